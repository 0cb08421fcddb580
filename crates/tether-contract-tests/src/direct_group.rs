use crate::BackendFactory;
use crate::case::{TckCase, TckSuite};
use crate::support::{process, run_processes};
use parking_lot::Mutex;
use tether_core::{ChannelState, codes};

const ACCEPTOR: &str = "solver";
const REQUESTER: &str = "mesh";
const GROUP_SIZE: u32 = 3;

pub(crate) fn suite<F: BackendFactory>() -> TckSuite<F> {
    TckSuite {
        name: "direct_group",
        cases: vec![
            TckCase {
                name: "requester_group_lands_on_declared_ranks",
                test: requester_group_lands_on_declared_ranks::<F>,
            },
            TckCase {
                name: "out_of_range_requester_rank_is_rejected",
                test: out_of_range_requester_rank_is_rejected::<F>,
            },
            TckCase {
                name: "inconsistent_group_size_releases_admitted_links",
                test: inconsistent_group_size_releases_admitted_links::<F>,
            },
            TckCase {
                name: "duplicate_rank_releases_admitted_links",
                test: duplicate_rank_releases_admitted_links::<F>,
            },
        ],
    }
}

/// 三个请求方以同一组名直连一个接受方，接受方在与声明秩相同的本地秩上找到各自的端点。
fn requester_group_lands_on_declared_ranks<F: BackendFactory>(factory: &F) {
    let requester = |rank: u32| {
        process(move |channel| {
            channel
                .request_connection(ACCEPTOR, REQUESTER, rank, GROUP_SIZE)
                .expect("请求方建立连接");
            assert_eq!(channel.local_ranks(), vec![0]);
            channel.send(&(i64::from(rank) * 100), 0).expect("发送");
            assert_eq!(channel.receive::<i64>(0).expect("接收"), i64::from(rank) + 1);
            channel.close_connection().expect("关闭");
        })
    };

    let mut processes = vec![process(|channel| {
        channel
            .accept_connection(ACCEPTOR, REQUESTER)
            .expect("接受方建立连接");
        assert_eq!(channel.remote_size(), GROUP_SIZE as usize);
        assert_eq!(channel.local_ranks(), vec![0, 1, 2]);
        for rank in 0..GROUP_SIZE as usize {
            let value = channel.receive::<i64>(rank).expect("接收");
            assert_eq!(value, rank as i64 * 100, "本地秩 {rank} 必须承载声明秩 {rank}");
            channel.send(&(rank as i64 + 1), rank).expect("回发");
        }
        channel.close_connection().expect("关闭");
    })];
    processes.extend((0..GROUP_SIZE).rev().map(requester));
    run_processes(factory, processes);
}

/// 声明秩不小于组大小时，请求在任何 I/O 之前被拒绝，通道保持 `Disconnected`。
fn out_of_range_requester_rank_is_rejected<F: BackendFactory>(factory: &F) {
    run_processes(
        factory,
        vec![process(|channel| {
            let err = channel
                .request_connection(ACCEPTOR, REQUESTER, 2, 2)
                .expect_err("越界秩必须被拒绝");
            assert_eq!(err.code(), codes::CHANNEL_INVALID_ARGUMENT);
            assert!(err.is_contract_violation());
            assert_eq!(channel.state(), ChannelState::Disconnected);
        })],
    );
}

/// 两个请求方分别声明 `(0, 2)` 与 `(1, 3)`：后到者的组大小与先到者不一致。
fn inconsistent_group_size_releases_admitted_links<F: BackendFactory>(factory: &F) {
    rejected_member_releases_admitted_links(factory, [(0, 2), (1, 3)]);
}

/// 两个请求方都声明 `(0, 2)`：后到者的秩已被占用。
fn duplicate_rank_releases_admitted_links<F: BackendFactory>(factory: &F) {
    rejected_member_releases_admitted_links(factory, [(0, 2), (0, 2)]);
}

/// 接受方拒绝后到的组员时，整个建立失败并回到 `Disconnected`；
/// 被拒者收到 NAK，先前已被接纳的组员随后在接收时看到链路断开。
///
/// 到达顺序不确定，因此每个请求方都接受两种结局之一，最后核对恰好各出现一次。
fn rejected_member_releases_admitted_links<F: BackendFactory>(
    factory: &F,
    declared: [(u32, u32); 2],
) {
    let outcomes = Mutex::new(Vec::new());
    let outcomes_ref = &outcomes;
    let requester = |(rank, size): (u32, u32)| {
        process(move |channel| {
            match channel.request_connection(ACCEPTOR, REQUESTER, rank, size) {
                Err(err) => {
                    assert_eq!(err.code(), codes::PROTOCOL_HANDSHAKE);
                    assert_eq!(channel.state(), ChannelState::Disconnected);
                    outcomes_ref.lock().push("rejected");
                }
                Ok(()) => {
                    let err = channel
                        .receive::<i32>(0)
                        .expect_err("接受方释放链路后接收必须失败");
                    assert!(err.is_transfer_failure(), "意外错误：{err}");
                    channel.close_connection().expect("关闭");
                    outcomes_ref.lock().push("released");
                }
            }
        })
    };

    let mut processes = vec![process(|channel| {
        let err = channel
            .accept_connection(ACCEPTOR, REQUESTER)
            .expect_err("不一致的组员必须使建立失败");
        assert_eq!(err.code(), codes::PROTOCOL_HANDSHAKE);
        assert_eq!(channel.state(), ChannelState::Disconnected);
        assert_eq!(channel.remote_size(), 0);
    })];
    processes.extend(declared.into_iter().map(requester));
    run_processes(factory, processes);

    let mut outcomes = outcomes.into_inner();
    outcomes.sort_unstable();
    assert_eq!(outcomes, vec!["rejected", "released"]);
}
