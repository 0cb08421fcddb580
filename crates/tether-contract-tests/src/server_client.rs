use crate::BackendFactory;
use crate::case::{TckCase, TckSuite};
use crate::support::{process, run_processes};
use parking_lot::Mutex;
use std::collections::BTreeSet;
use tether_core::ChannelState;

const SERVER: &str = "even";
const CLIENTS: &str = "odd";

pub(crate) fn suite<F: BackendFactory>() -> TckSuite<F> {
    TckSuite {
        name: "server_client",
        cases: vec![
            TckCase {
                name: "two_processes_exchange_once",
                test: two_processes_exchange_once::<F>,
            },
            TckCase {
                name: "four_processes_reconcile_identity",
                test: four_processes_reconcile_identity::<F>,
            },
            TckCase {
                name: "broadcast_reaches_every_client",
                test: broadcast_reaches_every_client::<F>,
            },
        ],
    }
}

/// 一个服务端、一个客户端：服务端发 1，客户端确认后回 2，双方关闭。
fn two_processes_exchange_once<F: BackendFactory>(factory: &F) {
    run_processes(
        factory,
        vec![
            process(|channel| {
                channel
                    .accept_connection_as_server(SERVER, CLIENTS, 1)
                    .expect("服务端建立连接");
                assert_eq!(channel.remote_size(), 1);
                channel.send(&1_i32, 0).expect("发送");
                assert_eq!(channel.receive::<i32>(0).expect("接收"), 2);
                channel.close_connection().expect("关闭");
            }),
            process(|channel| {
                channel
                    .request_connection_as_client(SERVER, CLIENTS)
                    .expect("客户端建立连接");
                assert_eq!(channel.receive::<i32>(0).expect("接收"), 1);
                channel.send(&2_i32, 0).expect("发送");
                channel.close_connection().expect("关闭");
            }),
        ],
    );
}

/// 四个进程：进程 0 为期待两个客户端的服务端，进程 1 静默，进程 2、3 为客户端。
///
/// 客户端以首条消息告知身份（全局秩）；服务端不论身份落在哪个本地秩，都按本地秩
/// 回发 `identity * 10` 并期待 `identity * 10 + 2`。
fn four_processes_reconcile_identity<F: BackendFactory>(factory: &F) {
    let seen = Mutex::new(Vec::new());
    let client = |identity: i32| {
        process(move |channel| {
            channel
                .request_connection_as_client(SERVER, CLIENTS)
                .expect("客户端建立连接");
            assert_eq!(channel.local_ranks(), vec![0]);
            channel.send(&identity, 0).expect("告知身份");
            let echoed = channel.receive::<i32>(0).expect("接收回发");
            assert_eq!(echoed, identity * 10);
            channel.send(&(echoed + 2), 0).expect("发送应答");
            channel.close_connection().expect("关闭");
        })
    };

    run_processes(
        factory,
        vec![
            process(|channel| {
                channel
                    .accept_connection_as_server(SERVER, CLIENTS, 2)
                    .expect("服务端建立连接");
                assert_eq!(channel.local_ranks(), vec![0, 1]);
                for local_rank in 0..2 {
                    let identity = channel.receive::<i32>(local_rank).expect("接收身份");
                    assert!(
                        identity == 2 || identity == 3,
                        "本地秩 {local_rank} 上出现未知身份 {identity}"
                    );
                    channel.send(&(identity * 10), local_rank).expect("回发");
                    let answer = channel.receive::<i32>(local_rank).expect("接收应答");
                    assert_eq!(answer, identity * 10 + 2);
                    seen.lock().push(identity);
                }
                channel.close_connection().expect("关闭");
            }),
            process(|channel| {
                assert_eq!(channel.state(), ChannelState::Disconnected);
                assert_eq!(channel.remote_size(), 0);
                assert!(channel.local_ranks().is_empty());
            }),
            client(2),
            client(3),
        ],
    );

    let seen: BTreeSet<i32> = seen.into_inner().into_iter().collect();
    assert_eq!(seen, BTreeSet::from([2, 3]), "两个身份各占一个本地秩");
}

/// 服务端向三个客户端广播同一值，每个客户端以各自身份应答。
fn broadcast_reaches_every_client<F: BackendFactory>(factory: &F) {
    let client = |identity: u32| {
        process(move |channel| {
            channel
                .request_connection_as_client(SERVER, CLIENTS)
                .expect("客户端建立连接");
            assert_eq!(channel.receive::<u64>(0).expect("接收广播"), 0xC0FFEE);
            channel.send(&identity, 0).expect("应答");
            channel.close_connection().expect("关闭");
        })
    };

    run_processes(
        factory,
        vec![
            process(|channel| {
                channel
                    .accept_connection_as_server(SERVER, CLIENTS, 3)
                    .expect("服务端建立连接");
                channel.broadcast(&0xC0FFEE_u64).expect("广播");
                let answers: BTreeSet<u32> = channel
                    .local_ranks()
                    .into_iter()
                    .map(|rank| channel.receive::<u32>(rank).expect("接收应答"))
                    .collect();
                assert_eq!(answers, BTreeSet::from([1, 2, 3]));
                channel.close_connection().expect("关闭");
            }),
            client(1),
            client(2),
            client(3),
        ],
    );
}
