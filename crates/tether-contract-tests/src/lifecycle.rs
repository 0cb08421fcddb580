use crate::BackendFactory;
use crate::case::{TckCase, TckSuite};
use crate::support::{process, run_processes};
use tether_core::{ChannelState, codes};

const SERVER: &str = "even";
const CLIENTS: &str = "odd";

pub(crate) fn suite<F: BackendFactory>() -> TckSuite<F> {
    TckSuite {
        name: "lifecycle",
        cases: vec![
            TckCase {
                name: "operations_before_connect_are_rejected",
                test: operations_before_connect_are_rejected::<F>,
            },
            TckCase {
                name: "zero_clients_stay_disconnected",
                test: zero_clients_stay_disconnected::<F>,
            },
            TckCase {
                name: "unknown_rank_and_reconnect_are_rejected",
                test: unknown_rank_and_reconnect_are_rejected::<F>,
            },
            TckCase {
                name: "close_is_terminal_and_idempotent",
                test: close_is_terminal_and_idempotent::<F>,
            },
            TckCase {
                name: "establishment_directory_is_prepared_and_removed",
                test: establishment_directory_is_prepared_and_removed::<F>,
            },
        ],
    }
}

fn operations_before_connect_are_rejected<F: BackendFactory>(factory: &F) {
    run_processes(
        factory,
        vec![process(|channel| {
            let err = channel.send(&1_i32, 0).expect_err("未连接时发送必须失败");
            assert_eq!(err.code(), codes::CHANNEL_INVALID_STATE);
            let err = channel
                .receive::<String>(0)
                .expect_err("未连接时接收必须失败");
            assert_eq!(err.code(), codes::CHANNEL_INVALID_STATE);
            let err = channel.close_connection().expect_err("未连接时关闭必须失败");
            assert_eq!(err.code(), codes::CHANNEL_INVALID_STATE);
            assert_eq!(channel.state(), ChannelState::Disconnected);
        })],
    );
}

/// 期待零个客户端的服务端立即返回，不发布地址、不持有端点，之后仍可正常建立连接。
fn zero_clients_stay_disconnected<F: BackendFactory>(factory: &F) {
    run_processes(
        factory,
        vec![
            process(|channel| {
                channel
                    .accept_connection_as_server(SERVER, CLIENTS, 0)
                    .expect("零客户端立即返回");
                assert_eq!(channel.state(), ChannelState::Disconnected);
                assert_eq!(channel.remote_size(), 0);

                channel
                    .accept_connection_as_server(SERVER, CLIENTS, 1)
                    .expect("随后照常建立连接");
                assert_eq!(channel.receive::<u32>(0).expect("接收"), 5);
                channel.close_connection().expect("关闭");
            }),
            process(|channel| {
                channel
                    .request_connection_as_client(SERVER, CLIENTS)
                    .expect("客户端建立连接");
                channel.send(&5_u32, 0).expect("发送");
                channel.close_connection().expect("关闭");
            }),
        ],
    );
}

/// 未知本地秩属于调用方违例，不破坏已有端点；已连接的通道不得再次建立。
fn unknown_rank_and_reconnect_are_rejected<F: BackendFactory>(factory: &F) {
    run_processes(
        factory,
        vec![
            process(|channel| {
                channel
                    .accept_connection_as_server(SERVER, CLIENTS, 1)
                    .expect("服务端建立连接");

                let err = channel.send(&1_i32, 5).expect_err("未知本地秩必须被拒绝");
                assert_eq!(err.code(), codes::CHANNEL_UNKNOWN_RANK);
                assert!(err.is_contract_violation());

                let err = channel
                    .accept_connection_as_server(SERVER, CLIENTS, 1)
                    .expect_err("已连接的通道不得再次建立");
                assert_eq!(err.code(), codes::CHANNEL_INVALID_STATE);
                assert_eq!(channel.state(), ChannelState::Connected);

                channel.send(&1_i32, 0).expect("端点仍可用");
                assert_eq!(channel.receive::<i32>(0).expect("接收"), 2);
                channel.close_connection().expect("关闭");
            }),
            process(|channel| {
                channel
                    .request_connection_as_client(SERVER, CLIENTS)
                    .expect("客户端建立连接");
                let err = channel
                    .request_connection_as_client(SERVER, CLIENTS)
                    .expect_err("已连接的通道不得再次建立");
                assert_eq!(err.code(), codes::CHANNEL_INVALID_STATE);

                assert_eq!(channel.receive::<i32>(0).expect("接收"), 1);
                channel.send(&2_i32, 0).expect("发送");
                channel.close_connection().expect("关闭");
            }),
        ],
    );
}

/// 关闭两次均成功；关闭后的收发与重新建立都被拒绝。
fn close_is_terminal_and_idempotent<F: BackendFactory>(factory: &F) {
    let after_close = |channel: &mut tether_core::BlockingChannel<F::Backend>| {
        assert_eq!(channel.state(), ChannelState::Closed);
        assert_eq!(channel.remote_size(), 0);
        channel.close_connection().expect("重复关闭必须成功");

        let err = channel.send(&1_i32, 0).expect_err("关闭后发送必须失败");
        assert_eq!(err.code(), codes::CHANNEL_INVALID_STATE);
        let err = channel
            .receive::<i32>(0)
            .expect_err("关闭后接收必须失败");
        assert_eq!(err.code(), codes::CHANNEL_INVALID_STATE);
        let err = channel
            .accept_connection_as_server(SERVER, CLIENTS, 0)
            .expect_err("关闭后不得重新建立");
        assert_eq!(err.code(), codes::CHANNEL_INVALID_STATE);
    };

    run_processes(
        factory,
        vec![
            process(move |channel| {
                channel
                    .accept_connection_as_server(SERVER, CLIENTS, 1)
                    .expect("服务端建立连接");
                channel.send(&true, 0).expect("发送");
                channel.close_connection().expect("关闭");
                after_close(channel);
            }),
            process(move |channel| {
                channel
                    .request_connection_as_client(SERVER, CLIENTS)
                    .expect("客户端建立连接");
                assert!(channel.receive::<bool>(0).expect("接收"));
                channel.close_connection().expect("关闭");
                after_close(channel);
            }),
        ],
    );
}

/// `prepare_establishment` 创建汇合目录，`cleanup_establishment` 删除它，二者均可重复调用。
fn establishment_directory_is_prepared_and_removed<F: BackendFactory>(factory: &F) {
    run_processes(
        factory,
        vec![process(|channel| {
            let root = channel.channel().config().registry_root();
            channel.prepare_establishment().expect("准备汇合目录");
            channel.prepare_establishment().expect("重复准备");
            assert!(root.is_dir());

            channel.cleanup_establishment().expect("清理汇合目录");
            channel.cleanup_establishment().expect("重复清理");
            assert!(!root.exists());
        })],
    );
}
