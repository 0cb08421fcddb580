#![doc = r#"
# tether-impl-tck

## 章节定位（Why）
- **目标**：把 `tether-contract-tests` 的与后端无关的契约套件接到仓库内的两个真实后端上，
  并补充只有真实传输才能观察到的行为（汇合文件里的地址形态、端口文件回收、对端断开）。

## 结构概览（How）
- [`TcpFactory`] 与 [`PortFactory`] 为契约套件构造后端，`tests/tck.rs` 以 `#[tether_tck]` 展开全部套件；
- `transport` 测试模块收纳后端特有的异步测试，使用 Tokio 多线程运行时直接驱动
  `CommunicationChannel`。
"#]

use std::path::Path;
use tether_contract_tests::BackendFactory;
use tether_transport_tcp::{TcpBackend, TcpBackendConfig};

/// 套接字后端工厂：每个模拟进程绑定回环地址上的临时端口。
#[derive(Clone, Debug, Default)]
pub struct TcpFactory {
    config: TcpBackendConfig,
}

impl TcpFactory {
    pub fn new(config: TcpBackendConfig) -> Self {
        Self { config }
    }
}

impl BackendFactory for TcpFactory {
    type Backend = TcpBackend;

    fn name(&self) -> &'static str {
        "tcp"
    }

    fn create(&self, _scratch: &Path) -> TcpBackend {
        TcpBackend::new(self.config.clone())
    }
}

/// 具名端口后端工厂：端口文件位于用例临时目录下的 `ports/`。
#[cfg(unix)]
#[derive(Clone, Copy, Debug, Default)]
pub struct PortFactory;

#[cfg(unix)]
impl BackendFactory for PortFactory {
    type Backend = tether_transport_port::PortBackend;

    fn name(&self) -> &'static str {
        "port"
    }

    fn create(&self, scratch: &Path) -> Self::Backend {
        tether_transport_port::PortBackend::new(tether_transport_port::PortBackendConfig::new(
            scratch.join("ports"),
        ))
    }
}

/// 传输相关测试集合。
#[cfg(test)]
pub mod transport {
    use std::path::Path;
    use std::time::Duration;

    use anyhow::{Context, Result};
    use tether_core::{
        Backend, CallContext, Cancellation, ChannelConfig, ChannelState, CommunicationChannel,
        ConnectionRegistry, Deadline, EndpointState, ErrorCategory, codes,
    };

    const SERVER: &str = "even";
    const CLIENTS: &str = "odd";

    fn config(exchange: &Path) -> ChannelConfig {
        ChannelConfig::new(exchange).with_lookup_poll_interval(Duration::from_millis(2))
    }

    fn channel<B: Backend>(backend: B, exchange: &Path) -> Result<CommunicationChannel<B>> {
        CommunicationChannel::new(backend, config(exchange)).context("构建通道")
    }

    /// 套接字后端上的汇合与传输行为。
    pub mod tcp_rendezvous {
        use super::*;
        use std::net::SocketAddr;
        use tether_transport_tcp::TcpBackend;

        /// 汇合文件中发布的是可解析的 `ip:port`，建立完成后文件被撤回。
        #[tokio::test(flavor = "multi_thread")]
        async fn published_address_is_a_socket_address() -> Result<()> {
            let dir = tempfile::tempdir()?;
            let registry = ConnectionRegistry::new(&config(dir.path()));
            let entry = registry.entry_path(SERVER, CLIENTS)?;
            let mut server = channel(TcpBackend::default(), dir.path())?;
            let mut client = channel(TcpBackend::default(), dir.path())?;

            let ctx = CallContext::default();
            let (accepted, requested) = tokio::join!(
                server.accept_connection_as_server(SERVER, CLIENTS, 1),
                async {
                    let address = registry.lookup(&ctx, SERVER, CLIENTS).await?;
                    let parsed: SocketAddr = address
                        .parse()
                        .map_err(|err| anyhow::anyhow!("地址 {address:?} 无法解析: {err}"))?;
                    assert!(parsed.ip().is_loopback());
                    client
                        .request_connection_as_client(SERVER, CLIENTS)
                        .await
                        .context("客户端建立连接")
                },
            );
            accepted.context("服务端建立连接")?;
            requested?;
            assert!(!entry.exists(), "建立完成后汇合文件必须撤回");

            client.send(&"ping".to_string(), 0).await?;
            assert_eq!(server.receive::<String>(0).await?, "ping");
            client.close_connection().await?;
            server.close_connection().await?;
            Ok(())
        }

        /// 没有接受方时，请求在截止时间到达后以超时失败，通道回到 `Disconnected`。
        #[tokio::test(flavor = "multi_thread")]
        async fn request_without_acceptor_times_out() -> Result<()> {
            let dir = tempfile::tempdir()?;
            let ctx = CallContext::builder()
                .with_deadline(Deadline::after(Duration::from_millis(50)))
                .build();
            let mut client = channel(TcpBackend::default(), dir.path())?.with_context(ctx);
            let err = client
                .request_connection(SERVER, CLIENTS, 0, 1)
                .await
                .expect_err("无接受方时必须超时");
            assert_eq!(err.category(), ErrorCategory::Timeout);
            assert_eq!(client.state(), ChannelState::Disconnected);
            Ok(())
        }

        /// 取消等待中的接受：汇合文件撤回，监听器释放，通道可重试。
        #[tokio::test(flavor = "multi_thread")]
        async fn cancelled_accept_withdraws_address() -> Result<()> {
            let dir = tempfile::tempdir()?;
            let token = Cancellation::new();
            let ctx = CallContext::builder()
                .with_cancellation(token.clone())
                .build();
            let entry = ConnectionRegistry::new(&config(dir.path())).entry_path(SERVER, CLIENTS)?;
            let mut server = channel(TcpBackend::default(), dir.path())?.with_context(ctx);

            let watched = entry.clone();
            let canceller = tokio::spawn(async move {
                while !watched.exists() {
                    tokio::time::sleep(Duration::from_millis(2)).await;
                }
                token.cancel();
            });
            let err = server
                .accept_connection_as_server(SERVER, CLIENTS, 1)
                .await
                .expect_err("取消必须打断接受");
            canceller.await?;
            assert_eq!(err.category(), ErrorCategory::Cancelled);
            assert_eq!(server.state(), ChannelState::Disconnected);
            assert!(!entry.exists());
            Ok(())
        }

        /// 对端断开后接收以传输失败返回，端点随之不可用，关闭仍然成功。
        #[tokio::test(flavor = "multi_thread")]
        async fn peer_loss_breaks_the_endpoint() -> Result<()> {
            let dir = tempfile::tempdir()?;
            let mut server = channel(TcpBackend::default(), dir.path())?;
            let mut client = channel(TcpBackend::default(), dir.path())?;
            let (accepted, requested) = tokio::join!(
                server.accept_connection_as_server(SERVER, CLIENTS, 1),
                client.request_connection_as_client(SERVER, CLIENTS),
            );
            accepted?;
            requested?;

            client.close_connection().await?;
            drop(client);

            let err = server
                .receive::<i32>(0)
                .await
                .expect_err("对端断开后接收必须失败");
            assert!(err.is_transfer_failure());
            assert_eq!(
                server.endpoint(0).map(|endpoint| endpoint.state()),
                Some(EndpointState::Broken)
            );
            let err = server.send(&1_i32, 0).await.expect_err("损坏端点不可再用");
            assert_eq!(err.code(), codes::CHANNEL_ENDPOINT_BROKEN);

            server.close_connection().await?;
            assert_eq!(server.state(), ChannelState::Closed);
            Ok(())
        }
    }

    /// 具名端口后端上的汇合行为。
    #[cfg(unix)]
    pub mod port_rendezvous {
        use super::*;
        use tether_transport_port::{PortBackend, PortBackendConfig};

        fn backend(dir: &Path) -> PortBackend {
            PortBackend::new(PortBackendConfig::new(dir.join("ports")))
        }

        fn open_ports(dir: &Path) -> Result<usize> {
            let mut count = 0;
            for entry in std::fs::read_dir(dir.join("ports"))? {
                if entry?.path().extension().is_some_and(|ext| ext == "sock") {
                    count += 1;
                }
            }
            Ok(count)
        }

        /// 端口只在汇合期间存在：全部客户端连入后端口文件被回收，已建立的链路不受影响。
        #[tokio::test(flavor = "multi_thread")]
        async fn port_is_released_after_establishment() -> Result<()> {
            let dir = tempfile::tempdir()?;
            let mut server = channel(backend(dir.path()), dir.path())?;
            let mut first = channel(backend(dir.path()), dir.path())?;
            let mut second = channel(backend(dir.path()), dir.path())?;

            let (accepted, one, two) = tokio::join!(
                server.accept_connection_as_server(SERVER, CLIENTS, 2),
                first.request_connection_as_client(SERVER, CLIENTS),
                second.request_connection_as_client(SERVER, CLIENTS),
            );
            accepted?;
            one?;
            two?;
            assert_eq!(open_ports(dir.path())?, 0);

            server.broadcast(&3.5_f64).await?;
            assert_eq!(first.receive::<f64>(0).await?, 3.5);
            assert_eq!(second.receive::<f64>(0).await?, 3.5);

            for peer in [&mut first, &mut second] {
                peer.close_connection().await?;
            }
            server.close_connection().await?;
            Ok(())
        }

        /// 直连接受方拒绝客户端模式的握手，双方都回到 `Disconnected`。
        #[tokio::test(flavor = "multi_thread")]
        async fn mode_mismatch_is_rejected() -> Result<()> {
            let dir = tempfile::tempdir()?;
            let mut acceptor = channel(backend(dir.path()), dir.path())?;
            let mut client = channel(backend(dir.path()), dir.path())?;
            let (accepted, requested) = tokio::join!(
                acceptor.accept_connection(SERVER, CLIENTS),
                client.request_connection_as_client(SERVER, CLIENTS),
            );
            let err = accepted.expect_err("直连接受方必须拒绝客户端");
            assert_eq!(err.code(), codes::PROTOCOL_HANDSHAKE);
            let err = requested.expect_err("客户端必须收到拒绝");
            assert!(err.is_contract_violation());
            assert_eq!(acceptor.state(), ChannelState::Disconnected);
            assert_eq!(client.state(), ChannelState::Disconnected);
            Ok(())
        }
    }
}
