use crate::error::ADDRESS;
use crate::link::{TcpLink, TcpSocketConfig};
use crate::listener::TcpListener;
use serde::Deserialize;
use std::future::Future;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::pin::Pin;
use tether_core::{Backend, CallContext, CoreError, ErrorCategory};

/// TCP 后端配置。
///
/// ```rust
/// use tether_transport_tcp::TcpBackendConfig;
///
/// let config: TcpBackendConfig = toml::from_str(
///     r#"
///     bind_addr = "0.0.0.0"
///     advertise_addr = "10.0.0.7"
///     [socket]
///     linger_ms = 2000
///     "#,
/// )
/// .expect("合法配置");
/// assert_eq!(config.port(), 0);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TcpBackendConfig {
    bind_addr: IpAddr,
    port: u16,
    advertise_addr: Option<IpAddr>,
    socket: TcpSocketConfig,
}

impl Default for TcpBackendConfig {
    fn default() -> Self {
        Self {
            bind_addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 0,
            advertise_addr: None,
            socket: TcpSocketConfig::default(),
        }
    }
}

impl TcpBackendConfig {
    pub fn with_bind_addr(mut self, addr: IpAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// 固定监听端口；`0` 表示由内核分配。
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// 写入汇合文件的 IP，缺省为实际绑定的 IP。
    pub fn with_advertise_addr(mut self, addr: IpAddr) -> Self {
        self.advertise_addr = Some(addr);
        self
    }

    pub fn with_socket_config(mut self, socket: TcpSocketConfig) -> Self {
        self.socket = socket;
        self
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_addr, self.port)
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn socket(&self) -> &TcpSocketConfig {
        &self.socket
    }
}

/// 套接字传输后端。
#[derive(Clone, Debug, Default)]
pub struct TcpBackend {
    config: TcpBackendConfig,
}

impl TcpBackend {
    pub fn new(config: TcpBackendConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TcpBackendConfig {
        &self.config
    }
}

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = tether_core::Result<T>> + Send + 'a>>;

impl Backend for TcpBackend {
    type Link = TcpLink;
    type Listener = TcpListener;
    type ListenFuture<'a> = BoxFuture<'a, TcpListener>;
    type ConnectFuture<'a> = BoxFuture<'a, TcpLink>;

    fn scheme(&self) -> &'static str {
        "tcp"
    }

    fn listen<'a>(&'a self, ctx: &'a CallContext) -> Self::ListenFuture<'a> {
        Box::pin(async move {
            if ctx.cancellation().is_cancelled() {
                return Err(tether_core::io::cancelled_error(crate::error::BIND));
            }
            TcpListener::bind(
                self.config.bind_addr(),
                self.config.advertise_addr,
                self.config.socket.clone(),
            )
            .await
        })
    }

    fn connect<'a>(&'a self, ctx: &'a CallContext, address: &'a str) -> Self::ConnectFuture<'a> {
        Box::pin(async move {
            let addr: SocketAddr = address.trim().parse().map_err(|err| {
                CoreError::new(ADDRESS.code, format!("{}: {address:?}: {err}", ADDRESS.message))
                    .with_category(ErrorCategory::NonRetryable)
            })?;
            TcpLink::connect(ctx, addr, &self.config.socket).await
        })
    }
}
