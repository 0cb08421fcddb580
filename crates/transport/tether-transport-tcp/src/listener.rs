use crate::error::{self, ACCEPT};
use crate::link::{TcpLink, TcpSocketConfig};
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use tether_core::io::{map_io_error, run_with_context};
use tether_core::{BackendListener, CallContext, CoreError};
use tokio::net::TcpListener as TokioTcpListener;
use tracing::debug;

/// 对 Tokio `TcpListener` 的语义封装。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 接受方在汇合期间持有监听器，把可连接地址写入汇合文件；全部请求方连入后即丢弃，
///   监听端口随之释放。
///
/// ## 逻辑 (How)
/// - `bind`：绑定配置的地址（端口 `0` 表示由内核分配），读取实际端口；
///   对外公布的地址使用 `advertise` 覆盖绑定 IP，适配绑定 `0.0.0.0` 的场景；
/// - `accept`：经 `run_with_context` 继承取消/截止语义，成功后应用套接字配置。
///
/// ## 注意事项 (Trade-offs)
/// - 取消依赖定时轮询，存在毫秒级响应延迟。
#[derive(Debug)]
pub struct TcpListener {
    inner: TokioTcpListener,
    local_addr: SocketAddr,
    address: String,
    socket_config: TcpSocketConfig,
}

impl TcpListener {
    /// 绑定到指定地址。
    pub async fn bind(
        addr: SocketAddr,
        advertise: Option<std::net::IpAddr>,
        socket_config: TcpSocketConfig,
    ) -> Result<Self, CoreError> {
        let listener = TokioTcpListener::bind(addr)
            .await
            .map_err(|err| map_io_error(error::BIND, err))?;
        let local_addr = listener
            .local_addr()
            .map_err(|err| map_io_error(error::BIND, err))?;
        let published = SocketAddr::new(advertise.unwrap_or(local_addr.ip()), local_addr.port());
        debug!(local = %local_addr, published = %published, "tcp listener bound");
        Ok(Self {
            inner: listener,
            local_addr,
            address: published.to_string(),
            socket_config,
        })
    }

    /// 返回监听器实际绑定的地址。
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// 接受一个入站连接。
    pub async fn accept_link(&self, ctx: &CallContext) -> Result<TcpLink, CoreError> {
        let (stream, remote) = run_with_context(ctx, ACCEPT, self.inner.accept()).await?;
        debug!(remote = %remote, "tcp connection accepted");
        TcpLink::from_stream(stream, &self.socket_config)
    }
}

impl BackendListener for TcpListener {
    type Link = TcpLink;

    type AcceptFuture<'a>
        = Pin<Box<dyn Future<Output = tether_core::Result<TcpLink>> + Send + 'a>>
    where
        Self: 'a;

    fn address(&self) -> &str {
        &self.address
    }

    fn accept<'a>(&'a self, ctx: &'a CallContext) -> Self::AcceptFuture<'a> {
        Box::pin(async move { self.accept_link(ctx).await })
    }
}
