use crate::error::{self, CONFIGURE};
use serde::Deserialize;
use socket2::SockRef;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::time::Duration;
use tether_core::io::{map_io_error, run_with_context};
use tether_core::{CallContext, CoreError, Link};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// TCP 套接字级配置项。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 耦合进程交换的多为小而频繁的标量消息，默认关闭 Nagle 算法以避免 40ms 级的确认延迟；
/// - `SO_LINGER` 显式配置化，避免调用方直接操作 `socket2`。
///
/// ## 契约（What）
/// - `nodelay`：是否设置 `TCP_NODELAY`，默认 `true`；
/// - `linger_ms`：`Some(ms)` 时写入 `SO_LINGER`，`None` 沿用内核默认；
/// - 链路建立（接受或连接）后立即应用，失败以 `tether.transport.tcp.configure_failed` 报告。
///
/// ## 注意事项（Trade-offs）
/// - Linux 会将 linger 时长向下取整到秒。
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TcpSocketConfig {
    nodelay: bool,
    linger_ms: Option<u64>,
}

impl Default for TcpSocketConfig {
    fn default() -> Self {
        Self {
            nodelay: true,
            linger_ms: None,
        }
    }
}

impl TcpSocketConfig {
    pub fn with_nodelay(mut self, nodelay: bool) -> Self {
        self.nodelay = nodelay;
        self
    }

    /// 设置 `SO_LINGER` 超时时长。
    pub fn with_linger(mut self, linger: Option<Duration>) -> Self {
        self.linger_ms = linger.map(|dur| dur.as_millis().try_into().unwrap_or(u64::MAX));
        self
    }

    pub fn nodelay(&self) -> bool {
        self.nodelay
    }

    pub fn linger(&self) -> Option<Duration> {
        self.linger_ms.map(Duration::from_millis)
    }

    fn apply(&self, stream: &TcpStream) -> io::Result<()> {
        stream.set_nodelay(self.nodelay)?;
        SockRef::from(stream).set_linger(self.linger())
    }
}

type BoxFuture<'a> = Pin<Box<dyn Future<Output = tether_core::Result<()>> + Send + 'a>>;

/// 一条已建立的 TCP 链路。
#[derive(Debug)]
pub struct TcpLink {
    stream: TcpStream,
    peer: String,
}

impl TcpLink {
    pub(crate) fn from_stream(
        stream: TcpStream,
        config: &TcpSocketConfig,
    ) -> Result<Self, CoreError> {
        config
            .apply(&stream)
            .map_err(|err| map_io_error(CONFIGURE, err))?;
        let peer = stream
            .peer_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        Ok(Self { stream, peer })
    }

    /// 建立到 `addr` 的连接并应用套接字配置。
    pub async fn connect(
        ctx: &CallContext,
        addr: std::net::SocketAddr,
        config: &TcpSocketConfig,
    ) -> Result<Self, CoreError> {
        let stream = run_with_context(ctx, error::CONNECT, TcpStream::connect(addr)).await?;
        Self::from_stream(stream, config)
    }

    /// 读取当前生效的 `SO_LINGER`。
    pub fn linger(&self) -> Result<Option<Duration>, CoreError> {
        SockRef::from(&self.stream)
            .linger()
            .map_err(|err| map_io_error(CONFIGURE, err))
    }

    pub fn nodelay(&self) -> Result<bool, CoreError> {
        self.stream
            .nodelay()
            .map_err(|err| map_io_error(CONFIGURE, err))
    }
}

impl Link for TcpLink {
    type WriteFuture<'a> = BoxFuture<'a>;
    type ReadFuture<'a> = BoxFuture<'a>;
    type CloseFuture<'a> = BoxFuture<'a>;

    fn peer(&self) -> &str {
        &self.peer
    }

    fn write_all<'a>(&'a mut self, ctx: &'a CallContext, buf: &'a [u8]) -> Self::WriteFuture<'a> {
        Box::pin(async move {
            if buf.is_empty() {
                return Ok(());
            }
            run_with_context(ctx, error::WRITE, self.stream.write_all(buf)).await
        })
    }

    fn read_exact<'a>(
        &'a mut self,
        ctx: &'a CallContext,
        buf: &'a mut [u8],
    ) -> Self::ReadFuture<'a> {
        Box::pin(async move {
            if buf.is_empty() {
                return Ok(());
            }
            run_with_context(ctx, error::READ, async {
                self.stream.read_exact(buf).await.map(drop)
            })
            .await
        })
    }

    /// 写半关闭（发送 FIN）后释放；不等待对端 EOF，对端可能已先行关闭。
    fn close<'a>(&'a mut self, ctx: &'a CallContext) -> Self::CloseFuture<'a> {
        Box::pin(async move {
            run_with_context(ctx, error::SHUTDOWN, async {
                match self.stream.shutdown().await {
                    Err(err) if err.kind() == io::ErrorKind::NotConnected => Ok(()),
                    other => other,
                }
            })
            .await
        })
    }
}
