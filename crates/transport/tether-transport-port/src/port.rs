use crate::error;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use tether_core::io::{map_io_error, run_with_context};
use tether_core::{BackendListener, CallContext, CoreError, Link};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, warn};

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = tether_core::Result<T>> + Send + 'a>>;

/// 打开的具名端口。
///
/// # 教案式注释
///
/// ## 意图（Why）
/// - 同一主机上的耦合进程无需占用网络端口：端口名即套接字文件路径，写入汇合文件后
///   由请求方直接连接。
///
/// ## 契约（What）
/// - `open` 会先删除同名的残留套接字文件（上一次运行异常退出遗留）；
/// - 端口被丢弃时删除套接字文件，端口名随之失效。
#[derive(Debug)]
pub struct PortListener {
    inner: UnixListener,
    path: PathBuf,
    address: String,
}

impl PortListener {
    /// 在 `path` 处打开端口。
    pub fn open(path: PathBuf) -> Result<Self, CoreError> {
        match std::fs::remove_file(&path) {
            Ok(()) => warn!(path = %path.display(), "removed stale port file"),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => return Err(map_io_error(error::OPEN, err)),
        }
        let inner = UnixListener::bind(&path).map_err(|err| map_io_error(error::OPEN, err))?;
        let address = path.to_string_lossy().into_owned();
        debug!(port = %address, "port opened");
        Ok(Self {
            inner,
            path,
            address,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PortListener {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

impl BackendListener for PortListener {
    type Link = PortLink;
    type AcceptFuture<'a> = BoxFuture<'a, PortLink>;

    fn address(&self) -> &str {
        &self.address
    }

    fn accept<'a>(&'a self, ctx: &'a CallContext) -> Self::AcceptFuture<'a> {
        Box::pin(async move {
            let (stream, _) = run_with_context(ctx, error::ACCEPT, self.inner.accept()).await?;
            Ok(PortLink {
                stream,
                peer: format!("{}#accepted", self.address),
            })
        })
    }
}

/// 经具名端口建立的链路。
#[derive(Debug)]
pub struct PortLink {
    stream: UnixStream,
    peer: String,
}

impl PortLink {
    /// 连接名为 `port` 的端口。
    pub async fn connect(ctx: &CallContext, port: &str) -> Result<Self, CoreError> {
        let stream = run_with_context(ctx, error::CONNECT, UnixStream::connect(port)).await?;
        Ok(Self {
            stream,
            peer: port.to_string(),
        })
    }
}

impl Link for PortLink {
    type WriteFuture<'a> = BoxFuture<'a, ()>;
    type ReadFuture<'a> = BoxFuture<'a, ()>;
    type CloseFuture<'a> = BoxFuture<'a, ()>;

    fn peer(&self) -> &str {
        &self.peer
    }

    fn write_all<'a>(&'a mut self, ctx: &'a CallContext, buf: &'a [u8]) -> Self::WriteFuture<'a> {
        Box::pin(async move { run_with_context(ctx, error::WRITE, self.stream.write_all(buf)).await })
    }

    fn read_exact<'a>(
        &'a mut self,
        ctx: &'a CallContext,
        buf: &'a mut [u8],
    ) -> Self::ReadFuture<'a> {
        Box::pin(async move {
            run_with_context(ctx, error::READ, async {
                self.stream.read_exact(buf).await.map(drop)
            })
            .await
        })
    }

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
