//! 进程内回环后端，供单元测试与 TCK 在无网络、无文件系统套接字的环境下驱动通道。
//!
//! 地址形如 `mem://<n>`，由全局表映射到监听器的入站队列；每条链路是一对
//! `tokio::io::duplex` 流。监听器被丢弃时从全局表注销，之后的连接以
//! `ConnectionRefused` 失败。

use crate::backend::{Backend, BackendListener, Link};
use crate::contract::CallContext;
use crate::io::{OperationKind, run_with_context};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::mpsc;

const ACCEPT: OperationKind =
    OperationKind::new("tether.transport.memory.accept_failed", "memory accept");
const CONNECT: OperationKind =
    OperationKind::new("tether.transport.memory.connect_failed", "memory connect");
const READ: OperationKind = OperationKind::new("tether.transport.memory.read_failed", "memory read");
const WRITE: OperationKind =
    OperationKind::new("tether.transport.memory.write_failed", "memory write");
const SHUTDOWN: OperationKind =
    OperationKind::new("tether.transport.memory.shutdown_failed", "memory shutdown");

const DEFAULT_BUFFER: usize = 64 * 1024;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = crate::Result<T>> + Send + 'a>>;
type Incoming = mpsc::UnboundedSender<(DuplexStream, String)>;

fn listeners() -> &'static Mutex<HashMap<String, Incoming>> {
    static LISTENERS: OnceLock<Mutex<HashMap<String, Incoming>>> = OnceLock::new();
    LISTENERS.get_or_init(|| Mutex::new(HashMap::new()))
}

fn next_id() -> u64 {
    static NEXT: AtomicU64 = AtomicU64::new(1);
    NEXT.fetch_add(1, Ordering::Relaxed)
}

/// 内存回环后端。
#[derive(Clone, Debug)]
pub struct MemoryBackend {
    buffer: usize,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            buffer: DEFAULT_BUFFER,
        }
    }

    /// 指定每个方向的管道缓冲区大小。
    pub fn with_buffer(buffer: usize) -> Self {
        Self { buffer }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// 内存监听器。
#[derive(Debug)]
pub struct MemoryListener {
    address: String,
    incoming: tokio::sync::Mutex<mpsc::UnboundedReceiver<(DuplexStream, String)>>,
}

impl Drop for MemoryListener {
    fn drop(&mut self) {
        listeners().lock().remove(&self.address);
    }
}

/// 内存链路。
#[derive(Debug)]
pub struct MemoryLink {
    stream: DuplexStream,
    peer: String,
}

impl Link for MemoryLink {
    type WriteFuture<'a> = BoxFuture<'a, ()>;
    type ReadFuture<'a> = BoxFuture<'a, ()>;
    type CloseFuture<'a> = BoxFuture<'a, ()>;

    fn peer(&self) -> &str {
        &self.peer
    }

    fn write_all<'a>(&'a mut self, ctx: &'a CallContext, buf: &'a [u8]) -> Self::WriteFuture<'a> {
        Box::pin(async move { run_with_context(ctx, WRITE, self.stream.write_all(buf)).await })
    }

    fn read_exact<'a>(
        &'a mut self,
        ctx: &'a CallContext,
        buf: &'a mut [u8],
    ) -> Self::ReadFuture<'a> {
        Box::pin(async move {
            run_with_context(ctx, READ, async { self.stream.read_exact(buf).await.map(drop) })
                .await
        })
    }

    fn close<'a>(&'a mut self, ctx: &'a CallContext) -> Self::CloseFuture<'a> {
        Box::pin(async move { run_with_context(ctx, SHUTDOWN, self.stream.shutdown()).await })
    }
}

impl BackendListener for MemoryListener {
    type Link = MemoryLink;
    type AcceptFuture<'a> = BoxFuture<'a, MemoryLink>;

    fn address(&self) -> &str {
        &self.address
    }

    fn accept<'a>(&'a self, ctx: &'a CallContext) -> Self::AcceptFuture<'a> {
        Box::pin(async move {
            let (stream, peer) = run_with_context(ctx, ACCEPT, async {
                self.incoming
                    .lock()
                    .await
                    .recv()
                    .await
                    .ok_or_else(|| io::Error::from(io::ErrorKind::ConnectionAborted))
            })
            .await?;
            Ok(MemoryLink { stream, peer })
        })
    }
}

impl Backend for MemoryBackend {
    type Link = MemoryLink;
    type Listener = MemoryListener;
    type ListenFuture<'a> = BoxFuture<'a, MemoryListener>;
    type ConnectFuture<'a> = BoxFuture<'a, MemoryLink>;

    fn scheme(&self) -> &'static str {
        "memory"
    }

    fn listen<'a>(&'a self, _ctx: &'a CallContext) -> Self::ListenFuture<'a> {
        Box::pin(async move {
            let address = format!("mem://{}", next_id());
            let (tx, rx) = mpsc::unbounded_channel();
            listeners().lock().insert(address.clone(), tx);
            Ok(MemoryListener {
                address,
                incoming: tokio::sync::Mutex::new(rx),
            })
        })
    }

    fn connect<'a>(&'a self, ctx: &'a CallContext, address: &'a str) -> Self::ConnectFuture<'a> {
        Box::pin(async move {
            let local = format!("mem-client://{}", next_id());
            let connecting = async {
                let sender = listeners()
                    .lock()
                    .get(address)
                    .cloned()
                    .ok_or_else(|| io::Error::from(io::ErrorKind::ConnectionRefused))?;
                let (ours, theirs) = tokio::io::duplex(self.buffer);
                sender
                    .send((theirs, local))
                    .map_err(|_| io::Error::from(io::ErrorKind::ConnectionRefused))?;
                Ok::<_, io::Error>(ours)
            };
            let stream = run_with_context(ctx, CONNECT, connecting).await?;
            Ok(MemoryLink {
                stream,
                peer: address.to_string(),
            })
        })
    }
}
