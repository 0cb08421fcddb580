use crate::error;
use crate::port::{PortLink, PortListener};
use serde::Deserialize;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use tether_core::io::{cancelled_error, map_io_error};
use tether_core::{Backend, CallContext};

/// 具名端口后端配置。
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PortBackendConfig {
    port_directory: PathBuf,
}

impl Default for PortBackendConfig {
    fn default() -> Self {
        Self {
            port_directory: std::env::temp_dir().join("tether-ports"),
        }
    }
}

impl PortBackendConfig {
    /// 端口套接字文件所在目录。
    pub fn new(port_directory: impl Into<PathBuf>) -> Self {
        Self {
            port_directory: port_directory.into(),
        }
    }

    pub fn port_directory(&self) -> &std::path::Path {
        &self.port_directory
    }
}

/// 具名端口传输后端：端口名是 `port_directory` 下的 Unix 域套接字路径。
#[derive(Clone, Debug, Default)]
pub struct PortBackend {
    config: PortBackendConfig,
}

impl PortBackend {
    pub fn new(config: PortBackendConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PortBackendConfig {
        &self.config
    }

    /// 端口名在进程内全局递增，同一进程内的多个后端实例不会互相覆盖。
    fn next_port_path(&self) -> PathBuf {
        static NEXT_PORT: AtomicU64 = AtomicU64::new(0);
        let seq = NEXT_PORT.fetch_add(1, Ordering::Relaxed);
        self.config
            .port_directory
            .join(format!("port-{}-{seq}.sock", std::process::id()))
    }
}

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = tether_core::Result<T>> + Send + 'a>>;

impl Backend for PortBackend {
    type Link = PortLink;
    type Listener = PortListener;
    type ListenFuture<'a> = BoxFuture<'a, PortListener>;
    type ConnectFuture<'a> = BoxFuture<'a, PortLink>;

    fn scheme(&self) -> &'static str {
        "port"
    }

    fn listen<'a>(&'a self, ctx: &'a CallContext) -> Self::ListenFuture<'a> {
        Box::pin(async move {
            if ctx.cancellation().is_cancelled() {
                return Err(cancelled_error(error::OPEN));
            }
            tokio::fs::create_dir_all(&self.config.port_directory)
                .await
                .map_err(|err| map_io_error(error::OPEN, err))?;
            PortListener::open(self.next_port_path())
        })
    }

    fn connect<'a>(&'a self, ctx: &'a CallContext, address: &'a str) -> Self::ConnectFuture<'a> {
        Box::pin(async move { PortLink::connect(ctx, address.trim()).await })
    }
}
