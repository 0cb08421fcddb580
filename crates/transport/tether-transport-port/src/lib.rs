#![cfg(unix)]
#![doc = r#"
# tether-transport-port

## 设计动机（Why）
- 同一主机上的耦合进程以“具名端口”互连：接受方打开端口并把端口名写入汇合文件，
  请求方按名连接。端口实现为 Unix 域套接字，端口名即套接字文件路径。

## 核心契约（What）
- [`PortBackend`]：在 [`PortBackendConfig::port_directory`] 下以
  `port-<pid>-<seq>.sock` 命名新端口；
- [`PortListener`]：端口被丢弃时删除套接字文件；
- [`PortLink`]：读满/写满语义的字节流链路。

## 注意事项（Trade-offs）
- Unix 域套接字路径长度受限（Linux 约 108 字节），端口目录不宜过深；
- 仅在 Unix 平台编译。
"#]

mod backend;
mod error;
mod port;

pub use backend::{PortBackend, PortBackendConfig};
pub use port::{PortLink, PortListener};

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tether_core::{Backend, BackendListener, CallContext, Deadline, ErrorCategory, Link};

    #[test]
    fn config_parses_port_directory() {
        let config: PortBackendConfig =
            toml::from_str("port_directory = \"/run/tether\"").expect("合法配置");
        assert_eq!(config.port_directory(), std::path::Path::new("/run/tether"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn port_file_lives_with_listener() {
        let dir = tempfile::tempdir().expect("创建临时目录");
        let backend = PortBackend::new(PortBackendConfig::new(dir.path()));
        let ctx = CallContext::default();

        let listener = backend.listen(&ctx).await.expect("打开端口");
        let path = listener.path().to_path_buf();
        assert!(path.exists());
        assert!(path.starts_with(dir.path()));

        let address = listener.address().to_string();
        let (accepted, connected) =
            tokio::join!(listener.accept(&ctx), backend.connect(&ctx, &address));
        let mut server = accepted.expect("接受连接");
        let mut client = connected.expect("建立连接");

        server.write_all(&ctx, &[1, 2, 3]).await.expect("写入");
        let mut buf = [0u8; 3];
        client.read_exact(&ctx, &mut buf).await.expect("读取");
        assert_eq!(buf, [1, 2, 3]);

        client.close(&ctx).await.expect("关闭客户端");
        server.close(&ctx).await.expect("关闭服务端");

        drop(listener);
        assert!(!path.exists());
        let err = backend
            .connect(&ctx, &address)
            .await
            .expect_err("端口关闭后连接必须失败");
        assert_eq!(err.code(), "tether.transport.port.connect_failed");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn stale_port_file_is_replaced() {
        let dir = tempfile::tempdir().expect("创建临时目录");
        let path = dir.path().join("stale.sock");
        std::fs::write(&path, b"leftover").expect("写入残留文件");
        let listener = PortListener::open(path.clone()).expect("覆盖残留文件");
        assert_eq!(listener.path(), path.as_path());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn accept_honours_deadline() {
        let dir = tempfile::tempdir().expect("创建临时目录");
        let backend = PortBackend::new(PortBackendConfig::new(dir.path()));
        let ctx = CallContext::builder()
            .with_deadline(Deadline::after(Duration::from_millis(30)))
            .build();
        let listener = backend.listen(&ctx).await.expect("打开端口");
        let err = listener.accept(&ctx).await.expect_err("无人连接时必须超时");
        assert_eq!(err.category(), ErrorCategory::Timeout);
    }
}
