#![doc = r#"
# tether-transport-tcp

## 设计动机（Why）
- 为 `tether-core` 的 [`Backend`](tether_core::Backend) 能力接口提供基于 TCP 套接字的实现，
  使分布在不同主机上的耦合进程可以经共享文件系统汇合后直接互连。

## 核心契约（What）
- [`TcpBackend`]：监听配置的地址，汇合文件中记录 `ip:port`；
- [`TcpListener`]：接受入站连接并应用 [`TcpSocketConfig`]；
- [`TcpLink`]：读满/写满语义的字节流链路，关闭时写半关闭后释放。

## 实现策略（How）
- 基于 Tokio `TcpListener`/`TcpStream`，所有 I/O 经
  [`run_with_context`](tether_core::io::run_with_context) 继承取消与截止；
- 套接字选项通过 `socket2::SockRef` 写入，I/O 错误按操作映射为
  `tether.transport.tcp.*` 错误码。
"#]

mod backend;
mod error;
mod link;
mod listener;

pub use backend::{TcpBackend, TcpBackendConfig};
pub use link::{TcpLink, TcpSocketConfig};
pub use listener::TcpListener;
