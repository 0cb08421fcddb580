#![deny(unsafe_code)]
#![allow(clippy::result_large_err)]
#![doc = r#"
# tether-core

## 设计动机（Why）
- **定位**：为独立启动的多个进程（例如耦合求解器）提供面向连接的点对点通信通道，
  在可替换的传输后端（TCP 套接字、具名端口）之上交换强类型数据。
- **核心难点**：连接建立协议（直连的成对握手与“一服务端多客户端”汇合）以及在其上
  构建的类型化收发契约；二者必须与所插入的后端无关、行为一致。

## 核心契约（What）
- [`CommunicationChannel`]：进程内唯一的通道句柄，管理按 `LocalRank` 编号的
  [`Endpoint`]，执行严格前向的生命周期状态机
  `Disconnected → Connecting → Connected → Closed`；
- [`Backend`]：传输后端的能力接口（监听、接受、连接、读写、关闭），通道核心仅依赖该接口；
- [`ConnectionRegistry`]：基于共享交换目录的汇合文件，负责把参与者名称对解析为可连接地址；
- [`wire`]：标量、定长数组与变长序列的线上格式；
- [`BlockingChannel`]：为无异步运行时的调用方提供阻塞式外观。

## 实现策略（How）
- 所有 I/O 都在 [`CallContext`] 下执行，由 [`io::run_with_context`] 将取消与截止时间
  与 I/O Future 组合；默认上下文不设截止，保持无界阻塞语义。
- 失败统一映射为带稳定错误码与 [`ErrorCategory`] 的 [`CoreError`]。
"#]

pub mod backend;
pub mod blocking;
pub mod channel;
pub mod config;
pub mod contract;
pub mod endpoint;
pub mod error;
pub mod handshake;
pub mod io;
pub mod prelude;
pub mod registry;
mod rendezvous;
#[cfg(any(test, feature = "test-util"))]
pub mod testing;
pub mod wire;

pub use backend::{Backend, BackendListener, Link};
pub use blocking::BlockingChannel;
pub use channel::{ChannelState, CommunicationChannel, LocalRank};
pub use config::ChannelConfig;
pub use contract::{CallContext, CallContextBuilder, Cancellation, Deadline};
pub use endpoint::{Endpoint, EndpointState};
pub use error::{CoreError, ErrorCategory, Result, RetryAdvice, codes};
pub use registry::ConnectionRegistry;
pub use wire::{Element, Scalar, WireError};
