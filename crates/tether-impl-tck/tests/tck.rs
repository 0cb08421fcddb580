//! 仓库内传输后端对契约测试套件（TCK）的整体验证入口。
//!
//! # 教案式综述
//! - **意图 (Why)**：套接字后端与具名端口后端必须表现出完全一致的通道契约，任何改动都要通过同一套件；
//! - **执行方式 (How)**：`#[tether_tck]` 为每个主题注入一个 `#[test]`，内部调用
//!   `tether_contract_tests::run_*_suite`，失败时 panic 信息带有“后端/套件/用例/进程”上下文。

use tether_contract_tests::tether_tck;

#[tether_tck(factory = tether_impl_tck::TcpFactory::default())]
mod tcp_backend_tck {}

#[cfg(unix)]
#[tether_tck(factory = tether_impl_tck::PortFactory)]
mod port_backend_tck {
    //! 端口文件位于每个用例的临时目录下，用例之间互不干扰。
}
