//! tether 契约测试套件（TCK）入口。
//!
//! # 教案式综述（Why / How / What）
//! - **为什么存在**：通道的建立协议与类型化收发契约必须与所插入的传输后端无关。本 crate 把这些契约
//!   收敛为一组与后端无关的用例，任何实现 [`Backend`] 的后端只需提供一个 [`BackendFactory`] 即可接受同一
//!   准绳的检验。
//! - **如何集成**：在目标仓库的 `tests` 目录下对模块标注 `#[tether_tck(factory = ...)]`（或直接调用
//!   `run_*_suite` 入口），即可将完整套件编译为标准的 Rust 测试；宏支持 `suites(...)` 选择子套件。
//! - **测试对象**：每个用例以若干“模拟进程”驱动，每个模拟进程是一个操作系统线程，持有独立的
//!   [`BlockingChannel`]，进程间只经共享的交换目录与后端链路交互，与独立启动的耦合进程同构。
//!
//! # 契约说明（What）
//! - **输入要求**：工厂在给定的临时目录下构造后端；同一用例内各模拟进程共享该目录。
//! - **输出保证**：全部用例通过即表明后端满足标量/数组/序列往返、服务端按到达顺序分配本地秩、
//!   静默参与者不阻塞、关闭幂等等契约。
//!
//! # 风险提示（Trade-offs）
//! - 每个用例带 30 秒截止时间，失败的一方退出后对端会随链路关闭或截止而失败，不会无限挂起；
//! - 失败信息附带“后端/套件/用例/进程”上下文，原始 panic 文本保留在末尾。
//!
//! # 模块结构
//! - `case` 模块：用例与套件的元信息以及统一执行函数；
//! - `primitives`、`vectors`、`server_client`、`direct_group`、`lifecycle` 分别实现五个主题；
//! - 顶层提供 `run_*_suite` 入口、[`MemoryFactory`] 与 `#[tether_tck]` 宏 re-export。

mod direct_group;
mod lifecycle;
mod primitives;
mod server_client;
mod support;
mod vectors;

use std::path::Path;
use tether_core::Backend;
use tether_core::testing::MemoryBackend;

pub use case::{TckCase, TckSuite, run_suite};
pub use tether_contract_tests_macros::tether_tck;

#[doc(no_inline)]
pub use tether_core::BlockingChannel;

/// 为每个用例构造被测后端。
///
/// # 教案式说明
/// - **意图 (Why)**：套件对后端类型泛型，但后端的构造参数（端口目录、绑定地址）因实现而异，
///   由工厂把这些差异挡在套件之外。
/// - **契约 (What)**：`create` 对同一用例内的每个模拟进程各调用一次；`scratch` 是该用例独占的临时目录，
///   用例结束后删除。返回的后端之间必须能够互连。
pub trait BackendFactory {
    /// 被测后端。
    type Backend: Backend;

    /// 出现在失败信息中的后端名称。
    fn name(&self) -> &'static str;

    fn create(&self, scratch: &Path) -> Self::Backend;
}

/// 进程内存回环后端的工厂，供无网络环境自测。
#[derive(Clone, Copy, Debug, Default)]
pub struct MemoryFactory;

impl BackendFactory for MemoryFactory {
    type Backend = MemoryBackend;

    fn name(&self) -> &'static str {
        "memory"
    }

    fn create(&self, _scratch: &Path) -> MemoryBackend {
        MemoryBackend::new()
    }
}

mod case {
    use super::{BackendFactory, support};
    use std::panic;
    use tracing::debug;

    /// 表示单个 TCK 用例的元信息。
    ///
    /// # 教案式说明
    /// - **意图 (Why)**：以结构体封装测试函数与名称，便于统一遍历、打印上下文信息。
    /// - **契约 (What)**：`test` 必须在失败时 `panic`；名称会用于错误提示。
    pub struct TckCase<F: BackendFactory> {
        /// 用例的人类可读名称。
        pub name: &'static str,
        /// 实际执行的断言逻辑。
        pub test: fn(&F),
    }

    /// 代表同一主题的一组 TCK 用例。
    pub struct TckSuite<F: BackendFactory> {
        /// 套件名称，与 `run_*_suite` 入口一一对应。
        pub name: &'static str,
        pub cases: Vec<TckCase<F>>,
    }

    /// 在捕获 panic 的前提下执行整个套件。
    ///
    /// # 教案式说明
    /// - **逻辑 (How)**：依次执行用例，借助 [`panic::catch_unwind`] 捕获失败，再由
    ///   `support::panic_with_context` 附加“后端/套件/用例”上下文后重新抛出。
    /// - **契约 (What)**：`suite.cases` 非空；首个失败的用例终止整个套件。
    pub fn run_suite<F: BackendFactory>(suite: &TckSuite<F>, factory: &F) {
        assert!(!suite.cases.is_empty(), "TCK 套件不应为空");
        for case in &suite.cases {
            debug!(
                backend = factory.name(),
                suite = suite.name,
                case = case.name,
                "running tck case"
            );
            let outcome = panic::catch_unwind(panic::AssertUnwindSafe(|| (case.test)(factory)));
            if let Err(payload) = outcome {
                support::panic_with_context(factory.name(), suite.name, case.name, payload);
            }
        }
    }
}

/// 按固定顺序返回全部套件，与宏默认展开顺序一致。
pub fn all_suites<F: BackendFactory>() -> Vec<TckSuite<F>> {
    vec![
        primitives::suite(),
        vectors::suite(),
        server_client::suite(),
        direct_group::suite(),
        lifecycle::suite(),
    ]
}

/// 运行“标量往返”主题：字符串、浮点、整数、布尔在两个方向上逐值往返。
pub fn run_primitives_suite<F: BackendFactory>(factory: &F) {
    run_suite(&primitives::suite(), factory);
}

/// 运行“数组与序列”主题：定长数组与动态序列的保真度及顺序。
pub fn run_vectors_suite<F: BackendFactory>(factory: &F) {
    run_suite(&vectors::suite(), factory);
}

/// 运行“服务端/客户端”主题。
///
/// # 教案式说明
/// - **意图 (Why)**：服务端按握手完成先后分配本地秩，客户端身份只能经首条应用消息告知；
///   本主题验证这一点以及静默参与者不阻塞。
/// - **契约 (What)**：包含两进程单次往返、四进程（其中一个静默）身份对账、广播三个用例。
pub fn run_server_client_suite<F: BackendFactory>(factory: &F) {
    run_suite(&server_client::suite(), factory);
}

/// 运行“直连请求组”主题：多秩请求组按声明秩落位。
pub fn run_direct_group_suite<F: BackendFactory>(factory: &F) {
    run_suite(&direct_group::suite(), factory);
}

/// 运行“生命周期”主题：状态机违例、未知本地秩、幂等关闭、汇合目录准备与清理。
pub fn run_lifecycle_suite<F: BackendFactory>(factory: &F) {
    run_suite(&lifecycle::suite(), factory);
}
