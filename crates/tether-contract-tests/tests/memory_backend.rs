//! 集成示例：在进程内存回环后端上运行完整 TCK。
//!
//! # 使用说明
//! - 将 `tether-contract-tests` 作为 dev-dependency，对空模块标注 `#[tether_tck]` 并给出后端工厂即可生成全部测试；
//! - 内存后端不触碰网络，适合作为套件自身的冒烟验证。

use tether_contract_tests::tether_tck;

#[tether_tck(factory = tether_contract_tests::MemoryFactory)]
mod memory_backend_tck {}
