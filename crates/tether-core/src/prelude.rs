//! 常用类型的一站式导入：`use tether_core::prelude::*;`

pub use crate::backend::{Backend, BackendListener, Link};
pub use crate::blocking::BlockingChannel;
pub use crate::channel::{ChannelState, CommunicationChannel, LocalRank};
pub use crate::config::ChannelConfig;
pub use crate::contract::{CallContext, Cancellation, Deadline};
pub use crate::error::{CoreError, ErrorCategory, Result, codes};
pub use crate::io::{OperationKind, run_with_context};
pub use crate::wire::{Element, Scalar};
