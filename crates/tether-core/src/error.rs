use std::borrow::Cow;
use std::error::Error;
use std::fmt;
use std::time::Duration;

/// `CoreError` 表示 `tether` 跨层共享的稳定错误域，是所有可观察错误的最终形态。
///
/// # 设计背景（Why）
/// - 通道、汇合协调器与传输后端在不同层次产生的故障需要合流为统一的错误码，
///   调用方据此区分“契约违例 / 汇合失败 / 传输失败”三类处置策略。
///
/// # 契约说明（What）
/// - `code`：稳定字符串，遵循 `<领域>.<语义>` 命名，见 [`codes`]；
/// - `message`：面向排障人员的自然语言描述；
/// - `cause`：可选底层原因，通过 [`Error::source`] 暴露；
/// - `category`：可选显式分类，缺省时按错误码查表得到。
///
/// # 风险提示（Trade-offs）
/// - 结构体仅承载信息，不执行任何格式化或上报逻辑。
#[derive(Debug)]
pub struct CoreError {
    code: &'static str,
    message: Cow<'static, str>,
    cause: Option<ErrorCause>,
    category: Option<ErrorCategory>,
}

/// `ErrorCause` 封装底层原因，保持 `Send + Sync` 以方便跨线程传递。
pub type ErrorCause = Box<dyn Error + Send + Sync + 'static>;

/// 框架统一的返回值别名，默认错误类型为 [`CoreError`]。
pub type Result<T, E = CoreError> = std::result::Result<T, E>;

impl CoreError {
    /// 构造核心错误。
    ///
    /// ```rust
    /// use tether_core::{CoreError, codes};
    ///
    /// let err = CoreError::new(codes::CHANNEL_INVALID_STATE, "send before connect");
    /// assert_eq!(err.code(), codes::CHANNEL_INVALID_STATE);
    /// assert!(err.is_contract_violation());
    /// ```
    pub fn new(code: &'static str, message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            code,
            message: message.into(),
            cause: None,
            category: None,
        }
    }

    /// 附带底层原因并返回新的核心错误。
    pub fn with_cause(mut self, cause: impl Error + Send + Sync + 'static) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    /// 为错误标记结构化分类信息。
    pub fn with_category(mut self, category: ErrorCategory) -> Self {
        self.category = Some(category);
        self
    }

    /// 获取结构化错误分类。
    ///
    /// 显式设置的分类优先；否则按错误码前缀查表，查表失败回退为
    /// [`ErrorCategory::NonRetryable`]。
    pub fn category(&self) -> ErrorCategory {
        self.category
            .clone()
            .unwrap_or_else(|| default_category(self.code))
    }

    /// 获取稳定错误码。
    pub fn code(&self) -> &'static str {
        self.code
    }

    /// 获取描述。
    pub fn message(&self) -> &str {
        &self.message
    }

    /// 获取底层原因。
    pub fn cause(&self) -> Option<&ErrorCause> {
        self.cause.as_ref()
    }

    /// 是否属于调用方的编程契约违例（状态错误、未知本地秩、握手或解码不符）。
    pub fn is_contract_violation(&self) -> bool {
        self.category() == ErrorCategory::ProtocolViolation
    }

    /// 是否属于汇合阶段的失败（对端不可达、握手中断、汇合文件读写失败）。
    pub fn is_rendezvous_failure(&self) -> bool {
        self.code.starts_with("rendezvous.")
    }

    /// 是否属于已建立连接上的传输失败。
    pub fn is_transfer_failure(&self) -> bool {
        self.code.starts_with("transfer.")
    }
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl Error for CoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.cause
            .as_ref()
            .map(|boxed| boxed.as_ref() as &(dyn Error + 'static))
    }
}

/// 错误分类枚举，驱动调用方的处置策略。
///
/// - `Retryable`：携带退避建议 [`RetryAdvice`]，通常来自瞬时的套接字错误；
/// - `ProtocolViolation`：编程契约违例，立即暴露且不应重试；
/// - `Cancelled`/`Timeout`：由 [`CallContext`](crate::CallContext) 的取消或截止触发。
#[derive(Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorCategory {
    Retryable(RetryAdvice),
    NonRetryable,
    ProtocolViolation,
    Cancelled,
    Timeout,
}

/// 退避建议。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryAdvice {
    wait: Duration,
    reason: Option<Cow<'static, str>>,
}

impl RetryAdvice {
    /// 建议在 `wait` 之后重试。
    pub fn after(wait: Duration) -> Self {
        Self { wait, reason: None }
    }

    /// 附带人类可读的原因。
    pub fn with_reason(mut self, reason: impl Into<Cow<'static, str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn wait(&self) -> Duration {
        self.wait
    }

    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }
}

fn default_category(code: &str) -> ErrorCategory {
    match code {
        codes::TRANSPORT_TIMEOUT => ErrorCategory::Timeout,
        codes::TRANSPORT_CANCELLED => ErrorCategory::Cancelled,
        _ if code.starts_with("channel.") || code.starts_with("protocol.") => {
            ErrorCategory::ProtocolViolation
        }
        _ => ErrorCategory::NonRetryable,
    }
}

/// 稳定错误码集合。
///
/// 错误码遵循 `<领域>.<语义>` 命名约定；传输实现层的细粒度错误码
/// （如 `tether.transport.tcp.read_failed`）在各自 crate 中定义。
pub mod codes {
    /// 在错误的生命周期状态调用了通道操作。
    pub const CHANNEL_INVALID_STATE: &str = "channel.invalid_state";
    /// 指定的本地秩不存在于通道中。
    pub const CHANNEL_UNKNOWN_RANK: &str = "channel.unknown_rank";
    /// 端点此前已发生传输失败，不可再用。
    pub const CHANNEL_ENDPOINT_BROKEN: &str = "channel.endpoint_broken";
    /// 参与者名称或秩参数不合法。
    pub const CHANNEL_INVALID_ARGUMENT: &str = "channel.invalid_argument";
    /// 握手帧不符合协议。
    pub const PROTOCOL_HANDSHAKE: &str = "protocol.handshake";
    /// 载荷解码失败。
    pub const PROTOCOL_DECODE: &str = "protocol.decode";
    /// 长度前缀超出配置的报文预算。
    pub const PROTOCOL_BUDGET_EXCEEDED: &str = "protocol.budget_exceeded";
    /// 具名对端不可达。
    pub const RENDEZVOUS_UNREACHABLE: &str = "rendezvous.unreachable";
    /// 握手在进行中被中断。
    pub const RENDEZVOUS_ABORTED: &str = "rendezvous.aborted";
    /// 汇合文件读写失败。
    pub const RENDEZVOUS_REGISTRY_IO: &str = "rendezvous.registry_io";
    /// 已建立连接上的收发失败。
    pub const TRANSFER_FAILED: &str = "transfer.failed";
    /// 传输层取消。
    pub const TRANSPORT_CANCELLED: &str = "transport.cancelled";
    /// 传输层超时。
    pub const TRANSPORT_TIMEOUT: &str = "transport.timeout";
    /// 配置不合法。
    pub const CONFIG_INVALID: &str = "config.invalid";
    /// 无法构建阻塞外观所需的运行时。
    pub const RUNTIME_UNAVAILABLE: &str = "runtime.unavailable";
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn category_falls_back_to_code_prefix() {
        let err = CoreError::new(codes::CHANNEL_UNKNOWN_RANK, "rank 3");
        assert_eq!(err.category(), ErrorCategory::ProtocolViolation);
        assert!(err.is_contract_violation());
        assert!(!err.is_transfer_failure());

        let err = CoreError::new(codes::TRANSPORT_TIMEOUT, "accept timed out");
        assert_eq!(err.category(), ErrorCategory::Timeout);

        let err = CoreError::new(codes::RENDEZVOUS_UNREACHABLE, "no listener");
        assert_eq!(err.category(), ErrorCategory::NonRetryable);
        assert!(err.is_rendezvous_failure());
    }

    #[test]
    fn explicit_category_wins() {
        let advice = RetryAdvice::after(Duration::from_millis(50)).with_reason("reset");
        let err = CoreError::new(codes::TRANSFER_FAILED, "peer reset")
            .with_category(ErrorCategory::Retryable(advice.clone()));
        assert_eq!(err.category(), ErrorCategory::Retryable(advice));
        assert!(err.is_transfer_failure());
    }

    #[test]
    fn source_exposes_cause() {
        let cause = io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed");
        let err = CoreError::new(codes::TRANSFER_FAILED, "write").with_cause(cause);
        let source = err.source().expect("应暴露底层原因");
        assert_eq!(source.to_string(), "pipe closed");
        assert_eq!(err.to_string(), "[transfer.failed] write");
    }
}
