//! I/O 辅助：把底层 `io::Error` 映射为 [`CoreError`]，并在 [`CallContext`] 约束下驱动 Future。
//!
//! 传输后端 crate 复用这里的 [`OperationKind`] 与 [`run_with_context`]，
//! 保证不同后端对取消/超时的报告方式一致。

use crate::contract::{CallContext, Cancellation};
use crate::error::{CoreError, ErrorCategory, RetryAdvice, codes};
use std::borrow::Cow;
use std::future::Future;
use std::io;
use std::time::Duration;
use tokio::time::Instant as TokioInstant;

const CANCELLATION_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// 描述一次底层操作对应的稳定错误码与默认文案。
#[derive(Clone, Copy, Debug)]
pub struct OperationKind {
    pub code: &'static str,
    pub message: &'static str,
}

impl OperationKind {
    pub const fn new(code: &'static str, message: &'static str) -> Self {
        Self { code, message }
    }
}

/// 读取汇合文件。
pub const REGISTRY_LOOKUP: OperationKind =
    OperationKind::new(codes::RENDEZVOUS_REGISTRY_IO, "registry lookup");

/// 将 IO 错误映射为 [`CoreError`]，并附带错误分类。
pub fn map_io_error(kind: OperationKind, error: io::Error) -> CoreError {
    let category = categorize_io_error(&error);
    CoreError::new(
        kind.code,
        Cow::Owned(format!("{}: {}", kind.message, error)),
    )
    .with_category(category)
    .with_cause(error)
}

/// 构造取消错误。
pub fn cancelled_error(kind: OperationKind) -> CoreError {
    let message = format!("{} cancelled", kind.message);
    CoreError::new(codes::TRANSPORT_CANCELLED, message).with_category(ErrorCategory::Cancelled)
}

/// 构造超时错误。
pub fn timeout_error(kind: OperationKind) -> CoreError {
    let message = format!("{} timed out", kind.message);
    CoreError::new(codes::TRANSPORT_TIMEOUT, message).with_category(ErrorCategory::Timeout)
}

/// 按 `io::ErrorKind` 推断错误分类。
pub fn categorize_io_error(error: &io::Error) -> ErrorCategory {
    use io::ErrorKind;
    match error.kind() {
        ErrorKind::TimedOut => ErrorCategory::Timeout,
        ErrorKind::WouldBlock | ErrorKind::Interrupted => {
            ErrorCategory::Retryable(RetryAdvice::after(Duration::from_millis(5)))
        }
        ErrorKind::ConnectionRefused
        | ErrorKind::ConnectionReset
        | ErrorKind::ConnectionAborted
        | ErrorKind::NotConnected
        | ErrorKind::AddrInUse
        | ErrorKind::AddrNotAvailable
        | ErrorKind::BrokenPipe => {
            ErrorCategory::Retryable(RetryAdvice::after(Duration::from_millis(50)))
        }
        _ => ErrorCategory::NonRetryable,
    }
}

async fn wait_for_cancellation(cancellation: &Cancellation) {
    while !cancellation.is_cancelled() {
        tokio::time::sleep(CANCELLATION_POLL_INTERVAL).await;
    }
}

/// 在保留取消/超时语义的前提下执行 IO Future。
///
/// # 契约说明（What）
/// - 入口处若截止已过期或已取消，直接返回对应错误，不轮询 `future`；
/// - 取消优先于截止，截止优先于 I/O 结果（`biased` 选择）；
/// - I/O 失败经 [`map_io_error`] 映射为 `kind.code`。
pub async fn run_with_context<F, T>(
    ctx: &CallContext,
    kind: OperationKind,
    future: F,
) -> crate::Result<T>
where
    F: Future<Output = io::Result<T>>,
{
    if ctx.deadline().is_expired() {
        return Err(timeout_error(kind));
    }
    if ctx.cancellation().is_cancelled() {
        return Err(cancelled_error(kind));
    }

    let cancel = wait_for_cancellation(ctx.cancellation());
    tokio::pin!(cancel);
    tokio::pin!(future);

    if let Some(deadline) = ctx.deadline().instant() {
        let sleep = tokio::time::sleep_until(TokioInstant::from_std(deadline));
        tokio::pin!(sleep);
        tokio::select! {
            biased;
            _ = &mut cancel => Err(cancelled_error(kind)),
            _ = &mut sleep => Err(timeout_error(kind)),
            result = &mut future => result.map_err(|err| map_io_error(kind, err)),
        }
    } else {
        tokio::select! {
            biased;
            _ = &mut cancel => Err(cancelled_error(kind)),
            result = &mut future => result.map_err(|err| map_io_error(kind, err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::Deadline;

    const SAMPLE: OperationKind = OperationKind::new("tether.test.sample", "sample");

    #[tokio::test]
    async fn expired_deadline_short_circuits() {
        let ctx = CallContext::builder()
            .with_deadline(Deadline::after(Duration::ZERO))
            .build();
        let err = run_with_context(&ctx, SAMPLE, std::future::pending::<io::Result<()>>())
            .await
            .expect_err("截止已过期时必须立即失败");
        assert_eq!(err.code(), codes::TRANSPORT_TIMEOUT);
        assert_eq!(err.category(), ErrorCategory::Timeout);
    }

    #[tokio::test]
    async fn cancellation_interrupts_pending_future() {
        let ctx = CallContext::default();
        let token = ctx.cancellation().clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            token.cancel();
        });
        let err = run_with_context(&ctx, SAMPLE, std::future::pending::<io::Result<()>>())
            .await
            .expect_err("取消后挂起的 Future 必须被打断");
        assert_eq!(err.category(), ErrorCategory::Cancelled);
    }

    #[tokio::test]
    async fn io_errors_keep_operation_code() {
        let ctx = CallContext::default();
        let err = run_with_context(&ctx, SAMPLE, async {
            Err::<(), _>(io::Error::from(io::ErrorKind::ConnectionReset))
        })
        .await
        .expect_err("I/O 错误应被透传");
        assert_eq!(err.code(), "tether.test.sample");
        assert!(matches!(err.category(), ErrorCategory::Retryable(_)));
    }
}
