use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// 取消原语，允许外部线程打断阻塞在汇合或收发上的通道操作。
///
/// # 设计背景（Why）
/// - 通道的所有操作默认无界阻塞（等待对端出现、等待对端发送）；耦合进程的宿主
///   需要在对端崩溃时主动退出，而非永久挂起。
///
/// # 逻辑解析（How）
/// - 内部使用 [`AtomicBool`] 表达取消状态，并通过 [`Arc`] 支持多方共享；
/// - `cancel` 在首次成功设置取消位时返回 `true`，重复调用返回 `false`；
/// - `child` 生成共享同一原子位的派生实例。
///
/// # 风险提示（Trade-offs）
/// - 不提供回调注册；I/O 层以短周期轮询取消位，取消的可见延迟约为一个轮询周期。
#[derive(Clone, Debug)]
pub struct Cancellation {
    inner: Arc<AtomicBool>,
}

impl Cancellation {
    /// 创建处于“未取消”状态的取消令牌。
    pub fn new() -> Self {
        Self {
            inner: Arc::new(AtomicBool::new(false)),
        }
    }

    /// 查询当前是否已被标记取消。
    pub fn is_cancelled(&self) -> bool {
        self.inner.load(Ordering::Acquire)
    }

    /// 将当前令牌标记为取消。
    ///
    /// 返回值为 `true` 表示本次调用首次触发取消；返回 `false` 表示之前已被取消。
    pub fn cancel(&self) -> bool {
        self.inner
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// 派生共享同一原子位的子令牌。
    pub fn child(&self) -> Self {
        self.clone()
    }
}

impl Default for Cancellation {
    fn default() -> Self {
        Self::new()
    }
}

/// 截止原语，描述操作的最迟完成时间。
///
/// # 契约说明（What）
/// - `Deadline` 可以为空，代表调用方未施加超时，操作可无界阻塞；
/// - `after` 以调用时刻为起点计算绝对截止点，之后的比较基于单调时钟。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Deadline {
    instant: Option<Instant>,
}

impl Deadline {
    /// 创建未设置截止时间的实例。
    pub const fn none() -> Self {
        Self { instant: None }
    }

    /// 根据绝对时间点构造截止时间。
    pub fn at(instant: Instant) -> Self {
        Self {
            instant: Some(instant),
        }
    }

    /// 以当前时刻加 `timeout` 生成截止时间。
    pub fn after(timeout: Duration) -> Self {
        Self::at(Instant::now() + timeout)
    }

    /// 返回内部时间点。
    pub fn instant(&self) -> Option<Instant> {
        self.instant
    }

    /// 距离截止时间的剩余时长；未设置时返回 `None`。
    pub fn remaining(&self) -> Option<Duration> {
        self.instant
            .map(|instant| instant.saturating_duration_since(Instant::now()))
    }

    /// 判断是否已经超时。
    pub fn is_expired(&self) -> bool {
        match self.instant {
            Some(deadline) => Instant::now() >= deadline,
            None => false,
        }
    }
}

impl Default for Deadline {
    fn default() -> Self {
        Deadline::none()
    }
}

#[derive(Debug)]
struct CallContextInner {
    cancellation: Cancellation,
    deadline: Deadline,
}

/// 调用上下文，在通道、汇合协调器与传输后端之间传递取消与截止时间。
///
/// # 契约说明（What）
/// - 通道在构造时绑定一个上下文，其后所有汇合与收发都在该上下文下执行；
/// - 默认上下文既不可取消（除非外部持有令牌）也无截止，等价于无界阻塞。
///
/// # 风险提示（Trade-offs）
/// - `CallContext` 通过 [`Arc`] 共享，克隆成本为常数；
/// - 截止时间到期并不会自动标记取消，超时与取消分别以不同错误分类报告。
#[derive(Clone, Debug)]
pub struct CallContext {
    inner: Arc<CallContextInner>,
}

impl CallContext {
    /// 创建上下文构建器。
    pub fn builder() -> CallContextBuilder {
        CallContextBuilder::default()
    }

    /// 获取取消原语。
    pub fn cancellation(&self) -> &Cancellation {
        &self.inner.cancellation
    }

    /// 查询截止时间。
    pub fn deadline(&self) -> Deadline {
        self.inner.deadline
    }
}

impl Default for CallContext {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl fmt::Display for CallContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let deadline = match self.deadline().remaining() {
            Some(remaining) => format!("{remaining:?}"),
            None => "none".to_string(),
        };
        write!(
            f,
            "CallContext{{cancelled={}, deadline={}}}",
            self.cancellation().is_cancelled(),
            deadline
        )
    }
}

/// `CallContext` 构建器。
#[derive(Default)]
pub struct CallContextBuilder {
    cancellation: Cancellation,
    deadline: Deadline,
}

impl CallContextBuilder {
    /// 设置取消原语。
    pub fn with_cancellation(mut self, cancellation: Cancellation) -> Self {
        self.cancellation = cancellation;
        self
    }

    /// 设置截止时间。
    pub fn with_deadline(mut self, deadline: Deadline) -> Self {
        self.deadline = deadline;
        self
    }

    /// 构建上下文。
    pub fn build(self) -> CallContext {
        CallContext {
            inner: Arc::new(CallContextInner {
                cancellation: self.cancellation,
                deadline: self.deadline,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_reports_first_trigger_only() {
        let token = Cancellation::new();
        let child = token.child();
        assert!(child.cancel());
        assert!(!token.cancel());
        assert!(token.is_cancelled());
    }

    #[test]
    fn deadline_expiry() {
        assert!(!Deadline::none().is_expired());
        assert!(Deadline::none().remaining().is_none());
        let past = Deadline::at(Instant::now() - Duration::from_millis(1));
        assert!(past.is_expired());
        let future = Deadline::after(Duration::from_secs(60));
        assert!(!future.is_expired());
        assert!(future.remaining().is_some());
    }

    #[test]
    fn display_reflects_state() {
        let ctx = CallContext::default();
        assert_eq!(ctx.to_string(), "CallContext{cancelled=false, deadline=none}");
        ctx.cancellation().cancel();
        assert!(ctx.to_string().starts_with("CallContext{cancelled=true"));
    }
}
