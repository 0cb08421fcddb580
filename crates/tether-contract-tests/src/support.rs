use crate::BackendFactory;
use std::any::Any;
use std::fmt::Write;
use std::panic;
use std::sync::Once;
use std::thread;
use std::time::Duration;
use tether_core::{Backend, BlockingChannel, CallContext, ChannelConfig, Deadline};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;

/// 单个用例内全部阻塞调用共享的截止时长。
pub(crate) const CASE_DEADLINE: Duration = Duration::from_secs(30);

const LOOKUP_POLL_INTERVAL: Duration = Duration::from_millis(2);

/// 一个模拟进程的主体：在自己的线程上驱动自己的通道。
pub(crate) type Process<'a, B> = Box<dyn FnOnce(&mut BlockingChannel<B>) + Send + 'a>;

pub(crate) fn process<'a, B: Backend>(
    body: impl FnOnce(&mut BlockingChannel<B>) + Send + 'a,
) -> Process<'a, B> {
    Box::new(body)
}

/// 在附加上下文的情况下重新抛出 panic。
///
/// # 教案式说明
/// - **意图 (Why)**：`case::run_suite` 捕获 panic 后，需要在原始 payload 之上追加“后端/套件/用例”描述。
/// - **逻辑 (How)**：将 payload 解析为 `&str` / `String`，格式化后经 [`panic::resume_unwind`] 抛出。
/// - **契约 (What)**：只应在 `catch_unwind` 的错误分支中调用；函数不会正常返回。
pub(crate) fn panic_with_context(
    backend: &str,
    suite: &str,
    case: &str,
    payload: Box<dyn Any + Send>,
) -> ! {
    let mut message = String::new();
    let _ = write!(
        &mut message,
        "[tether-tck::{backend}::{suite}::{case}] 测试失败：{}",
        describe_panic(payload.as_ref())
    );
    panic::resume_unwind(Box::new(message));
}

fn describe_panic(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "<未知 panic 类型>".to_string()
    }
}

/// 以独立线程运行一组模拟进程，直至全部结束。
///
/// # 教案式说明
/// - **意图 (Why)**：被测契约描述的是独立启动的进程；以线程模拟时仍保持“每进程一个通道、
///   只经交换目录与链路交互”的隔离。
/// - **逻辑 (How)**：
///   1. 创建用例独占的临时目录，交换目录位于其下 `exchange/`；
///   2. 每个进程得到工厂新建的后端与共享截止时间的 [`CallContext`]；
///   3. `thread::scope` 等待全部线程结束，再按进程序号报告首个失败。
/// - **契约 (What)**：任一进程 panic 时，本函数以 `[进程 #i]` 前缀重新 panic。
pub(crate) fn run_processes<F: BackendFactory>(
    factory: &F,
    processes: Vec<Process<'_, F::Backend>>,
) {
    install_test_subscriber();
    let scratch = tempfile::tempdir().expect("创建用例临时目录");
    let exchange = scratch.path().join("exchange");
    let ctx = CallContext::builder()
        .with_deadline(Deadline::after(CASE_DEADLINE))
        .build();

    let outcomes: Vec<thread::Result<()>> = thread::scope(|scope| {
        let handles: Vec<_> = processes
            .into_iter()
            .map(|body| {
                let backend = factory.create(scratch.path());
                let config = ChannelConfig::new(exchange.clone())
                    .with_lookup_poll_interval(LOOKUP_POLL_INTERVAL);
                let ctx = ctx.clone();
                scope.spawn(move || {
                    let mut channel = BlockingChannel::new(backend, config)
                        .expect("构建阻塞通道")
                        .with_context(ctx);
                    body(&mut channel);
                })
            })
            .collect();
        handles.into_iter().map(|handle| handle.join()).collect()
    });

    for (index, outcome) in outcomes.into_iter().enumerate() {
        if let Err(payload) = outcome {
            panic::resume_unwind(Box::new(format!(
                "[进程 #{index}] {}",
                describe_panic(payload.as_ref())
            )));
        }
    }
}

/// 安装进程级日志订阅器，`RUST_LOG` 缺省时只输出告警。
fn install_test_subscriber() {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_test_writer());
        // 调用方可能已安装自己的订阅器。
        let _ = tracing::subscriber::set_global_default(subscriber);
    });
}
