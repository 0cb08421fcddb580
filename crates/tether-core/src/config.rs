use crate::error::{CoreError, codes};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_RUN_DIRECTORY: &str = "tether-run";
const DEFAULT_LOOKUP_POLL_MS: u64 = 10;
const DEFAULT_MAX_MESSAGE_BYTES: u64 = 1 << 30;

/// 通道配置：汇合目录位置、轮询周期与单条报文预算。
///
/// # 契约说明（What）
/// - `exchange_directory`：所有参与者可见的共享目录，汇合文件写在其下的
///   `run_directory` 子目录中；
/// - `lookup_poll_interval_ms`：请求方等待汇合文件出现时的轮询周期，必须大于 0；
/// - `max_message_bytes`：接收方接受的最大长度前缀（字符串字节数或序列元素数×元素宽度），
///   超出即以 `protocol.budget_exceeded` 拒绝，拒绝前不做任何分配。
///
/// 既可通过 builder 风格的 `with_*` 方法构造，也可从 TOML 反序列化：
///
/// ```rust
/// use tether_core::ChannelConfig;
///
/// let config = ChannelConfig::from_toml_str(
///     r#"
///     exchange_directory = "/tmp/coupling"
///     lookup_poll_interval_ms = 25
///     "#,
/// )
/// .expect("合法配置");
/// assert_eq!(config.run_directory().to_str(), Some("tether-run"));
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChannelConfig {
    exchange_directory: PathBuf,
    run_directory: PathBuf,
    lookup_poll_interval_ms: u64,
    max_message_bytes: u64,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            exchange_directory: PathBuf::from("."),
            run_directory: PathBuf::from(DEFAULT_RUN_DIRECTORY),
            lookup_poll_interval_ms: DEFAULT_LOOKUP_POLL_MS,
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
        }
    }
}

impl ChannelConfig {
    /// 以指定交换目录构造默认配置。
    pub fn new(exchange_directory: impl Into<PathBuf>) -> Self {
        Self {
            exchange_directory: exchange_directory.into(),
            ..Self::default()
        }
    }

    pub fn with_run_directory(mut self, run_directory: impl Into<PathBuf>) -> Self {
        self.run_directory = run_directory.into();
        self
    }

    pub fn with_lookup_poll_interval(mut self, interval: Duration) -> Self {
        self.lookup_poll_interval_ms = interval.as_millis().try_into().unwrap_or(u64::MAX);
        self
    }

    pub fn with_max_message_bytes(mut self, max: u64) -> Self {
        self.max_message_bytes = max;
        self
    }

    pub fn exchange_directory(&self) -> &Path {
        &self.exchange_directory
    }

    pub fn run_directory(&self) -> &Path {
        &self.run_directory
    }

    /// 汇合文件根目录：`exchange_directory/run_directory`。
    pub fn registry_root(&self) -> PathBuf {
        self.exchange_directory.join(&self.run_directory)
    }

    pub fn lookup_poll_interval(&self) -> Duration {
        Duration::from_millis(self.lookup_poll_interval_ms)
    }

    pub fn max_message_bytes(&self) -> u64 {
        self.max_message_bytes
    }

    /// 从 TOML 文本解析并校验配置。
    pub fn from_toml_str(raw: &str) -> crate::Result<Self> {
        let config: Self = toml::from_str(raw).map_err(|err| {
            CoreError::new(codes::CONFIG_INVALID, format!("invalid channel config: {err}"))
                .with_cause(err)
        })?;
        config.validate()?;
        Ok(config)
    }

    /// 从磁盘读取 TOML 配置文件。
    pub fn load(path: impl AsRef<Path>) -> crate::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|err| {
            CoreError::new(
                codes::CONFIG_INVALID,
                format!("failed to read channel config {}: {err}", path.display()),
            )
            .with_cause(err)
        })?;
        Self::from_toml_str(&raw)
    }

    /// 校验字段取值。
    pub fn validate(&self) -> crate::Result<()> {
        if self.lookup_poll_interval_ms == 0 {
            return Err(CoreError::new(
                codes::CONFIG_INVALID,
                "lookup_poll_interval_ms must be positive",
            ));
        }
        if self.max_message_bytes == 0 {
            return Err(CoreError::new(
                codes::CONFIG_INVALID,
                "max_message_bytes must be positive",
            ));
        }
        if self.run_directory.as_os_str().is_empty() {
            return Err(CoreError::new(
                codes::CONFIG_INVALID,
                "run_directory must not be empty",
            ));
        }
        Ok(())
    }
}
