use crate::config::ChannelConfig;
use crate::contract::CallContext;
use crate::error::{CoreError, codes};
use crate::io::{REGISTRY_LOOKUP, run_with_context};
use sha2::{Digest, Sha256};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// 汇合文件读写错误。
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("participant name must not be empty")]
    EmptyName,
    #[error("failed to {op} {}: {source}", path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl From<RegistryError> for CoreError {
    fn from(err: RegistryError) -> Self {
        let code = match err {
            RegistryError::EmptyName => codes::CHANNEL_INVALID_ARGUMENT,
            RegistryError::Io { .. } => codes::RENDEZVOUS_REGISTRY_IO,
        };
        CoreError::new(code, err.to_string()).with_cause(err)
    }
}

/// 基于共享交换目录的连接信息登记处。
///
/// # 教案式注释
///
/// ## 意图（Why）
/// - 相互独立启动的进程没有共同的父进程可传递地址；接受方把监听地址写进双方都能看到的
///   目录，请求方据名称对推导出同一路径并等待文件出现。
///
/// ## 逻辑（How）
/// - 文件路径：`<exchange>/<run>/<hex[..2]>/<hex[2..]>`，`hex` 为
///   `sha256("<acceptor>-<requester>")` 的十六进制摘要，分桶避免单目录文件过多；
/// - 发布先写同目录临时文件再 `rename`，读者永远看不到半写的地址；
/// - 查找按配置的周期轮询，直到文件出现或 `ctx` 取消/超时。
///
/// ## 契约（What）
/// - 名称不得为空；
/// - [`ConnectionRegistry::withdraw`] 与 [`ConnectionRegistry::cleanup`] 对不存在的路径是幂等的；
/// - 桶目录可能被多个名称对共用，`withdraw` 只删文件，桶目录随 `cleanup` 一并删除。
#[derive(Clone, Debug)]
pub struct ConnectionRegistry {
    root: PathBuf,
    poll_interval: Duration,
}

impl ConnectionRegistry {
    pub fn new(config: &ChannelConfig) -> Self {
        Self {
            root: config.registry_root(),
            poll_interval: config.lookup_poll_interval(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 计算名称对对应的汇合文件路径。
    pub fn entry_path(&self, acceptor: &str, requester: &str) -> Result<PathBuf, RegistryError> {
        if acceptor.is_empty() || requester.is_empty() {
            return Err(RegistryError::EmptyName);
        }
        let digest = Sha256::digest(format!("{acceptor}-{requester}").as_bytes());
        let hex = hex::encode(digest);
        Ok(self.root.join(&hex[..2]).join(&hex[2..]))
    }

    /// 创建汇合根目录。
    pub async fn prepare(&self) -> Result<(), RegistryError> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|source| RegistryError::Io {
                op: "create",
                path: self.root.clone(),
                source,
            })
    }

    /// 删除整个汇合根目录。
    pub async fn cleanup(&self) -> Result<(), RegistryError> {
        match tokio::fs::remove_dir_all(&self.root).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(RegistryError::Io {
                op: "remove",
                path: self.root.clone(),
                source,
            }),
        }
    }

    /// 原子地发布监听地址。
    pub async fn publish(
        &self,
        acceptor: &str,
        requester: &str,
        address: &str,
    ) -> Result<PathBuf, RegistryError> {
        let path = self.entry_path(acceptor, requester)?;
        if let Some(bucket) = path.parent() {
            tokio::fs::create_dir_all(bucket)
                .await
                .map_err(|source| RegistryError::Io {
                    op: "create",
                    path: bucket.to_path_buf(),
                    source,
                })?;
        }
        let staging = path.with_extension(format!("tmp-{}", std::process::id()));
        tokio::fs::write(&staging, address.as_bytes())
            .await
            .map_err(|source| RegistryError::Io {
                op: "write",
                path: staging.clone(),
                source,
            })?;
        tokio::fs::rename(&staging, &path)
            .await
            .map_err(|source| RegistryError::Io {
                op: "rename",
                path: path.clone(),
                source,
            })?;
        debug!(acceptor, requester, address, path = %path.display(), "published listen address");
        Ok(path)
    }

    /// 等待并读取接受方发布的地址。
    pub async fn lookup(
        &self,
        ctx: &CallContext,
        acceptor: &str,
        requester: &str,
    ) -> crate::Result<String> {
        let path = self.entry_path(acceptor, requester)?;
        let interval = self.poll_interval;
        let address = run_with_context(ctx, REGISTRY_LOOKUP, async {
            loop {
                match tokio::fs::read_to_string(&path).await {
                    Ok(address) if !address.is_empty() => return Ok(address),
                    Ok(_) => {}
                    Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                    Err(err) => return Err(err),
                }
                tokio::time::sleep(interval).await;
            }
        })
        .await?;
        debug!(acceptor, requester, address = %address, "resolved listen address");
        Ok(address)
    }

    /// 删除名称对的汇合文件，保留所在桶目录。
    pub async fn withdraw(&self, acceptor: &str, requester: &str) -> Result<(), RegistryError> {
        let path = self.entry_path(acceptor, requester)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(source) => {
                return Err(RegistryError::Io {
                    op: "remove",
                    path,
                    source,
                });
            }
        }
        debug!(acceptor, requester, "withdrew listen address");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::Deadline;
    use crate::error::ErrorCategory;

    fn registry(dir: &Path) -> ConnectionRegistry {
        ConnectionRegistry::new(
            &ChannelConfig::new(dir).with_lookup_poll_interval(Duration::from_millis(2)),
        )
    }

    #[test]
    fn entry_path_is_bucketed_digest() {
        let registry = registry(Path::new("/exchange"));
        let path = registry
            .entry_path("process0", "process1")
            .expect("合法名称");
        let hex = hex::encode(Sha256::digest(b"process0-process1"));
        assert_eq!(
            path,
            PathBuf::from("/exchange/tether-run")
                .join(&hex[..2])
                .join(&hex[2..])
        );
        assert_ne!(
            path,
            registry.entry_path("process1", "process0").expect("合法名称")
        );
    }

    #[test]
    fn empty_names_are_rejected() {
        let registry = registry(Path::new("/exchange"));
        let err: CoreError = registry
            .entry_path("", "b")
            .expect_err("空名称必须被拒绝")
            .into();
        assert_eq!(err.code(), codes::CHANNEL_INVALID_ARGUMENT);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn lookup_waits_for_publication() {
        let dir = tempfile::tempdir().expect("创建临时目录");
        let registry = registry(dir.path());
        registry.prepare().await.expect("创建汇合目录");

        let publisher = registry.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            publisher
                .publish("a", "b", "127.0.0.1:4000")
                .await
                .expect("发布地址")
        });

        let address = registry
            .lookup(&CallContext::default(), "a", "b")
            .await
            .expect("应读取到地址");
        assert_eq!(address, "127.0.0.1:4000");

        let path = handle.await.expect("发布任务完成");
        registry.withdraw("a", "b").await.expect("撤回地址");
        assert!(!path.exists());
        registry.withdraw("a", "b").await.expect("重复撤回是幂等的");

        registry.cleanup().await.expect("清理汇合目录");
        assert!(!registry.root().exists());
        registry.cleanup().await.expect("重复清理是幂等的");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn lookup_honours_deadline() {
        let dir = tempfile::tempdir().expect("创建临时目录");
        let registry = registry(dir.path());
        let ctx = CallContext::builder()
            .with_deadline(Deadline::after(Duration::from_millis(40)))
            .build();
        let err = registry
            .lookup(&ctx, "nobody", "me")
            .await
            .expect_err("无人发布时必须超时");
        assert_eq!(err.category(), ErrorCategory::Timeout);
    }

    /// 落在同一桶内的两个名称对交替发布与撤回，任何一方的撤回都不影响另一方的发布。
    #[tokio::test(flavor = "multi_thread")]
    async fn withdraw_keeps_shared_bucket() {
        const ROUNDS: usize = 200;
        let dir = tempfile::tempdir().expect("创建临时目录");
        let registry = registry(dir.path());
        registry.prepare().await.expect("创建汇合目录");

        let first = registry.entry_path("solverA18", "mesh").expect("合法名称");
        let second = registry.entry_path("solverA19", "mesh").expect("合法名称");
        assert_ne!(first, second);
        assert_eq!(first.parent(), second.parent(), "两个名称对必须共用桶目录");

        let churn = |acceptor: &'static str| {
            let registry = registry.clone();
            tokio::spawn(async move {
                for round in 0..ROUNDS {
                    registry
                        .publish(acceptor, "mesh", "127.0.0.1:4000")
                        .await
                        .unwrap_or_else(|err| panic!("{acceptor} 第 {round} 轮发布失败: {err}"));
                    registry.withdraw(acceptor, "mesh").await.expect("撤回地址");
                }
            })
        };
        let (a, b) = tokio::join!(churn("solverA18"), churn("solverA19"));
        a.expect("发布任务完成");
        b.expect("发布任务完成");

        registry.withdraw("solverA18", "mesh").await.expect("撤回地址");
        assert!(first.parent().is_some_and(Path::is_dir), "撤回不得删除桶目录");
        let path = registry
            .publish("solverA19", "mesh", "127.0.0.1:4001")
            .await
            .expect("桶目录保留后再次发布");
        assert_eq!(path, second);

        registry.cleanup().await.expect("清理汇合目录");
        assert!(!registry.root().exists());
    }
}
