use crate::backend::Backend;
use crate::channel::{ChannelState, CommunicationChannel, LocalRank};
use crate::config::ChannelConfig;
use crate::contract::CallContext;
use crate::error::{CoreError, codes};
use crate::wire::{Element, Scalar};
use tokio::runtime::{Builder, Runtime};

/// [`CommunicationChannel`] 的阻塞式外观。
///
/// # 教案式注释
///
/// ## 意图（Why）
/// - 耦合求解器通常是同步代码，每个进程单线程驱动一个通道；“调用阻塞当前线程直至完成”
///   是它们期望的语义，不应强迫其引入异步运行时。
///
/// ## 逻辑（How）
/// - 持有一个 current-thread Tokio 运行时，每个方法以 `block_on` 驱动对应的异步操作；
/// - 字段声明顺序保证通道（及其链路）先于运行时析构，链路可在运行时仍存活时注销。
///
/// ## 注意事项（Trade-offs）
/// - 不得在异步上下文内调用这些方法：在运行时线程上嵌套 `block_on` 会 panic。
pub struct BlockingChannel<B: Backend> {
    inner: CommunicationChannel<B>,
    runtime: Runtime,
}

impl<B: Backend> std::fmt::Debug for BlockingChannel<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockingChannel")
            .field("inner", &self.inner)
            .finish_non_exhaustive()
    }
}

impl<B: Backend> BlockingChannel<B> {
    pub fn new(backend: B, config: ChannelConfig) -> crate::Result<Self> {
        Self::from_channel(CommunicationChannel::new(backend, config)?)
    }

    /// 包装已有的异步通道。
    pub fn from_channel(inner: CommunicationChannel<B>) -> crate::Result<Self> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|err| {
                CoreError::new(
                    codes::RUNTIME_UNAVAILABLE,
                    format!("failed to build blocking runtime: {err}"),
                )
                .with_cause(err)
            })?;
        Ok(Self { inner, runtime })
    }

    pub fn with_context(mut self, ctx: CallContext) -> Self {
        self.inner.set_context(ctx);
        self
    }

    /// 只读访问底层异步通道。
    pub fn channel(&self) -> &CommunicationChannel<B> {
        &self.inner
    }

    pub fn state(&self) -> ChannelState {
        self.inner.state()
    }

    pub fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    pub fn remote_size(&self) -> usize {
        self.inner.remote_size()
    }

    pub fn local_ranks(&self) -> Vec<LocalRank> {
        self.inner.local_ranks()
    }

    pub fn prepare_establishment(&self) -> crate::Result<()> {
        self.runtime.block_on(self.inner.prepare_establishment())
    }

    pub fn cleanup_establishment(&self) -> crate::Result<()> {
        self.runtime.block_on(self.inner.cleanup_establishment())
    }

    pub fn accept_connection(&mut self, acceptor: &str, requester: &str) -> crate::Result<()> {
        self.runtime
            .block_on(self.inner.accept_connection(acceptor, requester))
    }

    pub fn request_connection(
        &mut self,
        acceptor: &str,
        requester: &str,
        requester_rank: u32,
        requester_size: u32,
    ) -> crate::Result<()> {
        self.runtime.block_on(self.inner.request_connection(
            acceptor,
            requester,
            requester_rank,
            requester_size,
        ))
    }

    pub fn accept_connection_as_server(
        &mut self,
        acceptor: &str,
        requester: &str,
        expected_clients: usize,
    ) -> crate::Result<()> {
        self.runtime.block_on(
            self.inner
                .accept_connection_as_server(acceptor, requester, expected_clients),
        )
    }

    pub fn request_connection_as_client(
        &mut self,
        acceptor: &str,
        requester: &str,
    ) -> crate::Result<()> {
        self.runtime
            .block_on(self.inner.request_connection_as_client(acceptor, requester))
    }

    pub fn send<T: Scalar>(&mut self, value: &T, local_rank: LocalRank) -> crate::Result<()> {
        self.runtime.block_on(self.inner.send(value, local_rank))
    }

    pub fn receive<T: Scalar>(&mut self, local_rank: LocalRank) -> crate::Result<T> {
        self.runtime.block_on(self.inner.receive(local_rank))
    }

    pub fn send_array<T: Element>(&mut self, values: &[T], local_rank: LocalRank) -> crate::Result<()> {
        self.runtime.block_on(self.inner.send_array(values, local_rank))
    }

    pub fn receive_array<T: Element>(
        &mut self,
        values: &mut [T],
        local_rank: LocalRank,
    ) -> crate::Result<()> {
        self.runtime
            .block_on(self.inner.receive_array(values, local_rank))
    }

    pub fn send_sequence<T: Element>(
        &mut self,
        values: &[T],
        local_rank: LocalRank,
    ) -> crate::Result<()> {
        self.runtime
            .block_on(self.inner.send_sequence(values, local_rank))
    }

    pub fn receive_sequence<T: Element>(
        &mut self,
        values: &mut Vec<T>,
        local_rank: LocalRank,
    ) -> crate::Result<usize> {
        self.runtime
            .block_on(self.inner.receive_sequence(values, local_rank))
    }

    pub fn broadcast<T: Scalar>(&mut self, value: &T) -> crate::Result<()> {
        self.runtime.block_on(self.inner.broadcast(value))
    }

    pub fn close_connection(&mut self) -> crate::Result<()> {
        self.runtime.block_on(self.inner.close_connection())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryBackend;
    use std::time::Duration;

    #[test]
    fn threads_drive_blocking_channels() {
        let dir = tempfile::tempdir().expect("创建临时目录");
        let config = ChannelConfig::new(dir.path())
            .with_lookup_poll_interval(Duration::from_millis(2));

        std::thread::scope(|scope| {
            let server_config = config.clone();
            scope.spawn(move || {
                let mut server = BlockingChannel::new(MemoryBackend::new(), server_config)
                    .expect("构建通道");
                server
                    .accept_connection_as_server("even", "odd", 1)
                    .expect("服务端建立连接");
                server.send(&1_i32, 0).expect("发送");
                assert_eq!(server.receive::<i32>(0).expect("接收"), 2);
                server.close_connection().expect("关闭");
            });
            scope.spawn(move || {
                let mut client =
                    BlockingChannel::new(MemoryBackend::new(), config).expect("构建通道");
                client
                    .request_connection_as_client("even", "odd")
                    .expect("客户端建立连接");
                assert_eq!(client.receive::<i32>(0).expect("接收"), 1);
                client.send(&2_i32, 0).expect("发送");
                client.close_connection().expect("关闭");
                assert_eq!(client.state(), ChannelState::Closed);
            });
        });
    }
}
