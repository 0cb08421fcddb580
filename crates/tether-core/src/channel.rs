use crate::backend::Backend;
use crate::config::ChannelConfig;
use crate::contract::CallContext;
use crate::endpoint::Endpoint;
use crate::error::{CoreError, codes};
use crate::handshake::Hello;
use crate::registry::ConnectionRegistry;
use crate::rendezvous::{self, AcceptMode, Endpoints, Pair};
use crate::wire::{self, Element, LENGTH_PREFIX_LEN, Scalar};
use bytes::BytesMut;
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, info};

/// 通道内端点的编号。
pub type LocalRank = usize;

const MAX_SCALAR_HEADER: usize = 8;

/// 通道生命周期状态：`Disconnected → Connecting → Connected → Closed`。
///
/// 唯一的回退是建立失败时 `Connecting → Disconnected`，调用方可以重试整个建立调用；
/// 进入 `Connected` 之后只能前进到 `Closed`。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelState {
    Disconnected,
    Connecting,
    Connected,
    Closed,
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChannelState::Disconnected => "disconnected",
            ChannelState::Connecting => "connecting",
            ChannelState::Connected => "connected",
            ChannelState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// 通信通道：管理按本地秩编号的端点，提供连接建立与类型化收发。
///
/// # 教案式注释
///
/// ## 意图（Why）
/// - 耦合进程只关心“与谁建立连接、向哪个本地秩收发什么类型”，不关心底层是 TCP 还是
///   具名端口；通道把汇合、握手与线上格式收敛在后端无关的核心里。
///
/// ## 逻辑（How）
/// - 四个建立调用之一把通道从 `Disconnected` 推进到 `Connected`：
///   - [`accept_connection`](Self::accept_connection) / [`request_connection`](Self::request_connection)：直连；
///   - [`accept_connection_as_server`](Self::accept_connection_as_server) /
///     [`request_connection_as_client`](Self::request_connection_as_client)：一服务端多客户端；
/// - 收发按本地秩寻址，每条消息恰好承载一个类型化值，格式见 [`wire`]；
/// - [`close_connection`](Self::close_connection) 关闭全部端点并进入终态 `Closed`。
///
/// ## 契约（What）
/// - 通道一次性使用：至多一次成功建立、一次关闭；
/// - 在 `Disconnected`/`Connecting`/`Closed` 状态收发、引用不存在的本地秩都是契约违例，
///   立即以 `channel.*` 错误码失败，不触碰任何链路；
/// - 同一对（发送方、接收方）之间的消息按发送顺序到达；收发双方须按相同顺序配对调用。
///
/// ## 注意事项（Trade-offs）
/// - 所有操作默认无界阻塞，有界等待由 [`with_context`](Self::with_context) 附加的截止/取消提供；
/// - 通道不做内部加锁，同一时刻只应由一个执行上下文驱动。
pub struct CommunicationChannel<B: Backend> {
    backend: B,
    registry: ConnectionRegistry,
    config: ChannelConfig,
    ctx: CallContext,
    state: ChannelState,
    endpoints: Endpoints<B::Link>,
}

impl<B: Backend> fmt::Debug for CommunicationChannel<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommunicationChannel")
            .field("scheme", &self.backend.scheme())
            .field("state", &self.state)
            .field("local_ranks", &self.endpoints.keys().collect::<Vec<_>>())
            .field("registry", &self.registry.root())
            .finish()
    }
}

impl<B: Backend> CommunicationChannel<B> {
    /// 以后端与配置创建处于 `Disconnected` 的通道。
    pub fn new(backend: B, config: ChannelConfig) -> crate::Result<Self> {
        config.validate()?;
        Ok(Self {
            backend,
            registry: ConnectionRegistry::new(&config),
            config,
            ctx: CallContext::default(),
            state: ChannelState::Disconnected,
            endpoints: BTreeMap::new(),
        })
    }

    /// 附加调用上下文，其截止/取消约束此后的全部操作。
    pub fn with_context(mut self, ctx: CallContext) -> Self {
        self.ctx = ctx;
        self
    }

    pub fn set_context(&mut self, ctx: CallContext) {
        self.ctx = ctx;
    }

    pub fn context(&self) -> &CallContext {
        &self.ctx
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ChannelState::Connected
    }

    /// 当前持有的端点个数。
    pub fn remote_size(&self) -> usize {
        self.endpoints.len()
    }

    /// 升序排列的本地秩。
    pub fn local_ranks(&self) -> Vec<LocalRank> {
        self.endpoints.keys().copied().collect()
    }

    /// 只读访问指定本地秩的端点。
    pub fn endpoint(&self, local_rank: LocalRank) -> Option<&Endpoint<B::Link>> {
        self.endpoints.get(&local_rank)
    }

    /// 创建汇合目录。一次耦合运行开始前由任一参与者调用一次。
    pub async fn prepare_establishment(&self) -> crate::Result<()> {
        Ok(self.registry.prepare().await?)
    }

    /// 删除汇合目录。全部参与者完成建立后由任一参与者调用一次。
    pub async fn cleanup_establishment(&self) -> crate::Result<()> {
        Ok(self.registry.cleanup().await?)
    }

    /// 直连接受方：等待名为 `requester` 的请求组全部连入。
    ///
    /// 单秩请求组得到本地秩 0 上的一个端点；多秩请求组的每个成员落在与其声明秩相同的本地秩上。
    pub async fn accept_connection(&mut self, acceptor: &str, requester: &str) -> crate::Result<()> {
        self.begin("accept_connection")?;
        let pair = Pair {
            acceptor,
            requester,
        };
        let result =
            rendezvous::accept(&self.backend, &self.registry, &self.ctx, pair, AcceptMode::Direct)
                .await;
        self.finish(result)
    }

    /// 直连请求方：等待名为 `acceptor` 的接受方可达并完成握手。请求方持有本地秩 0。
    pub async fn request_connection(
        &mut self,
        acceptor: &str,
        requester: &str,
        requester_rank: u32,
        requester_size: u32,
    ) -> crate::Result<()> {
        if requester_rank >= requester_size {
            return Err(CoreError::new(
                codes::CHANNEL_INVALID_ARGUMENT,
                format!(
                    "requester rank {requester_rank} is out of range for group size {requester_size}"
                ),
            ));
        }
        self.begin("request_connection")?;
        let pair = Pair {
            acceptor,
            requester,
        };
        let hello = Hello::Direct {
            rank: requester_rank,
            size: requester_size,
        };
        let result =
            rendezvous::request(&self.backend, &self.registry, &self.ctx, pair, hello).await;
        self.finish(result)
    }

    /// 服务端：等待恰好 `expected_clients` 个客户端完成握手，本地秩按握手完成先后分配。
    ///
    /// `expected_clients == 0` 时立即返回，通道保持 `Disconnected`。
    pub async fn accept_connection_as_server(
        &mut self,
        acceptor: &str,
        requester: &str,
        expected_clients: usize,
    ) -> crate::Result<()> {
        self.expect_state(ChannelState::Disconnected, "accept_connection_as_server")?;
        if expected_clients == 0 {
            debug!(acceptor, requester, "no clients expected, staying disconnected");
            return Ok(());
        }
        self.begin("accept_connection_as_server")?;
        let pair = Pair {
            acceptor,
            requester,
        };
        let mode = AcceptMode::Server {
            expected: expected_clients,
        };
        let result =
            rendezvous::accept(&self.backend, &self.registry, &self.ctx, pair, mode).await;
        self.finish(result)
    }

    /// 客户端：连入服务端并完成握手。客户端的唯一端点位于本地秩 0，且不获知其服务端侧的秩。
    pub async fn request_connection_as_client(
        &mut self,
        acceptor: &str,
        requester: &str,
    ) -> crate::Result<()> {
        self.begin("request_connection_as_client")?;
        let pair = Pair {
            acceptor,
            requester,
        };
        let result =
            rendezvous::request(&self.backend, &self.registry, &self.ctx, pair, Hello::Client)
                .await;
        self.finish(result)
    }

    /// 发送一个标量。
    pub async fn send<T: Scalar>(&mut self, value: &T, local_rank: LocalRank) -> crate::Result<()> {
        let mut buf = BytesMut::new();
        value.encode(&mut buf);
        self.transmit(local_rank, &buf).await
    }

    /// 接收一个标量。
    pub async fn receive<T: Scalar>(&mut self, local_rank: LocalRank) -> crate::Result<T> {
        debug_assert!(T::HEADER_LEN <= MAX_SCALAR_HEADER);
        let budget = self.config.max_message_bytes();
        let ctx = self.ctx.clone();
        let endpoint = self.endpoint_mut(local_rank)?;

        let mut header = [0u8; MAX_SCALAR_HEADER];
        let header = &mut header[..T::HEADER_LEN];
        endpoint.receive(&ctx, header).await?;
        let body_len = match T::body_len(header, budget) {
            Ok(len) => len,
            Err(err) => {
                endpoint.poison();
                return Err(err.into());
            }
        };
        let mut body = vec![0u8; body_len];
        endpoint.receive(&ctx, &mut body).await?;
        Ok(T::decode(header, &body)?)
    }

    /// 发送定长数组：恰好 `values.len()` 个元素，无长度前缀。
    pub async fn send_array<T: Element>(
        &mut self,
        values: &[T],
        local_rank: LocalRank,
    ) -> crate::Result<()> {
        let mut buf = BytesMut::new();
        wire::encode_elements(values, &mut buf);
        self.transmit(local_rank, &buf).await
    }

    /// 接收定长数组：填满 `values`，接收方须提供与发送方相同的元素个数。
    pub async fn receive_array<T: Element>(
        &mut self,
        values: &mut [T],
        local_rank: LocalRank,
    ) -> crate::Result<()> {
        let ctx = self.ctx.clone();
        let endpoint = self.endpoint_mut(local_rank)?;
        let mut payload = vec![0u8; values.len() * T::WIDTH];
        endpoint.receive(&ctx, &mut payload).await?;
        Ok(wire::decode_elements(&payload, values)?)
    }

    /// 发送动态序列：元素个数前缀后紧随元素。
    pub async fn send_sequence<T: Element>(
        &mut self,
        values: &[T],
        local_rank: LocalRank,
    ) -> crate::Result<()> {
        let mut buf = BytesMut::with_capacity(LENGTH_PREFIX_LEN + values.len() * T::WIDTH);
        wire::encode_length(values.len(), &mut buf);
        wire::encode_elements(values, &mut buf);
        self.transmit(local_rank, &buf).await
    }

    /// 接收动态序列：按前缀重设 `values` 的长度，返回元素个数。
    ///
    /// 任一元素解码失败时返回错误，`values` 保持调用前的内容。
    pub async fn receive_sequence<T: Element>(
        &mut self,
        values: &mut Vec<T>,
        local_rank: LocalRank,
    ) -> crate::Result<usize> {
        let budget = self.config.max_message_bytes();
        let ctx = self.ctx.clone();
        let endpoint = self.endpoint_mut(local_rank)?;

        let mut prefix = [0u8; LENGTH_PREFIX_LEN];
        endpoint.receive(&ctx, &mut prefix).await?;
        let count = wire::decode_length(&prefix);
        let payload_len = match wire::payload_len(count, T::WIDTH, budget) {
            Ok(len) => len,
            Err(err) => {
                endpoint.poison();
                return Err(err.into());
            }
        };
        let mut payload = vec![0u8; payload_len];
        endpoint.receive(&ctx, &mut payload).await?;

        let decoded = payload
            .chunks_exact(T::WIDTH)
            .map(T::get)
            .collect::<Result<Vec<T>, _>>()?;
        *values = decoded;
        Ok(values.len())
    }

    /// 按本地秩升序向每个端点发送同一标量。
    pub async fn broadcast<T: Scalar>(&mut self, value: &T) -> crate::Result<()> {
        self.expect_state(ChannelState::Connected, "broadcast")?;
        let mut buf = BytesMut::new();
        value.encode(&mut buf);
        for endpoint in self.endpoints.values_mut() {
            endpoint.send(&self.ctx, &buf).await?;
        }
        Ok(())
    }

    /// 关闭全部端点并进入终态 `Closed`。
    ///
    /// 已关闭时直接返回成功；从未建立连接时关闭属于契约违例。
    /// 个别端点关闭失败不会阻止其余端点释放，首个错误在全部释放后返回。
    pub async fn close_connection(&mut self) -> crate::Result<()> {
        match self.state {
            ChannelState::Closed => return Ok(()),
            ChannelState::Connected => {}
            state => {
                return Err(CoreError::new(
                    codes::CHANNEL_INVALID_STATE,
                    format!("close_connection requires a connected channel, found {state}"),
                ));
            }
        }
        let mut first_error = None;
        for endpoint in self.endpoints.values_mut() {
            if let Err(err) = endpoint.close(&self.ctx).await {
                first_error.get_or_insert(err);
            }
        }
        let released = self.endpoints.len();
        self.endpoints.clear();
        self.transition(ChannelState::Closed);
        info!(released, "channel closed");
        first_error.map_or(Ok(()), Err)
    }

    async fn transmit(&mut self, local_rank: LocalRank, bytes: &[u8]) -> crate::Result<()> {
        let ctx = self.ctx.clone();
        self.endpoint_mut(local_rank)?.send(&ctx, bytes).await
    }

    fn endpoint_mut(&mut self, local_rank: LocalRank) -> crate::Result<&mut Endpoint<B::Link>> {
        self.expect_state(ChannelState::Connected, "transfer")?;
        self.endpoints.get_mut(&local_rank).ok_or_else(|| {
            CoreError::new(
                codes::CHANNEL_UNKNOWN_RANK,
                format!("no endpoint at local rank {local_rank}"),
            )
        })
    }

    fn expect_state(&self, expected: ChannelState, op: &'static str) -> crate::Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(CoreError::new(
                codes::CHANNEL_INVALID_STATE,
                format!("{op} requires a {expected} channel, found {}", self.state),
            ))
        }
    }

    fn begin(&mut self, op: &'static str) -> crate::Result<()> {
        self.expect_state(ChannelState::Disconnected, op)?;
        self.transition(ChannelState::Connecting);
        Ok(())
    }

    fn finish(&mut self, result: crate::Result<Endpoints<B::Link>>) -> crate::Result<()> {
        match result {
            Ok(endpoints) => {
                info!(
                    scheme = self.backend.scheme(),
                    endpoints = endpoints.len(),
                    "channel connected"
                );
                self.endpoints = endpoints;
                self.transition(ChannelState::Connected);
                Ok(())
            }
            Err(err) => {
                self.transition(ChannelState::Disconnected);
                Err(err)
            }
        }
    }

    fn transition(&mut self, next: ChannelState) {
        debug!(from = %self.state, to = %next, "channel state transition");
        self.state = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::{Cancellation, Deadline};
    use crate::error::ErrorCategory;
    use crate::testing::MemoryBackend;
    use std::path::Path;
    use std::time::Duration;
    use tracing_test::traced_test;

    fn channel(dir: &Path) -> CommunicationChannel<MemoryBackend> {
        let config = ChannelConfig::new(dir).with_lookup_poll_interval(Duration::from_millis(2));
        CommunicationChannel::new(MemoryBackend::new(), config).expect("合法配置")
    }

    async fn connected_pair(
        dir: &Path,
    ) -> (
        CommunicationChannel<MemoryBackend>,
        CommunicationChannel<MemoryBackend>,
    ) {
        let mut acceptor = channel(dir);
        let mut requester = channel(dir);
        let (accepted, requested) = tokio::join!(
            acceptor.accept_connection("process0", "process1"),
            requester.request_connection("process0", "process1", 0, 1),
        );
        accepted.expect("接受方建立连接");
        requested.expect("请求方建立连接");
        (acceptor, requester)
    }

    #[tokio::test(flavor = "multi_thread")]
    #[traced_test]
    async fn direct_pair_exchanges_scalars() {
        let dir = tempfile::tempdir().expect("创建临时目录");
        let (mut a, mut b) = connected_pair(dir.path()).await;
        assert!(a.is_connected() && b.is_connected());
        assert_eq!(a.local_ranks(), vec![0]);
        assert_eq!(b.remote_size(), 1);

        a.send(&"Hello World".to_string(), 0).await.expect("发送字符串");
        a.send(&0.123_f64, 0).await.expect("发送浮点");
        a.send(&true, 0).await.expect("发送布尔");
        assert_eq!(b.receive::<String>(0).await.expect("接收字符串"), "Hello World");
        assert_eq!(b.receive::<f64>(0).await.expect("接收浮点"), 0.123);
        assert!(b.receive::<bool>(0).await.expect("接收布尔"));

        a.close_connection().await.expect("关闭接受方");
        b.close_connection().await.expect("关闭请求方");
        assert!(logs_contain("channel connected"));
        assert!(logs_contain("waiting for requesters"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn sequences_resize_receiver() {
        let dir = tempfile::tempdir().expect("创建临时目录");
        let (mut a, mut b) = connected_pair(dir.path()).await;

        a.send_sequence(&[1_i32, 2, 3], 0).await.expect("发送序列");
        let mut received: Vec<i32> = Vec::new();
        let count = b
            .receive_sequence(&mut received, 0)
            .await
            .expect("接收序列");
        assert_eq!(count, 3);
        assert_eq!(received, vec![1, 2, 3]);

        b.send_sequence::<f64>(&[], 0).await.expect("发送空序列");
        let mut stale = vec![9.0_f64; 4];
        a.receive_sequence(&mut stale, 0).await.expect("接收空序列");
        assert!(stale.is_empty());
    }

    /// 管道缓冲远小于消息时，收发双方交替推进，序列仍完整到达。
    #[tokio::test(flavor = "multi_thread")]
    async fn small_pipe_buffer_carries_large_sequence() {
        let dir = tempfile::tempdir().expect("创建临时目录");
        let config =
            ChannelConfig::new(dir.path()).with_lookup_poll_interval(Duration::from_millis(2));
        let mut acceptor =
            CommunicationChannel::new(MemoryBackend::with_buffer(16), config.clone())
                .expect("合法配置");
        let mut requester =
            CommunicationChannel::new(MemoryBackend::with_buffer(16), config).expect("合法配置");
        let (accepted, requested) = tokio::join!(
            acceptor.accept_connection("process0", "process1"),
            requester.request_connection("process0", "process1", 0, 1),
        );
        accepted.expect("接受方建立连接");
        requested.expect("请求方建立连接");

        let values: Vec<u64> = (0..1024).collect();
        let mut received: Vec<u64> = Vec::new();
        let (sent, count) = tokio::join!(
            acceptor.send_sequence(&values, 0),
            requester.receive_sequence(&mut received, 0),
        );
        sent.expect("发送序列");
        assert_eq!(count.expect("接收序列"), values.len());
        assert_eq!(received, values);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn invalid_sequence_element_keeps_receiver() {
        let dir = tempfile::tempdir().expect("创建临时目录");
        let (mut a, mut b) = connected_pair(dir.path()).await;

        // 一个 u32 元素按布尔解读：计数为 1，首字节为 2。
        a.send_sequence(&[2_u32], 0).await.expect("发送序列");
        let mut flags = vec![true, false];
        let err = b
            .receive_sequence::<bool>(&mut flags, 0)
            .await
            .expect_err("非法布尔字节必须被拒绝");
        assert_eq!(err.code(), codes::PROTOCOL_DECODE);
        assert_eq!(flags, vec![true, false]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn arrays_fill_receiver_buffer() {
        let dir = tempfile::tempdir().expect("创建临时目录");
        let (mut a, mut b) = connected_pair(dir.path()).await;

        a.send_array(&[1.0_f64; 3], 0).await.expect("发送数组");
        let mut buf = [0.0_f64; 3];
        b.receive_array(&mut buf, 0).await.expect("接收数组");
        assert_eq!(buf, [1.0; 3]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn over_budget_prefix_is_rejected_and_poisons_endpoint() {
        let dir = tempfile::tempdir().expect("创建临时目录");
        let mut a = channel(dir.path());
        let config = ChannelConfig::new(dir.path())
            .with_lookup_poll_interval(Duration::from_millis(2))
            .with_max_message_bytes(16);
        let mut b =
            CommunicationChannel::new(MemoryBackend::new(), config).expect("合法配置");
        let (accepted, requested) = tokio::join!(
            a.accept_connection("left", "right"),
            b.request_connection("left", "right", 0, 1),
        );
        accepted.expect("接受方建立连接");
        requested.expect("请求方建立连接");

        a.send_sequence(&[0_i64; 3], 0).await.expect("发送序列");
        let mut out = Vec::<i64>::new();
        let err = b
            .receive_sequence(&mut out, 0)
            .await
            .expect_err("超出预算必须被拒绝");
        assert_eq!(err.code(), codes::PROTOCOL_BUDGET_EXCEEDED);
        assert!(err.is_contract_violation());

        let err = b.receive::<i32>(0).await.expect_err("端点已不可用");
        assert_eq!(err.code(), codes::CHANNEL_ENDPOINT_BROKEN);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn lifecycle_violations_fail_fast() {
        let dir = tempfile::tempdir().expect("创建临时目录");
        let mut idle = channel(dir.path());
        let err = idle.send(&1_i32, 0).await.expect_err("未连接时发送必须失败");
        assert_eq!(err.code(), codes::CHANNEL_INVALID_STATE);
        let err = idle.close_connection().await.expect_err("未连接时关闭必须失败");
        assert_eq!(err.code(), codes::CHANNEL_INVALID_STATE);

        let (mut a, mut b) = connected_pair(dir.path()).await;
        let err = a.send(&1_i32, 5).await.expect_err("未知本地秩");
        assert_eq!(err.code(), codes::CHANNEL_UNKNOWN_RANK);

        let err = a
            .accept_connection("process0", "process1")
            .await
            .expect_err("通道只能建立一次");
        assert_eq!(err.code(), codes::CHANNEL_INVALID_STATE);

        a.close_connection().await.expect("首次关闭");
        a.close_connection().await.expect("重复关闭是幂等的");
        assert_eq!(a.state(), ChannelState::Closed);
        let err = a.receive::<i32>(0).await.expect_err("关闭后接收必须失败");
        assert_eq!(err.code(), codes::CHANNEL_INVALID_STATE);
        b.close_connection().await.expect("关闭请求方");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn zero_clients_stays_disconnected() {
        let dir = tempfile::tempdir().expect("创建临时目录");
        let mut server = channel(dir.path());
        server
            .accept_connection_as_server("even", "odd", 0)
            .await
            .expect("零客户端立即返回");
        assert_eq!(server.state(), ChannelState::Disconnected);
        assert_eq!(server.remote_size(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failed_rendezvous_returns_to_disconnected() {
        let dir = tempfile::tempdir().expect("创建临时目录");
        let ctx = CallContext::builder()
            .with_deadline(Deadline::after(Duration::from_millis(50)))
            .build();
        let mut requester = channel(dir.path()).with_context(ctx);
        let err = requester
            .request_connection_as_client("nobody", "me")
            .await
            .expect_err("无接受方时必须超时");
        assert_eq!(err.category(), ErrorCategory::Timeout);
        assert_eq!(requester.state(), ChannelState::Disconnected);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn cancelled_accept_withdraws_address() {
        let dir = tempfile::tempdir().expect("创建临时目录");
        let token = Cancellation::new();
        let ctx = CallContext::builder()
            .with_cancellation(token.clone())
            .build();
        let mut acceptor = channel(dir.path()).with_context(ctx);
        let path = acceptor
            .registry
            .entry_path("even", "odd")
            .expect("合法名称");

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            token.cancel();
        });
        let err = acceptor
            .accept_connection_as_server("even", "odd", 2)
            .await
            .expect_err("取消必须打断接受");
        canceller.await.expect("取消任务完成");
        assert_eq!(err.category(), ErrorCategory::Cancelled);
        assert_eq!(acceptor.state(), ChannelState::Disconnected);
        assert!(!path.exists());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn mode_mismatch_is_a_protocol_violation() {
        let dir = tempfile::tempdir().expect("创建临时目录");
        let mut acceptor = channel(dir.path());
        let mut client = channel(dir.path());
        let (accepted, requested) = tokio::join!(
            acceptor.accept_connection("a", "b"),
            client.request_connection_as_client("a", "b"),
        );
        let err = accepted.expect_err("直连接受方必须拒绝客户端");
        assert_eq!(err.code(), codes::PROTOCOL_HANDSHAKE);
        assert!(requested.is_err());
        assert_eq!(acceptor.state(), ChannelState::Disconnected);
        assert_eq!(client.state(), ChannelState::Disconnected);
    }
}
