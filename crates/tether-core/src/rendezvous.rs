//! 汇合协调：把名称对解析为一组已完成握手的端点。

use crate::backend::{Backend, BackendListener, Link};
use crate::channel::LocalRank;
use crate::contract::CallContext;
use crate::endpoint::Endpoint;
use crate::error::{CoreError, ErrorCategory, codes};
use crate::handshake::{self, ACK, DIRECT_TAIL_LEN, HandshakeError, Hello, NAK, PREFIX_LEN};
use crate::registry::ConnectionRegistry;
use bytes::BytesMut;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

pub(crate) type Endpoints<L> = BTreeMap<LocalRank, Endpoint<L>>;

/// 接受方的汇合模式。
#[derive(Clone, Copy, Debug)]
pub(crate) enum AcceptMode {
    /// 直连：接受整个请求组，本地秩即请求方声明的秩。
    Direct,
    /// 服务端：恰好接受 `expected` 个客户端，本地秩为握手完成的先后次序。
    Server { expected: usize },
}

impl AcceptMode {
    fn hello_name(&self) -> &'static str {
        match self {
            AcceptMode::Direct => "direct",
            AcceptMode::Server { .. } => "client",
        }
    }
}

/// 名称对的两端。
#[derive(Clone, Copy, Debug)]
pub(crate) struct Pair<'a> {
    pub acceptor: &'a str,
    pub requester: &'a str,
}

/// 汇合阶段的 I/O 失败统一归为“握手中断”；取消、超时与协议违例保持原样。
fn aborted(err: CoreError, stage: &'static str) -> CoreError {
    match err.category() {
        ErrorCategory::Cancelled | ErrorCategory::Timeout | ErrorCategory::ProtocolViolation => {
            err
        }
        _ => CoreError::new(
            codes::RENDEZVOUS_ABORTED,
            format!("handshake aborted during {stage}"),
        )
        .with_cause(err),
    }
}

/// 接受方：监听、发布地址、接受直到满足模式要求，最后撤回地址。
///
/// 失败时关闭已接受的全部链路；无论成败都会撤回汇合文件。
pub(crate) async fn accept<B: Backend>(
    backend: &B,
    registry: &ConnectionRegistry,
    ctx: &CallContext,
    pair: Pair<'_>,
    mode: AcceptMode,
) -> crate::Result<Endpoints<B::Link>> {
    // 名称非法时不应先占用监听资源。
    registry.entry_path(pair.acceptor, pair.requester)?;
    let listener = backend.listen(ctx).await?;
    registry
        .publish(pair.acceptor, pair.requester, listener.address())
        .await?;
    info!(
        acceptor = pair.acceptor,
        requester = pair.requester,
        address = listener.address(),
        scheme = backend.scheme(),
        ?mode,
        "waiting for requesters"
    );

    let mut endpoints = BTreeMap::new();
    let admitted = admit_all(&listener, ctx, mode, &mut endpoints).await;
    let withdrawn = registry
        .withdraw(pair.acceptor, pair.requester)
        .await
        .map_err(CoreError::from);

    match admitted.and(withdrawn) {
        Ok(()) => Ok(endpoints),
        Err(err) => {
            warn!(
                acceptor = pair.acceptor,
                requester = pair.requester,
                admitted = endpoints.len(),
                error = %err,
                "rendezvous failed, releasing partial links"
            );
            release(ctx, endpoints).await;
            Err(err)
        }
    }
}

async fn admit_all<L: BackendListener>(
    listener: &L,
    ctx: &CallContext,
    mode: AcceptMode,
    endpoints: &mut Endpoints<L::Link>,
) -> crate::Result<()> {
    let mut group_size: Option<u32> = None;
    loop {
        let target = match mode {
            AcceptMode::Server { expected } => Some(expected),
            AcceptMode::Direct => group_size.map(|size| size as usize),
        };
        if target.is_some_and(|target| endpoints.len() >= target) {
            return Ok(());
        }

        let mut link = listener
            .accept(ctx)
            .await
            .map_err(|err| aborted(err, "accept"))?;
        let hello = match read_hello(&mut link, ctx).await {
            Ok(hello) => hello,
            Err(err) => {
                let _ = link.close(ctx).await;
                return Err(err);
            }
        };

        let admission = admit(mode, hello, &mut group_size, endpoints);
        let local_rank = match admission {
            Ok(local_rank) => local_rank,
            Err(err) => {
                // 尽力告知对端被拒绝；对端可能已经断开。
                let _ = link.write_all(ctx, &[NAK]).await;
                let _ = link.close(ctx).await;
                return Err(err.into());
            }
        };
        if let Err(err) = link.write_all(ctx, &[ACK]).await {
            let _ = link.close(ctx).await;
            return Err(aborted(err, "acknowledge"));
        }
        debug!(local_rank, peer = link.peer(), ?hello, "requester admitted");
        endpoints.insert(local_rank, Endpoint::new(local_rank, link));
    }
}

fn admit<L>(
    mode: AcceptMode,
    hello: Hello,
    group_size: &mut Option<u32>,
    endpoints: &Endpoints<L>,
) -> Result<LocalRank, HandshakeError> {
    match (mode, hello) {
        (AcceptMode::Direct, Hello::Direct { rank, size }) => {
            match *group_size {
                None => *group_size = Some(size),
                Some(expected) if expected != size => {
                    return Err(HandshakeError::InconsistentSize {
                        expected,
                        received: size,
                    });
                }
                Some(_) => {}
            }
            let local_rank = rank as LocalRank;
            if endpoints.contains_key(&local_rank) {
                return Err(HandshakeError::DuplicateRank(rank));
            }
            Ok(local_rank)
        }
        (AcceptMode::Server { .. }, Hello::Client) => Ok(endpoints.len()),
        (mode, hello) => Err(HandshakeError::UnexpectedMode {
            expected: mode.hello_name(),
            received: hello.mode_name(),
        }),
    }
}

async fn read_hello<L: Link>(link: &mut L, ctx: &CallContext) -> crate::Result<Hello> {
    let mut prefix = [0u8; PREFIX_LEN];
    link.read_exact(ctx, &mut prefix)
        .await
        .map_err(|err| aborted(err, "hello"))?;
    let tail_len = Hello::tail_len(&prefix)?;
    let mut tail = [0u8; DIRECT_TAIL_LEN];
    link.read_exact(ctx, &mut tail[..tail_len])
        .await
        .map_err(|err| aborted(err, "hello"))?;
    Ok(Hello::decode(&prefix, &tail[..tail_len])?)
}

/// 请求方：等待地址、连接、发送 hello 并等待确认。返回的端点位于本地秩 0。
pub(crate) async fn request<B: Backend>(
    backend: &B,
    registry: &ConnectionRegistry,
    ctx: &CallContext,
    pair: Pair<'_>,
    hello: Hello,
) -> crate::Result<Endpoints<B::Link>> {
    let address = registry.lookup(ctx, pair.acceptor, pair.requester).await?;
    let mut link = backend
        .connect(ctx, &address)
        .await
        .map_err(|err| match err.category() {
            ErrorCategory::Cancelled | ErrorCategory::Timeout => err,
            _ => CoreError::new(
                codes::RENDEZVOUS_UNREACHABLE,
                format!("acceptor {} is unreachable at {address}", pair.acceptor),
            )
            .with_cause(err),
        })?;

    if let Err(err) = greet(&mut link, ctx, hello).await {
        let _ = link.close(ctx).await;
        return Err(err);
    }
    info!(
        acceptor = pair.acceptor,
        requester = pair.requester,
        address = %address,
        ?hello,
        "connected to acceptor"
    );
    let mut endpoints = BTreeMap::new();
    endpoints.insert(0, Endpoint::new(0, link));
    Ok(endpoints)
}

async fn greet<L: Link>(link: &mut L, ctx: &CallContext, hello: Hello) -> crate::Result<()> {
    let mut frame = BytesMut::with_capacity(PREFIX_LEN + DIRECT_TAIL_LEN);
    hello.encode(&mut frame);
    link.write_all(ctx, &frame)
        .await
        .map_err(|err| aborted(err, "hello"))?;
    let mut reply = [0u8; 1];
    link.read_exact(ctx, &mut reply)
        .await
        .map_err(|err| aborted(err, "acknowledge"))?;
    handshake::check_reply(reply[0])?;
    Ok(())
}

/// 关闭部分建立的端点，忽略关闭错误。
pub(crate) async fn release<L: Link>(ctx: &CallContext, mut endpoints: Endpoints<L>) {
    for endpoint in endpoints.values_mut() {
        let _ = endpoint.close(ctx).await;
    }
}
