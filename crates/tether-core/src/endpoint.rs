use crate::backend::Link;
use crate::channel::LocalRank;
use crate::contract::CallContext;
use crate::error::{CoreError, ErrorCategory, codes};
use tracing::{debug, warn};

/// 端点状态。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EndpointState {
    Open,
    /// 发生过传输失败，不可再用。
    Broken,
    Closed,
}

/// 连接端点：一条到单个远端参与者的已建立链路。
///
/// # 教案式注释
///
/// ## 契约（What）
/// - `send`/`receive` 在全部字节传输完成或后端报告失败前不返回；
/// - 任一方向的传输失败都会把端点置为 [`EndpointState::Broken`]，此后的收发立即以
///   `channel.endpoint_broken` 失败，避免在字节流错位后继续解码；
/// - `close` 幂等，底层链路恰好释放一次。
///
/// ## 注意事项（Trade-offs）
/// - 取消与超时同样会把端点置为 `Broken`：被打断的读写可能已消费部分字节。
#[derive(Debug)]
pub struct Endpoint<L> {
    local_rank: LocalRank,
    link: Option<L>,
    state: EndpointState,
}

impl<L: Link> Endpoint<L> {
    pub(crate) fn new(local_rank: LocalRank, link: L) -> Self {
        Self {
            local_rank,
            link: Some(link),
            state: EndpointState::Open,
        }
    }

    pub fn local_rank(&self) -> LocalRank {
        self.local_rank
    }

    pub fn state(&self) -> EndpointState {
        self.state
    }

    /// 对端描述；关闭后返回 `None`。
    pub fn peer(&self) -> Option<&str> {
        self.link.as_ref().map(Link::peer)
    }

    fn open_link(&mut self) -> crate::Result<&mut L> {
        match (self.state, self.link.as_mut()) {
            (EndpointState::Open, Some(link)) => Ok(link),
            (EndpointState::Broken, _) => Err(CoreError::new(
                codes::CHANNEL_ENDPOINT_BROKEN,
                format!("endpoint {} is broken", self.local_rank),
            )),
            _ => Err(CoreError::new(
                codes::CHANNEL_INVALID_STATE,
                format!("endpoint {} is closed", self.local_rank),
            )),
        }
    }

    /// 写出全部字节。
    pub async fn send(&mut self, ctx: &CallContext, bytes: &[u8]) -> crate::Result<()> {
        let link = self.open_link()?;
        let result = link.write_all(ctx, bytes).await;
        self.settle(result, "send")
    }

    /// 读满 `buf`。
    pub async fn receive(&mut self, ctx: &CallContext, buf: &mut [u8]) -> crate::Result<()> {
        let link = self.open_link()?;
        let result = link.read_exact(ctx, buf).await;
        self.settle(result, "receive")
    }

    /// 关闭端点；重复调用直接返回成功。
    pub async fn close(&mut self, ctx: &CallContext) -> crate::Result<()> {
        self.state = EndpointState::Closed;
        match self.link.take() {
            Some(mut link) => {
                debug!(local_rank = self.local_rank, peer = link.peer(), "closing endpoint");
                link.close(ctx).await
            }
            None => Ok(()),
        }
    }

    /// 字节流已错位（例如长度前缀被拒绝），端点不可再用。
    pub(crate) fn poison(&mut self) {
        self.state = EndpointState::Broken;
    }

    fn settle(&mut self, result: crate::Result<()>, op: &'static str) -> crate::Result<()> {
        let err = match result {
            Ok(()) => return Ok(()),
            Err(err) => err,
        };
        self.state = EndpointState::Broken;
        warn!(
            local_rank = self.local_rank,
            op,
            code = err.code(),
            error = %err,
            "endpoint transfer failed"
        );
        match err.category() {
            ErrorCategory::Cancelled | ErrorCategory::Timeout => Err(err),
            _ => Err(CoreError::new(
                codes::TRANSFER_FAILED,
                format!("{op} on local rank {} failed", self.local_rank),
            )
            .with_cause(err)),
        }
    }
}
