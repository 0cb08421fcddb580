use crate::contract::CallContext;
use std::future::Future;

/// 已建立的双向字节流链路。
///
/// # 教案式注释
///
/// ## 意图（Why）
/// - 通道核心只需要“写满 / 读满 / 关闭”三个原语即可实现全部类型化收发；
///   把它们收敛为 trait，使 TCP 与具名端口两种后端可以互换。
///
/// ## 契约（What）
/// - `write_all`：写出全部字节后才返回成功；失败时链路状态未定义，调用方不得继续使用；
/// - `read_exact`：读满 `buf` 后才返回成功；对端提前关闭以
///   `io::ErrorKind::UnexpectedEof` 映射出的错误报告，绝不返回部分数据；
/// - `close`：释放底层句柄，调用方保证至多调用一次；
/// - 所有操作都必须遵循 `ctx` 的取消与截止语义。
///
/// ## 注意事项（Trade-offs）
/// - Future 通过 GAT 暴露，实现方通常以 `Pin<Box<dyn Future + Send + 'a>>` 落地，
///   每次调用产生一次堆分配。
pub trait Link: Send + 'static {
    type WriteFuture<'a>: Future<Output = crate::Result<()>> + Send + 'a
    where
        Self: 'a;

    type ReadFuture<'a>: Future<Output = crate::Result<()>> + Send + 'a
    where
        Self: 'a;

    type CloseFuture<'a>: Future<Output = crate::Result<()>> + Send + 'a
    where
        Self: 'a;

    /// 对端的可读描述，用于日志。
    fn peer(&self) -> &str;

    fn write_all<'a>(&'a mut self, ctx: &'a CallContext, buf: &'a [u8]) -> Self::WriteFuture<'a>;

    fn read_exact<'a>(
        &'a mut self,
        ctx: &'a CallContext,
        buf: &'a mut [u8],
    ) -> Self::ReadFuture<'a>;

    fn close<'a>(&'a mut self, ctx: &'a CallContext) -> Self::CloseFuture<'a>;
}

/// 处于监听状态的后端端点。
///
/// ## 契约（What）
/// - `address`：可被写入汇合文件、并由同一后端的 [`Backend::connect`] 解析的地址字符串；
/// - `accept`：阻塞直到一条入站链路建立，遵循 `ctx` 的取消与截止；
/// - 监听器被丢弃时必须释放监听资源（端口、套接字文件）。
pub trait BackendListener: Send + Sync + 'static {
    type Link: Link;

    type AcceptFuture<'a>: Future<Output = crate::Result<Self::Link>> + Send + 'a
    where
        Self: 'a;

    fn address(&self) -> &str;

    fn accept<'a>(&'a self, ctx: &'a CallContext) -> Self::AcceptFuture<'a>;
}

/// 传输后端能力接口：通道核心唯一依赖的后端抽象。
///
/// ## 逻辑（How）
/// - 接受方调用 [`Backend::listen`] 得到监听器，并把 [`BackendListener::address`]
///   发布到汇合目录；
/// - 请求方读取该地址并调用 [`Backend::connect`]。
pub trait Backend: Send + Sync + 'static {
    type Link: Link;
    type Listener: BackendListener<Link = Self::Link>;

    type ListenFuture<'a>: Future<Output = crate::Result<Self::Listener>> + Send + 'a
    where
        Self: 'a;

    type ConnectFuture<'a>: Future<Output = crate::Result<Self::Link>> + Send + 'a
    where
        Self: 'a;

    /// 协议标识（例如 `"tcp"`、`"port"`）。
    fn scheme(&self) -> &'static str;

    fn listen<'a>(&'a self, ctx: &'a CallContext) -> Self::ListenFuture<'a>;

    fn connect<'a>(&'a self, ctx: &'a CallContext, address: &'a str) -> Self::ConnectFuture<'a>;
}
