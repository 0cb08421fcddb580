use tether_core::io::OperationKind;

pub(crate) const BIND: OperationKind =
    OperationKind::new("tether.transport.tcp.bind_failed", "tcp bind");
pub(crate) const ACCEPT: OperationKind =
    OperationKind::new("tether.transport.tcp.accept_failed", "tcp accept");
pub(crate) const CONNECT: OperationKind =
    OperationKind::new("tether.transport.tcp.connect_failed", "tcp connect");
pub(crate) const READ: OperationKind =
    OperationKind::new("tether.transport.tcp.read_failed", "tcp read");
pub(crate) const WRITE: OperationKind =
    OperationKind::new("tether.transport.tcp.write_failed", "tcp write");
pub(crate) const SHUTDOWN: OperationKind =
    OperationKind::new("tether.transport.tcp.shutdown_failed", "tcp shutdown");
pub(crate) const CONFIGURE: OperationKind =
    OperationKind::new("tether.transport.tcp.configure_failed", "tcp configure");
/// 汇合文件中的地址无法解析为套接字地址。
pub(crate) const ADDRESS: OperationKind =
    OperationKind::new("tether.transport.tcp.invalid_address", "tcp address");
