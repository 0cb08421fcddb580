use tether_core::io::OperationKind;

pub(crate) const OPEN: OperationKind =
    OperationKind::new("tether.transport.port.open_failed", "port open");
pub(crate) const ACCEPT: OperationKind =
    OperationKind::new("tether.transport.port.accept_failed", "port accept");
pub(crate) const CONNECT: OperationKind =
    OperationKind::new("tether.transport.port.connect_failed", "port connect");
pub(crate) const READ: OperationKind =
    OperationKind::new("tether.transport.port.read_failed", "port read");
pub(crate) const WRITE: OperationKind =
    OperationKind::new("tether.transport.port.write_failed", "port write");
pub(crate) const SHUTDOWN: OperationKind =
    OperationKind::new("tether.transport.port.shutdown_failed", "port shutdown");
