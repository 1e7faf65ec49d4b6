//! Socket and selector layer (spec §3, §4.1 "pluggable I/O readiness
//! selector").

mod acceptor;
mod connection;
mod endpoint;
mod selector;
mod wakeup;

pub use acceptor::TcpAcceptor;
pub use connection::TcpConnection;
pub use endpoint::{AddressFamily, Endpoint};
pub use selector::Selector;
pub use wakeup::{WakeupHandle, WakeupSignal};
