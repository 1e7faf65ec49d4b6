//! Shared loopback helper for the integration tests in this directory.
//! Every test here drives a real kernel socket pair through a real
//! [`Scheduler`], rather than faking readiness — the scheduler, the
//! selector backend, and the non-blocking buffers are all exercised
//! together the way they would be in a running dispatcher.

use std::net::TcpStream as StdTcpStream;

use cuti::net::{Endpoint, TcpAcceptor, TcpConnection};

/// Binds an ephemeral listener, connects a plain blocking
/// `std::net::TcpStream` to it, and accepts the other end as a `cuti`
/// [`TcpConnection`]. The standard library stream plays the role of a
/// hand-written test client talking raw wire-format bytes; the `cuti`
/// connection is handed to `NbInbuf::new`/`NbOutbuf::new` by callers that
/// need it on a scheduler — registration happens there, same as it would
/// for a connection accepted by the dispatcher.
#[allow(dead_code)]
pub fn loopback() -> (StdTcpStream, TcpConnection) {
    let acceptor = TcpAcceptor::bind(Endpoint::resolve("127.0.0.1:0").unwrap()).unwrap();
    let addr = acceptor.local_endpoint().as_socket_addr();

    let client = StdTcpStream::connect(addr).unwrap();
    client.set_nodelay(true).unwrap();

    let server = loop {
        if let Some(conn) = acceptor.accept().unwrap() {
            break conn;
        }
        std::thread::yield_now();
    };
    (client, server)
}
