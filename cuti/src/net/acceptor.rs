//! [`TcpAcceptor`]: owns a listening socket and its local endpoint (spec
//! §3).

use std::io;
use std::os::fd::{AsRawFd, FromRawFd, RawFd};

use mio::event::Source;
use mio::net::TcpListener as MioTcpListener;
use mio::{Interest, Registry, Token};

use super::connection::TcpConnection;
use super::endpoint::Endpoint;

pub struct TcpAcceptor {
    listener: MioTcpListener,
    local: Endpoint,
}

impl TcpAcceptor {
    /// Binds a listening socket at `endpoint`. A port of `0` asks the OS
    /// to pick an ephemeral port; the actual bound endpoint is available
    /// via [`local_endpoint`](Self::local_endpoint) afterwards.
    pub fn bind(endpoint: Endpoint) -> io::Result<Self> {
        let listener = MioTcpListener::bind(endpoint.as_socket_addr())?;
        let local = Endpoint::new(listener.local_addr()?);
        Ok(TcpAcceptor { listener, local })
    }

    pub fn local_endpoint(&self) -> Endpoint {
        self.local
    }

    /// Accepts one pending connection, or `Ok(None)` if none is currently
    /// pending (the non-blocking "would block" case).
    pub fn accept(&self) -> io::Result<Option<TcpConnection>> {
        match self.listener.accept() {
            Ok((stream, addr)) => Ok(Some(TcpConnection::from_mio(stream, Endpoint::new(addr)))),
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Duplicates the listening socket's file descriptor so a second
    /// worker thread can register the same listener on its own
    /// scheduler (spec §4.6: "each worker ... registers each
    /// acceptor's readiness callback on its scheduler"). `accept()`
    /// races safely across the resulting independent listeners — the
    /// kernel hands each pending connection to exactly one caller.
    pub fn try_clone(&self) -> io::Result<Self> {
        let dup_fd = unsafe { libc::dup(self.listener.as_raw_fd()) };
        if dup_fd < 0 {
            return Err(io::Error::last_os_error());
        }
        let std_listener = unsafe { std::net::TcpListener::from_raw_fd(dup_fd) };
        std_listener.set_nonblocking(true)?;
        Ok(TcpAcceptor {
            listener: MioTcpListener::from_std(std_listener),
            local: self.local,
        })
    }
}

impl AsRawFd for TcpAcceptor {
    fn as_raw_fd(&self) -> RawFd {
        self.listener.as_raw_fd()
    }
}

impl Source for TcpAcceptor {
    fn register(&mut self, registry: &Registry, token: Token, interests: Interest) -> io::Result<()> {
        self.listener.register(registry, token, interests)
    }

    fn reregister(&mut self, registry: &Registry, token: Token, interests: Interest) -> io::Result<()> {
        self.listener.reregister(registry, token, interests)
    }

    fn deregister(&mut self, registry: &Registry) -> io::Result<()> {
        self.listener.deregister(registry)
    }
}
