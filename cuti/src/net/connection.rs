//! [`TcpConnection`]: a non-copyable, movable owner of a TCP socket file
//! descriptor (spec §3).

use std::io::{self, Read, Write};
use std::net::Shutdown;
use std::os::fd::{AsRawFd, FromRawFd, RawFd};

use mio::event::Source;
use mio::net::TcpStream as MioTcpStream;
use mio::{Interest, Registry, Token};

use super::endpoint::Endpoint;

/// A TCP connection's socket. Bulk `read`/`write` mirror the spec's
/// `(first,last) -> next` contract as idiomatic slice-based calls
/// returning the number of bytes transferred (0 meaning "would block" in
/// non-blocking mode, which the caller distinguishes from a genuine EOF
/// via the `Ok(0)` convention `std::io::Read` already uses for a stream
/// that is not at EOF but made no progress is not representable — callers
/// instead check `ErrorKind::WouldBlock`, matching `mio`'s own contract).
pub struct TcpConnection {
    stream: MioTcpStream,
    peer: Endpoint,
}

impl TcpConnection {
    pub fn connect(endpoint: Endpoint) -> io::Result<Self> {
        let stream = MioTcpStream::connect(endpoint.as_socket_addr())?;
        Ok(TcpConnection { stream, peer: endpoint })
    }

    pub(crate) fn from_mio(stream: MioTcpStream, peer: Endpoint) -> Self {
        TcpConnection { stream, peer }
    }

    pub fn peer_endpoint(&self) -> Endpoint {
        self.peer
    }

    /// Reads into `buf`, returning the number of bytes read. An `Ok(0)`
    /// with a non-empty `buf` means end-of-file; `ErrorKind::WouldBlock`
    /// means no data is currently available.
    pub fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf)
    }

    pub fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream.write(buf)
    }

    /// Shuts down the write half only; the peer will observe EOF on its
    /// read side while this side may continue reading.
    pub fn close_write_end(&self) -> io::Result<()> {
        self.stream.shutdown(Shutdown::Write)
    }

    pub fn set_nodelay(&self, nodelay: bool) -> io::Result<()> {
        self.stream.set_nodelay(nodelay)
    }

    /// Toggles the underlying socket's blocking mode. `cuti`'s own I/O is
    /// always non-blocking once handed to an `nb_inbuf`/`nb_outbuf`; this
    /// exists for code (tests, short synchronous setup steps) that needs a
    /// connection to behave like an ordinary blocking socket first.
    pub fn set_blocking(&self, blocking: bool) -> io::Result<()> {
        set_fd_nonblocking(self.stream.as_raw_fd(), !blocking)
    }

    /// Duplicates the underlying file descriptor, giving back an
    /// independent `TcpConnection` over the same socket. An `nb_inbuf`
    /// and an `nb_outbuf` each take ownership of one half rather than
    /// sharing a single handle, so a connection destined for both is
    /// split this way before being handed to them.
    pub fn try_clone(&self) -> io::Result<Self> {
        let dup_fd = unsafe { libc::dup(self.stream.as_raw_fd()) };
        if dup_fd < 0 {
            return Err(io::Error::last_os_error());
        }
        let std_stream = unsafe { std::net::TcpStream::from_raw_fd(dup_fd) };
        Ok(TcpConnection { stream: MioTcpStream::from_std(std_stream), peer: self.peer })
    }
}

impl AsRawFd for TcpConnection {
    fn as_raw_fd(&self) -> RawFd {
        self.stream.as_raw_fd()
    }
}

impl Source for TcpConnection {
    fn register(&mut self, registry: &Registry, token: Token, interests: Interest) -> io::Result<()> {
        self.stream.register(registry, token, interests)
    }

    fn reregister(&mut self, registry: &Registry, token: Token, interests: Interest) -> io::Result<()> {
        self.stream.reregister(registry, token, interests)
    }

    fn deregister(&mut self, registry: &Registry) -> io::Result<()> {
        self.stream.deregister(registry)
    }
}

fn set_fd_nonblocking(fd: RawFd, nonblocking: bool) -> io::Result<()> {
    unsafe {
        let flags = libc::fcntl(fd, libc::F_GETFL, 0);
        if flags < 0 {
            return Err(io::Error::last_os_error());
        }
        let flags = if nonblocking {
            flags | libc::O_NONBLOCK
        } else {
            flags & !libc::O_NONBLOCK
        };
        if libc::fcntl(fd, libc::F_SETFL, flags) < 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}
