//! Thin wrapper around [`mio::Poll`] fulfilling the "Selector" contract of
//! spec §3: register a socket for read/write readiness under an opaque
//! id (a [`mio::Token`]), then block in `poll` until one socket becomes
//! ready or a timeout elapses. `mio` already multiplexes epoll (Linux),
//! kqueue (BSD/macOS), IOCP/AFD (Windows) and poll (fallback) behind this
//! exact API, so `Selector` adds no behavior of its own beyond naming the
//! contract the way spec §3 describes it.

use std::io;
use std::time::Duration;

use mio::{Events, Poll, Registry};

pub struct Selector {
    poll: Poll,
}

impl Selector {
    pub fn new() -> io::Result<Self> {
        Ok(Selector { poll: Poll::new()? })
    }

    /// The handle sockets register themselves against. `Registry` is
    /// `Clone`-free but cheaply shareable via `try_clone`, which callers
    /// needing to register from another thread (there are none in this
    /// single-threaded scheduler) would use instead.
    pub fn registry(&self) -> &Registry {
        self.poll.registry()
    }

    pub fn poll(&mut self, events: &mut Events, timeout: Option<Duration>) -> io::Result<()> {
        self.poll.poll(events, timeout)
    }
}
