//! [`NbInbuf`]: a non-blocking input buffer wrapping an async byte source
//! (spec §4.2).

use std::cell::{Cell, RefCell};
use std::io::{self, ErrorKind as IoErrorKind};
use std::rc::Rc;
use std::time::Duration;

use mio::Interest;

use crate::error::ErrorKind;
use crate::net::TcpConnection;
use crate::scheduler::{call_bounded, may_call_synchronously, Callback, Scheduler};
use crate::ticket::Ticket;

use super::circular::CircularBuffer;
use super::throughput::{ThroughputChecker, ThroughputSettings};

struct StickyError {
    kind: ErrorKind,
    message: String,
}

/// A non-blocking input buffer. Exposes `readable()`/`peek()`/`skip()`
/// for byte-at-a-time consumers and bulk `read()` for the wire-format
/// readers in [`crate::wire`]. End-of-file is represented as `None` from
/// [`peek`](Self::peek) rather than a sentinel integer.
pub struct NbInbuf {
    buf: CircularBuffer,
    source: TcpConnection,
    token: mio::Token,
    eof_observed: bool,
    sticky: Cell<Option<ErrorKind>>,
    sticky_detail: RefCell<Option<String>>,
    throughput: Option<ThroughputChecker>,
    pending_ticket: Cell<Ticket>,
    pending_cb: RefCell<Option<Callback>>,
    tick_ticket: Cell<Ticket>,
}

impl NbInbuf {
    pub fn new(
        scheduler: &Scheduler,
        mut source: TcpConnection,
        capacity: usize,
        throughput: Option<ThroughputSettings>,
    ) -> io::Result<Rc<RefCell<Self>>> {
        let token = scheduler.next_token();
        scheduler.register(&mut source, token, Interest::READABLE)?;
        let inbuf = Rc::new(RefCell::new(NbInbuf {
            buf: CircularBuffer::new(capacity),
            source,
            token,
            eof_observed: false,
            sticky: Cell::new(None),
            sticky_detail: RefCell::new(None),
            throughput: throughput.map(ThroughputChecker::new),
            pending_ticket: Cell::new(Ticket::EMPTY),
            pending_cb: RefCell::new(None),
            tick_ticket: Cell::new(Ticket::EMPTY),
        }));
        if inbuf.borrow().throughput.is_some() {
            Self::arm_tick(&inbuf, scheduler);
        }
        Ok(inbuf)
    }

    pub fn readable(&self) -> bool {
        self.buf.has_data() || self.eof_observed || self.sticky.get().is_some()
    }

    /// Returns the next byte without consuming it, or `None` at
    /// end-of-file. Panics if `!readable()`.
    pub fn peek(&self) -> Option<u8> {
        assert!(self.readable(), "peek() requires readable()");
        if self.buf.has_data() {
            Some(self.buf.readable_slice()[0])
        } else {
            None
        }
    }

    /// Consumes one byte. Undefined behavior (debug-asserted) if
    /// `peek()` would return `None`.
    pub fn skip(&mut self) {
        debug_assert!(self.peek().is_some(), "skip() called at eof");
        self.buf.consume(1);
    }

    /// Copies as many currently-available bytes into `out` as possible,
    /// returning the count. A return of `0` with a non-empty `out` means
    /// eof has been observed.
    pub fn read(&mut self, out: &mut [u8]) -> usize {
        let avail = self.buf.readable_slice();
        let n = avail.len().min(out.len());
        out[..n].copy_from_slice(&avail[..n]);
        self.buf.consume(n);
        n
    }

    pub fn error_status(&self) -> Option<ErrorKind> {
        self.sticky.get()
    }

    pub fn error_detail(&self) -> Option<String> {
        self.sticky_detail.borrow().clone()
    }

    /// Arranges for `cb` to run once at least one byte, eof, or a sticky
    /// error becomes observable. Only one call may be outstanding per
    /// `NbInbuf` at a time (spec §4.2).
    pub fn call_when_readable(self_rc: &Rc<RefCell<Self>>, scheduler: &Scheduler, cb: Callback) -> Ticket {
        let already = self_rc.borrow().readable();
        if already {
            return fire_or_repost(scheduler, cb);
        }
        debug_assert!(
            self_rc.borrow().pending_cb.borrow().is_none(),
            "call_when_readable already outstanding"
        );
        *self_rc.borrow().pending_cb.borrow_mut() = Some(cb);
        let rc = self_rc.clone();
        let sched = scheduler.clone();
        let token = self_rc.borrow().token;
        let ticket = scheduler.call_when_readable(
            token,
            Box::new(move || Self::on_source_readable(&rc, &sched)),
        );
        self_rc.borrow().pending_ticket.set(ticket);
        ticket
    }

    fn on_source_readable(self_rc: &Rc<RefCell<Self>>, _scheduler: &Scheduler) {
        Self::drain(self_rc);
        let cb = self_rc.borrow().pending_cb.borrow_mut().take();
        self_rc.borrow().pending_ticket.set(Ticket::EMPTY);
        if let Some(cb) = cb {
            call_bounded(cb);
        }
    }

    fn drain(self_rc: &Rc<RefCell<Self>>) {
        let mut inbuf = self_rc.borrow_mut();
        if inbuf.sticky.get().is_some() || inbuf.eof_observed {
            return;
        }
        let n = {
            let NbInbuf { buf, source, .. } = &mut *inbuf;
            let dest = buf.writable_slice();
            if dest.is_empty() {
                0
            } else {
                match source.read(dest) {
                    Ok(0) => {
                        inbuf.eof_observed = true;
                        0
                    }
                    Ok(k) => k,
                    Err(e) if e.kind() == IoErrorKind::WouldBlock => 0,
                    Err(e) => {
                        inbuf.sticky.set(Some(ErrorKind::Io));
                        *inbuf.sticky_detail.borrow_mut() = Some(e.to_string());
                        0
                    }
                }
            }
        };
        if n > 0 {
            inbuf.buf.commit_written(n);
            if let Some(checker) = inbuf.throughput.as_mut() {
                checker.record(n as u64);
            }
        }
    }

    fn arm_tick(self_rc: &Rc<RefCell<Self>>, scheduler: &Scheduler) {
        let tick_length = self_rc
            .borrow()
            .throughput
            .as_ref()
            .map(|c| c.tick_length())
            .unwrap_or(Duration::from_secs(1));
        let rc = self_rc.clone();
        let sched = scheduler.clone();
        let ticket = scheduler.call_alarm(
            tick_length,
            Box::new(move || Self::on_tick(&rc, &sched)),
        );
        self_rc.borrow().tick_ticket.set(ticket);
    }

    fn on_tick(self_rc: &Rc<RefCell<Self>>, scheduler: &Scheduler) {
        {
            let inbuf = self_rc.borrow();
            if inbuf.eof_observed || inbuf.sticky.get().is_some() {
                // Already closed by some other path (a read error, a clean
                // eof, or a prior throughput trip): nothing left to police,
                // and rearming would tick forever on a dead connection.
                return;
            }
        }
        let tripped = {
            let mut inbuf = self_rc.borrow_mut();
            match inbuf.throughput.as_mut() {
                Some(checker) => checker.on_tick(),
                None => return,
            }
        };
        if tripped {
            let mut inbuf = self_rc.borrow_mut();
            if inbuf.sticky.get().is_none() {
                inbuf.sticky.set(Some(ErrorKind::Throughput));
                *inbuf.sticky_detail.borrow_mut() =
                    Some("throughput below configured minimum".to_string());
            }
            inbuf.eof_observed = true;
            drop(inbuf);
            Self::wake_pending(self_rc, scheduler);
            // Throughput policing is terminal: stop ticking.
            return;
        }
        Self::arm_tick(self_rc, scheduler);
    }

    fn wake_pending(self_rc: &Rc<RefCell<Self>>, scheduler: &Scheduler) {
        let ticket = self_rc.borrow().pending_ticket.get();
        if !ticket.is_empty() {
            scheduler.cancel(ticket);
            self_rc.borrow().pending_ticket.set(Ticket::EMPTY);
        }
        let cb = self_rc.borrow().pending_cb.borrow_mut().take();
        if let Some(cb) = cb {
            call_bounded(cb);
        }
    }
}

fn fire_or_repost(scheduler: &Scheduler, cb: Callback) -> Ticket {
    if may_call_synchronously() {
        call_bounded(cb);
        Ticket::EMPTY
    } else {
        scheduler.call_alarm(Duration::ZERO, Box::new(move || call_bounded(cb)))
    }
}

#[cfg(test)]
mod tests {
    // `NbInbuf` requires a live socket pair to exercise end-to-end; see
    // `cuti/tests/buffers.rs` for the integration-level coverage of the
    // readable/eof/throughput contract.
}
