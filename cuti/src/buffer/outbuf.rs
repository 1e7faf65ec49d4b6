//! [`NbOutbuf`]: a non-blocking output buffer, symmetric to
//! [`super::inbuf::NbInbuf`] (spec §4.2).

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

pub struct NbOutbuf {
    buf: CircularBuffer,
    sink: TcpConnection,
    token: mio::Token,
    flushing: bool,
    sticky: Cell<Option<ErrorKind>>,
    sticky_detail: RefCell<Option<String>>,
    throughput: Option<ThroughputChecker>,
    pending_ticket: Cell<Ticket>,
    pending_cb: RefCell<Option<Callback>>,
    tick_ticket: Cell<Ticket>,
}

impl NbOutbuf {
    pub fn new(
        scheduler: &Scheduler,
        mut sink: TcpConnection,
        capacity: usize,
        throughput: Option<ThroughputSettings>,
    ) -> io::Result<Rc<RefCell<Self>>> {
        let token = scheduler.next_token();
        scheduler.register(&mut sink, token, Interest::WRITABLE)?;
        let outbuf = Rc::new(RefCell::new(NbOutbuf {
            buf: CircularBuffer::new(capacity),
            sink,
            token,
            flushing: false,
            sticky: Cell::new(None),
            sticky_detail: RefCell::new(None),
            throughput: throughput.map(ThroughputChecker::new),
            pending_ticket: Cell::new(Ticket::EMPTY),
            pending_cb: RefCell::new(None),
            tick_ticket: Cell::new(Ticket::EMPTY),
        }));
        if outbuf.borrow().throughput.is_some() {
            Self::arm_tick(&outbuf, scheduler);
        }
        Ok(outbuf)
    }

    /// `true` unless currently flushing (in which case no more bytes may
    /// be queued until the buffer drains) or a sticky error is set.
    pub fn writable(&self) -> bool {
        if self.sticky.get().is_some() {
            return false;
        }
        if self.flushing {
            return false;
        }
        self.buf.has_slack()
    }

    /// Queues one byte. Panics if `!writable()`.
    pub fn put(&mut self, c: u8) {
        assert!(self.writable(), "put() requires writable()");
        self.buf.writable_slice()[0] = c;
        self.buf.commit_written(1);
    }

    /// Queues as many bytes of `data` as the buffer currently has slack
    /// for, returning the count queued.
    pub fn write(&mut self, data: &[u8]) -> usize {
        if !self.writable() {
            return 0;
        }
        let dest = self.buf.writable_slice();
        let n = dest.len().min(data.len());
        dest[..n].copy_from_slice(&data[..n]);
        self.buf.commit_written(n);
        n
    }

    pub fn error_status(&self) -> Option<ErrorKind> {
        self.sticky.get()
    }

    pub fn error_detail(&self) -> Option<String> {
        self.sticky_detail.borrow().clone()
    }

    /// Enters the flushing state: `writable()` stays `false` until every
    /// queued byte has actually been sent.
    pub fn start_flush(&mut self) {
        self.flushing = true;
    }

    /// `true` once a flush started by [`start_flush`](Self::start_flush)
    /// has drained every queued byte (or a sticky error makes further
    /// draining impossible).
    pub fn flush_complete(&self) -> bool {
        !self.buf.has_data() || self.sticky.get().is_some()
    }

    /// Arranges for `cb` to run once the buffer can accept more data
    /// (ordinary writes) or, while flushing, once the flush has fully
    /// drained. Only one call may be outstanding at a time.
    pub fn call_when_writable(self_rc: &Rc<RefCell<Self>>, scheduler: &Scheduler, cb: Callback) -> Ticket {
        let ready = {
            let o = self_rc.borrow();
            if o.flushing {
                o.flush_complete()
            } else {
                o.writable()
            }
        };
        if ready {
            return fire_or_repost(scheduler, cb);
        }
        debug_assert!(
            self_rc.borrow().pending_cb.borrow().is_none(),
            "call_when_writable already outstanding"
        );
        *self_rc.borrow().pending_cb.borrow_mut() = Some(cb);
        let rc = self_rc.clone();
        let sched = scheduler.clone();
        let token = self_rc.borrow().token;
        let ticket = scheduler.call_when_writable(
            token,
            Box::new(move || Self::on_sink_writable(&rc, &sched)),
        );
        self_rc.borrow().pending_ticket.set(ticket);
        ticket
    }

    fn on_sink_writable(self_rc: &Rc<RefCell<Self>>, scheduler: &Scheduler) {
        Self::drain(self_rc);
        let done = {
            let o = self_rc.borrow();
            if o.flushing {
                o.flush_complete()
            } else {
                o.writable() || o.sticky.get().is_some()
            }
        };
        self_rc.borrow().pending_ticket.set(Ticket::EMPTY);
        if done {
            let cb = self_rc.borrow().pending_cb.borrow_mut().take();
            if let Some(cb) = cb {
                call_bounded(cb);
            }
        } else {
            // Still flushing: re-arm against the sink's writability.
            let rc = self_rc.clone();
            let sched = scheduler.clone();
            let token = self_rc.borrow().token;
            let ticket = scheduler.call_when_writable(
                token,
                Box::new(move || Self::on_sink_writable(&rc, &sched)),
            );
            self_rc.borrow().pending_ticket.set(ticket);
        }
    }

    fn drain(self_rc: &Rc<RefCell<Self>>) {
        let mut outbuf = self_rc.borrow_mut();
        if outbuf.sticky.get().is_some() {
            return;
        }
        loop {
            let n = {
                let NbOutbuf { buf, sink, .. } = &mut *outbuf;
                let src = buf.readable_slice();
                if src.is_empty() {
                    break;
                }
                match sink.write(src) {
                    Ok(0) => break,
                    Ok(k) => k,
                    Err(e) if e.kind() == IoErrorKind::WouldBlock => break,
                    Err(e) => {
                        outbuf.sticky.set(Some(ErrorKind::Io));
                        *outbuf.sticky_detail.borrow_mut() = Some(e.to_string());
                        break;
                    }
                }
            };
            if n == 0 {
                break;
            }
            outbuf.buf.consume(n);
            if let Some(checker) = outbuf.throughput.as_mut() {
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
        let ticket = scheduler.call_alarm(tick_length, Box::new(move || Self::on_tick(&rc, &sched)));
        self_rc.borrow().tick_ticket.set(ticket);
    }

    fn on_tick(self_rc: &Rc<RefCell<Self>>, scheduler: &Scheduler) {
        if self_rc.borrow().sticky.get().is_some() {
            // Already closed by some other path: rearming would tick
            // forever on a dead connection.
            return;
        }
        let tripped = {
            let mut outbuf = self_rc.borrow_mut();
            match outbuf.throughput.as_mut() {
                Some(checker) => checker.on_tick(),
                None => return,
            }
        };
        if tripped {
            let mut outbuf = self_rc.borrow_mut();
            if outbuf.sticky.get().is_none() {
                outbuf.sticky.set(Some(ErrorKind::Throughput));
                *outbuf.sticky_detail.borrow_mut() =
                    Some("throughput below configured minimum".to_string());
            }
            drop(outbuf);
            let ticket = self_rc.borrow().pending_ticket.get();
            if !ticket.is_empty() {
                scheduler.cancel(ticket);
                self_rc.borrow().pending_ticket.set(Ticket::EMPTY);
            }
            let cb = self_rc.borrow().pending_cb.borrow_mut().take();
            if let Some(cb) = cb {
                call_bounded(cb);
            }
            return;
        }
        Self::arm_tick(self_rc, scheduler);
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
