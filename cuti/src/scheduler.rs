//! The single-threaded cooperative scheduler (spec §4.1).
//!
//! A [`Scheduler`] multiplexes two kinds of pending work: alarms (fire at a
//! deadline) and readiness callbacks (fire when a registered socket becomes
//! readable or writable). Both are represented uniformly as boxed
//! `FnOnce()` callbacks keyed by a [`Ticket`]; `wait()` returns at most one
//! ready callback per call, with alarms taking precedence over readiness
//! events at equal wall-clock time.
//!
//! The selector backend is [`mio`]'s `Poll`/`Registry`, which already
//! multiplexes epoll/kqueue/poll/IOCP per platform — see `net::Selector`.

use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::rc::Rc;
use std::time::{Duration, Instant};

use mio::{Events, Token};

use crate::net::{Selector, WakeupSignal};
use crate::ticket::Ticket;

/// A scheduled, one-shot unit of work. Async combinators box their
/// continuations into this type when they suspend.
pub type Callback = Box<dyn FnOnce()>;

/// Maximum synchronous re-entry depth before a continuation is required to
/// post itself back through `call_alarm(Duration::ZERO, ..)` instead of
/// calling its successor directly (spec §4.1, "stack-marker trick").
const MAX_SYNC_DEPTH: usize = 64;

thread_local! {
    static SYNC_DEPTH: Cell<usize> = const { Cell::new(0) };
}

/// Returns `true` if a continuation may invoke its successor synchronously
/// from the current call stack, `false` if it must repost via an
/// immediate alarm to bound stack growth.
///
/// This stands in for the original's literal stack-address marker: rather
/// than comparing `&local` addresses, we count nested synchronous
/// invocations directly, which is portable and doesn't rely on
/// implementation-defined stack-growth direction.
pub fn may_call_synchronously() -> bool {
    SYNC_DEPTH.with(|d| d.get() < MAX_SYNC_DEPTH)
}

/// Runs `f` with the synchronous re-entry counter incremented, so that
/// nested calls to [`may_call_synchronously`] see accurate depth.
pub fn call_bounded<R>(f: impl FnOnce() -> R) -> R {
    SYNC_DEPTH.with(|d| d.set(d.get() + 1));
    let result = f();
    SYNC_DEPTH.with(|d| d.set(d.get() - 1));
    result
}

struct AlarmEntry {
    deadline: Instant,
    id: i64,
}

impl PartialEq for AlarmEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.id == other.id
    }
}
impl Eq for AlarmEntry {}
impl Ord for AlarmEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; reverse so the earliest deadline (and,
        // among equal deadlines, the alarm allocated first — `id` is a
        // monotonic counter, never reused or derived from collection
        // sizes — pops first).
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.id.cmp(&self.id))
    }
}
impl PartialOrd for AlarmEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Default)]
struct ReadinessSlot {
    read_id: Option<i64>,
    read_cb: Option<Callback>,
    write_id: Option<i64>,
    write_cb: Option<Callback>,
}

struct Inner {
    selector: Selector,
    events: Events,
    next_id: i64,
    alarm_heap: BinaryHeap<AlarmEntry>,
    alarm_callbacks: HashMap<i64, Callback>,
    cancelled_alarms: HashSet<i64>,
    readiness: HashMap<Token, ReadinessSlot>,
}

impl Inner {
    fn alloc_id(&mut self) -> i64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

/// A cheaply-cloneable handle to a single-threaded scheduler.
///
/// Cloning shares the same underlying event loop (it's an `Rc<RefCell<_>>`
/// handle, not a new scheduler) — this is how async combinators and
/// buffers carry a scheduler reference through a task chain without
/// threading a lifetime parameter everywhere (spec §4.2 "Bound
/// inbuf/outbuf").
#[derive(Clone)]
pub struct Scheduler {
    inner: Rc<RefCell<Inner>>,
}

impl Scheduler {
    pub fn new() -> std::io::Result<Self> {
        Ok(Scheduler {
            inner: Rc::new(RefCell::new(Inner {
                selector: Selector::new()?,
                events: Events::with_capacity(256),
                next_id: 0,
                alarm_heap: BinaryHeap::new(),
                alarm_callbacks: HashMap::new(),
                cancelled_alarms: HashSet::new(),
                readiness: HashMap::new(),
            })),
        })
    }

    /// Registers a new I/O source with the scheduler's selector, returning
    /// the token that identifies it in subsequent
    /// `call_when_readable`/`call_when_writable` calls.
    pub fn register<S>(&self, source: &mut S, next_token: Token, interest: mio::Interest) -> std::io::Result<()>
    where
        S: mio::event::Source,
    {
        self.inner.borrow().selector.registry().register(source, next_token, interest)
    }

    pub fn reregister<S>(&self, source: &mut S, token: Token, interest: mio::Interest) -> std::io::Result<()>
    where
        S: mio::event::Source,
    {
        self.inner.borrow().selector.registry().reregister(source, token, interest)
    }

    pub fn deregister<S>(&self, source: &mut S) -> std::io::Result<()>
    where
        S: mio::event::Source,
    {
        let mut inner = self.inner.borrow_mut();
        inner.selector.registry().deregister(source)?;
        inner.readiness.retain(|_, _| true);
        Ok(())
    }

    pub fn next_token(&self) -> Token {
        let mut inner = self.inner.borrow_mut();
        let id = inner.alloc_id();
        Token(id as usize)
    }

    /// Registers a fresh cross-thread [`WakeupSignal`] against this
    /// scheduler's selector, returning it alongside the token its
    /// readiness arrives on (pass the token to
    /// [`call_when_readable`](Self::call_when_readable) to be notified).
    /// The dispatcher uses one of these per worker thread (spec §4.6
    /// "each worker owns a scheduler and its own wakeup pipe").
    pub fn new_wakeup(&self) -> std::io::Result<(WakeupSignal, Token)> {
        let token = self.next_token();
        let signal = WakeupSignal::new(self.inner.borrow().selector.registry(), token)?;
        Ok((signal, token))
    }

    /// Schedules `cb` to run after `delay` has elapsed.
    pub fn call_alarm(&self, delay: Duration, cb: Callback) -> Ticket {
        self.call_alarm_at(Instant::now() + delay, cb)
    }

    /// Schedules `cb` to run at `deadline`.
    pub fn call_alarm_at(&self, deadline: Instant, cb: Callback) -> Ticket {
        let mut inner = self.inner.borrow_mut();
        let id = inner.alloc_id();
        inner.alarm_heap.push(AlarmEntry { deadline, id });
        inner.alarm_callbacks.insert(id, cb);
        Ticket::new(id)
    }

    /// Arranges for `cb` to run the next time `token`'s source becomes
    /// readable. Only one outstanding readable callback per token is
    /// permitted (spec §4.2: "Only one `call_when_readable` may be
    /// outstanding at a time").
    pub fn call_when_readable(&self, token: Token, cb: Callback) -> Ticket {
        let mut inner = self.inner.borrow_mut();
        let id = inner.alloc_id();
        let slot = inner.readiness.entry(token).or_default();
        debug_assert!(slot.read_cb.is_none(), "readable callback already armed");
        slot.read_id = Some(id);
        slot.read_cb = Some(cb);
        Ticket::new(id)
    }

    pub fn call_when_writable(&self, token: Token, cb: Callback) -> Ticket {
        let mut inner = self.inner.borrow_mut();
        let id = inner.alloc_id();
        let slot = inner.readiness.entry(token).or_default();
        debug_assert!(slot.write_cb.is_none(), "writable callback already armed");
        slot.write_id = Some(id);
        slot.write_cb = Some(cb);
        Ticket::new(id)
    }

    /// Cancels a pending alarm or readiness callback. No-op on an already
    /// empty ticket or one that has already fired.
    pub fn cancel(&self, ticket: Ticket) {
        if ticket.is_empty() {
            return;
        }
        let mut inner = self.inner.borrow_mut();
        let id = ticket.raw();
        if inner.alarm_callbacks.remove(&id).is_some() {
            inner.cancelled_alarms.insert(id);
            return;
        }
        let mut empty_token = None;
        for (token, slot) in inner.readiness.iter_mut() {
            if slot.read_id == Some(id) {
                slot.read_id = None;
                slot.read_cb = None;
            }
            if slot.write_id == Some(id) {
                slot.write_id = None;
                slot.write_cb = None;
            }
            if slot.read_cb.is_none() && slot.write_cb.is_none() {
                empty_token = Some(*token);
            }
        }
        if let Some(token) = empty_token {
            inner.readiness.remove(&token);
        }
    }

    /// Returns one ready callback, blocking until one is available.
    /// Returns `None` only when no alarms and no readiness registrations
    /// remain (the loop has nothing left to wait for).
    pub fn wait(&self) -> Option<Callback> {
        loop {
            // 1. Expired alarms take precedence, earliest deadline first,
            //    FIFO among equal deadlines (spec §4.1, §5).
            {
                let mut inner = self.inner.borrow_mut();
                let now = Instant::now();
                let Inner { alarm_heap, cancelled_alarms, alarm_callbacks, .. } = &mut *inner;
                while let Some(top) = alarm_heap.peek() {
                    if cancelled_alarms.remove(&top.id) {
                        alarm_heap.pop();
                        continue;
                    }
                    if top.deadline <= now {
                        let entry = alarm_heap.pop().unwrap();
                        if let Some(cb) = alarm_callbacks.remove(&entry.id) {
                            return Some(cb);
                        }
                        continue;
                    }
                    break;
                }
            }

            // 2. No callbacks registered at all: nothing to wait for.
            let nothing_pending = {
                let inner = self.inner.borrow();
                inner.alarm_heap.is_empty() && inner.readiness.values().all(|s| {
                    s.read_cb.is_none() && s.write_cb.is_none()
                })
            };
            if nothing_pending {
                return None;
            }

            // 3. Block in the selector until the next alarm deadline or a
            //    readiness event.
            let timeout = {
                let inner = self.inner.borrow();
                inner.alarm_heap.peek().map(|top| {
                    top.deadline.saturating_duration_since(Instant::now())
                })
            };
            let mut inner = self.inner.borrow_mut();
            let Inner { selector, events, readiness, .. } = &mut *inner;
            if let Err(err) = selector.poll(events, timeout) {
                if err.kind() == std::io::ErrorKind::Interrupted {
                    continue;
                }
                tracing::warn!(error = %err, "selector poll failed");
                continue;
            }
            for event in events.iter() {
                let token = event.token();
                if let Some(slot) = readiness.get_mut(&token) {
                    if event.is_readable() {
                        if let Some(cb) = slot.read_cb.take() {
                            slot.read_id = None;
                            drop(inner);
                            return Some(cb);
                        }
                    }
                    if event.is_writable() {
                        if let Some(cb) = slot.write_cb.take() {
                            slot.write_id = None;
                            drop(inner);
                            return Some(cb);
                        }
                    }
                }
            }
            // Spurious wakeup (e.g. only the wakeup pipe fired, or a
            // readiness event arrived with no callback armed): loop back
            // around.
        }
    }

    /// Runs the loop until [`wait`](Self::wait) returns `None`.
    pub fn run(&self) {
        while let Some(cb) = self.wait() {
            cb();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell as StdRefCell;

    #[test]
    fn alarms_fire_in_deadline_then_fifo_order() {
        let sched = Scheduler::new().unwrap();
        let order = Rc::new(StdRefCell::new(Vec::new()));

        let o1 = order.clone();
        sched.call_alarm(Duration::from_millis(10), Box::new(move || o1.borrow_mut().push(1)));
        let o2 = order.clone();
        sched.call_alarm(Duration::from_millis(10), Box::new(move || o2.borrow_mut().push(2)));
        let o3 = order.clone();
        sched.call_alarm(Duration::from_millis(1), Box::new(move || o3.borrow_mut().push(3)));

        for _ in 0..3 {
            let cb = sched.wait().expect("alarm should fire");
            cb();
        }
        assert_eq!(*order.borrow(), vec![3, 1, 2]);
        assert!(sched.wait().is_none());
    }

    #[test]
    fn cancel_prevents_alarm_from_firing() {
        let sched = Scheduler::new().unwrap();
        let fired = Rc::new(Cell::new(false));
        let f = fired.clone();
        let ticket = sched.call_alarm(Duration::from_millis(5), Box::new(move || f.set(true)));
        sched.cancel(ticket);
        assert!(sched.wait().is_none());
        assert!(!fired.get());
    }

    #[test]
    fn empty_ticket_cancel_is_noop() {
        let sched = Scheduler::new().unwrap();
        sched.cancel(Ticket::EMPTY);
    }
}
