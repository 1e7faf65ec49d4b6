//! Cross-thread wakeup signal (SPEC_FULL.md §2, "wakeup signal /
//! restarter"). The only channel any other thread — including a POSIX
//! signal handler — may use to talk to a worker's scheduler (spec §5).
//!
//! Built on [`mio::Waker`], which already breaks a blocked `Poll::poll`
//! out of its wait; `WakeupSignal` adds the explicit coalescing flag the
//! spec calls for: any number of `signal()` calls before the scheduler
//! next drains the signal collapse into a single pending wakeup.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use mio::{Registry, Token, Waker};

struct Inner {
    waker: Waker,
    pending: AtomicBool,
}

/// The thread-safe half handed to other threads (and usable from a
/// signal handler: `signal()` performs only an atomic store plus, in the
/// `Waker`'s own implementation, a single `write()`/`eventfd_write()`
/// call — both async-signal-safe).
#[derive(Clone)]
pub struct WakeupHandle {
    inner: Arc<Inner>,
}

impl WakeupHandle {
    pub fn signal(&self) -> io::Result<()> {
        if !self.inner.pending.swap(true, Ordering::SeqCst) {
            self.inner.waker.wake()?;
        }
        Ok(())
    }
}

/// The scheduler-side half: registered as an ordinary readiness source so
/// a drained wakeup shows up through `Scheduler::call_when_readable` like
/// any other event.
pub struct WakeupSignal {
    inner: Arc<Inner>,
}

impl WakeupSignal {
    pub fn new(registry: &Registry, token: Token) -> io::Result<Self> {
        let waker = Waker::new(registry, token)?;
        Ok(WakeupSignal {
            inner: Arc::new(Inner { waker, pending: AtomicBool::new(false) }),
        })
    }

    pub fn handle(&self) -> WakeupHandle {
        WakeupHandle { inner: self.inner.clone() }
    }

    /// Clears the pending flag, returning whether a wakeup had in fact
    /// been signalled since the last drain.
    pub fn drain(&self) -> bool {
        self.inner.pending.swap(false, Ordering::SeqCst)
    }
}
