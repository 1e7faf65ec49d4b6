//! [`TicketHolder`]: RAII cancellation (spec §4.3 "Cancellation").
//!
//! Every async task that awaits readiness keeps one of these. Dropping
//! the holder cancels whatever alarm or readiness callback it currently
//! holds, so tearing down a parent task — which drops its children and
//! their ticket holders transitively — cancels the entire pending
//! subtree without any task needing to know about its descendants.

use crate::scheduler::Scheduler;
use crate::ticket::Ticket;

pub struct TicketHolder {
    scheduler: Scheduler,
    ticket: Ticket,
}

impl TicketHolder {
    pub fn new(scheduler: Scheduler) -> Self {
        TicketHolder { scheduler, ticket: Ticket::EMPTY }
    }

    pub fn set(&mut self, ticket: Ticket) {
        self.cancel();
        self.ticket = ticket;
    }

    /// Clears the held ticket without cancelling it — used once the
    /// scheduler has already fired the callback and invalidated the
    /// ticket on its own.
    pub fn clear(&mut self) {
        self.ticket = Ticket::EMPTY;
    }

    pub fn cancel(&mut self) {
        if !self.ticket.is_empty() {
            self.scheduler.cancel(self.ticket);
            self.ticket = Ticket::EMPTY;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.ticket.is_empty()
    }
}

impl Drop for TicketHolder {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;
    use std::time::Duration;

    #[test]
    fn dropping_the_holder_cancels_the_alarm() {
        let sched = Scheduler::new().unwrap();
        let fired = Rc::new(Cell::new(false));
        let f = fired.clone();
        let ticket = sched.call_alarm(Duration::from_millis(5), Box::new(move || f.set(true)));
        {
            let mut holder = TicketHolder::new(sched.clone());
            holder.set(ticket);
        }
        assert!(sched.wait().is_none());
        assert!(!fired.get());
    }
}
