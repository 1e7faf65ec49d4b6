//! [`Subroutine`]: composition primitive owning one child async task's
//! cancellation ticket and failure disposition (spec §3 "Subroutine",
//! §4.3 "Subroutine failure modes").

use crate::error::{Error, Result as CutiResult};
use crate::scheduler::Scheduler;

use super::result::ResultSlot;
use super::ticket_holder::TicketHolder;

/// How a child task's failure is routed relative to its parent.
pub enum FailureMode {
    /// The child's result reference *is* the parent's: on failure the
    /// parent's own continuations never run, the failure goes straight
    /// to whatever owns the parent.
    Propagate,
    /// On failure, the parent's named handler runs with the exception;
    /// the parent is then free to continue (e.g. draining the rest of a
    /// message before reporting).
    HandleInParent,
}

/// Owns the cancellation ticket for one child operation and knows how to
/// route that child's eventual success or failure.
pub struct Subroutine<T> {
    ticket: TicketHolder,
    mode: FailureMode,
    _marker: std::marker::PhantomData<T>,
}

impl<T> Subroutine<T> {
    pub fn new(scheduler: Scheduler, mode: FailureMode) -> Self {
        Subroutine { ticket: TicketHolder::new(scheduler), mode, _marker: std::marker::PhantomData }
    }

    pub fn propagate(scheduler: Scheduler) -> Self {
        Self::new(scheduler, FailureMode::Propagate)
    }

    pub fn handle_in_parent(scheduler: Scheduler) -> Self {
        Self::new(scheduler, FailureMode::HandleInParent)
    }

    pub fn ticket_holder(&mut self) -> &mut TicketHolder {
        &mut self.ticket
    }

    /// Dispatches the child's outcome. On success, always forwards to
    /// `parent_result`. On failure: `Propagate` forwards the error to
    /// `parent_result` too; `HandleInParent` instead calls `on_failure`
    /// and never touches `parent_result` (the handler decides what, if
    /// anything, happens to the parent's own result).
    pub fn complete(
        &mut self,
        outcome: CutiResult<T>,
        parent_result: &ResultSlot<T>,
        on_failure: impl FnOnce(Error),
    ) {
        self.ticket.clear();
        match (&self.mode, outcome) {
            (_, Ok(value)) => parent_result.submit(value),
            (FailureMode::Propagate, Err(error)) => parent_result.fail(error),
            (FailureMode::HandleInParent, Err(error)) => on_failure(error),
        }
    }
}
