//! Result holders (spec §3 "Result holder", §4.3 "Final result").

use std::cell::RefCell;

use crate::error::Result as CutiResult;
use crate::scheduler::call_bounded;

/// A one-shot continuation: exactly one of a successful value or an
/// error is ever delivered to it.
pub type Continuation<T> = Box<dyn FnOnce(CutiResult<T>)>;

/// Receives either a value or an error exactly once, then invokes its
/// parent continuation (subject to the stack-bounded re-entry discipline
/// of [`crate::scheduler`]).
pub struct ResultSlot<T> {
    continuation: RefCell<Option<Continuation<T>>>,
}

impl<T> ResultSlot<T> {
    pub fn new(continuation: Continuation<T>) -> Self {
        ResultSlot { continuation: RefCell::new(Some(continuation)) }
    }

    pub fn submit(&self, value: T) {
        self.fire(Ok(value));
    }

    pub fn fail(&self, error: crate::error::Error) {
        self.fire(Err(error));
    }

    fn fire(&self, outcome: CutiResult<T>) {
        let cont = self
            .continuation
            .borrow_mut()
            .take()
            .expect("result already delivered");
        call_bounded(move || cont(outcome));
    }
}

/// Captures a value or exception in a local variable — the adapter used
/// at the top of synchronous test drivers and other completion points
/// (spec §4.3 "Final result").
pub struct FinalResult<T> {
    outcome: RefCell<Option<CutiResult<T>>>,
}

impl<T> FinalResult<T> {
    pub fn new() -> Self {
        FinalResult { outcome: RefCell::new(None) }
    }

    pub fn submit(&self, value: T) {
        *self.outcome.borrow_mut() = Some(Ok(value));
    }

    pub fn fail(&self, error: crate::error::Error) {
        *self.outcome.borrow_mut() = Some(Err(error));
    }

    pub fn take(&self) -> Option<CutiResult<T>> {
        self.outcome.borrow_mut().take()
    }

    /// Builds a [`Continuation`] that delivers straight into this slot.
    pub fn continuation(self: &std::rc::Rc<Self>) -> Continuation<T>
    where
        T: 'static,
    {
        let slot = self.clone();
        Box::new(move |outcome| {
            *slot.outcome.borrow_mut() = Some(outcome);
        })
    }
}

impl<T> Default for FinalResult<T> {
    fn default() -> Self {
        Self::new()
    }
}
