//! Bound buffer pairs (spec §3 "Bound inbuf/outbuf"): a buffer plus the
//! scheduler it was created against, captured once so async combinators
//! don't need to thread a scheduler reference through every call.

use std::cell::RefCell;
use std::rc::Rc;

use crate::asynch::Continuation;
use crate::error::Error;
use crate::scheduler::Scheduler;

use super::inbuf::NbInbuf;
use super::outbuf::NbOutbuf;

#[derive(Clone)]
pub struct BoundInbuf {
    pub buf: Rc<RefCell<NbInbuf>>,
    pub scheduler: Scheduler,
}

impl BoundInbuf {
    pub fn new(buf: Rc<RefCell<NbInbuf>>, scheduler: Scheduler) -> Self {
        BoundInbuf { buf, scheduler }
    }
}

#[derive(Clone)]
pub struct BoundOutbuf {
    pub buf: Rc<RefCell<NbOutbuf>>,
    pub scheduler: Scheduler,
}

impl BoundOutbuf {
    pub fn new(buf: Rc<RefCell<NbOutbuf>>, scheduler: Scheduler) -> Self {
        BoundOutbuf { buf, scheduler }
    }

    /// Enters the flushing state and resolves once every byte queued so
    /// far has actually reached the socket (spec §4.5 "write `\n`, then
    /// flush").
    pub fn flush(&self, cont: Continuation<()>) {
        self.buf.borrow_mut().start_flush();
        drive_flush(self.clone(), cont);
    }
}

fn drive_flush(bound: BoundOutbuf, cont: Continuation<()>) {
    let outcome = {
        let outbuf = bound.buf.borrow();
        if let Some(err) = outbuf.error_status() {
            Some(Err(Error::parse(format!("output buffer failed: {}", err))))
        } else if outbuf.flush_complete() {
            Some(Ok(()))
        } else {
            None
        }
    };
    match outcome {
        Some(result) => cont(result),
        None => {
            let bound2 = bound.clone();
            NbOutbuf::call_when_writable(
                &bound.buf,
                &bound.scheduler,
                Box::new(move || drive_flush(bound2, cont)),
            );
        }
    }
}
