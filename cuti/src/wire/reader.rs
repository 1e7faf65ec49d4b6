//! [`WireReader`]: the incremental-parsing contract every wire type
//! implements, plus [`read_value`], the async driver that turns one into
//! a suspend/resume task against a [`BoundInbuf`] (spec §4.4).

use crate::asynch::Continuation;
use crate::buffer::{BoundInbuf, NbInbuf};
use crate::error::Result;

use super::progress::Progress;

/// An incremental parser for one wire-format value.
///
/// `poll` is called each time the bound inbuf has at least one readable
/// byte (real data, eof, or a sticky error); it consumes as much as it
/// can and returns [`Progress::Incomplete`] once the buffer is drained
/// without a complete value, so the driver can re-arm
/// `call_when_readable` and try again later. Implementations must not
/// consume a token's trailing delimiter — the next reader (or the
/// end-of-message check) owns that byte.
pub trait WireReader: Sized {
    type Value;

    fn new() -> Self;

    fn poll(&mut self, inbuf: &mut NbInbuf) -> Result<Progress<Self::Value>>;
}

/// Drives `R` to completion against `bound`, delivering the result to
/// `cont`. This is the only place a wire reader's suspension touches the
/// scheduler; readers themselves are plain synchronous state machines.
pub fn read_value<R>(bound: BoundInbuf, cont: Continuation<R::Value>)
where
    R: WireReader + 'static,
    R::Value: 'static,
{
    drive(R::new(), bound, cont)
}

fn drive<R>(mut reader: R, bound: BoundInbuf, cont: Continuation<R::Value>)
where
    R: WireReader + 'static,
    R::Value: 'static,
{
    let outcome = {
        let mut inbuf = bound.buf.borrow_mut();
        reader.poll(&mut inbuf)
    };
    match outcome {
        Ok(Progress::Complete(value)) => cont(Ok(value)),
        Ok(Progress::Incomplete) => {
            let bound2 = bound.clone();
            NbInbuf::call_when_readable(
                &bound.buf,
                &bound.scheduler,
                Box::new(move || drive(reader, bound2, cont)),
            );
        }
        Err(e) => cont(Err(e)),
    }
}
