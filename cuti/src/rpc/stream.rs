//! Streaming sequence input/output (spec §4.5 "Streaming arguments"):
//! an alternative to collecting a whole sequence into a `Vec` before a
//! method can act on it. A consumer callback is invoked once per
//! decoded element and once more with `None` for end-of-sequence; a
//! producer callback is polled the same way on the write side. Both
//! keep the wire framing (`[` ... `]`) identical to [`SequenceReader`]/
//! [`SequenceWriter`](crate::wire::SequenceWriter) — only the
//! buffering strategy differs.

use std::cell::RefCell;
use std::rc::Rc;

use crate::asynch::Continuation;
use crate::buffer::{BoundInbuf, BoundOutbuf, NbInbuf};
use crate::error::{Error, Result};
use crate::wire::{read_value, write_value, OpenBracket, Progress, PunctWriter, WireReader, WireWriter};

/// Peeks (after skipping whitespace) for a `]`: if found, consumes it
/// and resolves `true`; otherwise leaves the stream untouched and
/// resolves `false` so the caller can read an element next.
struct CloseOrElementProbe;

impl WireReader for CloseOrElementProbe {
    type Value = bool;

    fn new() -> Self {
        CloseOrElementProbe
    }

    fn poll(&mut self, inbuf: &mut NbInbuf) -> Result<Progress<bool>> {
        loop {
            if !inbuf.readable() {
                return Ok(Progress::Incomplete);
            }
            match inbuf.peek() {
                Some(b'\t') | Some(b'\r') | Some(b' ') => inbuf.skip(),
                Some(b'\n') => return Err(Error::parse("unexpected end of message")),
                Some(b']') => {
                    inbuf.skip();
                    return Ok(Progress::Complete(true));
                }
                Some(_) => return Ok(Progress::Complete(false)),
                None => {
                    return Err(Error::Io(std::io::Error::new(
                        std::io::ErrorKind::UnexpectedEof,
                        "connection closed mid-sequence",
                    )))
                }
            }
        }
    }
}

/// Reads a sequence of `R::Value` one element at a time, invoking
/// `on_element(Some(value))` for each and `on_element(None)` exactly
/// once at the end.
pub fn consume_sequence<R>(
    bound: BoundInbuf,
    on_element: Rc<RefCell<dyn FnMut(Option<R::Value>)>>,
    cont: Continuation<()>,
) where
    R: WireReader + 'static,
    R::Value: 'static,
{
    read_value::<OpenBracket>(
        bound.clone(),
        Box::new(move |result| match result {
            Ok(()) => consume_elements::<R>(bound, on_element, cont),
            Err(e) => cont(Err(e)),
        }),
    );
}

fn consume_elements<R>(
    bound: BoundInbuf,
    on_element: Rc<RefCell<dyn FnMut(Option<R::Value>)>>,
    cont: Continuation<()>,
) where
    R: WireReader + 'static,
    R::Value: 'static,
{
    let bound2 = bound.clone();
    read_value::<CloseOrElementProbe>(
        bound,
        Box::new(move |result| match result {
            Ok(true) => {
                (on_element.borrow_mut())(None);
                cont(Ok(()));
            }
            Ok(false) => {
                let on_element2 = on_element.clone();
                let bound3 = bound2.clone();
                read_value::<R>(
                    bound2,
                    Box::new(move |result| match result {
                        Ok(value) => {
                            (on_element2.borrow_mut())(Some(value));
                            consume_elements::<R>(bound3, on_element2, cont)
                        }
                        Err(e) => cont(Err(e)),
                    }),
                );
            }
            Err(e) => cont(Err(e)),
        }),
    );
}

/// Writes a sequence by repeatedly polling `next` for the next element
/// (`None` signalling the producer is exhausted) rather than requiring
/// the whole sequence up front.
pub fn produce_sequence<W>(
    bound: BoundOutbuf,
    next: Rc<RefCell<dyn FnMut() -> Option<W::Value>>>,
    cont: Continuation<()>,
) where
    W: WireWriter + 'static,
    W::Value: 'static,
{
    write_value::<PunctWriter<b'['>>(
        bound.clone(),
        (),
        Box::new(move |result| match result {
            Ok(()) => produce_elements::<W>(bound, next, cont),
            Err(e) => cont(Err(e)),
        }),
    );
}

fn produce_elements<W>(
    bound: BoundOutbuf,
    next: Rc<RefCell<dyn FnMut() -> Option<W::Value>>>,
    cont: Continuation<()>,
) where
    W: WireWriter + 'static,
    W::Value: 'static,
{
    let item = (next.borrow_mut())();
    match item {
        None => write_value::<PunctWriter<b']'>>(bound, (), cont),
        Some(value) => {
            let bound2 = bound.clone();
            write_value::<W>(
                bound,
                value,
                Box::new(move |result| match result {
                    Ok(()) => produce_elements::<W>(bound2, next, cont),
                    Err(e) => cont(Err(e)),
                }),
            );
        }
    }
}
