//! [`WireWriter`] and [`write_value`]: the output-side counterpart of
//! [`super::reader`].

use crate::asynch::Continuation;
use crate::buffer::{BoundOutbuf, NbOutbuf};
use crate::error::Result;

use super::progress::Progress;

pub trait WireWriter: Sized {
    type Value;

    fn new(value: Self::Value) -> Self;

    fn poll(&mut self, outbuf: &mut NbOutbuf) -> Result<Progress<()>>;
}

pub fn write_value<W>(bound: BoundOutbuf, value: W::Value, cont: Continuation<()>)
where
    W: WireWriter + 'static,
{
    drive(W::new(value), bound, cont)
}

fn drive<W>(mut writer: W, bound: BoundOutbuf, cont: Continuation<()>)
where
    W: WireWriter + 'static,
{
    let outcome = {
        let mut outbuf = bound.buf.borrow_mut();
        writer.poll(&mut outbuf)
    };
    match outcome {
        Ok(Progress::Complete(())) => cont(Ok(())),
        Ok(Progress::Incomplete) => {
            let bound2 = bound.clone();
            NbOutbuf::call_when_writable(
                &bound.buf,
                &bound.scheduler,
                Box::new(move || drive(writer, bound2, cont)),
            );
        }
        Err(e) => cont(Err(e)),
    }
}

/// A small owned byte sequence drained into an [`NbOutbuf`] a chunk at a
/// time — the common tail of every primitive writer below.
pub(crate) struct BytesWriter {
    bytes: Vec<u8>,
    pos: usize,
}

impl BytesWriter {
    pub(crate) fn new(bytes: Vec<u8>) -> Self {
        BytesWriter { bytes, pos: 0 }
    }

    #[cfg(test)]
    pub(crate) fn into_inner(self) -> Vec<u8> {
        self.bytes
    }

    pub(crate) fn poll(&mut self, outbuf: &mut NbOutbuf) -> Result<Progress<()>> {
        while self.pos < self.bytes.len() {
            if let Some(err) = outbuf.error_status() {
                return Err(crate::error::Error::parse(format!(
                    "output buffer failed: {}",
                    err
                )));
            }
            if !outbuf.writable() {
                return Ok(Progress::Incomplete);
            }
            let n = outbuf.write(&self.bytes[self.pos..]);
            if n == 0 {
                return Ok(Progress::Incomplete);
            }
            self.pos += n;
        }
        Ok(Progress::Complete(()))
    }
}
