//! End-of-message handling (spec §4.4 "End-of-message"): every request
//! and reply is terminated by exactly one `\n`, which — unlike the
//! ordinary whitespace bytes — is never skipped while reading a value
//! and is only ever consumed here, at a value-complete position.

use crate::buffer::{NbInbuf, NbOutbuf};
use crate::error::{Error, Result};

use super::progress::{unexpected_eof, Progress};
use super::reader::WireReader;
use super::writer::{BytesWriter, WireWriter};

pub struct EndOfMessageReader;

impl WireReader for EndOfMessageReader {
    type Value = ();

    fn new() -> Self {
        EndOfMessageReader
    }

    fn poll(&mut self, inbuf: &mut NbInbuf) -> Result<Progress<()>> {
        if !inbuf.readable() {
            return Ok(Progress::Incomplete);
        }
        match inbuf.peek() {
            Some(b'\n') => {
                inbuf.skip();
                Ok(Progress::Complete(()))
            }
            Some(_) => Err(Error::parse("expected end of message")),
            None => Err(unexpected_eof()),
        }
    }
}

pub struct EndOfMessageWriter {
    bytes: BytesWriter,
}

impl WireWriter for EndOfMessageWriter {
    type Value = ();

    fn new(_value: ()) -> Self {
        EndOfMessageWriter { bytes: BytesWriter::new(vec![b'\n']) }
    }

    fn poll(&mut self, outbuf: &mut NbOutbuf) -> Result<Progress<()>> {
        self.bytes.poll(outbuf)
    }
}
