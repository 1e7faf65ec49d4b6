//! Shared plumbing for the wire readers/writers in this module: the
//! incremental-progress result type, whitespace skipping (the original's
//! `token_finder_t`), and small hex helpers used by the byte-vector forms.

use std::io;

use crate::buffer::NbInbuf;
use crate::error::{Error, Result};

/// The outcome of one [`super::reader::WireReader::poll`] or
/// [`super::writer::WireWriter::poll`] call: either the value is fully
/// read/written, or the buffer ran out of data/space and the caller must
/// wait for the next readiness event before polling again.
#[derive(Debug)]
pub enum Progress<T> {
    Complete(T),
    Incomplete,
}

/// A connection closing where a value was still expected is always a
/// genuine I/O condition, distinct from hitting the wire format's own
/// `\n` end-of-message marker too early (which is a parse error).
pub(crate) fn unexpected_eof() -> Error {
    Error::Io(io::Error::new(
        io::ErrorKind::UnexpectedEof,
        "connection closed while a value was expected",
    ))
}

/// Skips tab/CR/space, stopping at the first byte that is neither —
/// without consuming it. A `\n` in that position is the wire format's
/// end-of-message marker arriving where a value was expected, which is a
/// parse error, not end-of-file. Returns the peeked byte (or `None` at
/// genuine connection eof) still unconsumed.
pub(crate) fn skip_whitespace(inbuf: &mut NbInbuf) -> Result<Progress<Option<u8>>> {
    loop {
        if !inbuf.readable() {
            return Ok(Progress::Incomplete);
        }
        match inbuf.peek() {
            Some(b'\t') | Some(b'\r') | Some(b' ') => inbuf.skip(),
            Some(b'\n') => return Err(Error::parse("unexpected end of message")),
            Some(other) => return Ok(Progress::Complete(Some(other))),
            None => return Ok(Progress::Complete(None)),
        }
    }
}

pub(crate) fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

pub(crate) fn push_hex_byte(out: &mut Vec<u8>, byte: u8) {
    const DIGITS: &[u8; 16] = b"0123456789abcdef";
    out.push(DIGITS[(byte >> 4) as usize]);
    out.push(DIGITS[(byte & 0xf) as usize]);
}
