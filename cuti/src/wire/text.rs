//! Strings and identifiers (spec §4.4 "Primitives").

use crate::buffer::{NbInbuf, NbOutbuf};
use crate::error::{Error, Result};

use super::progress::{hex_value, skip_whitespace, unexpected_eof, Progress};
use super::reader::WireReader;
use super::writer::{BytesWriter, WireWriter};

enum StringPhase {
    Whitespace,
    OpeningQuote,
    Body,
    Escape,
    HexDigit1,
    HexDigit2 { high: u8 },
}

pub struct StringReader {
    phase: StringPhase,
    bytes: Vec<u8>,
}

impl WireReader for StringReader {
    type Value = String;

    fn new() -> Self {
        StringReader { phase: StringPhase::Whitespace, bytes: Vec::new() }
    }

    fn poll(&mut self, inbuf: &mut NbInbuf) -> Result<Progress<String>> {
        loop {
            match self.phase {
                StringPhase::Whitespace => match skip_whitespace(inbuf)? {
                    Progress::Incomplete => return Ok(Progress::Incomplete),
                    Progress::Complete(None) => return Err(unexpected_eof()),
                    Progress::Complete(Some(_)) => self.phase = StringPhase::OpeningQuote,
                },
                StringPhase::OpeningQuote => {
                    if !inbuf.readable() {
                        return Ok(Progress::Incomplete);
                    }
                    match inbuf.peek() {
                        Some(b'"') => {
                            inbuf.skip();
                            self.phase = StringPhase::Body;
                        }
                        Some(_) | None => return Err(Error::parse("expected opening '\"'")),
                    }
                }
                StringPhase::Body => {
                    if !inbuf.readable() {
                        return Ok(Progress::Incomplete);
                    }
                    match inbuf.peek() {
                        Some(b'"') => {
                            inbuf.skip();
                            let s = std::mem::take(&mut self.bytes);
                            return Ok(Progress::Complete(
                                String::from_utf8(s)
                                    .map_err(|_| Error::parse("string is not valid utf-8"))?,
                            ));
                        }
                        Some(b'\\') => {
                            inbuf.skip();
                            self.phase = StringPhase::Escape;
                        }
                        Some(c) => {
                            self.bytes.push(c);
                            inbuf.skip();
                        }
                        None => return Err(unexpected_eof()),
                    }
                }
                StringPhase::Escape => {
                    if !inbuf.readable() {
                        return Ok(Progress::Incomplete);
                    }
                    match inbuf.peek() {
                        Some(b't') => self.finish_escape(inbuf, b'\t'),
                        Some(b'n') => self.finish_escape(inbuf, b'\n'),
                        Some(b'r') => self.finish_escape(inbuf, b'\r'),
                        Some(b'\\') => self.finish_escape(inbuf, b'\\'),
                        Some(b'"') => self.finish_escape(inbuf, b'"'),
                        Some(b'x') => {
                            inbuf.skip();
                            self.phase = StringPhase::HexDigit1;
                        }
                        Some(_) => return Err(Error::parse("invalid escape sequence")),
                        None => return Err(unexpected_eof()),
                    }
                }
                StringPhase::HexDigit1 => {
                    if !inbuf.readable() {
                        return Ok(Progress::Incomplete);
                    }
                    match inbuf.peek() {
                        None => return Err(unexpected_eof()),
                        Some(c) => match hex_value(c) {
                            Some(high) => {
                                inbuf.skip();
                                self.phase = StringPhase::HexDigit2 { high };
                            }
                            None => return Err(Error::parse("invalid \\x escape")),
                        },
                    }
                }
                StringPhase::HexDigit2 { high } => {
                    if !inbuf.readable() {
                        return Ok(Progress::Incomplete);
                    }
                    match inbuf.peek() {
                        None => return Err(unexpected_eof()),
                        Some(c) => match hex_value(c) {
                            Some(low) => {
                                inbuf.skip();
                                self.bytes.push(high * 16 + low);
                                self.phase = StringPhase::Body;
                            }
                            None => return Err(Error::parse("invalid \\x escape")),
                        },
                    }
                }
            }
        }
    }
}

impl StringReader {
    fn finish_escape(&mut self, inbuf: &mut NbInbuf, decoded: u8) {
        inbuf.skip();
        self.bytes.push(decoded);
        self.phase = StringPhase::Body;
    }
}

/// Renders `value` as a leading-space-prefixed quoted string token,
/// escaping control bytes, `"`, and `\` per spec §4.4. Shared with the
/// RPC exception frame writer, which inlines a string token without
/// going through the full async [`StringWriter`] state machine.
pub(crate) fn escape_string_token(value: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(value.len() + 3);
    out.push(b' ');
    out.push(b'"');
    for &b in value.as_bytes() {
        match b {
            b'\t' => out.extend_from_slice(b"\\t"),
            b'\n' => out.extend_from_slice(b"\\n"),
            b'\r' => out.extend_from_slice(b"\\r"),
            b'\\' => out.extend_from_slice(b"\\\\"),
            b'"' => out.extend_from_slice(b"\\\""),
            0x20..=0x7e => out.push(b),
            _ => {
                out.extend_from_slice(b"\\x");
                super::progress::push_hex_byte(&mut out, b);
            }
        }
    }
    out.push(b'"');
    out
}

pub struct StringWriter {
    bytes: BytesWriter,
}

impl WireWriter for StringWriter {
    type Value = String;

    fn new(value: String) -> Self {
        StringWriter { bytes: BytesWriter::new(escape_string_token(&value)) }
    }

    fn poll(&mut self, outbuf: &mut NbOutbuf) -> Result<Progress<()>> {
        self.bytes.poll(outbuf)
    }
}

pub(crate) fn is_identifier_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}

pub(crate) fn is_identifier_continue(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

enum IdentifierPhase {
    Whitespace,
    Body,
}

pub struct IdentifierReader {
    phase: IdentifierPhase,
    bytes: Vec<u8>,
}

impl WireReader for IdentifierReader {
    type Value = String;

    fn new() -> Self {
        IdentifierReader { phase: IdentifierPhase::Whitespace, bytes: Vec::new() }
    }

    fn poll(&mut self, inbuf: &mut NbInbuf) -> Result<Progress<String>> {
        loop {
            match self.phase {
                IdentifierPhase::Whitespace => match skip_whitespace(inbuf)? {
                    Progress::Incomplete => return Ok(Progress::Incomplete),
                    Progress::Complete(None) => return Err(unexpected_eof()),
                    Progress::Complete(Some(c)) => {
                        if !is_identifier_start(c) {
                            return Err(Error::parse("expected an identifier"));
                        }
                        self.phase = IdentifierPhase::Body;
                    }
                },
                IdentifierPhase::Body => {
                    if !inbuf.readable() {
                        return Ok(Progress::Incomplete);
                    }
                    match inbuf.peek() {
                        Some(c) if is_identifier_continue(c) => {
                            self.bytes.push(c);
                            inbuf.skip();
                        }
                        _ => {
                            let bytes = std::mem::take(&mut self.bytes);
                            // Always ASCII by construction.
                            return Ok(Progress::Complete(String::from_utf8(bytes).unwrap()));
                        }
                    }
                }
            }
        }
    }
}

pub struct IdentifierWriter {
    bytes: BytesWriter,
}

impl WireWriter for IdentifierWriter {
    type Value = String;

    fn new(value: String) -> Self {
        let mut out = Vec::with_capacity(value.len() + 1);
        out.push(b' ');
        out.extend_from_slice(value.as_bytes());
        IdentifierWriter { bytes: BytesWriter::new(out) }
    }

    fn poll(&mut self, outbuf: &mut NbOutbuf) -> Result<Progress<()>> {
        self.bytes.poll(outbuf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_writer_escapes_control_and_quote_bytes() {
        let writer = StringWriter::new("a\"b\tc\x01".to_string());
        assert_eq!(
            String::from_utf8(writer.bytes.into_inner()).unwrap(),
            " \"a\\\"b\\tc\\x01\""
        );
    }

    #[test]
    fn identifier_recognizes_start_and_continuation_bytes() {
        assert!(is_identifier_start(b'_'));
        assert!(is_identifier_start(b'A'));
        assert!(!is_identifier_start(b'9'));
        assert!(is_identifier_continue(b'9'));
    }
}
