//! Exception frames (spec §4.5 "Framing"): the literal identifier `$`,
//! an identifier naming the error *kind*, and a string holding the error
//! *message* — how a server reports a failed request instead of a
//! normal result list.

use crate::buffer::{NbInbuf, NbOutbuf};
use crate::error::{Error, Result};
use crate::wire::{
    escape_string_token, BytesWriter, IdentifierReader, Progress, PunctReader, StringReader,
    WireReader, WireWriter,
};

/// A decoded `$ kind "message"` reply frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionFrame {
    pub kind: String,
    pub message: String,
}

impl ExceptionFrame {
    pub fn from_error(error: &Error) -> Self {
        ExceptionFrame { kind: error.wire_kind().to_string(), message: error.to_string() }
    }
}

enum ReadPhase {
    Dollar,
    Kind,
    Message,
}

pub struct ExceptionFrameReader {
    phase: ReadPhase,
    dollar: PunctReader<b'$'>,
    kind_reader: IdentifierReader,
    kind: Option<String>,
    message_reader: StringReader,
}

impl WireReader for ExceptionFrameReader {
    type Value = ExceptionFrame;

    fn new() -> Self {
        ExceptionFrameReader {
            phase: ReadPhase::Dollar,
            dollar: PunctReader::new(),
            kind_reader: IdentifierReader::new(),
            kind: None,
            message_reader: StringReader::new(),
        }
    }

    fn poll(&mut self, inbuf: &mut NbInbuf) -> Result<Progress<ExceptionFrame>> {
        loop {
            match self.phase {
                ReadPhase::Dollar => match self.dollar.poll(inbuf)? {
                    Progress::Incomplete => return Ok(Progress::Incomplete),
                    Progress::Complete(()) => self.phase = ReadPhase::Kind,
                },
                ReadPhase::Kind => match self.kind_reader.poll(inbuf)? {
                    Progress::Incomplete => return Ok(Progress::Incomplete),
                    Progress::Complete(kind) => {
                        self.kind = Some(kind);
                        self.phase = ReadPhase::Message;
                    }
                },
                ReadPhase::Message => match self.message_reader.poll(inbuf)? {
                    Progress::Incomplete => return Ok(Progress::Incomplete),
                    Progress::Complete(message) => {
                        return Ok(Progress::Complete(ExceptionFrame {
                            kind: self.kind.take().expect("kind read before message"),
                            message,
                        }));
                    }
                },
            }
        }
    }
}

pub struct ExceptionFrameWriter {
    bytes: BytesWriter,
}

impl WireWriter for ExceptionFrameWriter {
    type Value = ExceptionFrame;

    fn new(value: ExceptionFrame) -> Self {
        let mut out = vec![b' ', b'$', b' '];
        out.extend_from_slice(value.kind.as_bytes());
        out.extend(escape_string_token(&value.message));
        ExceptionFrameWriter { bytes: BytesWriter::new(out) }
    }

    fn poll(&mut self, outbuf: &mut NbOutbuf) -> Result<Progress<()>> {
        self.bytes.poll(outbuf)
    }
}

/// Which shape the next reply token takes — decided without consuming
/// anything past the leading whitespace run, so the caller can hand off
/// to either [`ExceptionFrameReader`] or the method's own result reader.
pub enum ReplyKind {
    Exception,
    Value,
}

pub struct ReplyKindProbe;

impl WireReader for ReplyKindProbe {
    type Value = ReplyKind;

    fn new() -> Self {
        ReplyKindProbe
    }

    fn poll(&mut self, inbuf: &mut NbInbuf) -> Result<Progress<ReplyKind>> {
        loop {
            if !inbuf.readable() {
                return Ok(Progress::Incomplete);
            }
            match inbuf.peek() {
                Some(b'\t') | Some(b'\r') | Some(b' ') => inbuf.skip(),
                Some(b'\n') => return Err(Error::parse("unexpected end of message")),
                Some(b'$') => return Ok(Progress::Complete(ReplyKind::Exception)),
                Some(_) => return Ok(Progress::Complete(ReplyKind::Value)),
                None => {
                    return Err(Error::Io(std::io::Error::new(
                        std::io::ErrorKind::UnexpectedEof,
                        "connection closed while a reply was expected",
                    )))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exception_frame_writer_renders_dollar_kind_and_message() {
        let frame =
            ExceptionFrame { kind: "bad_method".to_string(), message: "no such method".to_string() };
        let writer = ExceptionFrameWriter::new(frame);
        assert_eq!(
            String::from_utf8(writer.bytes.into_inner()).unwrap(),
            " $ bad_method \"no such method\""
        );
    }

    #[test]
    fn exception_frame_from_error_uses_wire_kind() {
        let error = Error::UnknownMethod("frobnicate".to_string());
        let frame = ExceptionFrame::from_error(&error);
        assert_eq!(frame.kind, "bad_method");
        assert_eq!(frame.message, error.to_string());
    }
}
