//! Optionals, sequences, and the byte-vector compact form (spec §4.4
//! "Composite forms").

use crate::buffer::{NbInbuf, NbOutbuf};
use crate::error::{Error, Result};

use super::progress::{hex_value, push_hex_byte, skip_whitespace, unexpected_eof, Progress};
use super::reader::WireReader;
use super::writer::{BytesWriter, WireWriter};

/// A single punctuation byte (`[`, `]`, `{`, `}`, `$`), preceded by the
/// usual whitespace run — every bracketing token in the wire format is
/// read this way.
pub struct PunctReader<const C: u8> {
    _marker: std::marker::PhantomData<()>,
}

impl<const C: u8> WireReader for PunctReader<C> {
    type Value = ();

    fn new() -> Self {
        PunctReader { _marker: std::marker::PhantomData }
    }

    fn poll(&mut self, inbuf: &mut NbInbuf) -> Result<Progress<()>> {
        match skip_whitespace(inbuf)? {
            Progress::Incomplete => Ok(Progress::Incomplete),
            Progress::Complete(None) => Err(unexpected_eof()),
            Progress::Complete(Some(b)) if b == C => {
                inbuf.skip();
                Ok(Progress::Complete(()))
            }
            Progress::Complete(Some(_)) => {
                Err(Error::parse(format!("expected '{}'", C as char)))
            }
        }
    }
}

pub struct PunctWriter<const C: u8> {
    bytes: BytesWriter,
    _marker: std::marker::PhantomData<()>,
}

impl<const C: u8> WireWriter for PunctWriter<C> {
    type Value = ();

    fn new(_value: ()) -> Self {
        PunctWriter { bytes: BytesWriter::new(vec![b' ', C]), _marker: std::marker::PhantomData }
    }

    fn poll(&mut self, outbuf: &mut NbOutbuf) -> Result<Progress<()>> {
        self.bytes.poll(outbuf)
    }
}

pub type OpenBracket = PunctReader<b'['>;
pub type CloseBracket = PunctReader<b']'>;
pub type OpenBrace = PunctReader<b'{'>;
pub type CloseBrace = PunctReader<b'}'>;

enum OptionalPhase {
    OpenWhitespace,
    AfterOpen,
    Inner,
    CloseWhitespace,
}

pub struct OptionalReader<R: WireReader> {
    phase: OptionalPhase,
    inner: Option<R>,
    value: Option<R::Value>,
}

impl<R> WireReader for OptionalReader<R>
where
    R: WireReader + 'static,
{
    type Value = Option<R::Value>;

    fn new() -> Self {
        OptionalReader { phase: OptionalPhase::OpenWhitespace, inner: None, value: None }
    }

    fn poll(&mut self, inbuf: &mut NbInbuf) -> Result<Progress<Option<R::Value>>> {
        loop {
            match self.phase {
                OptionalPhase::OpenWhitespace => match skip_whitespace(inbuf)? {
                    Progress::Incomplete => return Ok(Progress::Incomplete),
                    Progress::Complete(None) => return Err(unexpected_eof()),
                    Progress::Complete(Some(b'[')) => {
                        inbuf.skip();
                        self.phase = OptionalPhase::AfterOpen;
                    }
                    Progress::Complete(Some(_)) => return Err(Error::parse("expected '['")),
                },
                OptionalPhase::AfterOpen => match skip_whitespace(inbuf)? {
                    Progress::Incomplete => return Ok(Progress::Incomplete),
                    Progress::Complete(None) => return Err(unexpected_eof()),
                    Progress::Complete(Some(b']')) => {
                        inbuf.skip();
                        return Ok(Progress::Complete(None));
                    }
                    Progress::Complete(Some(_)) => {
                        self.inner = Some(R::new());
                        self.phase = OptionalPhase::Inner;
                    }
                },
                OptionalPhase::Inner => {
                    let reader = self.inner.as_mut().expect("inner reader missing");
                    match reader.poll(inbuf)? {
                        Progress::Incomplete => return Ok(Progress::Incomplete),
                        Progress::Complete(v) => {
                            self.value = Some(v);
                            self.inner = None;
                            self.phase = OptionalPhase::CloseWhitespace;
                        }
                    }
                }
                OptionalPhase::CloseWhitespace => match skip_whitespace(inbuf)? {
                    Progress::Incomplete => return Ok(Progress::Incomplete),
                    Progress::Complete(None) => return Err(unexpected_eof()),
                    Progress::Complete(Some(b']')) => {
                        inbuf.skip();
                        return Ok(Progress::Complete(self.value.take()));
                    }
                    Progress::Complete(Some(_)) => {
                        return Err(Error::parse("expected ']' after optional value"))
                    }
                },
            }
        }
    }
}

enum OptionalWritePhase {
    Open,
    Inner,
    Close,
}

pub struct OptionalWriter<W: WireWriter> {
    phase: OptionalWritePhase,
    open: PunctWriter<b'['>,
    inner: Option<W>,
    close: PunctWriter<b']'>,
}

impl<W> WireWriter for OptionalWriter<W>
where
    W: WireWriter + 'static,
{
    type Value = Option<W::Value>;

    fn new(value: Option<W::Value>) -> Self {
        OptionalWriter {
            phase: OptionalWritePhase::Open,
            open: PunctWriter::new(()),
            inner: value.map(W::new),
            close: PunctWriter::new(()),
        }
    }

    fn poll(&mut self, outbuf: &mut NbOutbuf) -> Result<Progress<()>> {
        loop {
            match self.phase {
                OptionalWritePhase::Open => match self.open.poll(outbuf)? {
                    Progress::Incomplete => return Ok(Progress::Incomplete),
                    Progress::Complete(()) => self.phase = OptionalWritePhase::Inner,
                },
                OptionalWritePhase::Inner => match &mut self.inner {
                    None => self.phase = OptionalWritePhase::Close,
                    Some(w) => match w.poll(outbuf)? {
                        Progress::Incomplete => return Ok(Progress::Incomplete),
                        Progress::Complete(()) => {
                            self.inner = None;
                            self.phase = OptionalWritePhase::Close;
                        }
                    },
                },
                OptionalWritePhase::Close => return self.close.poll(outbuf),
            }
        }
    }
}

enum SequencePhase {
    OpenWhitespace,
    ElementOrClose,
    Element,
}

pub struct SequenceReader<R: WireReader> {
    phase: SequencePhase,
    inner: Option<R>,
    items: Vec<R::Value>,
}

impl<R> WireReader for SequenceReader<R>
where
    R: WireReader + 'static,
{
    type Value = Vec<R::Value>;

    fn new() -> Self {
        SequenceReader { phase: SequencePhase::OpenWhitespace, inner: None, items: Vec::new() }
    }

    fn poll(&mut self, inbuf: &mut NbInbuf) -> Result<Progress<Vec<R::Value>>> {
        loop {
            match self.phase {
                SequencePhase::OpenWhitespace => match skip_whitespace(inbuf)? {
                    Progress::Incomplete => return Ok(Progress::Incomplete),
                    Progress::Complete(None) => return Err(unexpected_eof()),
                    Progress::Complete(Some(b'[')) => {
                        inbuf.skip();
                        self.phase = SequencePhase::ElementOrClose;
                    }
                    Progress::Complete(Some(_)) => return Err(Error::parse("expected '['")),
                },
                SequencePhase::ElementOrClose => match skip_whitespace(inbuf)? {
                    Progress::Incomplete => return Ok(Progress::Incomplete),
                    Progress::Complete(None) => return Err(unexpected_eof()),
                    Progress::Complete(Some(b']')) => {
                        inbuf.skip();
                        return Ok(Progress::Complete(std::mem::take(&mut self.items)));
                    }
                    Progress::Complete(Some(_)) => {
                        self.inner = Some(R::new());
                        self.phase = SequencePhase::Element;
                    }
                },
                SequencePhase::Element => {
                    let reader = self.inner.as_mut().expect("inner reader missing");
                    match reader.poll(inbuf)? {
                        Progress::Incomplete => return Ok(Progress::Incomplete),
                        Progress::Complete(v) => {
                            self.items.push(v);
                            self.inner = None;
                            self.phase = SequencePhase::ElementOrClose;
                        }
                    }
                }
            }
        }
    }
}

enum SequenceWritePhase {
    Open,
    Element(usize),
    Close,
}

pub struct SequenceWriter<W: WireWriter> {
    phase: SequenceWritePhase,
    open: PunctWriter<b'['>,
    items: Vec<Option<W::Value>>,
    current: Option<W>,
    close: PunctWriter<b']'>,
}

impl<W> WireWriter for SequenceWriter<W>
where
    W: WireWriter + 'static,
{
    type Value = Vec<W::Value>;

    fn new(value: Vec<W::Value>) -> Self {
        SequenceWriter {
            phase: SequenceWritePhase::Open,
            open: PunctWriter::new(()),
            items: value.into_iter().map(Some).collect(),
            current: None,
            close: PunctWriter::new(()),
        }
    }

    fn poll(&mut self, outbuf: &mut NbOutbuf) -> Result<Progress<()>> {
        loop {
            match self.phase {
                SequenceWritePhase::Open => match self.open.poll(outbuf)? {
                    Progress::Incomplete => return Ok(Progress::Incomplete),
                    Progress::Complete(()) => self.phase = SequenceWritePhase::Element(0),
                },
                SequenceWritePhase::Element(i) => {
                    if self.current.is_none() {
                        match self.items.get_mut(i).and_then(Option::take) {
                            Some(v) => self.current = Some(W::new(v)),
                            None => {
                                self.phase = SequenceWritePhase::Close;
                                continue;
                            }
                        }
                    }
                    let writer = self.current.as_mut().unwrap();
                    match writer.poll(outbuf)? {
                        Progress::Incomplete => return Ok(Progress::Incomplete),
                        Progress::Complete(()) => {
                            self.current = None;
                            self.phase = SequenceWritePhase::Element(i + 1);
                        }
                    }
                }
                SequenceWritePhase::Close => return self.close.poll(outbuf),
            }
        }
    }
}

/// Byte vectors: the compact hex-chunk sequence form (spec §4.4).
enum ByteVecPhase {
    OpenWhitespace,
    ElementOrClose,
    Chunk,
}

pub struct ByteVecReader {
    phase: ByteVecPhase,
    bytes: Vec<u8>,
    chunk_digits: Vec<u8>,
}

impl WireReader for ByteVecReader {
    type Value = Vec<u8>;

    fn new() -> Self {
        ByteVecReader { phase: ByteVecPhase::OpenWhitespace, bytes: Vec::new(), chunk_digits: Vec::new() }
    }

    fn poll(&mut self, inbuf: &mut NbInbuf) -> Result<Progress<Vec<u8>>> {
        loop {
            match self.phase {
                ByteVecPhase::OpenWhitespace => match skip_whitespace(inbuf)? {
                    Progress::Incomplete => return Ok(Progress::Incomplete),
                    Progress::Complete(None) => return Err(unexpected_eof()),
                    Progress::Complete(Some(b'[')) => {
                        inbuf.skip();
                        self.phase = ByteVecPhase::ElementOrClose;
                    }
                    Progress::Complete(Some(_)) => return Err(Error::parse("expected '['")),
                },
                ByteVecPhase::ElementOrClose => match skip_whitespace(inbuf)? {
                    Progress::Incomplete => return Ok(Progress::Incomplete),
                    Progress::Complete(None) => return Err(unexpected_eof()),
                    Progress::Complete(Some(b']')) => {
                        inbuf.skip();
                        return Ok(Progress::Complete(std::mem::take(&mut self.bytes)));
                    }
                    Progress::Complete(Some(c)) if hex_value(c).is_some() => {
                        self.phase = ByteVecPhase::Chunk;
                    }
                    Progress::Complete(Some(_)) => {
                        return Err(Error::parse("expected a hex digit or ']'"))
                    }
                },
                ByteVecPhase::Chunk => {
                    if !inbuf.readable() {
                        return Ok(Progress::Incomplete);
                    }
                    match inbuf.peek().and_then(hex_value) {
                        Some(d) => {
                            inbuf.skip();
                            self.chunk_digits.push(d);
                        }
                        None => {
                            if self.chunk_digits.len() % 2 != 0 {
                                return Err(Error::parse(
                                    "byte vector chunk has an odd number of hex digits",
                                ));
                            }
                            for pair in self.chunk_digits.chunks_exact(2) {
                                self.bytes.push(pair[0] * 16 + pair[1]);
                            }
                            self.chunk_digits.clear();
                            self.phase = ByteVecPhase::ElementOrClose;
                        }
                    }
                }
            }
        }
    }
}

pub struct ByteVecWriter {
    bytes: BytesWriter,
}

impl WireWriter for ByteVecWriter {
    type Value = Vec<u8>;

    fn new(value: Vec<u8>) -> Self {
        let mut out = Vec::with_capacity(value.len() * 2 + 4);
        out.push(b' ');
        out.push(b'[');
        if !value.is_empty() {
            out.push(b' ');
            for b in value {
                push_hex_byte(&mut out, b);
            }
        }
        out.push(b' ');
        out.push(b']');
        ByteVecWriter { bytes: BytesWriter::new(out) }
    }

    fn poll(&mut self, outbuf: &mut NbOutbuf) -> Result<Progress<()>> {
        self.bytes.poll(outbuf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_vec_writer_emits_one_chunk() {
        let writer = ByteVecWriter::new(vec![0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(String::from_utf8(writer.bytes.into_inner()).unwrap(), " [ deadbeef ]");
    }

    #[test]
    fn byte_vec_writer_handles_empty_vector() {
        let writer = ByteVecWriter::new(vec![]);
        assert_eq!(String::from_utf8(writer.bytes.into_inner()).unwrap(), " [ ]");
    }
}
