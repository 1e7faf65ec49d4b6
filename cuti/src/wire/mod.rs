//! The text wire format (spec §4.4): tokenizer primitives, readers, and
//! writers for every type an RPC method signature can mention, plus the
//! async drivers ([`read_value`], [`write_value`]) that turn a
//! [`WireReader`]/[`WireWriter`] into a suspend/resume task against a
//! bound non-blocking buffer.
//!
//! Every reader/writer here is a plain synchronous state machine over
//! `&mut NbInbuf`/`&mut NbOutbuf`; none of them touch the scheduler
//! directly; `read_value`/`write_value` are the sole bridge to
//! `call_when_readable`/`call_when_writable`. This mirrors the original
//! library's `reader_traits_t`/`writer_traits_t` per-type dispatch, with
//! the scheduler suspension factored out into one generic driver instead
//! of being reimplemented per type.

mod container;
mod message;
mod numeric;
mod progress;
mod reader;
mod text;
mod writer;

pub use container::{
    ByteVecReader, ByteVecWriter, CloseBrace, CloseBracket, OpenBrace, OpenBracket,
    OptionalReader, OptionalWriter, PunctReader, PunctWriter, SequenceReader, SequenceWriter,
};
pub use message::{EndOfMessageReader, EndOfMessageWriter};
pub use numeric::{
    BoolReader, BoolWriter, SignedReader, SignedWriter, UnsignedReader, UnsignedWriter, WireInt,
    WireUint,
};
pub use progress::Progress;
pub use reader::{read_value, WireReader};
pub use text::{IdentifierReader, IdentifierWriter, StringReader, StringWriter};
pub use writer::{write_value, WireWriter};

pub(crate) use text::{escape_string_token, is_identifier_continue, is_identifier_start};
pub(crate) use writer::BytesWriter;

pub type U16Reader = UnsignedReader<u16>;
pub type U32Reader = UnsignedReader<u32>;
pub type U64Reader = UnsignedReader<u64>;
pub type I16Reader = SignedReader<i16>;
pub type I32Reader = SignedReader<i32>;
pub type I64Reader = SignedReader<i64>;

pub type U16Writer = UnsignedWriter<u16>;
pub type U32Writer = UnsignedWriter<u32>;
pub type U64Writer = UnsignedWriter<u64>;
pub type I16Writer = SignedWriter<i16>;
pub type I32Writer = SignedWriter<i32>;
pub type I64Writer = SignedWriter<i64>;
