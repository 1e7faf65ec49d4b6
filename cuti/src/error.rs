//! Crate-wide error type.
//!
//! `cuti` funnels every failure mode named in the error taxonomy (I/O,
//! wire-parse, throughput timeout, unknown method, protocol violation,
//! cancellation) into one [`Error`] so that callers at any layer — buffer,
//! async combinator, RPC client, dispatcher — can match on [`ErrorKind`]
//! without needing to know which module raised it.

use std::fmt;
use std::io;

/// Coarse classification of an [`Error`], stable across releases.
///
/// Kept separate from the `Display` message so callers can branch on
/// `kind()` instead of string-matching error text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A socket or selector operation failed.
    Io,
    /// The wire format was violated while decoding a value.
    Parse,
    /// A throughput checker observed sustained underflow and closed the
    /// connection (spec §4.2, "throughput checker").
    Throughput,
    /// An RPC request named a method absent from the method map.
    UnknownMethod,
    /// The RPC framing itself was violated (e.g. reply without a
    /// terminating newline, or an unexpected exception frame shape).
    Protocol,
    /// An async task or its ancestor was torn down before completion.
    Cancelled,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Io => "io",
            ErrorKind::Parse => "parse",
            ErrorKind::Throughput => "throughput",
            ErrorKind::UnknownMethod => "unknown_method",
            ErrorKind::Protocol => "protocol",
            ErrorKind::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// The crate's single error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("throughput timeout: fewer than the configured minimum bytes were \
             transferred for too many consecutive ticks")]
    Throughput,

    #[error("unknown method: {0}")]
    UnknownMethod(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("operation cancelled")]
    Cancelled,
}

impl Error {
    pub fn parse(msg: impl Into<String>) -> Self {
        Error::Parse(msg.into())
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        Error::Protocol(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Io(_) => ErrorKind::Io,
            Error::Parse(_) => ErrorKind::Parse,
            Error::Throughput => ErrorKind::Throughput,
            Error::UnknownMethod(_) => ErrorKind::UnknownMethod,
            Error::Protocol(_) => ErrorKind::Protocol,
            Error::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// The identifier written into an exception frame's `kind` slot
    /// (spec §4.5). Only `bad_method` is fixed by the spec; everything
    /// else is a pass-through string naming the error kind.
    pub fn wire_kind(&self) -> &'static str {
        match self {
            Error::UnknownMethod(_) => "bad_method",
            Error::Parse(_) => "bad_request",
            Error::Throughput => "timeout",
            Error::Protocol(_) => "bad_request",
            Error::Cancelled => "cancelled",
            Error::Io(_) => "io_error",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
