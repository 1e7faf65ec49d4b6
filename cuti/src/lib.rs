//! `cuti`: a reusable library for building RPC servers and clients
//! over TCP (spec §1).
//!
//! The layering, bottom up: a cooperative single-threaded
//! [`scheduler`] multiplexes [`net`] sockets through continuation
//! callbacks; [`buffer`] builds non-blocking byte buffers on top of a
//! scheduler and a connection; [`wire`] reads and writes primitive
//! values against those buffers incrementally; [`rpc`] composes the
//! wire format into request/reply framing and method dispatch; and
//! [`dispatcher`] owns the thread pool, listener sockets, and
//! connection lifecycle that turn a method map into a running server.
//! [`cache`] and [`asynch`] are shared building blocks used across
//! more than one of those layers.

pub mod asynch;
pub mod buffer;
pub mod cache;
pub mod dispatcher;
pub mod error;
pub mod net;
pub mod rpc;
pub mod scheduler;
#[cfg(feature = "default-signals")]
pub mod signal;
pub mod ticket;
pub mod wire;

pub use error::{Error, ErrorKind, Result};
