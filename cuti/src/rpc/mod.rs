//! The RPC engine (spec §4.5): request/reply framing over a bound
//! inbuf/outbuf pair, method dispatch, and exception frames. The
//! client half lives in [`client`]; the server half in [`handler`];
//! [`stream`] covers the streaming argument/result form both sides can
//! use instead of collecting a whole sequence up front.

mod client;
mod exception;
mod handler;
mod method;
mod stream;

pub use client::{call, ClientConfig};
pub use exception::ExceptionFrame;
pub use handler::{serve_connection, ConnectionHooks};
pub use method::{default_method_factory, Method, MethodContext, MethodFactory, MethodMap};
pub use stream::{consume_sequence, produce_sequence};
