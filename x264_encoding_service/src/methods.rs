//! Demonstration RPC methods served by this binary.
//!
//! `cuti` itself is silent on what a method actually does (spec §1
//! lists "the demonstration service's method implementations" as an
//! explicit out-of-scope collaborator); the x264 codec glue the
//! original service wrapped is out of scope entirely (see `SPEC_FULL.md`
//! §3). These two methods exist only to exercise the wire format, the
//! request handler, and the dispatcher's concurrency gate end to end.

use cuti::asynch::Continuation;
use cuti::buffer::BoundOutbuf;
use cuti::rpc::{default_method_factory, Method, MethodContext, MethodMap};
use cuti::wire::{
    read_value, write_value, ByteVecReader, StringReader, StringWriter, U32Reader, U32Writer,
};

use crate::request_log::RequestLog;

/// Reads one string argument and writes it back unchanged. Useful as a
/// smoke test for the wire format and request/reply framing.
#[derive(Default)]
pub struct EchoMethod;

impl Method for EchoMethod {
    fn start(self: Box<Self>, ctx: MethodContext, on_done: Continuation<()>) {
        let log = RequestLog::open(ctx.connection_id, "echo");
        let outbuf = ctx.outbuf.clone();
        read_value::<StringReader>(
            ctx.inbuf.clone(),
            Box::new(move |result| match result {
                Ok(text) => {
                    tracing::debug!(parent: log.span(), bytes = text.len(), "echoing request body");
                    write_value::<StringWriter>(outbuf, text, on_done);
                }
                Err(e) => on_done(Err(e)),
            }),
        );
    }
}

/// Reads a frame id and a chunk of frame payload bytes and writes back
/// the frame id together with the payload's byte length, standing in
/// for the original service's encoded-frame-size reply without pulling
/// in any actual video codec.
#[derive(Default)]
pub struct EncodeFrameMethod;

impl Method for EncodeFrameMethod {
    fn start(self: Box<Self>, ctx: MethodContext, on_done: Continuation<()>) {
        let log = RequestLog::open(ctx.connection_id, "encode_frame");
        let inbuf = ctx.inbuf.clone();
        let outbuf = ctx.outbuf.clone();
        read_value::<U32Reader>(
            ctx.inbuf.clone(),
            Box::new(move |result| match result {
                Ok(frame_id) => read_value::<ByteVecReader>(
                    inbuf,
                    Box::new(move |result| match result {
                        Ok(payload) => {
                            let encoded_size = payload.len() as u32;
                            tracing::debug!(
                                parent: log.span(),
                                frame_id,
                                encoded_size,
                                "encoded frame"
                            );
                            write_frame_reply(outbuf, frame_id, encoded_size, on_done);
                        }
                        Err(e) => on_done(Err(e)),
                    }),
                ),
                Err(e) => on_done(Err(e)),
            }),
        );
    }
}

fn write_frame_reply(
    outbuf: BoundOutbuf,
    frame_id: u32,
    encoded_size: u32,
    on_done: Continuation<()>,
) {
    let outbuf2 = outbuf.clone();
    write_value::<U32Writer>(
        outbuf,
        frame_id,
        Box::new(move |result| match result {
            Ok(()) => write_value::<U32Writer>(outbuf2, encoded_size, on_done),
            Err(e) => on_done(Err(e)),
        }),
    );
}

/// Builds the method map this service exposes.
pub fn build_method_map() -> MethodMap {
    let mut methods = MethodMap::new();
    methods.add_method_factory("echo", default_method_factory::<EchoMethod>());
    methods.add_method_factory("encode_frame", default_method_factory::<EncodeFrameMethod>());
    methods
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_map_knows_both_demo_methods() {
        let methods = build_method_map();
        assert!(methods.instantiate("echo").is_ok());
        assert!(methods.instantiate("encode_frame").is_ok());
        assert!(methods.instantiate("bogus").is_err());
    }
}
