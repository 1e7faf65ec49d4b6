//! The server-side per-connection request handler (spec §4.5 "Server
//! request handler"): reads a method identifier, dispatches to the
//! method map, and writes the reply or an exception frame, then loops
//! for the next request. Requests on one connection are strictly
//! sequential — the next one is not read until the previous reply has
//! been fully flushed (spec §5 "Per-connection ordering").

use std::rc::Rc;
use std::sync::Arc;

use crate::asynch::Continuation;
use crate::buffer::{BoundInbuf, BoundOutbuf, NbInbuf};
use crate::error::Result;
use crate::scheduler::Scheduler;
use crate::wire::{
    is_identifier_continue, is_identifier_start, read_value, write_value, EndOfMessageWriter,
    Progress, WireReader,
};

use super::exception::{ExceptionFrame, ExceptionFrameWriter};
use super::method::{Method, MethodContext, MethodMap};

/// Lifecycle observers the dispatcher attaches to a connection's
/// request loop, so it can tell an idle connection (safe to close
/// immediately on shutdown or eviction) from one mid-request (spec
/// §4.6 "let in-flight requests complete if their connection is still
/// intact"), and gate how many method bodies actually run at once
/// (spec §4.6 "concurrent request" slot). `rpc` itself has no notion
/// of a dispatcher; these hooks are its only outlet for that.
#[derive(Clone)]
pub struct ConnectionHooks {
    pub on_idle: Rc<dyn Fn()>,
    pub on_busy: Rc<dyn Fn()>,
    pub run_method: Rc<dyn Fn(Box<dyn Method>, MethodContext, Continuation<()>)>,
}

impl ConnectionHooks {
    pub fn noop() -> Self {
        ConnectionHooks {
            on_idle: Rc::new(|| {}),
            on_busy: Rc::new(|| {}),
            run_method: Rc::new(|method, ctx, on_done| method.start(ctx, on_done)),
        }
    }
}

enum NamePhase {
    Whitespace,
    Body,
}

/// Drains whatever is left of the request just handled — usually
/// nothing, since a well-behaved method reads exactly its own
/// arguments, but an unknown method never reads its argument list at
/// all — and consumes the trailing `\n`.
///
/// Scanning raw bytes for `\n` without understanding their shape is
/// safe: every wire writer escapes or hex-encodes a literal newline
/// (`StringWriter`'s `\n` escape, `ByteVecWriter`'s hex digits, and so
/// on), so the terminator is the only place a raw `\n` byte can occur
/// on the wire. That makes this reader a correct resync point even
/// after a parse error partway through a request.
struct RequestTerminatorReader;

impl WireReader for RequestTerminatorReader {
    type Value = ();

    fn new() -> Self {
        RequestTerminatorReader
    }

    fn poll(&mut self, inbuf: &mut NbInbuf) -> Result<Progress<()>> {
        loop {
            if !inbuf.readable() {
                return Ok(Progress::Incomplete);
            }
            match inbuf.peek() {
                Some(b'\n') => {
                    inbuf.skip();
                    return Ok(Progress::Complete(()));
                }
                Some(_) => inbuf.skip(),
                None => {
                    return Err(crate::error::Error::Io(std::io::Error::new(
                        std::io::ErrorKind::UnexpectedEof,
                        "connection closed before the request's terminator arrived",
                    )))
                }
            }
        }
    }
}

/// Reads the method identifier that starts a request, or detects a
/// clean close (eof before any byte of a new request has arrived) by
/// resolving to `None` instead of erroring.
struct MethodNameReader {
    phase: NamePhase,
    bytes: Vec<u8>,
}

impl WireReader for MethodNameReader {
    type Value = Option<String>;

    fn new() -> Self {
        MethodNameReader { phase: NamePhase::Whitespace, bytes: Vec::new() }
    }

    fn poll(&mut self, inbuf: &mut NbInbuf) -> Result<Progress<Option<String>>> {
        loop {
            match self.phase {
                NamePhase::Whitespace => {
                    if !inbuf.readable() {
                        return Ok(Progress::Incomplete);
                    }
                    match inbuf.peek() {
                        Some(b'\t') | Some(b'\r') | Some(b' ') => inbuf.skip(),
                        Some(b'\n') => {
                            return Err(crate::error::Error::parse(
                                "expected a method name, found end of message",
                            ))
                        }
                        Some(c) => {
                            if !is_identifier_start(c) {
                                return Err(crate::error::Error::parse(
                                    "expected a method name",
                                ));
                            }
                            self.phase = NamePhase::Body;
                        }
                        None => return Ok(Progress::Complete(None)),
                    }
                }
                NamePhase::Body => {
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
                            return Ok(Progress::Complete(Some(
                                String::from_utf8(bytes).unwrap(),
                            )));
                        }
                    }
                }
            }
        }
    }
}

/// Serves requests on one connection until it closes cleanly or a
/// protocol/IO error makes it unusable. `on_closed` fires exactly once.
pub fn serve_connection(
    inbuf: BoundInbuf,
    outbuf: BoundOutbuf,
    scheduler: Scheduler,
    methods: Arc<MethodMap>,
    hooks: ConnectionHooks,
    connection_id: u64,
    on_closed: Continuation<()>,
) {
    read_next_request(inbuf, outbuf, scheduler, methods, hooks, connection_id, on_closed);
}

fn read_next_request(
    inbuf: BoundInbuf,
    outbuf: BoundOutbuf,
    scheduler: Scheduler,
    methods: Arc<MethodMap>,
    hooks: ConnectionHooks,
    connection_id: u64,
    on_closed: Continuation<()>,
) {
    (hooks.on_idle)();
    let inbuf2 = inbuf.clone();
    let hooks2 = hooks.clone();
    read_value::<MethodNameReader>(
        inbuf,
        Box::new(move |result| match result {
            Ok(Some(name)) => {
                (hooks2.on_busy)();
                dispatch_request(name, inbuf2, outbuf, scheduler, methods, hooks2, connection_id, on_closed)
            }
            Ok(None) => on_closed(Ok(())),
            Err(e) => on_closed(Err(e)),
        }),
    );
}

fn dispatch_request(
    name: String,
    inbuf: BoundInbuf,
    outbuf: BoundOutbuf,
    scheduler: Scheduler,
    methods: Arc<MethodMap>,
    hooks: ConnectionHooks,
    connection_id: u64,
    on_closed: Continuation<()>,
) {
    match methods.instantiate(&name) {
        Ok(method) => {
            let ctx = MethodContext::new(inbuf.clone(), outbuf.clone(), scheduler.clone())
                .with_connection_id(connection_id);
            let inbuf2 = inbuf;
            let outbuf2 = outbuf;
            let scheduler2 = scheduler;
            let run_method = hooks.run_method.clone();
            run_method(
                method,
                ctx,
                Box::new(move |outcome| {
                    consume_request_terminator(
                        outcome, inbuf2, outbuf2, scheduler2, methods, hooks, connection_id, on_closed,
                    )
                }),
            );
        }
        Err(e) => consume_request_terminator(
            Err(e), inbuf, outbuf, scheduler, methods, hooks, connection_id, on_closed,
        ),
    }
}

/// Drains the request's own trailing `\n` (see [`RequestTerminatorReader`])
/// before a reply is written, so the connection is left positioned at
/// the start of the next request rather than mid-terminator — the step
/// a persistent connection needs and a fresh one per call never
/// exercises (spec §4.7, §5 "per-connection ordering").
fn consume_request_terminator(
    outcome: Result<()>,
    inbuf: BoundInbuf,
    outbuf: BoundOutbuf,
    scheduler: Scheduler,
    methods: Arc<MethodMap>,
    hooks: ConnectionHooks,
    connection_id: u64,
    on_closed: Continuation<()>,
) {
    let inbuf2 = inbuf.clone();
    read_value::<RequestTerminatorReader>(
        inbuf,
        Box::new(move |result| match result {
            Ok(()) => finish_request(
                outcome, inbuf2, outbuf, scheduler, methods, hooks, connection_id, on_closed,
            ),
            Err(e) => on_closed(Err(e)),
        }),
    );
}

fn finish_request(
    outcome: Result<()>,
    inbuf: BoundInbuf,
    outbuf: BoundOutbuf,
    scheduler: Scheduler,
    methods: Arc<MethodMap>,
    hooks: ConnectionHooks,
    connection_id: u64,
    on_closed: Continuation<()>,
) {
    match outcome {
        Ok(()) => write_terminator(inbuf, outbuf, scheduler, methods, hooks, connection_id, on_closed),
        Err(e) => {
            let frame = ExceptionFrame::from_error(&e);
            write_value::<ExceptionFrameWriter>(
                outbuf.clone(),
                frame,
                Box::new(move |result| match result {
                    Ok(()) => {
                        write_terminator(inbuf, outbuf, scheduler, methods, hooks, connection_id, on_closed)
                    }
                    Err(write_err) => on_closed(Err(write_err)),
                }),
            );
        }
    }
}

fn write_terminator(
    inbuf: BoundInbuf,
    outbuf: BoundOutbuf,
    scheduler: Scheduler,
    methods: Arc<MethodMap>,
    hooks: ConnectionHooks,
    connection_id: u64,
    on_closed: Continuation<()>,
) {
    let outbuf_for_write = outbuf.clone();
    write_value::<EndOfMessageWriter>(
        outbuf_for_write,
        (),
        Box::new(move |result| match result {
            Ok(()) => flush_and_continue(inbuf, outbuf, scheduler, methods, hooks, connection_id, on_closed),
            Err(e) => on_closed(Err(e)),
        }),
    );
}

fn flush_and_continue(
    inbuf: BoundInbuf,
    outbuf: BoundOutbuf,
    scheduler: Scheduler,
    methods: Arc<MethodMap>,
    hooks: ConnectionHooks,
    connection_id: u64,
    on_closed: Continuation<()>,
) {
    let outbuf2 = outbuf.clone();
    outbuf.flush(Box::new(move |result| match result {
        Ok(()) => read_next_request(inbuf, outbuf2, scheduler, methods, hooks, connection_id, on_closed),
        Err(e) => on_closed(Err(e)),
    }));
}
