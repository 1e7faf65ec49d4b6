//! The RPC client (spec §4.5 "Client (rpc_client)"): obtains a cached
//! connection (or opens a new one), writes a request, reads the
//! reply, and returns either the decoded result or the server's
//! reported exception. A failed call is never returned to the cache,
//! and every other idle connection to the same endpoint is dropped
//! with it.

use std::cell::RefCell;
use std::rc::Rc;

use crate::asynch::Continuation;
use crate::buffer::{BoundInbuf, BoundOutbuf, NbInbuf, NbOutbuf, ThroughputSettings};
use crate::cache::{NbClient, NbClientCache};
use crate::error::{Error, Result};
use crate::net::{Endpoint, TcpConnection};
use crate::scheduler::Scheduler;
use crate::wire::{
    read_value, write_value, EndOfMessageReader, EndOfMessageWriter, IdentifierWriter, WireReader,
    WireWriter,
};

use super::exception::{ExceptionFrameReader, ReplyKind, ReplyKindProbe};

/// Connection sizing shared by every client call against one cache.
#[derive(Debug, Clone, Copy)]
pub struct ClientConfig {
    pub bufsize: usize,
    pub throughput: Option<ThroughputSettings>,
}

impl ClientConfig {
    pub fn new(bufsize: usize) -> Self {
        ClientConfig { bufsize, throughput: None }
    }
}

/// Invokes `method` at `endpoint`, writing `args` with `A` and reading
/// the result with `R`. `A`/`R` are ordinarily hand-written composite
/// writers/readers covering a method's whole argument or result list
/// (built from the primitives in [`crate::wire`] the same way
/// [`super::exception::ExceptionFrameReader`] composes its fields).
pub fn call<A, R>(
    cache: Rc<RefCell<NbClientCache>>,
    scheduler: Scheduler,
    config: ClientConfig,
    endpoint: Endpoint,
    method: String,
    args: A::Value,
    cont: Continuation<R::Value>,
) where
    A: WireWriter + 'static,
    A::Value: 'static,
    R: WireReader + 'static,
    R::Value: 'static,
{
    let client = match cache.borrow_mut().obtain(endpoint) {
        Some(client) => client,
        None => match connect(&scheduler, endpoint, config) {
            Ok(client) => Rc::new(client),
            Err(e) => return cont(Err(e)),
        },
    };
    write_request::<A, R>(cache, client, method, args, cont);
}

fn connect(scheduler: &Scheduler, endpoint: Endpoint, config: ClientConfig) -> Result<NbClient> {
    let read_half = TcpConnection::connect(endpoint)?;
    read_half.set_nodelay(true)?;
    let write_half = read_half.try_clone()?;
    let inbuf = NbInbuf::new(scheduler, read_half, config.bufsize, config.throughput)?;
    let outbuf = NbOutbuf::new(scheduler, write_half, config.bufsize, config.throughput)?;
    Ok(NbClient::new(
        endpoint,
        BoundInbuf::new(inbuf, scheduler.clone()),
        BoundOutbuf::new(outbuf, scheduler.clone()),
    ))
}

fn write_request<A, R>(
    cache: Rc<RefCell<NbClientCache>>,
    client: Rc<NbClient>,
    method: String,
    args: A::Value,
    cont: Continuation<R::Value>,
) where
    A: WireWriter + 'static,
    A::Value: 'static,
    R: WireReader + 'static,
    R::Value: 'static,
{
    let outbuf = client.outbuf.clone();
    write_value::<IdentifierWriter>(
        outbuf,
        method,
        Box::new(move |result| match result {
            Ok(()) => write_args::<A, R>(cache, client, args, cont),
            Err(e) => fail(cache, client.endpoint, e, cont),
        }),
    );
}

fn write_args<A, R>(
    cache: Rc<RefCell<NbClientCache>>,
    client: Rc<NbClient>,
    args: A::Value,
    cont: Continuation<R::Value>,
) where
    A: WireWriter + 'static,
    A::Value: 'static,
    R: WireReader + 'static,
    R::Value: 'static,
{
    let outbuf = client.outbuf.clone();
    write_value::<A>(
        outbuf,
        args,
        Box::new(move |result| match result {
            Ok(()) => write_request_terminator::<R>(cache, client, cont),
            Err(e) => fail(cache, client.endpoint, e, cont),
        }),
    );
}

fn write_request_terminator<R>(
    cache: Rc<RefCell<NbClientCache>>,
    client: Rc<NbClient>,
    cont: Continuation<R::Value>,
) where
    R: WireReader + 'static,
    R::Value: 'static,
{
    let outbuf = client.outbuf.clone();
    write_value::<EndOfMessageWriter>(
        outbuf,
        (),
        Box::new(move |result| match result {
            Ok(()) => flush_request::<R>(cache, client, cont),
            Err(e) => fail(cache, client.endpoint, e, cont),
        }),
    );
}

fn flush_request<R>(cache: Rc<RefCell<NbClientCache>>, client: Rc<NbClient>, cont: Continuation<R::Value>)
where
    R: WireReader + 'static,
    R::Value: 'static,
{
    let endpoint = client.endpoint;
    client.outbuf.clone().flush(Box::new(move |result| match result {
        Ok(()) => read_reply::<R>(cache, client, cont),
        Err(e) => fail(cache, endpoint, e, cont),
    }));
}

fn read_reply<R>(cache: Rc<RefCell<NbClientCache>>, client: Rc<NbClient>, cont: Continuation<R::Value>)
where
    R: WireReader + 'static,
    R::Value: 'static,
{
    let inbuf = client.inbuf.clone();
    read_value::<ReplyKindProbe>(
        inbuf,
        Box::new(move |result| match result {
            Ok(ReplyKind::Exception) => read_exception::<R>(cache, client, cont),
            Ok(ReplyKind::Value) => read_result::<R>(cache, client, cont),
            Err(e) => fail(cache, client.endpoint, e, cont),
        }),
    );
}

fn read_exception<R>(cache: Rc<RefCell<NbClientCache>>, client: Rc<NbClient>, cont: Continuation<R::Value>)
where
    R: WireReader + 'static,
    R::Value: 'static,
{
    let inbuf = client.inbuf.clone();
    read_value::<ExceptionFrameReader>(
        inbuf,
        Box::new(move |result| match result {
            Ok(frame) => {
                let endpoint = client.endpoint;
                let error = Error::protocol(format!("{}: {}", frame.kind, frame.message));
                read_terminator_then(cache, client, endpoint, Err(error), cont)
            }
            Err(e) => fail(cache, client.endpoint, e, cont),
        }),
    );
}

fn read_result<R>(cache: Rc<RefCell<NbClientCache>>, client: Rc<NbClient>, cont: Continuation<R::Value>)
where
    R: WireReader + 'static,
    R::Value: 'static,
{
    let inbuf = client.inbuf.clone();
    read_value::<R>(
        inbuf,
        Box::new(move |result| {
            let endpoint = client.endpoint;
            match result {
                Ok(value) => read_terminator_then(cache, client, endpoint, Ok(value), cont),
                Err(e) => fail(cache, endpoint, e, cont),
            }
        }),
    );
}

/// Consumes the reply's trailing `\n` and, since the framing stayed
/// intact, returns the connection to the cache — even when `outcome`
/// itself is the `Err` built from a server-reported exception frame.
/// Only a framing-level failure here (the terminator itself not
/// arriving cleanly) evicts the connection.
fn read_terminator_then<T: 'static>(
    cache: Rc<RefCell<NbClientCache>>,
    client: Rc<NbClient>,
    endpoint: Endpoint,
    outcome: Result<T>,
    cont: Continuation<T>,
) {
    let inbuf = client.inbuf.clone();
    read_value::<EndOfMessageReader>(
        inbuf,
        Box::new(move |result| match result {
            Ok(()) => {
                cache.borrow_mut().store(client);
                cont(outcome)
            }
            Err(e) => fail(cache, endpoint, e, cont),
        }),
    );
}

fn fail<T>(cache: Rc<RefCell<NbClientCache>>, endpoint: Endpoint, error: Error, cont: Continuation<T>) {
    cache.borrow_mut().invalidate_entries(endpoint);
    cont(Err(error));
}
