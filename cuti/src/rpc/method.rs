//! Methods and method maps (spec §4.5 "Server request handler").
//!
//! A method owns the request's argument list and its own result
//! writer: it reads its arguments from the bound inbuf, does its work,
//! writes a success reply to the bound outbuf with the same
//! serializers the client used to encode the request, and reports
//! back to the handler via `on_done`. The handler only ever sees
//! whether the method succeeded or failed — a failure is turned into
//! an exception frame by the caller, never by the method itself.

use std::collections::HashMap;

use crate::asynch::Continuation;
use crate::buffer::{BoundInbuf, BoundOutbuf};
use crate::error::{Error, Result};
use crate::scheduler::Scheduler;

/// Everything a method needs to read its arguments and write its
/// reply: the connection's bound buffers and the worker scheduler they
/// were created against.
#[derive(Clone)]
pub struct MethodContext {
    pub inbuf: BoundInbuf,
    pub outbuf: BoundOutbuf,
    pub scheduler: Scheduler,
    /// Identifies the connection this request arrived on, scoped to
    /// the worker thread serving it (spec §4.6 assigns connection ids
    /// per worker, not dispatcher-wide). `0` when a method runs
    /// outside a dispatcher (e.g. a unit test driving it directly).
    pub connection_id: u64,
}

impl MethodContext {
    pub fn new(inbuf: BoundInbuf, outbuf: BoundOutbuf, scheduler: Scheduler) -> Self {
        MethodContext { inbuf, outbuf, scheduler, connection_id: 0 }
    }

    pub fn with_connection_id(mut self, connection_id: u64) -> Self {
        self.connection_id = connection_id;
        self
    }
}

/// A single RPC method invocation. `start` is expected to read its
/// arguments from `ctx.inbuf`, perform the call's work, write a result
/// list to `ctx.outbuf` on success, and invoke `on_done` exactly once
/// with the outcome. On `Err`, nothing the method wrote to `ctx.outbuf`
/// is assumed complete; the handler discards it and writes an
/// exception frame instead.
pub trait Method {
    fn start(self: Box<Self>, ctx: MethodContext, on_done: Continuation<()>);
}

/// Builds a fresh [`Method`] instance per request. `Send + Sync` so a
/// [`MethodMap`] can be shared (via `Arc`) across the dispatcher's
/// worker threads — each worker calls the factory on its own thread to
/// produce a `Method` that then lives out its life there.
pub type MethodFactory = Box<dyn Fn() -> Box<dyn Method> + Send + Sync>;

/// A factory for any `Method` that can be constructed with no
/// arguments — the common case for handlers that hold no state beyond
/// what they read per-request.
pub fn default_method_factory<M>() -> MethodFactory
where
    M: Method + Default + 'static,
{
    Box::new(|| Box::new(M::default()))
}

/// Name-to-factory table consulted by the server request handler.
/// Lookup is by strict string equality; there is no prefix or fuzzy
/// matching.
#[derive(Default)]
pub struct MethodMap {
    factories: HashMap<String, MethodFactory>,
}

impl MethodMap {
    pub fn new() -> Self {
        MethodMap { factories: HashMap::new() }
    }

    pub fn add_method_factory(&mut self, name: impl Into<String>, factory: MethodFactory) {
        self.factories.insert(name.into(), factory);
    }

    pub fn instantiate(&self, name: &str) -> Result<Box<dyn Method>> {
        match self.factories.get(name) {
            Some(factory) => Ok(factory()),
            None => Err(Error::UnknownMethod(name.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct NoopMethod;

    impl Method for NoopMethod {
        fn start(self: Box<Self>, _ctx: MethodContext, on_done: Continuation<()>) {
            on_done(Ok(()));
        }
    }

    #[test]
    fn lookup_of_unregistered_name_is_unknown_method() {
        let map = MethodMap::new();
        let err = match map.instantiate("frobnicate") {
            Err(e) => e,
            Ok(_) => panic!("expected an error"),
        };
        assert_eq!(err.kind(), crate::error::ErrorKind::UnknownMethod);
    }

    #[test]
    fn registered_factory_instantiates_fresh_methods() {
        let mut map = MethodMap::new();
        map.add_method_factory("noop", default_method_factory::<NoopMethod>());
        assert!(map.instantiate("noop").is_ok());
        assert!(map.instantiate("noop").is_ok());
    }
}
