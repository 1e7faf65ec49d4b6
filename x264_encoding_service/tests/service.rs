//! End-to-end coverage of the demonstration service's own methods,
//! served by a real `cuti` dispatcher and driven by a real client.

use std::cell::RefCell;
use std::rc::Rc;
use std::thread;

use cuti::cache::NbClientCache;
use cuti::dispatcher::{Dispatcher, DispatcherConfig, DispatcherStopHandle};
use cuti::net::Endpoint;
use cuti::rpc::{call, ClientConfig};
use cuti::scheduler::Scheduler;
use cuti::wire::{ByteVecWriter, StringReader, StringWriter, U32Reader, U32Writer};

use x264_encoding_service::methods::build_method_map;

fn start_service() -> (Endpoint, DispatcherStopHandle, thread::JoinHandle<()>) {
    let mut dispatcher = Dispatcher::new(DispatcherConfig::default());
    let endpoint = dispatcher
        .add_listener(Endpoint::resolve("127.0.0.1:0").unwrap(), build_method_map())
        .unwrap();
    let stop_handle = dispatcher.stop_handle();
    let join = thread::spawn(move || dispatcher.run().unwrap());
    (endpoint, stop_handle, join)
}

#[test]
fn echo_returns_the_same_string_it_was_sent() {
    let (endpoint, stop_handle, join) = start_service();

    let scheduler = Scheduler::new().unwrap();
    let cache = Rc::new(RefCell::new(NbClientCache::new(4)));
    let result = Rc::new(RefCell::new(None));
    let result2 = result.clone();
    call::<StringWriter, StringReader>(
        cache,
        scheduler.clone(),
        ClientConfig::new(4096),
        endpoint,
        "echo".to_string(),
        "frame metadata goes here".to_string(),
        Box::new(move |r| *result2.borrow_mut() = Some(r)),
    );
    scheduler.run();

    assert_eq!(result.borrow_mut().take().unwrap().unwrap(), "frame metadata goes here");

    stop_handle.stop();
    join.join().unwrap();
}

#[test]
fn encode_frame_reports_the_frame_id_and_payload_length() {
    let (endpoint, stop_handle, join) = start_service();

    let scheduler = Scheduler::new().unwrap();
    let cache = Rc::new(RefCell::new(NbClientCache::new(4)));
    let result = Rc::new(RefCell::new(None));
    let result2 = result.clone();

    // The method signature is `(frame_id: u32, payload: bytes) -> (u32,
    // u32)`; encode both arguments with one composite writer so the
    // generic `call` driver can treat them as a single value, mirroring
    // how a hand-written argument-list writer would be built for any
    // multi-argument method.
    let args = (7u32, vec![0xAAu8; 128]);
    call::<EncodeFrameArgsWriter, EncodeFrameReplyReader>(
        cache,
        scheduler.clone(),
        ClientConfig::new(4096),
        endpoint,
        "encode_frame".to_string(),
        args,
        Box::new(move |r| *result2.borrow_mut() = Some(r)),
    );
    scheduler.run();

    let (frame_id, encoded_size) = result.borrow_mut().take().unwrap().unwrap();
    assert_eq!(frame_id, 7);
    assert_eq!(encoded_size, 128);

    stop_handle.stop();
    join.join().unwrap();
}

#[test]
fn unknown_method_name_is_rejected_before_any_dispatcher_work_runs() {
    let (endpoint, stop_handle, join) = start_service();

    let scheduler = Scheduler::new().unwrap();
    let cache = Rc::new(RefCell::new(NbClientCache::new(4)));
    let result = Rc::new(RefCell::new(None));
    let result2 = result.clone();
    call::<StringWriter, StringReader>(
        cache,
        scheduler.clone(),
        ClientConfig::new(4096),
        endpoint,
        "decode_frame".to_string(),
        "not a real method".to_string(),
        Box::new(move |r| *result2.borrow_mut() = Some(r)),
    );
    scheduler.run();

    assert!(result.borrow_mut().take().unwrap().is_err());

    stop_handle.stop();
    join.join().unwrap();
}

// Minimal hand-written composite writer/reader pair for `encode_frame`'s
// two-argument request and two-value reply, the same way a generated or
// hand-written RPC stub would compose wire primitives for a method with
// more than one argument (spec §4.4 composes this way; `cuti` itself
// never auto-derives it from a method signature).

use cuti::buffer::{NbInbuf, NbOutbuf};
use cuti::error::Result;
use cuti::wire::{Progress, WireReader, WireWriter};

struct EncodeFrameArgsWriter {
    frame_id: U32Writer,
    payload: Option<ByteVecWriter>,
    payload_value: Option<Vec<u8>>,
}

impl WireWriter for EncodeFrameArgsWriter {
    type Value = (u32, Vec<u8>);

    fn new(value: (u32, Vec<u8>)) -> Self {
        EncodeFrameArgsWriter {
            frame_id: U32Writer::new(value.0),
            payload: None,
            payload_value: Some(value.1),
        }
    }

    fn poll(&mut self, outbuf: &mut NbOutbuf) -> Result<Progress<()>> {
        loop {
            if self.payload.is_none() {
                match self.frame_id.poll(outbuf)? {
                    Progress::Incomplete => return Ok(Progress::Incomplete),
                    Progress::Complete(()) => {
                        self.payload = Some(ByteVecWriter::new(self.payload_value.take().unwrap()));
                    }
                }
            } else {
                return self.payload.as_mut().unwrap().poll(outbuf);
            }
        }
    }
}

enum ReplyPhase {
    FrameId,
    EncodedSize,
}

struct EncodeFrameReplyReader {
    phase: ReplyPhase,
    frame_id: U32Reader,
    encoded_size: U32Reader,
    frame_id_value: u32,
}

impl WireReader for EncodeFrameReplyReader {
    type Value = (u32, u32);

    fn new() -> Self {
        EncodeFrameReplyReader {
            phase: ReplyPhase::FrameId,
            frame_id: U32Reader::new(),
            encoded_size: U32Reader::new(),
            frame_id_value: 0,
        }
    }

    fn poll(&mut self, inbuf: &mut NbInbuf) -> Result<Progress<(u32, u32)>> {
        loop {
            match self.phase {
                ReplyPhase::FrameId => match self.frame_id.poll(inbuf)? {
                    Progress::Incomplete => return Ok(Progress::Incomplete),
                    Progress::Complete(v) => {
                        self.frame_id_value = v;
                        self.phase = ReplyPhase::EncodedSize;
                    }
                },
                ReplyPhase::EncodedSize => match self.encoded_size.poll(inbuf)? {
                    Progress::Incomplete => return Ok(Progress::Incomplete),
                    Progress::Complete(v) => return Ok(Progress::Complete((self.frame_id_value, v))),
                },
            }
        }
    }
}
