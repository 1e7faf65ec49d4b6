//! Wire format round trips driven against a real scheduler and a real
//! loopback socket (spec §4.4, §8 "round-trip guarantees").

mod support;

use std::cell::RefCell;
use std::rc::Rc;

use cuti::buffer::{BoundInbuf, BoundOutbuf, NbInbuf, NbOutbuf};
use cuti::scheduler::Scheduler;
use cuti::wire::{
    read_value, write_value, ByteVecReader, ByteVecWriter, I32Reader, SequenceReader,
    SequenceWriter, StringReader, StringWriter, U32Reader, U32Writer,
};

fn harness() -> (Scheduler, std::net::TcpStream, BoundInbuf, BoundOutbuf) {
    let scheduler = Scheduler::new().unwrap();
    let (std_stream, server_conn) = support::loopback();
    let write_half = server_conn.try_clone().unwrap();
    let inbuf = NbInbuf::new(&scheduler, server_conn, 256, None).unwrap();
    let outbuf = NbOutbuf::new(&scheduler, write_half, 256, None).unwrap();
    let bound_in = BoundInbuf::new(inbuf, scheduler.clone());
    let bound_out = BoundOutbuf::new(outbuf, scheduler.clone());
    (scheduler, std_stream, bound_in, bound_out)
}

#[test]
fn string_written_by_server_is_read_raw_by_the_test_client() {
    use std::io::Read;

    let (scheduler, mut std_stream, _bound_in, bound_out) = harness();
    write_value::<StringWriter>(
        bound_out.clone(),
        "hello\tworld".to_string(),
        Box::new(|r| r.unwrap()),
    );
    bound_out.flush(Box::new(|r| r.unwrap()));
    scheduler.run();

    let mut buf = [0u8; 64];
    let n = std_stream.read(&mut buf).unwrap();
    assert_eq!(&buf[..n], b" \"hello\\tworld\"");
}

#[test]
fn signed_integer_sent_raw_by_the_test_client_is_read_back_correctly() {
    use std::io::Write;

    let (scheduler, mut std_stream, bound_in, _bound_out) = harness();
    std_stream.write_all(b" -42").unwrap();
    std_stream.shutdown(std::net::Shutdown::Write).unwrap();

    let result = Rc::new(RefCell::new(None));
    let result2 = result.clone();
    read_value::<I32Reader>(bound_in, Box::new(move |r| *result2.borrow_mut() = Some(r)));
    scheduler.run();

    assert_eq!(result.borrow_mut().take().unwrap().unwrap(), -42);
}

#[test]
fn byte_vec_round_trips_through_a_real_socket() {
    use std::io::{Read, Write};

    let (scheduler, mut std_stream, bound_in, bound_out) = harness();
    let payload = vec![0x00u8, 0x01, 0xfe, 0xff];
    write_value::<ByteVecWriter>(bound_out.clone(), payload.clone(), Box::new(|r| r.unwrap()));
    bound_out.flush(Box::new(|r| r.unwrap()));
    scheduler.run();

    let mut raw = Vec::new();
    std_stream.read_to_end(&mut raw).ok();

    // Bounce the captured bytes straight back in as the reader's input,
    // the same bytes a peer would have received off the wire.
    std_stream.write_all(&raw).unwrap();
    std_stream.shutdown(std::net::Shutdown::Write).unwrap();

    let result = Rc::new(RefCell::new(None));
    let result2 = result.clone();
    read_value::<ByteVecReader>(bound_in, Box::new(move |r| *result2.borrow_mut() = Some(r)));
    scheduler.run();

    assert_eq!(result.borrow_mut().take().unwrap().unwrap(), payload);
}

#[test]
fn sequence_of_u32_round_trips_through_a_real_socket() {
    use std::io::{Read, Write};

    let (scheduler, mut std_stream, _bound_in, bound_out) = harness();
    let values: Vec<u32> = vec![1, 2, 3, 1000];
    write_value::<SequenceWriter<U32Writer>>(
        bound_out.clone(),
        values.clone(),
        Box::new(|r| r.unwrap()),
    );
    bound_out.flush(Box::new(|r| r.unwrap()));
    scheduler.run();

    let mut raw = Vec::new();
    std_stream.read_to_end(&mut raw).ok();

    // Check the reader side independently, against a second loopback pair
    // fed the bytes the writer above produced.
    let scheduler2 = Scheduler::new().unwrap();
    let (mut std_stream2, server_conn2) = support::loopback();
    let inbuf2 = NbInbuf::new(&scheduler2, server_conn2, 256, None).unwrap();
    let bound_in2 = BoundInbuf::new(inbuf2, scheduler2.clone());
    std_stream2.write_all(&raw).unwrap();
    std_stream2.shutdown(std::net::Shutdown::Write).unwrap();

    let result = Rc::new(RefCell::new(None));
    let result2 = result.clone();
    read_value::<SequenceReader<U32Reader>>(
        bound_in2,
        Box::new(move |r| *result2.borrow_mut() = Some(r)),
    );
    scheduler2.run();

    assert_eq!(result.borrow_mut().take().unwrap().unwrap(), values);
}
