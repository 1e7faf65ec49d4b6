//! Booleans and integers (spec §4.4 "Primitives").
//!
//! Grounded on the original's `digits_reader_t<T>` / `unsigned_reader_t<T>`
//! / `signed_reader_t<T>`: whitespace, then an optional sign, then digits
//! accumulated against an overflow bound, with the most-negative signed
//! value handled via the unsigned-max-plus-one encoding so no step ever
//! overflows the accumulator.

use std::marker::PhantomData;

use crate::buffer::{NbInbuf, NbOutbuf};
use crate::error::{Error, Result};

use super::progress::{skip_whitespace, unexpected_eof, Progress};
use super::reader::WireReader;
use super::writer::{BytesWriter, WireWriter};

/// A width cuti can read/write as an unsigned decimal token.
pub trait WireUint: Copy + 'static {
    const MAX_U64: u64;
    fn from_u64(v: u64) -> Self;
    fn to_u64(self) -> u64;
}

/// A width cuti can read/write as a signed decimal token.
pub trait WireInt: Copy + 'static {
    const MAX_U64: u64;
    const MAX_MAGNITUDE_U64: u64;
    fn from_magnitude(unsigned_value: u64, negative: bool) -> Self;
    fn to_magnitude(self) -> (u64, bool);
}

macro_rules! impl_wire_uint {
    ($t:ty) => {
        impl WireUint for $t {
            const MAX_U64: u64 = <$t>::MAX as u64;
            fn from_u64(v: u64) -> Self {
                v as $t
            }
            fn to_u64(self) -> u64 {
                self as u64
            }
        }
    };
}
impl_wire_uint!(u16);
impl_wire_uint!(u32);
impl_wire_uint!(u64);

macro_rules! impl_wire_int {
    ($t:ty) => {
        impl WireInt for $t {
            const MAX_U64: u64 = <$t>::MAX as u64;
            const MAX_MAGNITUDE_U64: u64 = <$t>::MAX as u64 + 1;
            fn from_magnitude(unsigned_value: u64, negative: bool) -> Self {
                if !negative || unsigned_value == 0 {
                    unsigned_value as $t
                } else {
                    let magnitude_minus_one = (unsigned_value - 1) as $t;
                    (-magnitude_minus_one) - 1
                }
            }
            fn to_magnitude(self) -> (u64, bool) {
                if self >= 0 {
                    (self as u64, false)
                } else {
                    let magnitude_minus_one = -(self + 1);
                    (magnitude_minus_one as u64 + 1, true)
                }
            }
        }
    };
}
impl_wire_int!(i16);
impl_wire_int!(i32);
impl_wire_int!(i64);

/// Reads a run of ASCII digits against an overflow bound `max`,
/// rejecting leading zeros other than the bare value `0` (spec §4.4).
struct DigitsReader {
    digit_count: u32,
    leading_zero: bool,
    value: u64,
}

impl DigitsReader {
    fn new() -> Self {
        DigitsReader { digit_count: 0, leading_zero: false, value: 0 }
    }

    fn poll(&mut self, inbuf: &mut NbInbuf, max: u64) -> Result<Progress<u64>> {
        loop {
            if !inbuf.readable() {
                return Ok(Progress::Incomplete);
            }
            match inbuf.peek() {
                Some(b) if b.is_ascii_digit() => {
                    if self.digit_count == 0 && b == b'0' {
                        inbuf.skip();
                        self.digit_count = 1;
                        self.leading_zero = true;
                        continue;
                    }
                    if self.leading_zero {
                        return Err(Error::parse("integer has a leading zero"));
                    }
                    let d = (b - b'0') as u64;
                    if self.value > (max - d) / 10 {
                        return Err(Error::parse("integer overflows target width"));
                    }
                    self.value = self.value * 10 + d;
                    self.digit_count += 1;
                    inbuf.skip();
                }
                _ => {
                    if self.digit_count == 0 {
                        return Err(Error::parse("expected a digit"));
                    }
                    return Ok(Progress::Complete(self.value));
                }
            }
        }
    }
}

enum Phase {
    Whitespace,
    Digits,
}

pub struct UnsignedReader<T: WireUint> {
    phase: Phase,
    digits: DigitsReader,
    _marker: PhantomData<T>,
}

impl<T: WireUint> WireReader for UnsignedReader<T> {
    type Value = T;

    fn new() -> Self {
        UnsignedReader { phase: Phase::Whitespace, digits: DigitsReader::new(), _marker: PhantomData }
    }

    fn poll(&mut self, inbuf: &mut NbInbuf) -> Result<Progress<T>> {
        loop {
            match self.phase {
                Phase::Whitespace => match skip_whitespace(inbuf)? {
                    Progress::Incomplete => return Ok(Progress::Incomplete),
                    Progress::Complete(None) => return Err(unexpected_eof()),
                    Progress::Complete(Some(_)) => self.phase = Phase::Digits,
                },
                Phase::Digits => match self.digits.poll(inbuf, T::MAX_U64)? {
                    Progress::Incomplete => return Ok(Progress::Incomplete),
                    Progress::Complete(v) => return Ok(Progress::Complete(T::from_u64(v))),
                },
            }
        }
    }
}

pub struct SignedReader<T: WireInt> {
    phase: Phase,
    digits: DigitsReader,
    negative: bool,
    _marker: PhantomData<T>,
}

impl<T: WireInt> WireReader for SignedReader<T> {
    type Value = T;

    fn new() -> Self {
        SignedReader {
            phase: Phase::Whitespace,
            digits: DigitsReader::new(),
            negative: false,
            _marker: PhantomData,
        }
    }

    fn poll(&mut self, inbuf: &mut NbInbuf) -> Result<Progress<T>> {
        loop {
            match self.phase {
                Phase::Whitespace => match skip_whitespace(inbuf)? {
                    Progress::Incomplete => return Ok(Progress::Incomplete),
                    Progress::Complete(None) => return Err(unexpected_eof()),
                    Progress::Complete(Some(c)) => {
                        if c == b'-' {
                            self.negative = true;
                            inbuf.skip();
                        }
                        self.phase = Phase::Digits;
                    }
                },
                Phase::Digits => {
                    let max = if self.negative { T::MAX_MAGNITUDE_U64 } else { T::MAX_U64 };
                    match self.digits.poll(inbuf, max)? {
                        Progress::Incomplete => return Ok(Progress::Incomplete),
                        Progress::Complete(unsigned_value) => {
                            return Ok(Progress::Complete(T::from_magnitude(unsigned_value, self.negative)));
                        }
                    }
                }
            }
        }
    }
}

fn push_decimal(out: &mut Vec<u8>, mut v: u64) {
    if v == 0 {
        out.push(b'0');
        return;
    }
    let start = out.len();
    while v > 0 {
        out.push(b'0' + (v % 10) as u8);
        v /= 10;
    }
    out[start..].reverse();
}

pub struct UnsignedWriter<T: WireUint> {
    bytes: BytesWriter,
    _marker: PhantomData<T>,
}

impl<T: WireUint> WireWriter for UnsignedWriter<T> {
    type Value = T;

    fn new(value: T) -> Self {
        let mut bytes = Vec::with_capacity(21);
        bytes.push(b' ');
        push_decimal(&mut bytes, value.to_u64());
        UnsignedWriter { bytes: BytesWriter::new(bytes), _marker: PhantomData }
    }

    fn poll(&mut self, outbuf: &mut NbOutbuf) -> Result<Progress<()>> {
        self.bytes.poll(outbuf)
    }
}

pub struct SignedWriter<T: WireInt> {
    bytes: BytesWriter,
    _marker: PhantomData<T>,
}

impl<T: WireInt> WireWriter for SignedWriter<T> {
    type Value = T;

    fn new(value: T) -> Self {
        let (magnitude, negative) = value.to_magnitude();
        let mut bytes = Vec::with_capacity(22);
        bytes.push(b' ');
        if negative {
            bytes.push(b'-');
        }
        push_decimal(&mut bytes, magnitude);
        SignedWriter { bytes: BytesWriter::new(bytes), _marker: PhantomData }
    }

    fn poll(&mut self, outbuf: &mut NbOutbuf) -> Result<Progress<()>> {
        self.bytes.poll(outbuf)
    }
}

pub struct BoolReader {
    phase: Phase,
}

impl WireReader for BoolReader {
    type Value = bool;

    fn new() -> Self {
        BoolReader { phase: Phase::Whitespace }
    }

    fn poll(&mut self, inbuf: &mut NbInbuf) -> Result<Progress<bool>> {
        match skip_whitespace(inbuf)? {
            Progress::Incomplete => Ok(Progress::Incomplete),
            Progress::Complete(None) => Err(unexpected_eof()),
            Progress::Complete(Some(b'*')) => {
                inbuf.skip();
                Ok(Progress::Complete(true))
            }
            Progress::Complete(Some(b'!')) => {
                inbuf.skip();
                Ok(Progress::Complete(false))
            }
            Progress::Complete(Some(_)) => Err(Error::parse("expected '*' or '!'")),
        }
    }
}

pub struct BoolWriter {
    bytes: BytesWriter,
}

impl WireWriter for BoolWriter {
    type Value = bool;

    fn new(value: bool) -> Self {
        BoolWriter { bytes: BytesWriter::new(vec![b' ', if value { b'*' } else { b'!' }]) }
    }

    fn poll(&mut self, outbuf: &mut NbOutbuf) -> Result<Progress<()>> {
        self.bytes.poll(outbuf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn i64_min_round_trips_through_magnitude_encoding() {
        let (magnitude, negative) = i64::MIN.to_magnitude();
        assert!(negative);
        assert_eq!(magnitude, 1u64 << 63);
        assert_eq!(i64::from_magnitude(magnitude, negative), i64::MIN);
    }

    #[test]
    fn positive_values_round_trip_through_magnitude_encoding() {
        for v in [0i64, 1, 41, i64::MAX] {
            let (magnitude, negative) = v.to_magnitude();
            assert_eq!(i64::from_magnitude(magnitude, negative), v);
        }
    }

    #[test]
    fn negative_values_round_trip_through_magnitude_encoding() {
        for v in [-1i32, -2, -127, i32::MIN] {
            let (magnitude, negative) = v.to_magnitude();
            assert_eq!(i32::from_magnitude(magnitude, negative), v);
        }
    }

    #[test]
    fn push_decimal_matches_standard_formatting() {
        for v in [0u64, 7, 42, 18_446_744_073_709_551_615] {
            let mut out = Vec::new();
            push_decimal(&mut out, v);
            assert_eq!(String::from_utf8(out).unwrap(), v.to_string());
        }
    }
}
