//! [`CircularBuffer`]: a fixed-capacity byte ring split into a contiguous
//! *data* region (readable bytes, in order) and a contiguous *slack*
//! region (writable space) — spec §3.
//!
//! Both regions may wrap around the end of the backing storage, in which
//! case they consist of two contiguous blocks; the buffer only exposes
//! the *first* block of each region directly, mirroring the original
//! `circular_buffer_t`'s `begin_data()/end_data()` and
//! `begin_slack()/end_slack()` pair. `reserve` grows the buffer in place
//! while preserving the data region's contents and order.
//!
//! Invariant: `capacity() == data_len() + slack_len()`. When `capacity()`
//! is nonzero, exactly one of `has_data()`/`has_slack()` is false only
//! when the other covers the whole buffer; at least one is always true.

pub struct CircularBuffer {
    buf: Vec<u8>,
    /// Offset of the first byte of the data region.
    data_start: usize,
    /// Offset of the first byte of the slack region.
    slack_start: usize,
    /// `true` iff the data region is empty. Needed to disambiguate
    /// `data_start == slack_start` (which otherwise means either "no
    /// data" or "no slack").
    empty: bool,
}

impl CircularBuffer {
    pub fn new(capacity: usize) -> Self {
        CircularBuffer {
            buf: vec![0u8; capacity],
            data_start: 0,
            slack_start: 0,
            empty: true,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    pub fn data_len(&self) -> usize {
        if self.empty {
            0
        } else if self.data_start < self.slack_start {
            self.slack_start - self.data_start
        } else {
            (self.capacity() - self.data_start) + self.slack_start
        }
    }

    pub fn slack_len(&self) -> usize {
        if self.empty {
            self.capacity()
        } else if self.slack_start <= self.data_start {
            self.data_start - self.slack_start
        } else {
            (self.capacity() - self.slack_start) + self.data_start
        }
    }

    pub fn has_data(&self) -> bool {
        !self.empty
    }

    pub fn has_slack(&self) -> bool {
        if self.empty {
            self.capacity() != 0
        } else {
            self.slack_start != self.data_start
        }
    }

    fn end_of_first_data_block(&self) -> usize {
        if self.empty || self.data_start < self.slack_start {
            self.slack_start
        } else {
            self.capacity()
        }
    }

    fn end_of_first_slack_block(&self) -> usize {
        if self.empty || self.slack_start > self.data_start {
            self.capacity()
        } else {
            self.data_start
        }
    }

    /// The first contiguous readable block. Empty if `!has_data()`.
    pub fn readable_slice(&self) -> &[u8] {
        &self.buf[self.data_start..self.end_of_first_data_block()]
    }

    /// The first contiguous writable block. Empty if `!has_slack()`.
    pub fn writable_slice(&mut self) -> &mut [u8] {
        let end = self.end_of_first_slack_block();
        &mut self.buf[self.slack_start..end]
    }

    /// Moves `n` bytes from the front of [`writable_slice`] into the data
    /// region (spec: `push_back`). `n` must not exceed
    /// `writable_slice().len()`.
    pub fn commit_written(&mut self, n: usize) {
        let max = self.end_of_first_slack_block() - self.slack_start;
        assert!(n <= max, "commit_written({n}) exceeds first slack block ({max})");
        if n != 0 {
            self.empty = false;
            let until = self.slack_start + n;
            self.slack_start = if until != self.capacity() { until } else { 0 };
        }
    }

    /// Moves `n` bytes from the front of [`readable_slice`] back into the
    /// slack region (spec: `pop_front`). Resets to the initial all-slack
    /// state once the data region becomes empty.
    pub fn consume(&mut self, n: usize) {
        let max = self.end_of_first_data_block() - self.data_start;
        assert!(n <= max, "consume({n}) exceeds first data block ({max})");
        if n != 0 {
            let until = self.data_start + n;
            self.data_start = if until != self.capacity() { until } else { 0 };
            if self.data_start == self.slack_start {
                self.empty = true;
                self.data_start = 0;
                self.slack_start = 0;
            }
        }
    }

    /// Grows (or shrinks, down to `data_len()`) the buffer's capacity,
    /// preserving the data region's bytes and order. No effect if
    /// `capacity < self.data_len()`.
    pub fn reserve(&mut self, capacity: usize) {
        let data_len = self.data_len();
        if capacity < data_len {
            return;
        }
        let mut new_buf = vec![0u8; capacity];
        let first = self.readable_slice();
        let first_len = first.len();
        new_buf[..first_len].copy_from_slice(first);
        if first_len < data_len {
            let second_len = data_len - first_len;
            // Second data block, if any, lives at the start of the
            // backing storage (data wrapped around).
            new_buf[first_len..data_len].copy_from_slice(&self.buf[0..second_len]);
        }
        self.buf = new_buf;
        self.data_start = 0;
        self.slack_start = if data_len != capacity { data_len } else { 0 };
        self.empty = data_len == 0;
    }

    /// Copies every readable byte out, in order, without consuming them.
    /// Used by `Clone` and by tests; not part of the hot read/write path.
    pub fn copy_data(&self) -> Vec<u8> {
        let data_len = self.data_len();
        let mut out = Vec::with_capacity(data_len);
        let first = self.readable_slice();
        out.extend_from_slice(first);
        if first.len() < data_len {
            out.extend_from_slice(&self.buf[0..data_len - first.len()]);
        }
        out
    }
}

impl Clone for CircularBuffer {
    /// Mirrors the original's copy semantics: only the *data* area is
    /// part of the copied state, the slack area is scratch memory and is
    /// not copied (SPEC_FULL.md §3.1).
    fn clone(&self) -> Self {
        let data = self.copy_data();
        let mut copy = CircularBuffer::new(self.capacity());
        copy.writable_slice()[..data.len()].copy_from_slice(&data);
        copy.commit_written(data.len());
        copy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_buffer_is_all_slack() {
        let mut buf = CircularBuffer::new(8);
        assert_eq!(buf.capacity(), 8);
        assert_eq!(buf.data_len(), 0);
        assert_eq!(buf.slack_len(), 8);
        assert!(!buf.has_data());
        assert!(buf.has_slack());
    }

    #[test]
    fn write_then_read_round_trips_and_wraps() {
        let mut buf = CircularBuffer::new(4);
        buf.writable_slice()[..3].copy_from_slice(b"abc");
        buf.commit_written(3);
        assert_eq!(buf.readable_slice(), b"abc");
        buf.consume(2);
        assert_eq!(buf.readable_slice(), b"c");
        // Slack now wraps: one byte at the tail, then the two bytes freed
        // at the front.
        assert_eq!(buf.slack_len(), 3);
        let w = buf.writable_slice();
        assert_eq!(w.len(), 1);
        w[0] = b'd';
        buf.commit_written(1);
        // Remaining slack block is now at the front of the buffer.
        assert_eq!(buf.writable_slice().len(), 2);
        buf.writable_slice().copy_from_slice(b"ef");
        buf.commit_written(2);
        assert_eq!(buf.copy_data(), b"cdef");
    }

    #[test]
    fn consume_to_empty_resets_to_initial_state() {
        let mut buf = CircularBuffer::new(4);
        buf.writable_slice()[..4].copy_from_slice(b"wxyz");
        buf.commit_written(4);
        buf.consume(4);
        assert!(!buf.has_data());
        assert_eq!(buf.slack_len(), 4);
    }

    #[test]
    fn reserve_grows_while_preserving_wrapped_data() {
        let mut buf = CircularBuffer::new(4);
        buf.writable_slice()[..4].copy_from_slice(b"abcd");
        buf.commit_written(4);
        buf.consume(2);
        buf.writable_slice()[..2].copy_from_slice(b"ef");
        buf.commit_written(2);
        assert_eq!(buf.copy_data(), b"cdef");
        buf.reserve(8);
        assert_eq!(buf.capacity(), 8);
        assert_eq!(buf.copy_data(), b"cdef");
        assert_eq!(buf.slack_len(), 4);
    }

    #[test]
    fn reserve_below_data_len_is_noop() {
        let mut buf = CircularBuffer::new(4);
        buf.writable_slice()[..4].copy_from_slice(b"abcd");
        buf.commit_written(4);
        buf.reserve(2);
        assert_eq!(buf.capacity(), 4);
    }

    #[test]
    fn clone_copies_only_the_data_region() {
        let mut buf = CircularBuffer::new(4);
        buf.writable_slice()[..2].copy_from_slice(b"ab");
        buf.commit_written(2);
        let clone = buf.clone();
        assert_eq!(clone.copy_data(), b"ab");
        assert_eq!(clone.capacity(), 4);
    }
}
