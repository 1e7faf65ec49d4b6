//! Throughput policing (spec §4.2 "Throughput checker").
//!
//! A [`ThroughputChecker`] is a pure state machine: the owning
//! `nb_inbuf`/`nb_outbuf` feeds it byte counts as they arrive and ticks it
//! on a recurring alarm; the checker itself has no notion of a scheduler
//! or a clock source beyond [`std::time::Instant`].

use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct ThroughputSettings {
    pub min_bytes_per_tick: u64,
    pub low_ticks_limit: u32,
    pub tick_length: Duration,
}

impl ThroughputSettings {
    pub fn new(min_bytes_per_tick: u64, low_ticks_limit: u32, tick_length: Duration) -> Self {
        ThroughputSettings { min_bytes_per_tick, low_ticks_limit, tick_length }
    }
}

pub struct ThroughputChecker {
    settings: ThroughputSettings,
    bytes_this_tick: u64,
    low_ticks: u32,
    tripped: bool,
    started: bool,
}

impl ThroughputChecker {
    pub fn new(settings: ThroughputSettings) -> Self {
        ThroughputChecker {
            settings,
            bytes_this_tick: 0,
            low_ticks: 0,
            tripped: false,
            started: false,
        }
    }

    pub fn tick_length(&self) -> Duration {
        self.settings.tick_length
    }

    /// Records `n` bytes transferred since the previous tick boundary.
    /// The first call (or the first call after construction) marks the
    /// checker as started; before that, `on_tick` is a no-op, matching
    /// "on first enable or first transfer the checker records the
    /// current monotonic time" (spec §4.2).
    pub fn record(&mut self, n: u64) {
        self.started = true;
        self.bytes_this_tick += n;
    }

    /// Evaluates one tick boundary. Returns `true` if the checker is
    /// tripped (either newly, or already from a previous tick).
    pub fn on_tick(&mut self) -> bool {
        if self.tripped {
            return true;
        }
        if !self.started {
            return false;
        }
        if self.bytes_this_tick < self.settings.min_bytes_per_tick {
            self.low_ticks += 1;
            if self.low_ticks >= self.settings.low_ticks_limit {
                self.tripped = true;
            }
        } else {
            self.low_ticks = 0;
        }
        self.bytes_this_tick = 0;
        self.tripped
    }

    pub fn is_tripped(&self) -> bool {
        self.tripped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trips_after_low_ticks_limit_consecutive_slow_ticks() {
        let mut checker = ThroughputChecker::new(ThroughputSettings::new(
            512,
            10,
            Duration::from_millis(10),
        ));
        for _ in 0..9 {
            checker.record(1);
            assert!(!checker.on_tick());
        }
        checker.record(1);
        assert!(checker.on_tick());
        assert!(checker.is_tripped());
    }

    #[test]
    fn a_fast_tick_resets_the_low_tick_counter() {
        let mut checker = ThroughputChecker::new(ThroughputSettings::new(
            512,
            3,
            Duration::from_millis(10),
        ));
        checker.record(1);
        assert!(!checker.on_tick());
        checker.record(1);
        assert!(!checker.on_tick());
        checker.record(1000);
        assert!(!checker.on_tick());
        checker.record(1);
        assert!(!checker.on_tick());
        checker.record(1);
        assert!(!checker.on_tick());
    }

    #[test]
    fn does_not_tick_before_first_transfer() {
        let mut checker = ThroughputChecker::new(ThroughputSettings::new(
            512,
            1,
            Duration::from_millis(10),
        ));
        assert!(!checker.on_tick());
    }
}
