//! Command-line configuration (spec §6's `DispatcherConfig` table),
//! parsed with `clap`'s derive API — command-line parsing is an
//! explicit out-of-scope collaborator for `cuti` itself (spec §1), so
//! this lives only in the demo binary.

use std::time::Duration;

use clap::Parser;
use cuti::buffer::ThroughputSettings;
use cuti::dispatcher::DispatcherConfig;

#[derive(Parser, Debug)]
#[command(name = "x264_encoding_service", about = "Demonstration cuti RPC service")]
pub struct Args {
    /// Address to listen on, e.g. `127.0.0.1:7000`. Port `0` picks an
    /// ephemeral port.
    #[arg(long, default_value = "127.0.0.1:0")]
    pub bind: String,

    /// Per-connection input/output buffer capacity, in bytes.
    #[arg(long, default_value_t = 4096)]
    pub bufsize: usize,

    /// Maximum number of simultaneously open connections before the
    /// oldest is evicted.
    #[arg(long, default_value_t = 64)]
    pub max_connections: usize,

    /// Number of worker threads, each enforcing one "concurrent
    /// request" slot (spec §4.6).
    #[arg(long, default_value_t = 4)]
    pub max_concurrent_requests: usize,

    /// Minimum bytes a connection must transfer per throughput tick;
    /// omit to disable throughput policing entirely.
    #[arg(long)]
    pub min_bytes_per_tick: Option<u64>,

    /// Consecutive below-minimum ticks tolerated before a connection is
    /// closed for insufficient throughput.
    #[arg(long, default_value_t = 3)]
    pub low_ticks_limit: u32,

    /// Length of one throughput tick, in milliseconds.
    #[arg(long, default_value_t = 1000)]
    pub tick_length_ms: u64,
}

impl Args {
    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            bufsize: self.bufsize,
            max_connections: self.max_connections,
            max_concurrent_requests: self.max_concurrent_requests,
            throughput: self.min_bytes_per_tick.map(|min_bytes_per_tick| {
                ThroughputSettings::new(
                    min_bytes_per_tick,
                    self.low_ticks_limit,
                    Duration::from_millis(self.tick_length_ms),
                )
            }),
        }
    }
}
