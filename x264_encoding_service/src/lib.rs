//! Library half of the demonstration service: everything `main.rs` wires
//! together, split out so integration tests can drive the same method
//! implementations through a real dispatcher without spawning the
//! compiled binary.

pub mod cli;
pub mod methods;
pub mod request_log;
