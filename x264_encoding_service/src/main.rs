//! Demonstration service binary built on `cuti`: parses its
//! configuration from the command line, wires up the `echo` and
//! `encode_frame` methods, and runs a dispatcher until SIGINT/SIGTERM
//! (grounded in `main.cpp`'s `throwing_main` + top-level try/catch
//! pattern from the original service).

use clap::Parser;
use cuti::dispatcher::Dispatcher;
use cuti::net::Endpoint;
use x264_encoding_service::{cli, methods};

fn main() {
    if let Err(err) = run() {
        eprintln!("x264_encoding_service: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let args = cli::Args::parse();
    let endpoint = Endpoint::resolve(&args.bind)?;

    let mut dispatcher = Dispatcher::new(args.dispatcher_config());
    let bound = dispatcher.add_listener(endpoint, methods::build_method_map())?;
    tracing::info!(endpoint = %bound, "x264_encoding_service listening");

    dispatcher.run_with_default_signals()?;
    tracing::info!("x264_encoding_service stopped");
    Ok(())
}
