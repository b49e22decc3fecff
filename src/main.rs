//! cdchain - run and inspect CDEvents delivery chains
//!
//! ## Commands
//!
//! - `cdchain run` - Run delivery chains and print the event history
//! - `cdchain ingest` - Publish envelopes from a file into the pipeline
//! - `cdchain completions` - Generate shell completions
//!
//! ## Quick Start
//!
//! ```bash
//! # Happy path: push, build, scan, deploy
//! cdchain run
//!
//! # Force the scan to fail; the chain halts after the scan
//! cdchain run --scan-outcome fail
//!
//! # Three concurrent chains, history as JSON
//! cdchain run --chains 3 --format json
//!
//! # Feed envelopes produced elsewhere
//! cdchain ingest events.ndjson
//!
//! # Generate shell completions
//! cdchain completions bash > /etc/bash_completion.d/cdchain
//! ```
//!
//! Logging follows `RUST_LOG`, then `CDCHAIN_LOG`, then `log_level` from the
//! config file.

use std::process::ExitCode;

mod cli;

fn main() -> ExitCode {
    match cli::run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            if std::env::var("CDCHAIN_VERBOSE").is_ok() {
                eprintln!("{:?}", e);
            }
            ExitCode::FAILURE
        }
    }
}
