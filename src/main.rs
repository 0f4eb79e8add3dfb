//! lmkt CLI
//!
//! # Usage
//!
//! ```bash
//! # Train a sequence-model baseline with 5-fold cross-validation
//! lmkt train --model-type dkt --dataset comta --model-name dkt_cv --crossval
//!
//! # Evaluate the majority-class policy on the validation split
//! lmkt test --model-type majority --dataset mathdial --testonval
//!
//! # Resolve a YAML configuration with overrides, without running
//! lmkt train --config runs/lmkt.yaml --lr 0.0001 --dry-run
//! ```

use clap::Parser;
use lmkt::cli::{init_logging, run_command, Cli, LogLevel};
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(LogLevel::from_flags(cli.verbose, cli.quiet));

    match run_command(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
