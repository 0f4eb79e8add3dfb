//! Command-line interface
//!
//! ```bash
//! lmkt train --model-type dkt --dataset comta --model-name dkt_run --crossval
//! lmkt test --config runs/lmkt.yaml --testonval
//! lmkt test --model-type majority --dataset mathdial --data-dir data/annotated
//! ```

mod commands;
mod logging;

pub use commands::run_command;
pub use logging::{init_logging, LogLevel};

use crate::config::RunArgs;
use crate::context::DEFAULT_SEED;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Knowledge tracing on tutoring dialogues
#[derive(Parser, Debug, Clone, PartialEq)]
#[command(name = "lmkt")]
#[command(version)]
#[command(about = "Train and evaluate LM-based and sequence-model knowledge tracing")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Train, then evaluate the best checkpoint
    Train(RunCommandArgs),

    /// Evaluate saved checkpoints or a baseline policy
    Test(RunCommandArgs),
}

/// Options shared by `train` and `test`
#[derive(Args, Debug, Clone, PartialEq)]
pub struct RunCommandArgs {
    /// YAML run configuration; flags override its values
    #[arg(long, value_name = "CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory holding `{dataset}.json` annotated dialogues
    #[arg(long, default_value = "data")]
    pub data_dir: PathBuf,

    /// Where metric reports and KC exports are written
    #[arg(long, default_value = "results")]
    pub results_dir: PathBuf,

    /// Where checkpoints are written and read
    #[arg(long, default_value = "saved_models")]
    pub checkpoint_dir: PathBuf,

    /// Seed for batch shuffling and the random policy
    #[arg(long, default_value_t = DEFAULT_SEED)]
    pub seed: u64,

    /// Resolve and print the configuration without running
    #[arg(long)]
    pub dry_run: bool,

    #[command(flatten)]
    pub run: RunArgs,
}
