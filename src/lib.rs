//! # lmkt
//!
//! Training and evaluation core for knowledge tracing on tutoring dialogues.
//!
//! Two model families predict whether a learner answers the next turn correctly:
//!
//! - **LMKT**: a causal language model with LoRA adapters answers "True"/"False" for every
//!   knowledge component (KC) a turn exercises; the turn's correctness probability is the
//!   product of its KC probabilities.
//! - **Sequence-model baselines** (`dkt-multi`, `dkt-sem`, `dkt`, `akt`, `dkvmn`, `saint`,
//!   `simplekt`) output a per-KC mastery vector per step, reduced the same way.
//!
//! `random` and `majority` policies serve as evaluation floors.
//!
//! ## Modules
//!
//! - [`aggregate`]: KC-probability gathering, product reduction and binary cross-entropy
//! - [`train`]: per-architecture adapters and the accumulation/clip/checkpoint training loop
//! - [`eval`]: metrics, final-turn selection and the metric reports
//! - [`pipeline`]: `train`/`test` entry points per fold
//! - [`sweep`]: cross-validation and hyperparameter grid search
//! - [`optim`]: AdamW, Adafactor and gradient clipping
//! - [`io`]: checkpoints
//! - [`config`], [`data`], [`model`], [`context`]: run configuration and collaborator contracts

pub mod aggregate;
pub mod cli;
pub mod config;
pub mod context;
pub mod data;
pub mod error;
pub mod eval;
pub mod io;
pub mod model;
pub mod optim;
pub mod pipeline;
pub mod sweep;
pub mod train;

pub use context::ExecutionContext;
pub use error::{Error, Result};
pub use pipeline::{test, train, RunOutcome};
