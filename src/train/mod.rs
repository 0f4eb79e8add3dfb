//! High-level training loop
//!
//! This module provides:
//! - Loss adapters, one per architecture family ([`Adapter`])
//! - Learners pairing a model with its adapter ([`LmLearner`], [`BaselineLearner`])
//! - The epoch loop with gradient accumulation, clipping and best-checkpoint saving ([`Trainer`])
//!
//! # Example
//!
//! ```no_run
//! use lmkt::config::ModelType;
//! use lmkt::train::Adapter;
//!
//! let adapter = Adapter::for_model(ModelType::Akt).unwrap();
//! // let mut learner = BaselineLearner { model, adapter };
//! // trainer.fit(&mut learner, |_| collator.batches(..), &val_batches)?;
//! ```

mod adapter;
mod trainer;

pub use adapter::{
    compute_lm_loss, Adapter, BaselineLearner, BaselineStep, FlatLayout, Learner, LmLearner,
};
pub use trainer::{EpochRecord, FitResult, TrainConfig, Trainer};
