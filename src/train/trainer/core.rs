//! Core Trainer struct and basic methods

use crate::optim::Optimizer;
use std::path::PathBuf;

/// Settings of one fit
#[derive(Debug, Clone, PartialEq)]
pub struct TrainConfig {
    pub epochs: usize,
    /// Micro-batches per optimizer step
    pub grad_accum_steps: usize,
    /// Global gradient-norm bound; `None` disables clipping
    pub max_grad_norm: Option<f32>,
    /// Where the best model so far is written
    pub checkpoint_path: PathBuf,
    /// Recorded in checkpoint metadata
    pub run_name: String,
    pub architecture: String,
}

/// Drives a [`Learner`](crate::train::Learner) through the configured epochs
///
/// # Example
///
/// ```no_run
/// use lmkt::optim::AdamW;
/// use lmkt::train::{TrainConfig, Trainer};
///
/// let config = TrainConfig {
///     epochs: 5,
///     grad_accum_steps: 64,
///     max_grad_norm: Some(1.0),
///     checkpoint_path: "saved_models/lmkt_run/adapter_model.json".into(),
///     run_name: "lmkt_run".to_string(),
///     architecture: "lmkt".to_string(),
/// };
/// let trainer = Trainer::new(Box::new(AdamW::default_params(2e-4)), config);
/// // trainer.fit(&mut learner, |epoch| make_batches(epoch), &val_batches)?;
/// ```
pub struct Trainer {
    pub(crate) optimizer: Box<dyn Optimizer>,
    pub(crate) config: TrainConfig,
    /// Best validation loss so far
    pub(crate) best_val_loss: Option<f32>,
}

impl Trainer {
    pub fn new(optimizer: Box<dyn Optimizer>, config: TrainConfig) -> Self {
        Self { optimizer, config, best_val_loss: None }
    }

    pub fn config(&self) -> &TrainConfig {
        &self.config
    }

    pub fn best_val_loss(&self) -> Option<f32> {
        self.best_val_loss
    }

    pub fn lr(&self) -> f32 {
        self.optimizer.lr()
    }
}
