//! Multi-epoch training loop

use super::core::Trainer;
use super::result::{EpochRecord, FitResult};
use crate::io::{save_checkpoint, ModelMetadata};
use crate::optim::clip_grad_norm;
use crate::train::Learner;
use crate::{Error, Result};
use std::time::Instant;
use tracing::{debug, info};

impl Trainer {
    /// Train for the configured number of epochs
    ///
    /// `batch_fn` yields the training batches of an epoch (reshuffled as the caller sees fit).
    /// After every epoch the validation loss is computed without gradients; the first epoch
    /// and every strict improvement overwrite the checkpoint, so ties keep the earliest.
    pub fn fit<L, B>(
        &mut self,
        learner: &mut L,
        mut batch_fn: B,
        val_batches: &[L::Batch],
    ) -> Result<FitResult>
    where
        L: Learner,
        B: FnMut(usize) -> Result<Vec<L::Batch>>,
    {
        if val_batches.is_empty() {
            return Err(Error::EmptySplit("validation"));
        }
        let start = Instant::now();
        self.best_val_loss = None;
        let mut records = Vec::with_capacity(self.config.epochs);
        let mut best_epoch = 0;

        for epoch in 0..self.config.epochs {
            info!("Epoch {}", epoch + 1);
            let batches = batch_fn(epoch)?;
            let train_loss = self.train_epoch(learner, &batches)?;
            let val_loss = self.validate(learner, val_batches)?;
            info!("Train Loss: {train_loss:.4}, Val Loss: {val_loss:.4}");

            let saved = match self.best_val_loss {
                Some(best) => val_loss < best,
                None => true,
            };
            if saved {
                info!("Best! Saving model...");
                let metadata =
                    ModelMetadata::new(&self.config.run_name, &self.config.architecture)
                        .with_custom("epoch", serde_json::json!(epoch + 1))
                        .with_custom("val_loss", serde_json::json!(val_loss));
                save_checkpoint(&*learner, metadata, &self.config.checkpoint_path)?;
                self.best_val_loss = Some(val_loss);
                best_epoch = epoch;
            }
            records.push(EpochRecord { epoch, train_loss, val_loss, saved });
        }

        Ok(FitResult {
            epochs: records,
            best_epoch,
            best_val_loss: self.best_val_loss.unwrap_or(f32::INFINITY),
            elapsed_secs: start.elapsed().as_secs_f64(),
        })
    }

    /// One pass over the training batches; returns the mean unscaled loss
    pub(crate) fn train_epoch<L: Learner>(
        &mut self,
        learner: &mut L,
        batches: &[L::Batch],
    ) -> Result<f32> {
        if batches.is_empty() {
            return Err(Error::EmptySplit("train"));
        }
        learner.set_training(true);
        let accum_steps = self.config.grad_accum_steps.max(1);
        let grad_scale = 1.0 / accum_steps as f32;
        let mut total_loss = 0.0;

        self.optimizer.zero_grad(&mut learner.parameters_mut());
        for (step, batch) in batches.iter().enumerate() {
            let loss = learner.forward_backward(batch, grad_scale)?;
            total_loss += loss;
            debug!(step, loss, "train step");

            let is_accum_boundary = (step + 1) % accum_steps == 0;
            let is_last_batch = step + 1 == batches.len();
            if is_accum_boundary || is_last_batch {
                let mut params = learner.parameters_mut();
                if let Some(max_norm) = self.config.max_grad_norm {
                    let norm = clip_grad_norm(&mut params, max_norm);
                    debug!(norm, "clipped gradients");
                }
                self.optimizer.step(&mut params);
                self.optimizer.zero_grad(&mut params);
            }
        }

        Ok(total_loss / batches.len() as f32)
    }

    /// Mean loss over validation batches, no parameter updates
    pub(crate) fn validate<L: Learner>(
        &self,
        learner: &mut L,
        batches: &[L::Batch],
    ) -> Result<f32> {
        learner.set_training(false);
        let mut total = 0.0;
        for batch in batches {
            total += learner.evaluate_loss(batch)?;
        }
        Ok(total / batches.len() as f32)
    }
}
