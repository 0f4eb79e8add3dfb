//! Training result types

/// Losses of one epoch
#[derive(Debug, Clone, PartialEq)]
pub struct EpochRecord {
    /// Zero-based epoch index
    pub epoch: usize,
    pub train_loss: f32,
    pub val_loss: f32,
    /// A new best model was written after this epoch
    pub saved: bool,
}

/// Result of a training run
#[derive(Debug, Clone, PartialEq)]
pub struct FitResult {
    pub epochs: Vec<EpochRecord>,
    /// Epoch whose weights are in the checkpoint
    pub best_epoch: usize,
    pub best_val_loss: f32,
    /// Total training time in seconds
    pub elapsed_secs: f64,
}

impl FitResult {
    pub fn final_train_loss(&self) -> Option<f32> {
        self.epochs.last().map(|e| e.train_loss)
    }
}
