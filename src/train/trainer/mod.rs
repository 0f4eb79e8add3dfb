//! Epoch loop with gradient accumulation and best-checkpoint selection

mod core;
mod result;
mod train_loop;

pub use core::{TrainConfig, Trainer};
pub use result::{EpochRecord, FitResult};
