//! Optimizers for the trainable parameters of a model collaborator

mod adafactor;
mod adamw;
mod clip;
mod optimizer;

pub use adafactor::Adafactor;
pub use adamw::AdamW;
pub use clip::clip_grad_norm;
pub use optimizer::Optimizer;

use crate::config::OptimizerKind;

/// Build the optimizer selected in the run configuration
pub fn build_optimizer(kind: OptimizerKind, lr: f32, weight_decay: f32) -> Box<dyn Optimizer> {
    match kind {
        OptimizerKind::AdamW => Box::new(AdamW::default_params(lr).with_weight_decay(weight_decay)),
        OptimizerKind::Adafactor => Box::new(Adafactor::new(lr, weight_decay)),
    }
}
