//! KC probability aggregation
//!
//! Turns raw model outputs into per-KC mastery probabilities, per-turn correctness
//! probabilities (product over the turn's KCs) and a binary cross-entropy loss. When
//! gradients are requested the derivative of the loss with respect to the model output
//! is returned alongside, ready for the model's backward pass.

mod bce;
mod flat;
mod packed;
mod reduce;
mod unpacked;

pub use bce::{binary_cross_entropy, binary_cross_entropy_grad};
pub use flat::{aggregate_next_turn, scatter_flat_grad, select_flat_out_vectors, NextTurnAggregate};
pub use packed::{aggregate_packed, neutralize_padding, to_additive_mask};
pub use reduce::{correctness_probability, product_of_others, true_probability};
pub use unpacked::aggregate_unpacked;

use crate::{Error, Result};
use ndarray::Array1;

fn ensure_len(what: &str, got: usize, expected: usize) -> Result<()> {
    if got == expected {
        Ok(())
    } else {
        Err(Error::Data(format!("{what}: got {got}, expected {expected}")))
    }
}

/// Whether the caller needs a gradient on the model output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GradMode {
    Enabled,
    Disabled,
}

/// Vocabulary ids of the answer tokens
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnswerTokens {
    pub true_token: u32,
    pub false_token: u32,
}

impl From<(u32, u32)> for AnswerTokens {
    fn from((true_token, false_token): (u32, u32)) -> Self {
        Self { true_token, false_token }
    }
}

/// Result of aggregating one LM batch
#[derive(Debug, Clone)]
pub struct Aggregate {
    pub loss: f32,
    /// Per-turn KC probabilities, padding removed
    pub kc_probs: Vec<Vec<f32>>,
    /// Per-turn correctness probabilities
    pub corr_probs: Array1<f32>,
}
