//! Binary cross-entropy on probabilities
//!
//! # Formula
//!
//! ```text
//! L = -mean(y * max(ln p, -100) + (1 - y) * max(ln(1 - p), -100))
//! ∂L/∂p = (p - y) / max(p * (1 - p), 1e-12) / N
//! ```
//!
//! The log clamp keeps the loss finite when a product of KC probabilities reaches exactly
//! 0 or 1.

use super::ensure_len;
use crate::Result;

const LOG_CLAMP: f32 = -100.0;
const GRAD_EPS: f32 = 1e-12;

/// Mean BCE of `preds` against 0/1 `targets`; an empty input has zero loss
pub fn binary_cross_entropy(preds: &[f32], targets: &[f32]) -> Result<f32> {
    ensure_len("BCE targets", targets.len(), preds.len())?;
    if preds.is_empty() {
        return Ok(0.0);
    }
    let total: f32 = preds
        .iter()
        .zip(targets)
        .map(|(&p, &y)| -(y * p.ln().max(LOG_CLAMP) + (1.0 - y) * (1.0 - p).ln().max(LOG_CLAMP)))
        .sum();
    Ok(total / preds.len() as f32)
}

/// ∂L/∂p for one prediction of a mean over `n` terms
pub fn binary_cross_entropy_grad(pred: f32, target: f32, n: usize) -> f32 {
    (pred - target) / (pred * (1.0 - pred)).max(GRAD_EPS) / n as f32
}
