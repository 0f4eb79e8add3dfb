//! Aggregation for sequence-model baselines
//!
//! A baseline emits, at every step, one mastery probability per KC in the vocabulary.
//! The output of turn `t` predicts the correctness of turn `t + 1`.

use super::bce::{binary_cross_entropy, binary_cross_entropy_grad};
use super::reduce::product_of_others;
use crate::data::IGNORE_INDEX;
use crate::Result;
use ndarray::{Array2, Array3, ArrayView2, ArrayView3, Axis};

/// Pick the output vector that represents each turn from a flattened KC sequence
///
/// Without `shift` the output at the turn's last KC is used. With `shift` the output one
/// step later is used, clipped to the largest end index in the batch, for architectures
/// whose output at a step only reflects the responses before it. Returns the selected
/// vectors (`batch x turns x kcs`) and the effective indices, which the backward pass
/// needs to route gradients.
pub fn select_flat_out_vectors(
    y: ArrayView3<'_, f32>,
    turn_end_idxs: ArrayView2<'_, usize>,
    shift: bool,
) -> (Array3<f32>, Array2<usize>) {
    let idxs = if shift {
        let max = turn_end_idxs.iter().copied().max().unwrap_or(0);
        turn_end_idxs.mapv(|i| (i + 1).min(max))
    } else {
        turn_end_idxs.to_owned()
    };
    let (batch, turns) = idxs.dim();
    let mut out = Array3::zeros((batch, turns, y.len_of(Axis(2))));
    for ((b, t), &i) in idxs.indexed_iter() {
        out.slice_mut(ndarray::s![b, t, ..]).assign(&y.slice(ndarray::s![b, i, ..]));
    }
    (out, idxs)
}

/// Route a gradient on selected turn vectors back onto the flat output sequence
pub fn scatter_flat_grad(
    grad: ArrayView3<'_, f32>,
    idxs: ArrayView2<'_, usize>,
    flat_len: usize,
) -> Array3<f32> {
    let (batch, _, kcs) = grad.dim();
    let mut out = Array3::zeros((batch, flat_len, kcs));
    for ((b, t), &i) in idxs.indexed_iter() {
        let mut row = out.slice_mut(ndarray::s![b, i, ..]);
        row += &grad.slice(ndarray::s![b, t, ..]);
    }
    out
}

/// Loss and predictions of the next-turn reduction
#[derive(Debug, Clone)]
pub struct NextTurnAggregate {
    pub loss: f32,
    /// Correctness probability of turn `t + 1`, `batch x (turns - 1)`
    pub corr_probs: Array2<f32>,
    /// Gradient of the loss on `y`, same shape as `y`
    pub grad: Option<Array3<f32>>,
}

/// Reduce per-turn KC vectors into next-turn correctness probabilities and BCE loss
///
/// `y` is `batch x turns x vocab`. The probabilities of the KCs of turn `t + 1` are read
/// from `y[:, t]`; slots beyond that turn's KC count are neutral. The loss covers every
/// next-turn label that is not `IGNORE_INDEX`, in row-major order.
pub fn aggregate_next_turn(
    y: ArrayView3<'_, f32>,
    kc_ids: ArrayView3<'_, usize>,
    num_kcs: ArrayView2<'_, usize>,
    labels: ArrayView2<'_, i64>,
    mode: super::GradMode,
) -> Result<NextTurnAggregate> {
    let (batch, turns, _) = kc_ids.dim();
    let steps = turns.saturating_sub(1);

    let gather = |b: usize, t: usize| -> Vec<f32> {
        (0..num_kcs[[b, t + 1]])
            .map(|k| y[[b, t, kc_ids[[b, t + 1, k]]]])
            .collect()
    };

    let corr_probs = Array2::from_shape_fn((batch, steps), |(b, t)| gather(b, t).iter().product());

    let mut preds = Vec::new();
    let mut targets = Vec::new();
    let mut scored = Vec::new();
    for ((b, t), &p) in corr_probs.indexed_iter() {
        let label = labels[[b, t + 1]];
        if label != IGNORE_INDEX {
            preds.push(p);
            targets.push(label as f32);
            scored.push((b, t));
        }
    }
    let loss = binary_cross_entropy(&preds, &targets)?;

    let grad = (mode == super::GradMode::Enabled).then(|| {
        let mut grad = Array3::zeros(y.dim());
        let n = preds.len();
        for (i, &(b, t)) in scored.iter().enumerate() {
            let d_corr = binary_cross_entropy_grad(preds[i], targets[i], n);
            for (k, other) in product_of_others(&gather(b, t)).into_iter().enumerate() {
                grad[[b, t, kc_ids[[b, t + 1, k]]]] += d_corr * other;
            }
        }
        grad
    });

    Ok(NextTurnAggregate { loss, corr_probs, grad })
}
