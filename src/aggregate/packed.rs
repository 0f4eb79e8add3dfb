//! Aggregation for prompts that ask about every KC of a turn in one sequence

use super::bce::{binary_cross_entropy, binary_cross_entropy_grad};
use super::reduce::{product_of_others, true_probability};
use super::{ensure_len, Aggregate, AnswerTokens, GradMode};
use crate::model::{LogitGrad, LogitGradEntry, Precision};
use crate::{Error, Result};
use ndarray::{Array1, Array2, Array3, ArrayView1, ArrayView2, ArrayView3, Axis};

/// Convert a 0/1 attention mask into an additive mask in the model's precision
///
/// Masked entries (0) become the precision's most negative value, attended entries (1)
/// become 0. Any other value passes through unchanged.
pub fn to_additive_mask(mask: ArrayView3<'_, f32>, precision: Precision) -> Array3<f32> {
    let min = precision.min_value();
    mask.mapv(|m| {
        if m == 0.0 {
            min
        } else if m == 1.0 {
            0.0
        } else {
            m
        }
    })
}

/// Set KC slots at or beyond each turn's KC count to probability 1
pub fn neutralize_padding(kc_probs: &mut Array2<f32>, num_kcs: &[usize]) {
    for (mut row, &n) in kc_probs.axis_iter_mut(Axis(0)).zip(num_kcs) {
        row.iter_mut().skip(n).for_each(|p| *p = 1.0);
    }
}

/// Aggregate KC probabilities from packed prompts
///
/// `logits` holds one row per turn; `last_idxs` (`turns x max_kcs`) lists each turn's
/// answer positions, with padding slots beyond `num_kcs`.
pub fn aggregate_packed(
    logits: ArrayView3<'_, f32>,
    last_idxs: ArrayView2<'_, usize>,
    num_kcs: &[usize],
    labels: ArrayView1<'_, f32>,
    tokens: AnswerTokens,
    mode: GradMode,
) -> Result<(Aggregate, Option<LogitGrad>)> {
    ensure_len("turn labels", labels.len(), num_kcs.len())?;
    ensure_len("answer position rows", last_idxs.nrows(), num_kcs.len())?;
    ensure_len("logit rows", logits.len_of(Axis(0)), num_kcs.len())?;
    if let Some(&n) = num_kcs.iter().find(|&&n| n > last_idxs.ncols()) {
        return Err(Error::Data(format!(
            "turn with {n} KCs exceeds {} answer slots",
            last_idxs.ncols()
        )));
    }
    let seq_len = logits.len_of(Axis(1));
    if let Some(&pos) = last_idxs.iter().find(|&&pos| pos >= seq_len) {
        return Err(Error::Data(format!("answer position {pos} outside sequence of {seq_len}")));
    }

    let (t_tok, f_tok) = (tokens.true_token as usize, tokens.false_token as usize);
    let mut probs = Array2::from_shape_fn(last_idxs.dim(), |(turn, k)| {
        let pos = last_idxs[[turn, k]];
        true_probability(logits[[turn, pos, t_tok]], logits[[turn, pos, f_tok]])
    });

    let kc_probs: Vec<Vec<f32>> = probs
        .axis_iter(Axis(0))
        .zip(num_kcs)
        .map(|(row, &n)| row.iter().take(n).copied().collect())
        .collect();

    neutralize_padding(&mut probs, num_kcs);
    let corr_probs: Array1<f32> = probs.map_axis(Axis(1), |row| row.product());

    let labels = labels.to_vec();
    let loss = binary_cross_entropy(&corr_probs.to_vec(), &labels)?;

    let grad = (mode == GradMode::Enabled).then(|| {
        let n_turns = corr_probs.len();
        let mut entries = Vec::new();
        for (turn, group) in kc_probs.iter().enumerate() {
            let d_corr = binary_cross_entropy_grad(corr_probs[turn], labels[turn], n_turns);
            for (k, (p, other)) in group.iter().zip(product_of_others(group)).enumerate() {
                let value = d_corr * other * p * (1.0 - p);
                let position = last_idxs[[turn, k]];
                entries.push(LogitGradEntry { row: turn, position, token: tokens.true_token, value });
                entries.push(LogitGradEntry {
                    row: turn,
                    position,
                    token: tokens.false_token,
                    value: -value,
                });
            }
        }
        LogitGrad { entries }
    });

    Ok((Aggregate { loss, kc_probs, corr_probs }, grad))
}
