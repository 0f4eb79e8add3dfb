//! Aggregation for one prompt sequence per (turn, KC)

use super::bce::{binary_cross_entropy, binary_cross_entropy_grad};
use super::reduce::{correctness_probability, product_of_others, true_probability};
use super::{ensure_len, Aggregate, AnswerTokens, GradMode};
use crate::model::{LogitGrad, LogitGradEntry};
use crate::{Error, Result};
use ndarray::{Array1, ArrayView1, ArrayView3, Axis};

/// Aggregate KC probabilities from unpacked prompts
///
/// # Arguments
///
/// * `logits` - Model output, `rows x seq_len x vocab`, one row per KC occurrence
/// * `last_idxs` - Answer position of each row
/// * `num_kcs` - Rows belonging to each turn, contiguous and in order
/// * `labels` - Correctness label per turn
pub fn aggregate_unpacked(
    logits: ArrayView3<'_, f32>,
    last_idxs: &[usize],
    num_kcs: &[usize],
    labels: ArrayView1<'_, f32>,
    tokens: AnswerTokens,
    mode: GradMode,
) -> Result<(Aggregate, Option<LogitGrad>)> {
    ensure_len("turn labels", labels.len(), num_kcs.len())?;
    ensure_len("answer positions", last_idxs.len(), num_kcs.iter().sum())?;
    ensure_len("logit rows", logits.len_of(Axis(0)), last_idxs.len())?;
    let seq_len = logits.len_of(Axis(1));
    if let Some(&pos) = last_idxs.iter().find(|&&pos| pos >= seq_len) {
        return Err(Error::Data(format!("answer position {pos} outside sequence of {seq_len}")));
    }

    let (t_tok, f_tok) = (tokens.true_token as usize, tokens.false_token as usize);
    let kc_probs: Vec<f32> = last_idxs
        .iter()
        .enumerate()
        .map(|(row, &pos)| true_probability(logits[[row, pos, t_tok]], logits[[row, pos, f_tok]]))
        .collect();

    let mut grouped = Vec::with_capacity(num_kcs.len());
    let mut offset = 0;
    for &n in num_kcs {
        grouped.push(kc_probs[offset..offset + n].to_vec());
        offset += n;
    }
    let corr_probs: Array1<f32> = grouped.iter().map(|g| correctness_probability(g)).collect();

    let labels = labels.to_vec();
    let loss = binary_cross_entropy(&corr_probs.to_vec(), &labels)?;

    let grad = (mode == GradMode::Enabled).then(|| {
        let n_turns = grouped.len();
        let mut entries = Vec::with_capacity(2 * kc_probs.len());
        let mut row = 0;
        for (turn, group) in grouped.iter().enumerate() {
            let d_corr = binary_cross_entropy_grad(corr_probs[turn], labels[turn], n_turns);
            for (p, other) in group.iter().zip(product_of_others(group)) {
                // d p / d (t - f) = p (1 - p)
                let value = d_corr * other * p * (1.0 - p);
                let position = last_idxs[row];
                entries.push(LogitGradEntry { row, position, token: tokens.true_token, value });
                entries.push(LogitGradEntry {
                    row,
                    position,
                    token: tokens.false_token,
                    value: -value,
                });
                row += 1;
            }
        }
        LogitGrad { entries }
    });

    Ok((Aggregate { loss, kc_probs: grouped, corr_probs }, grad))
}
