//! Evaluation over a held-out split
//!
//! Runs without gradients and collects per-turn predictions together with each
//! dialogue's final-turn prediction.

use super::report::Predictions;
use crate::aggregate::{AnswerTokens, GradMode};
use crate::data::{BaselineBatch, LmBatch, IGNORE_INDEX};
use crate::model::{LanguageModel, SequenceModel};
use crate::train::{compute_lm_loss, Adapter};
use crate::{Error, Result};
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::Rng;
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

/// Dialogue id to the global ordinals of its turns, in first-seen order
#[derive(Debug, Clone, Default)]
pub struct DialogueIndex {
    order: Vec<(usize, Vec<usize>)>,
    slots: HashMap<usize, usize>,
}

impl DialogueIndex {
    pub fn push(&mut self, dialogue_idx: usize, ordinal: usize) {
        let slot = *self.slots.entry(dialogue_idx).or_insert_with(|| {
            self.order.push((dialogue_idx, Vec::new()));
            self.order.len() - 1
        });
        self.order[slot].1.push(ordinal);
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &[usize])> {
        self.order.iter().map(|(d, ords)| (*d, ords.as_slice()))
    }

    /// Ordinal of each dialogue's last turn
    pub fn final_ordinals(&self) -> Vec<usize> {
        self.order.iter().filter_map(|(_, ords)| ords.last().copied()).collect()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Per-dialogue, per-turn KC probabilities
///
/// Serializes as `{ "<dialogue>": [ { "<kc>": prob, ... }, ... ] }` in first-seen order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KcReport {
    pub dialogues: Vec<(usize, Vec<Vec<(String, f32)>>)>,
}

struct TurnProbs<'a>(&'a [(String, f32)]);

impl Serialize for TurnProbs<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_map(self.0.iter().map(|(kc, p)| (kc, p)))
    }
}

struct Turns<'a>(&'a [Vec<(String, f32)>]);

impl Serialize for Turns<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.0.len()))?;
        for turn in self.0 {
            seq.serialize_element(&TurnProbs(turn))?;
        }
        seq.end()
    }
}

impl Serialize for KcReport {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.dialogues.len()))?;
        for (dialogue_idx, turns) in &self.dialogues {
            map.serialize_entry(&dialogue_idx.to_string(), &Turns(turns))?;
        }
        map.end()
    }
}

impl KcReport {
    pub fn write_json(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

/// Result of evaluating a language model
#[derive(Debug, Clone)]
pub struct LmEvaluation {
    pub predictions: Predictions,
    pub kc_report: KcReport,
}

/// Evaluate a language model on pre-built batches
pub fn evaluate_lm(
    model: &mut dyn LanguageModel,
    batches: &[LmBatch],
    tokens: AnswerTokens,
) -> Result<LmEvaluation> {
    if batches.is_empty() {
        return Err(Error::EmptySplit("test"));
    }
    model.set_training(false);

    let mut index = DialogueIndex::default();
    let mut labels = Vec::new();
    let mut preds = Vec::new();
    let mut kc_probs = Vec::new();
    let mut kcs = Vec::new();
    let mut total_loss = 0.0;

    for (batch_idx, batch) in batches.iter().enumerate() {
        let offset = labels.len();
        for (i, meta) in batch.meta_data().iter().enumerate() {
            index.push(meta.dialogue_idx, offset + i);
        }
        let (agg, _) = compute_lm_loss(model, batch, tokens, GradMode::Disabled)?;
        debug!(batch = batch_idx, loss = agg.loss, "evaluated batch");
        total_loss += agg.loss;
        labels.extend(batch.labels().iter().copied());
        preds.extend(agg.corr_probs.iter().copied());
        kc_probs.extend(agg.kc_probs);
        kcs.extend(batch.meta_data().iter().map(|m| m.kcs.clone()));
    }

    let finals = index.final_ordinals();
    let predictions = Predictions {
        loss: total_loss / batches.len() as f32,
        final_labels: finals.iter().map(|&o| labels[o]).collect(),
        final_preds: finals.iter().map(|&o| preds[o]).collect(),
        labels,
        preds,
    };

    let kc_report = KcReport {
        dialogues: index
            .iter()
            .map(|(dialogue_idx, ordinals)| {
                let turns = ordinals
                    .iter()
                    .map(|&o| kcs[o].iter().cloned().zip(kc_probs[o].iter().copied()).collect())
                    .collect();
                (dialogue_idx, turns)
            })
            .collect(),
    };

    Ok(LmEvaluation { predictions, kc_report })
}

/// Source of baseline predictions
pub enum BaselinePredictor<'a> {
    /// A trained sequence model with its adapter
    Model { model: &'a mut dyn SequenceModel, adapter: Adapter },
    /// Uniform 0/1 guess per position
    Random(StdRng),
    /// Constant class, the training split's majority
    Majority(i64),
}

impl BaselinePredictor<'_> {
    /// Loss and `batch x (turns - 1)` predictions; policies report zero loss
    fn predict(&mut self, batch: &BaselineBatch) -> Result<(f32, Array2<f32>)> {
        let shape = batch.target_labels().dim();
        match self {
            BaselinePredictor::Model { model, adapter } => adapter.predict(&mut **model, batch),
            BaselinePredictor::Random(rng) => {
                Ok((0.0, Array2::from_shape_simple_fn(shape, || f32::from(u8::from(rng.random_bool(0.5))))))
            }
            BaselinePredictor::Majority(class) => Ok((0.0, Array2::from_elem(shape, *class as f32))),
        }
    }
}

/// Evaluate a baseline predictor; one batch row is one full dialogue
pub fn evaluate_baseline(
    predictor: &mut BaselinePredictor<'_>,
    batches: &[BaselineBatch],
) -> Result<Predictions> {
    if batches.is_empty() {
        return Err(Error::EmptySplit("test"));
    }
    if let BaselinePredictor::Model { model, .. } = predictor {
        model.set_training(false);
    }

    let mut out = Predictions::default();
    let mut total_loss = 0.0;
    for batch in batches {
        let (loss, corr_probs) = predictor.predict(batch)?;
        total_loss += loss;
        let labels = batch.target_labels();

        for (row, (label_row, pred_row)) in labels.outer_iter().zip(corr_probs.outer_iter()).enumerate() {
            let mut last = None;
            for (t, (&label, &pred)) in label_row.iter().zip(pred_row.iter()).enumerate() {
                if label != IGNORE_INDEX {
                    out.labels.push(label as f32);
                    out.preds.push(pred);
                    last = Some(t);
                }
            }
            match last {
                Some(t) => {
                    out.final_labels.push(label_row[t] as f32);
                    out.final_preds.push(pred_row[t]);
                }
                None => warn!(
                    dialogue = batch.dialogue_idxs.get(row).copied(),
                    "dialogue has no labelled turn to predict, skipped for final-turn metrics"
                ),
            }
        }
    }
    out.loss = total_loss / batches.len() as f32;
    Ok(out)
}
