//! All-turn and final-turn metric reports

use super::metrics::{compute_metrics, hard_prediction, MetricSet};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// `[loss, acc, auc, prec, rec, f1]` over all turns, then the five metrics over final turns
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetricsVector(pub [f64; 11]);

impl MetricsVector {
    pub const LEN: usize = 11;

    /// Display names, in vector order
    pub const NAMES: [&'static str; 11] = [
        "Loss",
        "Acc",
        "AUC",
        "Prec",
        "Rec",
        "F1",
        "Acc (Final)",
        "AUC (Final)",
        "Prec (Final)",
        "Rec (Final)",
        "F1 (Final)",
    ];

    /// Index of the all-turn AUC, the sweep's selection score
    pub const AUC: usize = 2;

    pub fn new(loss: f64, all: MetricSet, final_turn: MetricSet) -> Self {
        let mut values = [0.0; 11];
        values[0] = loss;
        values[1..6].copy_from_slice(&all.to_array());
        values[6..].copy_from_slice(&final_turn.to_array());
        Self(values)
    }

    pub fn loss(&self) -> f64 {
        self.0[0]
    }

    pub fn auc(&self) -> f64 {
        self.0[Self::AUC]
    }

    pub fn values(&self) -> &[f64; 11] {
        &self.0
    }
}

/// Labels and predictions gathered by an evaluation run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Predictions {
    pub loss: f32,
    pub labels: Vec<f32>,
    pub preds: Vec<f32>,
    /// One entry per dialogue: its last labelled turn
    pub final_labels: Vec<f32>,
    pub final_preds: Vec<f32>,
}

/// `{results_dir}/metrics_{suffix}.txt`
pub fn metrics_path(results_dir: &Path, suffix: &str) -> PathBuf {
    results_dir.join(format!("metrics_{suffix}.txt"))
}

fn distribution_line(labels: &[f32], preds: &[f32]) -> String {
    let gt_true = labels.iter().filter(|&&y| y >= 0.5).count();
    let pred_true = preds.iter().filter(|&&p| hard_prediction(p) >= 0.5).count();
    format!(
        "GT - True: {gt_true}, False: {}; Pred - True: {pred_true}, False: {}",
        labels.len() - gt_true,
        preds.len() - pred_true
    )
}

fn metrics_line(m: &MetricSet) -> String {
    format!(
        "Acc: {:.2}, AUC: {:.2}, Prec: {:.2}, Rec: {:.2}, F1: {:.2}",
        m.acc, m.auc, m.prec, m.rec, m.f1
    )
}

/// Compute both metric populations, write the report and return the metrics vector
pub fn compute_all_metrics(predictions: &Predictions, report_path: &Path) -> Result<MetricsVector> {
    let all = compute_metrics(&predictions.labels, &predictions.preds)?;
    let final_turn = compute_metrics(&predictions.final_labels, &predictions.final_preds)?;

    let lines = [
        format!("Loss: {:.4}", predictions.loss),
        format!("Overall ({} samples):", predictions.labels.len()),
        distribution_line(&predictions.labels, &predictions.preds),
        metrics_line(&all),
        format!("Final Turn ({} samples):", predictions.final_labels.len()),
        distribution_line(&predictions.final_labels, &predictions.final_preds),
        metrics_line(&final_turn),
    ];
    let report = lines.join("\n") + "\n";

    info!("\n{report}");
    if let Some(parent) = report_path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(report_path, &report)?;

    Ok(MetricsVector::new(f64::from(predictions.loss), all, final_turn))
}
