//! Binary classification metrics over correctness predictions

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Hard 0/1 prediction from a probability (round half to even)
pub fn hard_prediction(prob: f32) -> f32 {
    prob.round_ties_even()
}

/// Confusion counts for the positive class
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BinaryConfusion {
    pub tp: usize,
    pub fp: usize,
    pub tn: usize,
    pub fn_: usize,
}

impl BinaryConfusion {
    pub fn from_predictions(labels: &[f32], hard_preds: &[f32]) -> Result<Self> {
        ensure_same_len(labels, hard_preds)?;
        let mut cm = Self::default();
        for (&y, &p) in labels.iter().zip(hard_preds) {
            match (y >= 0.5, p >= 0.5) {
                (true, true) => cm.tp += 1,
                (false, true) => cm.fp += 1,
                (false, false) => cm.tn += 1,
                (true, false) => cm.fn_ += 1,
            }
        }
        Ok(cm)
    }

    pub fn total(&self) -> usize {
        self.tp + self.fp + self.tn + self.fn_
    }

    pub fn accuracy(&self) -> f64 {
        ratio(self.tp + self.tn, self.total())
    }

    pub fn precision(&self) -> f64 {
        ratio(self.tp, self.tp + self.fp)
    }

    pub fn recall(&self) -> f64 {
        ratio(self.tp, self.tp + self.fn_)
    }

    pub fn f1(&self) -> f64 {
        let (p, r) = (self.precision(), self.recall());
        if p + r > 0.0 {
            2.0 * p * r / (p + r)
        } else {
            0.0
        }
    }
}

fn ensure_same_len(labels: &[f32], preds: &[f32]) -> Result<()> {
    if labels.len() == preds.len() {
        Ok(())
    } else {
        Err(Error::Data(format!("{} labels for {} predictions", labels.len(), preds.len())))
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den > 0 {
        num as f64 / den as f64
    } else {
        0.0
    }
}

/// Area under the ROC curve; tied scores count half
///
/// A label vector with a single class has no defined AUC and yields
/// [`Error::UndefinedAuc`].
pub fn roc_auc(labels: &[f32], preds: &[f32]) -> Result<f64> {
    ensure_same_len(labels, preds)?;
    let mut items: Vec<(f32, bool)> =
        preds.iter().copied().zip(labels.iter().map(|&y| y >= 0.5)).collect();
    items.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));

    let positives = items.iter().filter(|(_, y)| *y).count();
    let negatives = items.len() - positives;
    if positives == 0 || negatives == 0 {
        return Err(Error::UndefinedAuc { samples: items.len(), positives });
    }

    let mut auc_num = 0.0f64;
    let mut neg_cum = 0.0f64;
    let mut i = 0;
    while i < items.len() {
        let score = items[i].0;
        let (mut pos_sum, mut neg_sum) = (0.0f64, 0.0f64);
        while i < items.len() && items[i].0 == score {
            if items[i].1 {
                pos_sum += 1.0;
            } else {
                neg_sum += 1.0;
            }
            i += 1;
        }
        auc_num += pos_sum * neg_cum + 0.5 * pos_sum * neg_sum;
        neg_cum += neg_sum;
    }
    Ok(auc_num / (positives as f64 * negatives as f64))
}

/// Accuracy, AUC, precision, recall and F1 in percentage points
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricSet {
    pub acc: f64,
    pub auc: f64,
    pub prec: f64,
    pub rec: f64,
    pub f1: f64,
}

impl MetricSet {
    pub fn to_array(self) -> [f64; 5] {
        [self.acc, self.auc, self.prec, self.rec, self.f1]
    }
}

/// Threshold predictions at 0.5 for the hard metrics; AUC uses raw probabilities
pub fn compute_metrics(labels: &[f32], preds: &[f32]) -> Result<MetricSet> {
    let hard: Vec<f32> = preds.iter().map(|&p| hard_prediction(p)).collect();
    let cm = BinaryConfusion::from_predictions(labels, &hard)?;
    let auc = roc_auc(labels, preds)?;
    Ok(MetricSet {
        acc: cm.accuracy() * 100.0,
        auc: auc * 100.0,
        prec: cm.precision() * 100.0,
        rec: cm.recall() * 100.0,
        f1: cm.f1() * 100.0,
    })
}
