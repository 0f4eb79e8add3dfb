//! k-fold and leave-subject-out cross-validation

use crate::config::RunConfig;
use crate::context::ExecutionContext;
use crate::data::{crossval_folds, Fold};
use crate::eval::MetricsVector;
use crate::pipeline::{run_fold, Phase};
use crate::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Per-fold metric vectors with their elementwise mean and population standard deviation
#[derive(Debug, Clone, PartialEq)]
pub struct CrossValSummary {
    pub folds: Vec<Fold>,
    pub per_fold: Vec<MetricsVector>,
    pub mean: MetricsVector,
    pub std: MetricsVector,
}

impl CrossValSummary {
    pub fn from_folds(folds: Vec<Fold>, per_fold: Vec<MetricsVector>) -> Result<Self> {
        if per_fold.is_empty() {
            return Err(Error::InvalidConfig("cross-validation visited no folds".to_string()));
        }
        let n = per_fold.len() as f64;
        let mut mean = [0.0; MetricsVector::LEN];
        let mut std = [0.0; MetricsVector::LEN];
        for i in 0..MetricsVector::LEN {
            mean[i] = per_fold.iter().map(|m| m.0[i]).sum::<f64>() / n;
            let var = per_fold.iter().map(|m| (m.0[i] - mean[i]).powi(2)).sum::<f64>() / n;
            std[i] = var.sqrt();
        }
        Ok(Self { folds, per_fold, mean: MetricsVector(mean), std: MetricsVector(std) })
    }

    /// One `name: $mean_{\pm std}$` line per metric
    pub fn format(&self) -> String {
        MetricsVector::NAMES
            .iter()
            .enumerate()
            .map(|(i, name)| format!("{name}: ${:.2}_{{\\pm {:.2}}}$", self.mean.0[i], self.std.0[i]))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Raw per-fold vectors as JSON on the first line, the formatted summary after it
    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let raw = serde_json::to_string(&self.per_fold)?;
        fs::write(path, format!("{raw}\n{}\n", self.format()))?;
        Ok(())
    }
}

/// `metrics_crossval[_subj]_{suffix}.txt` under the results directory
pub fn crossval_path(results_dir: &Path, config: &RunConfig) -> PathBuf {
    let subj = if config.split_by_subject { "_subj" } else { "" };
    results_dir.join(format!("metrics_crossval{subj}_{}.txt", config.file_suffix(None)))
}

/// Run every fold, then persist and return the summary
pub fn crossval(
    phase: Phase,
    config: &RunConfig,
    ctx: &ExecutionContext<'_>,
) -> Result<CrossValSummary> {
    let folds = crossval_folds(ctx.data, config)?;
    let mut per_fold = Vec::with_capacity(folds.len());
    for fold in &folds {
        info!("Fold {fold}...");
        per_fold.push(run_fold(phase, config, ctx, Some(fold))?);
    }

    let summary = CrossValSummary::from_folds(folds, per_fold)?;
    info!("{}", summary.format());
    summary.write(&crossval_path(ctx.results_dir(), config))?;
    Ok(summary)
}
