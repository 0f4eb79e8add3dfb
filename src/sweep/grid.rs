//! Hyperparameter grid search

use crate::config::{ModelType, RunConfig};
use crate::context::ExecutionContext;
use crate::pipeline::{run, Phase};
use crate::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Learning rates tried for LoRA fine-tuning
pub const LMKT_LRS: [f32; 4] = [5e-5, 1e-4, 2e-4, 3e-4];

/// LoRA ranks; alpha follows the rank
pub const LORA_RANKS: [usize; 5] = [2, 4, 8, 16, 32];

/// Learning rates tried for sequence-model baselines
pub const BASELINE_LRS: [f32; 6] = [1e-4, 2e-4, 5e-4, 1e-3, 2e-3, 5e-3];

/// Embedding sizes tried for sequence-model baselines
pub const EMB_SIZES: [usize; 6] = [8, 16, 32, 64, 128, 256];

/// One point of the grid
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SweepPoint {
    Lora { lr: f32, r: usize },
    Embedding { lr: f32, emb_size: usize },
}

/// Shortest round-trip float text, with an exponent outside `[1e-4, 1e16)` (`5e-05`, `0.0001`)
fn float_repr(value: f32) -> String {
    let sci = format!("{value:e}");
    let Some((mantissa, exp)) = sci.split_once('e') else {
        return sci;
    };
    let exp: i32 = exp.parse().unwrap_or(0);
    if (-4..16).contains(&exp) {
        let plain = value.to_string();
        if plain.contains('.') {
            plain
        } else {
            format!("{plain}.0")
        }
    } else {
        let sign = if exp < 0 { '-' } else { '+' };
        format!("{mantissa}e{sign}{:02}", exp.abs())
    }
}

impl SweepPoint {
    pub fn run_name(&self, config: &RunConfig) -> String {
        let prefix = format!("hpsweep_{}_{}_{}", config.dataset, config.tag_src, config.model_type);
        match self {
            SweepPoint::Lora { lr, r } => format!("{prefix}_lr{}_r{r}", float_repr(*lr)),
            SweepPoint::Embedding { lr, emb_size } => {
                format!("{prefix}_lr{}_es{emb_size}", float_repr(*lr))
            }
        }
    }

    /// Candidate configuration: evaluated on validation, cross-validated on `comta`
    pub fn apply(&self, base: &RunConfig) -> RunConfig {
        let mut config = base.clone();
        config.model_name = Some(self.run_name(base));
        config.hyperparam_sweep = false;
        config.testonval = true;
        config.crossval = base.dataset == "comta";
        config.split_by_subject &= config.crossval;
        match *self {
            SweepPoint::Lora { lr, r } => {
                config.lr = lr;
                config.r = r;
                config.lora_alpha = r;
            }
            SweepPoint::Embedding { lr, emb_size } => {
                config.lr = lr;
                config.emb_size = emb_size;
            }
        }
        config
    }
}

fn cartesian_product<A: Copy, B: Copy>(outer: &[A], inner: &[B]) -> Vec<(A, B)> {
    outer.iter().flat_map(|&a| inner.iter().map(move |&b| (a, b))).collect()
}

/// Grid points in run order, learning rate outermost
pub fn sweep_grid(model_type: ModelType) -> Vec<SweepPoint> {
    if model_type.is_language_model() {
        cartesian_product(&LMKT_LRS, &LORA_RANKS)
            .into_iter()
            .map(|(lr, r)| SweepPoint::Lora { lr, r })
            .collect()
    } else {
        cartesian_product(&BASELINE_LRS, &EMB_SIZES)
            .into_iter()
            .map(|(lr, emb_size)| SweepPoint::Embedding { lr, emb_size })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SweepEntry {
    pub name: String,
    pub auc: f64,
}

/// Scores of every candidate and the winner (first maximum)
#[derive(Debug, Clone, PartialEq)]
pub struct SweepSummary {
    pub entries: Vec<SweepEntry>,
    best: usize,
}

impl SweepSummary {
    pub fn from_entries(entries: Vec<SweepEntry>) -> Result<Self> {
        let best = entries
            .iter()
            .enumerate()
            .fold(None, |best: Option<(usize, f64)>, (i, entry)| match best {
                Some((_, auc)) if entry.auc <= auc => best,
                _ => Some((i, entry.auc)),
            })
            .map(|(i, _)| i)
            .ok_or_else(|| Error::InvalidConfig("hyperparameter grid is empty".to_string()))?;
        Ok(Self { entries, best })
    }

    pub fn best(&self) -> &SweepEntry {
        &self.entries[self.best]
    }

    pub fn format(&self) -> String {
        let mut lines: Vec<String> =
            self.entries.iter().map(|e| format!("{}: {:.2}", e.name, e.auc)).collect();
        let best = self.best();
        lines.push(format!("Best: {}: {:.2}", best.name, best.auc));
        lines.join("\n")
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, format!("{}\n", self.format()))?;
        Ok(())
    }
}

/// `metrics_hpsweep_{dataset}_{tag_src}_{model_type}.txt` under the results directory
pub fn sweep_path(results_dir: &Path, config: &RunConfig) -> PathBuf {
    results_dir.join(format!(
        "metrics_hpsweep_{}_{}_{}.txt",
        config.dataset, config.tag_src, config.model_type
    ))
}

/// Run every grid point and rank the candidates by validation AUC
pub fn hyperparam_sweep(
    phase: Phase,
    config: &RunConfig,
    ctx: &ExecutionContext<'_>,
) -> Result<SweepSummary> {
    let grid = sweep_grid(config.model_type);
    let mut entries = Vec::with_capacity(grid.len());
    for (i, point) in grid.iter().enumerate() {
        let candidate = point.apply(config);
        let name = candidate.checkpoint_name(None)?;
        info!(candidate = i + 1, total = grid.len(), %name, "sweep candidate");
        let outcome = run(phase, &candidate, ctx)?;
        entries.push(SweepEntry { name, auc: outcome.selection_auc() });
    }

    let summary = SweepSummary::from_entries(entries)?;
    info!("{}", summary.format());
    summary.write(&sweep_path(ctx.results_dir(), config))?;
    Ok(summary)
}
