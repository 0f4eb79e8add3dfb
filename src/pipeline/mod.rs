//! Train and test entry points
//!
//! [`train`] and [`test`] dispatch a resolved [`RunConfig`] to a hyperparameter sweep, a
//! cross-validation or a single fold, and from there to the language-model or baseline runner
//! for its model family. Every collaborator comes from the [`ExecutionContext`].

mod baseline;
mod lmkt;

pub use baseline::{test_baseline, train_baseline};
pub use lmkt::{kc_results_path, test_lmkt, train_lmkt};

use crate::config::{ModelFamily, RunConfig};
use crate::context::ExecutionContext;
use crate::data::{Dialogue, Fold, Splits, DEBUG_EVAL_DIALOGUES};
use crate::eval::MetricsVector;
use crate::sweep::{crossval, hyperparam_sweep, CrossValSummary, SweepSummary};
use crate::train::FitResult;
use crate::{Error, Result};
use tracing::{debug, info};

/// Whether a run fits models before evaluating them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Train on each fold, then evaluate the best checkpoint
    Train,
    /// Evaluate existing checkpoints (or a policy)
    Test,
}

/// What a train or test invocation produced
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Single(MetricsVector),
    CrossVal(CrossValSummary),
    Sweep(SweepSummary),
}

impl RunOutcome {
    /// All-turn AUC used to rank sweep candidates; the fold mean under cross-validation
    pub fn selection_auc(&self) -> f64 {
        match self {
            RunOutcome::Single(metrics) => metrics.auc(),
            RunOutcome::CrossVal(summary) => summary.mean.auc(),
            RunOutcome::Sweep(summary) => summary.best().auc,
        }
    }
}

/// Train according to `config`, then evaluate on the held-out split
pub fn train(config: &RunConfig, ctx: &ExecutionContext<'_>) -> Result<RunOutcome> {
    run(Phase::Train, config, ctx)
}

/// Evaluate according to `config` without training
pub fn test(config: &RunConfig, ctx: &ExecutionContext<'_>) -> Result<RunOutcome> {
    run(Phase::Test, config, ctx)
}

pub fn run(phase: Phase, config: &RunConfig, ctx: &ExecutionContext<'_>) -> Result<RunOutcome> {
    if config.hyperparam_sweep {
        return hyperparam_sweep(phase, config, ctx).map(RunOutcome::Sweep);
    }
    if phase == Phase::Train {
        config.require_model_name()?;
    }
    if config.crossval {
        return crossval(phase, config, ctx).map(RunOutcome::CrossVal);
    }
    let fold = ctx.data.default_fold(config);
    run_fold(phase, config, ctx, fold.as_ref()).map(RunOutcome::Single)
}

/// Run one fold with the runner of the configured model family
pub fn run_fold(
    phase: Phase,
    config: &RunConfig,
    ctx: &ExecutionContext<'_>,
    fold: Option<&Fold>,
) -> Result<MetricsVector> {
    match (phase, config.model_type.family()) {
        (Phase::Train, ModelFamily::LanguageModel) => train_lmkt(config, ctx, fold),
        (Phase::Train, ModelFamily::Baseline) => train_baseline(config, ctx, fold),
        (Phase::Train, ModelFamily::Policy) => {
            Err(Error::NotTrainable(config.model_type.to_string()))
        }
        (Phase::Test, ModelFamily::LanguageModel) => test_lmkt(config, ctx, fold),
        (Phase::Test, _) => test_baseline(config, ctx, fold),
    }
}

/// Train/validation splits of a fold, truncated in debug mode
fn training_splits(
    config: &RunConfig,
    ctx: &ExecutionContext<'_>,
    fold: Option<&Fold>,
) -> Result<Splits> {
    let mut splits = ctx.data.load_annotated_data(config, fold)?;
    if config.debug {
        splits = splits.truncate_for_debug();
        debug!(dialogue = ?splits.train.first(), "first training dialogue");
        debug!(dialogue = ?splits.val.first(), "first validation dialogue");
    }
    info!(
        train = splits.train.len(),
        val = splits.val.len(),
        fold = fold.map(ToString::to_string),
        "loaded splits"
    );
    Ok(splits)
}

/// Held-out dialogues: validation under `testonval`, test otherwise
fn eval_dialogues(config: &RunConfig, splits: Splits) -> Vec<Dialogue> {
    let mut dialogues = splits.into_eval_split(config.testonval);
    if config.debug {
        dialogues.truncate(DEBUG_EVAL_DIALOGUES);
    }
    dialogues
}

fn log_fit(result: &FitResult) {
    info!(
        best_epoch = result.best_epoch + 1,
        best_val_loss = result.best_val_loss,
        final_train_loss = result.final_train_loss(),
        elapsed_secs = result.elapsed_secs,
        "training finished"
    );
}
