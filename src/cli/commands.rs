//! Command implementations

use super::{Cli, Command, RunCommandArgs};
use crate::config::{load_config, RunConfig};
use crate::context::ExecutionContext;
use crate::data::JsonDataSource;
use crate::pipeline::{run, Phase, RunOutcome};
use crate::Result;
use tracing::info;

/// Execute a parsed command line
///
/// The binary has no model backends; `random` and `majority` evaluation work out of the box
/// and every other model type reports a missing collaborator.
pub fn run_command(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Train(args) => run_phase(Phase::Train, args),
        Command::Test(args) => run_phase(Phase::Test, args),
    }
}

fn run_phase(phase: Phase, args: RunCommandArgs) -> Result<()> {
    let config = load_config(args.config.as_deref(), args.run)?;
    if args.dry_run {
        info!("Dry run - configuration resolved");
        info!("{}", serde_yaml::to_string(&config)?);
        return Ok(());
    }
    log_run(phase, &config);

    let source = JsonDataSource::new(&args.data_dir);
    let ctx = ExecutionContext::new(&source)
        .with_dirs(&args.results_dir, &args.checkpoint_dir)
        .with_seed(args.seed);

    match run(phase, &config, &ctx)? {
        RunOutcome::Single(metrics) => info!(auc = metrics.auc(), loss = metrics.loss(), "done"),
        RunOutcome::CrossVal(summary) => {
            info!(folds = summary.folds.len(), mean_auc = summary.mean.auc(), "done")
        }
        RunOutcome::Sweep(summary) => {
            let best = summary.best();
            info!(best = %best.name, auc = best.auc, "done")
        }
    }
    Ok(())
}

fn log_run(phase: Phase, config: &RunConfig) {
    info!(
        ?phase,
        model_type = %config.model_type,
        dataset = %config.dataset,
        model_name = config.model_name.as_deref(),
        crossval = config.crossval,
        sweep = config.hyperparam_sweep,
        "starting run"
    );
}
