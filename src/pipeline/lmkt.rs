//! Language-model knowledge tracing: fine-tune adapters, then score every KC of every turn

use super::{eval_dialogues, log_fit, training_splits};
use crate::aggregate::AnswerTokens;
use crate::config::RunConfig;
use crate::context::ExecutionContext;
use crate::data::Fold;
use crate::eval::{compute_all_metrics, evaluate_lm, metrics_path, MetricsVector};
use crate::io::{checkpoint_path, load_checkpoint, CheckpointLayout};
use crate::model::{LmSpec, LoadedLm, PromptOptions};
use crate::optim::build_optimizer;
use crate::train::{LmLearner, TrainConfig, Trainer};
use crate::Result;
use std::path::{Path, PathBuf};
use tracing::info;

/// Per-dialogue KC probabilities of an evaluation run
pub fn kc_results_path(results_dir: &Path, suffix: &str) -> PathBuf {
    results_dir.join(format!("kc_results_{suffix}.json"))
}

fn lm_spec<'a>(
    config: &'a RunConfig,
    ctx: &ExecutionContext<'_>,
    pretrained: Option<&'a str>,
) -> LmSpec<'a> {
    LmSpec {
        base_model: &config.base_model,
        r: config.r,
        lora_alpha: config.lora_alpha,
        pt_model_name: pretrained,
        quantize: config.quantize,
        device: ctx.device,
    }
}

fn prompt_options(config: &RunConfig, skip_first_turn: bool, shuffle_seed: Option<u64>) -> PromptOptions {
    PromptOptions {
        packed: config.pack_kcs,
        skip_first_turn,
        batch_size: config.batch_size,
        shuffle_seed,
    }
}

/// Fine-tune adapters on one fold and evaluate the best checkpoint
pub fn train_lmkt(
    config: &RunConfig,
    ctx: &ExecutionContext<'_>,
    fold: Option<&Fold>,
) -> Result<MetricsVector> {
    let name = config.checkpoint_name(fold)?;
    let loader = ctx.require_lm_loader()?;
    let LoadedLm { model, encoder } =
        loader.load(&lm_spec(config, ctx, config.pt_model_name.as_deref()))?;
    info!(
        base_model = %config.base_model,
        trainable = model.num_trainable_parameters(),
        precision = %model.precision(),
        "loaded language model"
    );

    let splits = training_splits(config, ctx, fold)?;
    let val_batches = encoder.encode(&splits.val, &prompt_options(config, false, None))?;

    let train_config = TrainConfig {
        epochs: config.epochs,
        grad_accum_steps: config.grad_accum_steps,
        max_grad_norm: config.grad_clip(),
        checkpoint_path: checkpoint_path(ctx.checkpoint_dir(), &name, CheckpointLayout::Adapter),
        run_name: name,
        architecture: config.model_type.to_string(),
    };
    let mut trainer = Trainer::new(build_optimizer(config.optim, config.lr, config.wd), train_config);
    let mut learner = LmLearner { model, tokens: AnswerTokens::from(encoder.true_false_tokens()) };

    let seed = ctx.seed;
    let result = trainer.fit(
        &mut learner,
        |epoch| {
            let options = prompt_options(config, false, Some(seed.wrapping_add(epoch as u64)));
            encoder.encode(&splits.train, &options)
        },
        &val_batches,
    )?;
    log_fit(&result);
    drop(learner);

    test_lmkt(config, ctx, fold)
}

/// Evaluate a fold with the trained adapters, or the bare base model when no run name is set
pub fn test_lmkt(
    config: &RunConfig,
    ctx: &ExecutionContext<'_>,
    fold: Option<&Fold>,
) -> Result<MetricsVector> {
    let loader = ctx.require_lm_loader()?;
    let LoadedLm { mut model, encoder } = loader.load(&lm_spec(config, ctx, None))?;
    if config.model_name.is_some() {
        let path = checkpoint_path(
            ctx.checkpoint_dir(),
            &config.checkpoint_name(fold)?,
            CheckpointLayout::Adapter,
        );
        let metadata = load_checkpoint(model.as_mut(), &path)?;
        info!(path = %path.display(), saved_at = %metadata.saved_at, "loaded adapter checkpoint");
    } else {
        info!("no model name set, evaluating the base model");
    }

    let dialogues = eval_dialogues(config, ctx.data.load_annotated_data(config, fold)?);
    let batches = encoder.encode(&dialogues, &prompt_options(config, true, None))?;
    let evaluation = evaluate_lm(model.as_mut(), &batches, encoder.true_false_tokens().into())?;

    let suffix = config.file_suffix(fold);
    evaluation.kc_report.write_json(&kc_results_path(ctx.results_dir(), &suffix))?;
    compute_all_metrics(&evaluation.predictions, &metrics_path(ctx.results_dir(), &suffix))
}
