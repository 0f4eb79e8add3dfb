//! Sequence-model baselines and the non-learned policies

use super::{eval_dialogues, log_fit, training_splits};
use crate::config::{ModelType, RunConfig};
use crate::context::ExecutionContext;
use crate::data::{majority_class, BaselineCollator, Fold, KcDict};
use crate::eval::{compute_all_metrics, evaluate_baseline, metrics_path, BaselinePredictor, MetricsVector};
use crate::io::{checkpoint_path, load_checkpoint, CheckpointLayout};
use crate::model::{BaselineSpec, SequenceModel};
use crate::optim::build_optimizer;
use crate::train::{Adapter, BaselineLearner, TrainConfig, Trainer};
use crate::Result;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::info;

fn build_model(
    config: &RunConfig,
    ctx: &ExecutionContext<'_>,
    kc_dict: &KcDict,
) -> Result<Box<dyn SequenceModel>> {
    let factory = ctx.require_baseline_factory()?;
    let model = factory.build(&BaselineSpec {
        model_type: config.model_type,
        kc_dict,
        emb_size: config.emb_size,
        device: ctx.device,
    })?;
    info!(
        model_type = %config.model_type,
        kcs = kc_dict.len(),
        emb_size = config.emb_size,
        trainable = model.num_trainable_parameters(),
        "built baseline model"
    );
    Ok(model)
}

/// Train a baseline on one fold and evaluate the best checkpoint
pub fn train_baseline(
    config: &RunConfig,
    ctx: &ExecutionContext<'_>,
    fold: Option<&Fold>,
) -> Result<MetricsVector> {
    let name = config.checkpoint_name(fold)?;
    let adapter = Adapter::for_model(config.model_type)?;
    let kc_dict = ctx.data.load_kc_dict(config)?;
    let model = build_model(config, ctx, &kc_dict)?;

    let splits = training_splits(config, ctx, fold)?;
    let collator = BaselineCollator::new(config.model_type.flattens_kcs());
    let val_batches = collator.batches::<StdRng>(&splits.val, &kc_dict, config.batch_size, None)?;

    let train_config = TrainConfig {
        epochs: config.epochs,
        grad_accum_steps: config.grad_accum_steps,
        max_grad_norm: config.grad_clip(),
        checkpoint_path: checkpoint_path(ctx.checkpoint_dir(), &name, CheckpointLayout::SingleFile),
        run_name: name,
        architecture: config.model_type.to_string(),
    };
    let mut trainer = Trainer::new(build_optimizer(config.optim, config.lr, config.wd), train_config);
    let mut learner = BaselineLearner { model, adapter };

    let mut rng = StdRng::seed_from_u64(ctx.seed);
    let result = trainer.fit(
        &mut learner,
        |_| collator.batches(&splits.train, &kc_dict, config.batch_size, Some(&mut rng)),
        &val_batches,
    )?;
    log_fit(&result);
    drop(learner);

    test_baseline(config, ctx, fold)
}

/// Evaluate a trained baseline, or the `random`/`majority` policy, on one fold
pub fn test_baseline(
    config: &RunConfig,
    ctx: &ExecutionContext<'_>,
    fold: Option<&Fold>,
) -> Result<MetricsVector> {
    let kc_dict = ctx.data.load_kc_dict(config)?;
    let splits = ctx.data.load_annotated_data(config, fold)?;
    let majority = majority_class(&splits.train);
    let dialogues = eval_dialogues(config, splits);

    let collator = BaselineCollator::new(config.model_type.flattens_kcs());
    let batches = collator.batches::<StdRng>(&dialogues, &kc_dict, config.batch_size, None)?;

    let predictions = match config.model_type {
        ModelType::Random => {
            let mut predictor = BaselinePredictor::Random(StdRng::seed_from_u64(ctx.seed));
            evaluate_baseline(&mut predictor, &batches)?
        }
        ModelType::Majority => {
            info!(majority, "majority class of the training split");
            evaluate_baseline(&mut BaselinePredictor::Majority(majority), &batches)?
        }
        model_type => {
            let adapter = Adapter::for_model(model_type)?;
            let mut model = build_model(config, ctx, &kc_dict)?;
            let path = checkpoint_path(
                ctx.checkpoint_dir(),
                &config.checkpoint_name(fold)?,
                CheckpointLayout::SingleFile,
            );
            let metadata = load_checkpoint(model.as_mut(), &path)?;
            info!(path = %path.display(), saved_at = %metadata.saved_at, "loaded checkpoint");
            let mut predictor = BaselinePredictor::Model { model: model.as_mut(), adapter };
            evaluate_baseline(&mut predictor, &batches)?
        }
    };

    compute_all_metrics(&predictions, &metrics_path(ctx.results_dir(), &config.file_suffix(fold)))
}
