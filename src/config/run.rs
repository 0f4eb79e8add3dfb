//! Run configuration: partial arguments and the resolved, immutable configuration

use super::model_type::{ModelFamily, ModelType};
use crate::data::Fold;
use crate::{Error, Result};
use clap::{Args, ValueEnum};
use serde::{Deserialize, Serialize};

/// Optimizer selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OptimizerKind {
    #[default]
    #[value(name = "adamw")]
    AdamW,
    Adafactor,
}

/// Run options as supplied by a YAML file and/or the command line.
///
/// Every field is optional; [`RunConfig::resolve`] fills in family defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Args)]
#[serde(default)]
pub struct RunArgs {
    /// Model identifier (lmkt, dkt-multi, dkt-sem, dkt, akt, dkvmn, saint, simplekt, random, majority)
    #[arg(long)]
    pub model_type: Option<ModelType>,

    /// Dataset name passed to the data collaborator
    #[arg(long)]
    pub dataset: Option<String>,

    /// Run name used for checkpoints and result files
    #[arg(long)]
    pub model_name: Option<String>,

    /// Number of training epochs
    #[arg(long)]
    pub epochs: Option<usize>,

    /// Learning rate
    #[arg(long)]
    pub lr: Option<f32>,

    /// Weight decay
    #[arg(long)]
    pub wd: Option<f32>,

    /// Gradient clipping threshold (0 disables clipping)
    #[arg(long)]
    pub gc: Option<f32>,

    /// Batch size
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Micro-batches per optimizer step
    #[arg(long)]
    pub grad_accum_steps: Option<usize>,

    /// LoRA rank
    #[arg(long)]
    pub r: Option<usize>,

    /// LoRA alpha
    #[arg(long)]
    pub lora_alpha: Option<usize>,

    /// Embedding size for sequence models
    #[arg(long)]
    pub emb_size: Option<usize>,

    /// Optimizer
    #[arg(long, value_enum)]
    pub optim: Option<OptimizerKind>,

    /// Base language model identifier
    #[arg(long)]
    pub base_model: Option<String>,

    /// Pretrained adapter to start LoRA training from
    #[arg(long)]
    pub pt_model_name: Option<String>,

    /// Annotation source tag, used in sweep run names
    #[arg(long)]
    pub tag_src: Option<String>,

    /// Run cross-validation over all folds
    #[arg(long)]
    pub crossval: bool,

    /// Use leave-one-subject-out folds
    #[arg(long)]
    pub split_by_subject: bool,

    /// Evaluate on the validation split instead of the test split
    #[arg(long)]
    pub testonval: bool,

    /// Truncate splits for fast iteration
    #[arg(long)]
    pub debug: bool,

    /// Pack all KCs of a turn into one LM sequence
    #[arg(long)]
    pub pack_kcs: bool,

    /// Load the base language model quantized
    #[arg(long)]
    pub quantize: bool,

    /// Run the hyperparameter grid instead of a single configuration
    #[arg(long)]
    pub hyperparam_sweep: bool,
}

impl RunArgs {
    /// Overlay `overrides` on top of `self`; set values in `overrides` win.
    pub fn merge(self, overrides: RunArgs) -> RunArgs {
        RunArgs {
            model_type: overrides.model_type.or(self.model_type),
            dataset: overrides.dataset.or(self.dataset),
            model_name: overrides.model_name.or(self.model_name),
            epochs: overrides.epochs.or(self.epochs),
            lr: overrides.lr.or(self.lr),
            wd: overrides.wd.or(self.wd),
            gc: overrides.gc.or(self.gc),
            batch_size: overrides.batch_size.or(self.batch_size),
            grad_accum_steps: overrides.grad_accum_steps.or(self.grad_accum_steps),
            r: overrides.r.or(self.r),
            lora_alpha: overrides.lora_alpha.or(self.lora_alpha),
            emb_size: overrides.emb_size.or(self.emb_size),
            optim: overrides.optim.or(self.optim),
            base_model: overrides.base_model.or(self.base_model),
            pt_model_name: overrides.pt_model_name.or(self.pt_model_name),
            tag_src: overrides.tag_src.or(self.tag_src),
            crossval: overrides.crossval || self.crossval,
            split_by_subject: overrides.split_by_subject || self.split_by_subject,
            testonval: overrides.testonval || self.testonval,
            debug: overrides.debug || self.debug,
            pack_kcs: overrides.pack_kcs || self.pack_kcs,
            quantize: overrides.quantize || self.quantize,
            hyperparam_sweep: overrides.hyperparam_sweep || self.hyperparam_sweep,
        }
    }
}

/// Default base model for LMKT runs
pub const DEFAULT_BASE_MODEL: &str = "meta-llama/Meta-Llama-3.1-8B-Instruct";

/// Family defaults applied by [`RunConfig::resolve`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FamilyDefaults {
    pub epochs: usize,
    pub lr: f32,
    pub wd: f32,
    pub gc: f32,
    pub batch_size: usize,
    pub grad_accum_steps: usize,
}

impl FamilyDefaults {
    pub fn for_model(model_type: ModelType) -> Self {
        match model_type.family() {
            ModelFamily::LanguageModel => Self {
                epochs: 5,
                lr: 2e-4,
                wd: 1e-2,
                gc: 1.0,
                batch_size: 1,
                grad_accum_steps: 64,
            },
            ModelFamily::Baseline | ModelFamily::Policy => Self {
                epochs: 100,
                lr: 1e-3,
                wd: 1e-2,
                gc: 0.0,
                batch_size: 64,
                grad_accum_steps: 1,
            },
        }
    }
}

/// Fully resolved run configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub model_type: ModelType,
    pub dataset: String,
    pub model_name: Option<String>,
    pub epochs: usize,
    pub lr: f32,
    pub wd: f32,
    pub gc: f32,
    pub batch_size: usize,
    pub grad_accum_steps: usize,
    pub r: usize,
    pub lora_alpha: usize,
    pub emb_size: usize,
    pub optim: OptimizerKind,
    pub base_model: String,
    pub pt_model_name: Option<String>,
    pub tag_src: String,
    pub crossval: bool,
    pub split_by_subject: bool,
    pub testonval: bool,
    pub debug: bool,
    pub pack_kcs: bool,
    pub quantize: bool,
    pub hyperparam_sweep: bool,
}

impl RunConfig {
    /// Resolve defaults once; the result is never read from ambient state again.
    pub fn resolve(args: RunArgs) -> Result<Self> {
        let model_type = args
            .model_type
            .ok_or_else(|| Error::InvalidConfig("model_type is required".to_string()))?;
        let dataset = args
            .dataset
            .ok_or_else(|| Error::InvalidConfig("dataset is required".to_string()))?;
        let defaults = FamilyDefaults::for_model(model_type);

        let config = Self {
            model_type,
            dataset,
            model_name: args.model_name,
            epochs: args.epochs.unwrap_or(defaults.epochs),
            lr: args.lr.unwrap_or(defaults.lr),
            wd: args.wd.unwrap_or(defaults.wd),
            gc: args.gc.unwrap_or(defaults.gc),
            batch_size: args.batch_size.unwrap_or(defaults.batch_size),
            grad_accum_steps: args.grad_accum_steps.unwrap_or(defaults.grad_accum_steps),
            r: args.r.unwrap_or(16),
            lora_alpha: args.lora_alpha.unwrap_or(16),
            emb_size: args.emb_size.unwrap_or(64),
            optim: args.optim.unwrap_or_default(),
            base_model: args.base_model.unwrap_or_else(|| DEFAULT_BASE_MODEL.to_string()),
            pt_model_name: args.pt_model_name,
            tag_src: args.tag_src.unwrap_or_else(|| "default".to_string()),
            crossval: args.crossval,
            split_by_subject: args.split_by_subject,
            testonval: args.testonval,
            debug: args.debug,
            pack_kcs: args.pack_kcs,
            quantize: args.quantize,
            hyperparam_sweep: args.hyperparam_sweep,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::InvalidConfig("batch_size must be positive".to_string()));
        }
        if self.grad_accum_steps == 0 {
            return Err(Error::InvalidConfig("grad_accum_steps must be positive".to_string()));
        }
        if self.gc < 0.0 {
            return Err(Error::InvalidConfig("gc must not be negative".to_string()));
        }
        if self.split_by_subject && !self.crossval {
            return Err(Error::InvalidConfig(
                "split_by_subject requires crossval".to_string(),
            ));
        }
        Ok(())
    }

    /// Gradient clipping threshold, `None` when disabled
    pub fn grad_clip(&self) -> Option<f32> {
        (self.gc > 0.0).then_some(self.gc)
    }

    /// Run name, required by anything that writes or reads checkpoints
    pub fn require_model_name(&self) -> Result<&str> {
        self.model_name
            .as_deref()
            .ok_or_else(|| Error::InvalidConfig("model_name is required".to_string()))
    }

    /// Checkpoint name for a fold: `{model_name}` or `{model_name}_{fold}`
    pub fn checkpoint_name(&self, fold: Option<&Fold>) -> Result<String> {
        let name = self.require_model_name()?;
        Ok(match fold {
            Some(fold) => format!("{name}_{fold}"),
            None => name.to_string(),
        })
    }

    /// Stem shared by every result file of this run
    pub fn file_suffix(&self, fold: Option<&Fold>) -> String {
        let run = self.model_name.as_deref().unwrap_or(self.model_type.as_str());
        match fold {
            Some(fold) => format!("{}_{run}_{fold}", self.dataset),
            None => format!("{}_{run}", self.dataset),
        }
    }
}
