//! Model collaborator contracts
//!
//! Architectures are opaque: the core only needs a forward pass, a backward pass from a
//! gradient on the model output, and access to named trainable parameters.

mod param;
mod precision;

pub use param::Param;
pub use precision::Precision;

use crate::config::ModelType;
use crate::data::{Dialogue, KcDict, LmBatch};
use crate::Result;
use ndarray::{Array3, ArrayView2, ArrayView3};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Compute device handed to model collaborators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Device {
    #[default]
    Cpu,
    Cuda(usize),
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => f.write_str("cpu"),
            Device::Cuda(idx) => write!(f, "cuda:{idx}"),
        }
    }
}

/// Parameter access and train/eval switching shared by every model
pub trait Parameterized {
    fn named_parameters(&self) -> Vec<(String, &Param)>;

    fn named_parameters_mut(&mut self) -> Vec<(String, &mut Param)>;

    /// Toggle dropout and similar training-only behaviour
    fn set_training(&mut self, _training: bool) {}

    fn parameters_mut(&mut self) -> Vec<&mut Param> {
        self.named_parameters_mut().into_iter().map(|(_, p)| p).collect()
    }

    fn num_trainable_parameters(&self) -> usize {
        self.named_parameters().iter().map(|(_, p)| p.len()).sum()
    }
}

// ===== Language models =====

/// Attention mask handed to a language model
#[derive(Debug, Clone, Copy)]
pub enum AttentionMask<'a> {
    /// 0/1 padding mask, `rows x seq_len`
    Padding(ArrayView2<'a, f32>),
    /// Additive mask, `rows x seq_len x seq_len`: 0 attends, dtype minimum is masked
    Additive(ArrayView3<'a, f32>),
}

/// Inputs of one language-model forward pass
#[derive(Debug, Clone, Copy)]
pub struct LmInput<'a> {
    pub input_ids: ArrayView2<'a, u32>,
    pub attention_mask: AttentionMask<'a>,
    pub position_ids: Option<ArrayView2<'a, usize>>,
}

/// One non-zero entry of a gradient on the output logits
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogitGradEntry {
    pub row: usize,
    pub position: usize,
    pub token: u32,
    pub value: f32,
}

/// Sparse gradient of the loss on `rows x seq_len x vocab` logits
///
/// Only answer positions and the two answer tokens carry gradient.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogitGrad {
    pub entries: Vec<LogitGradEntry>,
}

impl LogitGrad {
    pub fn scaled(&self, factor: f32) -> Self {
        Self {
            entries: self
                .entries
                .iter()
                .map(|e| LogitGradEntry { value: e.value * factor, ..*e })
                .collect(),
        }
    }

    /// Dense `rows x seq_len x vocab` view, for collaborators without sparse backward
    pub fn to_dense(&self, dim: (usize, usize, usize)) -> Array3<f32> {
        let mut dense = Array3::zeros(dim);
        for e in &self.entries {
            dense[[e.row, e.position, e.token as usize]] += e.value;
        }
        dense
    }
}

/// Causal language model with trainable adapters
pub trait LanguageModel: Parameterized {
    /// Logits, `rows x seq_len x vocab`
    fn forward(&mut self, input: &LmInput<'_>) -> Result<Array3<f32>>;

    /// Back-propagate a gradient on the logits of the last forward pass into parameter grads
    fn backward(&mut self, grad: &LogitGrad) -> Result<()>;

    /// Precision of activations; additive masks must match it
    fn precision(&self) -> Precision;
}

/// How dialogues are turned into prompts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptOptions {
    /// Pack all KC prompts of a turn into one sequence
    pub packed: bool,
    /// Leave each dialogue's first turn out of the prompts (evaluation)
    pub skip_first_turn: bool,
    pub batch_size: usize,
    /// Shuffle turns with this seed; `None` keeps dialogue order
    pub shuffle_seed: Option<u64>,
}

/// Tokenizer-side collaborator of a language model
pub trait PromptEncoder {
    /// Token ids of the "True" and "False" answers
    fn true_false_tokens(&self) -> (u32, u32);

    /// Build batches for a split
    fn encode(&self, dialogues: &[Dialogue], options: &PromptOptions) -> Result<Vec<LmBatch>>;
}

/// What to load for a language-model run
#[derive(Debug, Clone, PartialEq)]
pub struct LmSpec<'a> {
    pub base_model: &'a str,
    pub r: usize,
    pub lora_alpha: usize,
    /// Adapter to continue training from
    pub pt_model_name: Option<&'a str>,
    pub quantize: bool,
    pub device: Device,
}

/// A loaded language model with its prompt encoder
pub struct LoadedLm {
    pub model: Box<dyn LanguageModel>,
    pub encoder: Box<dyn PromptEncoder>,
}

/// Loads a base model and injects freshly initialised adapters
pub trait LanguageModelLoader {
    fn load(&self, spec: &LmSpec<'_>) -> Result<LoadedLm>;
}

// ===== Sequence-model baselines =====

/// Inputs in the layout each baseline architecture expects
#[derive(Debug, Clone, Copy)]
pub enum ModelInputs<'a> {
    /// Multi-KC turns (`dkt-multi`, `dkt-sem`)
    Turns(&'a crate::data::BaselineBatch),
    /// Flat KC/response interactions (`dkt`, `dkvmn`)
    Interactions { kc_ids: ArrayView2<'a, usize>, labels: ArrayView2<'a, i64> },
    /// Interactions plus problem ids for the Rasch embedding (`akt`)
    Rasch {
        kc_ids: ArrayView2<'a, usize>,
        labels: ArrayView2<'a, i64>,
        problem_ids: ArrayView2<'a, usize>,
    },
    /// Encoder exercises/categories with decoder responses shifted by one (`saint`)
    ExerciseResponses {
        exercises: ArrayView2<'a, usize>,
        categories: ArrayView2<'a, usize>,
        responses: ArrayView2<'a, i64>,
    },
    /// Current and next-step sequences (`simplekt`)
    Lookahead {
        kc_ids: ArrayView2<'a, usize>,
        labels: ArrayView2<'a, i64>,
        next_kc_ids: ArrayView2<'a, usize>,
        next_labels: ArrayView2<'a, i64>,
    },
}

/// Output of a baseline forward pass
#[derive(Debug, Clone)]
pub struct SequenceOutput {
    /// Probability of mastering every KC at every position, `batch x positions x num_kcs`
    ///
    /// Positions are turns for [`ModelInputs::Turns`] and the full flat sequence length for
    /// every other layout.
    pub y: Array3<f32>,
    /// Architecture-specific regularisation loss added to the objective
    pub aux_loss: Option<f32>,
}

/// Gradient of the objective on a [`SequenceOutput`]
#[derive(Debug, Clone)]
pub struct SequenceGrad {
    pub y: Array3<f32>,
    /// Gradient on the auxiliary loss term
    pub aux_loss: f32,
}

impl SequenceGrad {
    pub fn scaled(&self, factor: f32) -> Self {
        Self { y: &self.y * factor, aux_loss: self.aux_loss * factor }
    }
}

/// Knowledge-tracing sequence model
pub trait SequenceModel: Parameterized {
    fn forward(&mut self, inputs: &ModelInputs<'_>) -> Result<SequenceOutput>;

    fn backward(&mut self, grad: &SequenceGrad) -> Result<()>;
}

/// What to build for a baseline run
#[derive(Debug, Clone)]
pub struct BaselineSpec<'a> {
    pub model_type: ModelType,
    pub kc_dict: &'a KcDict,
    pub emb_size: usize,
    pub device: Device,
}

/// Constructs baseline architectures; unknown types fail with `Error::UnsupportedModel`
pub trait BaselineModelFactory {
    fn build(&self, spec: &BaselineSpec<'_>) -> Result<Box<dyn SequenceModel>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logit_grad_scaling_and_dense() {
        let grad = LogitGrad {
            entries: vec![
                LogitGradEntry { row: 0, position: 2, token: 1, value: 0.5 },
                LogitGradEntry { row: 0, position: 2, token: 1, value: 0.25 },
                LogitGradEntry { row: 1, position: 0, token: 0, value: -1.0 },
            ],
        };
        let scaled = grad.scaled(0.5);
        assert_eq!(scaled.entries[2].value, -0.5);

        let dense = grad.to_dense((2, 3, 2));
        assert_eq!(dense[[0, 2, 1]], 0.75);
        assert_eq!(dense[[1, 0, 0]], -1.0);
        assert_eq!(dense.sum(), -0.25);
    }

    #[test]
    fn test_device_display() {
        assert_eq!(Device::Cpu.to_string(), "cpu");
        assert_eq!(Device::Cuda(1).to_string(), "cuda:1");
    }
}
