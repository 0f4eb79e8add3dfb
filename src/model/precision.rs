//! Activation precision reported by language-model collaborators

use std::fmt;

/// Data type of model activations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Precision {
    /// 32-bit floating point (default)
    #[default]
    Fp32,
    /// 16-bit floating point (IEEE half precision)
    Fp16,
    /// 16-bit brain floating point (truncated mantissa)
    Bf16,
}

impl Precision {
    /// Human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            Precision::Fp32 => "fp32",
            Precision::Fp16 => "fp16",
            Precision::Bf16 => "bf16",
        }
    }

    /// Most negative finite value, used for masked positions in additive attention masks
    pub fn min_value(&self) -> f32 {
        match self {
            Precision::Fp32 => f32::MIN,
            Precision::Fp16 => -65504.0,
            Precision::Bf16 => -3.389_531_4e38,
        }
    }
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
