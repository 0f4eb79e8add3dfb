//! Batch layouts consumed by the loss adapters

use ndarray::{Array1, Array2, Array3};

/// Label value for turns excluded from every loss and metric
pub const IGNORE_INDEX: i64 = -100;

/// Maps a batch row back to its dialogue turn
#[derive(Debug, Clone, PartialEq)]
pub struct TurnMeta {
    pub dialogue_idx: usize,
    pub turn_idx: usize,
    /// KC texts, in the order their probabilities appear
    pub kcs: Vec<String>,
}

/// One prompt sequence per (turn, KC) pair
#[derive(Debug, Clone)]
pub struct UnpackedLmBatch {
    /// Token ids, `rows x seq_len`; one row per KC occurrence
    pub input_ids: Array2<u32>,
    /// 0/1 attention mask, `rows x seq_len`
    pub attention_mask: Array2<f32>,
    /// Answer position of each row
    pub last_idxs: Vec<usize>,
    /// KC rows belonging to each turn, contiguous and in order
    pub num_kcs: Vec<usize>,
    /// Correctness label per turn
    pub labels: Array1<f32>,
    pub meta_data: Vec<TurnMeta>,
}

/// All KC prompts of a turn packed into a single sequence
#[derive(Debug, Clone)]
pub struct PackedLmBatch {
    /// Token ids, `turns x seq_len`
    pub input_ids: Array2<u32>,
    /// 0/1 attention mask, `turns x seq_len x seq_len`
    pub attention_mask: Array3<f32>,
    /// Position ids restarting for each packed KC prompt
    pub position_ids: Array2<usize>,
    /// Answer positions, `turns x max_kcs`; slots past `num_kcs` are padding (0)
    pub last_idxs: Array2<usize>,
    pub num_kcs: Vec<usize>,
    pub labels: Array1<f32>,
    pub meta_data: Vec<TurnMeta>,
}

/// Language-model batch in either layout
#[derive(Debug, Clone)]
pub enum LmBatch {
    Unpacked(UnpackedLmBatch),
    Packed(PackedLmBatch),
}

impl LmBatch {
    pub fn labels(&self) -> &Array1<f32> {
        match self {
            LmBatch::Unpacked(b) => &b.labels,
            LmBatch::Packed(b) => &b.labels,
        }
    }

    pub fn meta_data(&self) -> &[TurnMeta] {
        match self {
            LmBatch::Unpacked(b) => &b.meta_data,
            LmBatch::Packed(b) => &b.meta_data,
        }
    }

    pub fn num_turns(&self) -> usize {
        self.labels().len()
    }
}

/// KC sequence with one position per (turn, KC), for single-KC-per-step architectures
#[derive(Debug, Clone, PartialEq)]
pub struct FlatSequence {
    /// `batch x flat_len`, padded with 0
    pub kc_ids: Array2<usize>,
    /// Turn label repeated for each of its KCs; unlabeled and padding positions hold 0
    pub labels: Array2<i64>,
    /// Flat index of the last KC of each turn, `batch x turns`
    pub turn_end_idxs: Array2<usize>,
}

/// One row per dialogue
#[derive(Debug, Clone, PartialEq)]
pub struct BaselineBatch {
    /// `batch x turns x max_kcs`, padded with 0
    pub kc_ids: Array3<usize>,
    /// Real KC count per turn, `batch x turns`
    pub num_kcs: Array2<usize>,
    /// Correctness per turn, padded with [`IGNORE_INDEX`]
    pub labels: Array2<i64>,
    /// Present when the collator flattened KCs
    pub flat: Option<FlatSequence>,
    pub dialogue_idxs: Vec<usize>,
}

impl BaselineBatch {
    pub fn batch_size(&self) -> usize {
        self.labels.nrows()
    }

    pub fn max_turns(&self) -> usize {
        self.labels.ncols()
    }

    /// Labels predicted by the model: every turn after the first
    pub fn target_labels(&self) -> ndarray::ArrayView2<'_, i64> {
        self.labels.slice(ndarray::s![.., 1..])
    }
}
