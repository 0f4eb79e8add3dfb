//! Dialogue data model and the data-collaborator contract
//!
//! Annotation of dialogues with KCs and correctness happens upstream; this module only
//! describes the shape the training core consumes and how splits are requested.

mod batch;
mod collate;
mod json;

pub use batch::{
    BaselineBatch, FlatSequence, LmBatch, PackedLmBatch, TurnMeta, UnpackedLmBatch, IGNORE_INDEX,
};
pub use collate::{majority_class, BaselineCollator};
pub use json::JsonDataSource;

use crate::config::RunConfig;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// One learner turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    /// KCs exercised by this turn
    #[serde(default)]
    pub kcs: Vec<String>,
    /// Correctness label, `None` when the turn is unlabeled
    #[serde(default)]
    pub correct: Option<bool>,
}

impl Turn {
    /// Label as stored in batches: 1, 0 or [`IGNORE_INDEX`]
    pub fn label(&self) -> i64 {
        match self.correct {
            Some(true) => 1,
            Some(false) => 0,
            None => IGNORE_INDEX,
        }
    }
}

/// An annotated tutoring dialogue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dialogue {
    pub dialogue_idx: usize,
    #[serde(default)]
    pub subject: Option<String>,
    pub turns: Vec<Turn>,
}

/// Training and validation dialogues kept in debug mode
pub const DEBUG_TRAIN_DIALOGUES: usize = 2;

/// Held-out dialogues kept in debug mode
pub const DEBUG_EVAL_DIALOGUES: usize = 10;

/// Train/validation/test partition
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Splits {
    pub train: Vec<Dialogue>,
    pub val: Vec<Dialogue>,
    pub test: Vec<Dialogue>,
}

impl Splits {
    /// Debug mode keeps two training/validation dialogues and ten test dialogues
    pub fn truncate_for_debug(mut self) -> Self {
        self.train.truncate(DEBUG_TRAIN_DIALOGUES);
        self.val.truncate(DEBUG_TRAIN_DIALOGUES);
        self.test.truncate(DEBUG_EVAL_DIALOGUES);
        self
    }

    /// Held-out split used for final reporting
    pub fn into_eval_split(self, testonval: bool) -> Vec<Dialogue> {
        if testonval {
            self.val
        } else {
            self.test
        }
    }
}

/// Cross-validation fold
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Fold {
    /// Fixed k-fold index, starting at 1
    Index(usize),
    /// Held-out subject
    Subject(String),
}

impl fmt::Display for Fold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fold::Index(idx) => write!(f, "{idx}"),
            Fold::Subject(subject) => f.write_str(subject),
        }
    }
}

/// Number of numeric cross-validation folds
pub const NUM_FOLDS: usize = 5;

/// KC text to integer id
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KcDict {
    ids: HashMap<String, usize>,
}

impl KcDict {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a KC, returning its id; existing KCs keep theirs
    pub fn insert(&mut self, kc: impl Into<String>) -> usize {
        let next = self.ids.len();
        *self.ids.entry(kc.into()).or_insert(next)
    }

    pub fn id(&self, kc: &str) -> Option<usize> {
        self.ids.get(kc).copied()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// KC texts ordered by id
    pub fn kcs_by_id(&self) -> Vec<&str> {
        let mut kcs: Vec<(&str, usize)> = self.ids.iter().map(|(k, &v)| (k.as_str(), v)).collect();
        kcs.sort_by_key(|&(_, id)| id);
        kcs.into_iter().map(|(k, _)| k).collect()
    }
}

impl<S: Into<String>> FromIterator<S> for KcDict {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut dict = KcDict::new();
        for kc in iter {
            dict.insert(kc);
        }
        dict
    }
}

/// Data collaborator: annotated splits and the KC vocabulary
pub trait DataSource {
    /// Train/validation/test splits for a fold; `None` selects the dataset's canonical split
    fn load_annotated_data(&self, config: &RunConfig, fold: Option<&Fold>) -> Result<Splits>;

    /// KC vocabulary of the dataset
    fn load_kc_dict(&self, config: &RunConfig) -> Result<KcDict>;

    /// Fold used when cross-validation is off
    fn default_fold(&self, _config: &RunConfig) -> Option<Fold> {
        None
    }

    /// Subjects available for leave-subject-out folds
    fn subjects(&self, config: &RunConfig) -> Result<Vec<String>>;
}

/// Folds visited by cross-validation
pub fn crossval_folds(source: &dyn DataSource, config: &RunConfig) -> Result<Vec<Fold>> {
    if config.split_by_subject {
        Ok(source.subjects(config)?.into_iter().map(Fold::Subject).collect())
    } else {
        Ok((1..=NUM_FOLDS).map(Fold::Index).collect())
    }
}
