//! File-backed data collaborator
//!
//! Reads `{data_dir}/{dataset}.json`:
//!
//! ```json
//! { "dialogues": [ { "dialogue_idx": 0, "subject": "Algebra",
//!     "turns": [ { "kcs": ["Combine like terms"], "correct": true } ] } ] }
//! ```

use super::{DataSource, Dialogue, Fold, KcDict, Splits, NUM_FOLDS};
use crate::config::RunConfig;
use crate::{Error, Result};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
struct DatasetFile {
    dialogues: Vec<Dialogue>,
}

/// Annotated dialogues stored as one JSON document per dataset
#[derive(Debug, Clone)]
pub struct JsonDataSource {
    data_dir: PathBuf,
}

impl JsonDataSource {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self { data_dir: data_dir.into() }
    }

    pub fn dataset_path(&self, dataset: &str) -> PathBuf {
        self.data_dir.join(format!("{dataset}.json"))
    }

    fn load(&self, dataset: &str) -> Result<Vec<Dialogue>> {
        read_dialogues(&self.dataset_path(dataset))
    }
}

fn read_dialogues(path: &Path) -> Result<Vec<Dialogue>> {
    let text = fs::read_to_string(path)
        .map_err(|e| Error::Data(format!("Failed to read {}: {e}", path.display())))?;
    let file: DatasetFile = serde_json::from_str(&text)?;
    Ok(file.dialogues)
}

/// Deterministic split of `dialogues` for a fold
pub(crate) fn split_dialogues(dialogues: Vec<Dialogue>, fold: Option<&Fold>) -> Splits {
    let mut splits = Splits::default();
    match fold {
        None => {
            let n = dialogues.len();
            let n_holdout = n.div_ceil(10);
            let val_start = n.saturating_sub(2 * n_holdout);
            let test_start = n.saturating_sub(n_holdout);
            for (i, dialogue) in dialogues.into_iter().enumerate() {
                if i >= test_start {
                    splits.test.push(dialogue);
                } else if i >= val_start {
                    splits.val.push(dialogue);
                } else {
                    splits.train.push(dialogue);
                }
            }
        }
        Some(Fold::Index(k)) => {
            let test_bucket = (k + NUM_FOLDS - 1) % NUM_FOLDS;
            let val_bucket = k % NUM_FOLDS;
            for (i, dialogue) in dialogues.into_iter().enumerate() {
                match i % NUM_FOLDS {
                    b if b == test_bucket => splits.test.push(dialogue),
                    b if b == val_bucket => splits.val.push(dialogue),
                    _ => splits.train.push(dialogue),
                }
            }
        }
        Some(Fold::Subject(subject)) => {
            let mut remaining = 0usize;
            for dialogue in dialogues {
                if dialogue.subject.as_deref() == Some(subject.as_str()) {
                    splits.test.push(dialogue);
                } else {
                    if remaining % NUM_FOLDS == 0 {
                        splits.val.push(dialogue);
                    } else {
                        splits.train.push(dialogue);
                    }
                    remaining += 1;
                }
            }
        }
    }
    splits
}

impl DataSource for JsonDataSource {
    fn load_annotated_data(&self, config: &RunConfig, fold: Option<&Fold>) -> Result<Splits> {
        let dialogues = self.load(&config.dataset)?;
        Ok(split_dialogues(dialogues, fold))
    }

    fn load_kc_dict(&self, config: &RunConfig) -> Result<KcDict> {
        let dialogues = self.load(&config.dataset)?;
        Ok(dialogues
            .iter()
            .flat_map(|d| d.turns.iter())
            .flat_map(|t| t.kcs.iter().cloned())
            .collect())
    }

    fn subjects(&self, config: &RunConfig) -> Result<Vec<String>> {
        let dialogues = self.load(&config.dataset)?;
        let subjects: BTreeSet<String> =
            dialogues.into_iter().filter_map(|d| d.subject).collect();
        Ok(subjects.into_iter().collect())
    }
}
