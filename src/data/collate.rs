//! Batching of dialogues for sequence-model baselines

use super::batch::{BaselineBatch, FlatSequence, IGNORE_INDEX};
use super::{Dialogue, KcDict};
use crate::{Error, Result};
use ndarray::{Array2, Array3};
use rand::seq::SliceRandom;
use rand::Rng;

/// Pads dialogues into [`BaselineBatch`]es, one dialogue per row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BaselineCollator {
    flatten_kcs: bool,
}

impl BaselineCollator {
    /// `flatten_kcs` adds the one-KC-per-step sequence used by flat architectures
    pub fn new(flatten_kcs: bool) -> Self {
        Self { flatten_kcs }
    }

    pub fn collate(&self, dialogues: &[&Dialogue], kc_dict: &KcDict) -> Result<BaselineBatch> {
        let batch_size = dialogues.len();
        let max_turns = dialogues.iter().map(|d| d.turns.len()).max().unwrap_or(0).max(1);
        let max_kcs = dialogues
            .iter()
            .flat_map(|d| d.turns.iter().map(|t| t.kcs.len()))
            .max()
            .unwrap_or(0)
            .max(1);

        let mut kc_ids = Array3::<usize>::zeros((batch_size, max_turns, max_kcs));
        let mut num_kcs = Array2::<usize>::zeros((batch_size, max_turns));
        let mut labels = Array2::<i64>::from_elem((batch_size, max_turns), IGNORE_INDEX);

        for (row, dialogue) in dialogues.iter().enumerate() {
            for (t, turn) in dialogue.turns.iter().enumerate() {
                for (k, kc) in turn.kcs.iter().enumerate() {
                    kc_ids[[row, t, k]] = lookup(kc_dict, kc)?;
                }
                num_kcs[[row, t]] = turn.kcs.len();
                labels[[row, t]] = turn.label();
            }
        }

        let flat = if self.flatten_kcs {
            Some(flatten(dialogues, kc_dict, max_turns)?)
        } else {
            None
        };

        Ok(BaselineBatch {
            kc_ids,
            num_kcs,
            labels,
            flat,
            dialogue_idxs: dialogues.iter().map(|d| d.dialogue_idx).collect(),
        })
    }

    /// Collate a split into batches of `batch_size` dialogues, optionally shuffled first
    pub fn batches<R: Rng + ?Sized>(
        &self,
        split: &[Dialogue],
        kc_dict: &KcDict,
        batch_size: usize,
        shuffle: Option<&mut R>,
    ) -> Result<Vec<BaselineBatch>> {
        let mut order: Vec<&Dialogue> = split.iter().collect();
        if let Some(rng) = shuffle {
            order.shuffle(rng);
        }
        order
            .chunks(batch_size.max(1))
            .map(|chunk| self.collate(chunk, kc_dict))
            .collect()
    }
}

fn lookup(kc_dict: &KcDict, kc: &str) -> Result<usize> {
    kc_dict
        .id(kc)
        .ok_or_else(|| Error::Data(format!("KC '{kc}' is missing from the KC dictionary")))
}

fn flatten(dialogues: &[&Dialogue], kc_dict: &KcDict, max_turns: usize) -> Result<FlatSequence> {
    let flat_len = dialogues
        .iter()
        .map(|d| d.turns.iter().map(|t| t.kcs.len()).sum::<usize>())
        .max()
        .unwrap_or(0)
        .max(1);

    let mut kc_ids = Array2::<usize>::zeros((dialogues.len(), flat_len));
    let mut labels = Array2::<i64>::zeros((dialogues.len(), flat_len));
    let mut turn_end_idxs = Array2::<usize>::zeros((dialogues.len(), max_turns));

    for (row, dialogue) in dialogues.iter().enumerate() {
        let mut pos = 0;
        for (t, turn) in dialogue.turns.iter().enumerate() {
            let response = turn.label().max(0);
            for kc in &turn.kcs {
                kc_ids[[row, pos]] = lookup(kc_dict, kc)?;
                labels[[row, pos]] = response;
                pos += 1;
            }
            // A turn without KCs ends where the previous one did
            turn_end_idxs[[row, t]] = pos.saturating_sub(1);
        }
    }

    Ok(FlatSequence { kc_ids, labels, turn_end_idxs })
}

/// Most frequent label among labelled turns; ties go to the positive class
pub fn majority_class(split: &[Dialogue]) -> i64 {
    let (positives, negatives) = split
        .iter()
        .flat_map(|d| d.turns.iter())
        .fold((0usize, 0usize), |(p, n), turn| match turn.correct {
            Some(true) => (p + 1, n),
            Some(false) => (p, n + 1),
            None => (p, n),
        });
    i64::from(positives >= negatives)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Turn;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn turn(kcs: &[&str], correct: Option<bool>) -> Turn {
        Turn { kcs: kcs.iter().map(|s| s.to_string()).collect(), correct }
    }

    fn dialogues() -> (Vec<Dialogue>, KcDict) {
        let dialogues = vec![
            Dialogue {
                dialogue_idx: 7,
                subject: None,
                turns: vec![
                    turn(&["a"], None),
                    turn(&["a", "b"], Some(true)),
                    turn(&["c"], Some(false)),
                ],
            },
            Dialogue {
                dialogue_idx: 9,
                subject: None,
                turns: vec![turn(&["b"], None), turn(&["c"], Some(true))],
            },
        ];
        let dict: KcDict = ["a", "b", "c"].into_iter().collect();
        (dialogues, dict)
    }

    #[test]
    fn test_multi_kc_layout() {
        let (dialogues, dict) = dialogues();
        let refs: Vec<&Dialogue> = dialogues.iter().collect();
        let batch = BaselineCollator::new(false).collate(&refs, &dict).unwrap();

        assert_eq!(batch.kc_ids.dim(), (2, 3, 2));
        assert_eq!(batch.kc_ids[[0, 1, 1]], 1);
        assert_eq!(batch.num_kcs[[0, 1]], 2);
        assert_eq!(batch.num_kcs[[1, 2]], 0);
        assert_eq!(batch.labels.row(0).to_vec(), vec![IGNORE_INDEX, 1, 0]);
        assert_eq!(batch.labels.row(1).to_vec(), vec![IGNORE_INDEX, 1, IGNORE_INDEX]);
        assert!(batch.flat.is_none());
        assert_eq!(batch.dialogue_idxs, vec![7, 9]);
    }

    #[test]
    fn test_flat_layout() {
        let (dialogues, dict) = dialogues();
        let refs: Vec<&Dialogue> = dialogues.iter().collect();
        let batch = BaselineCollator::new(true).collate(&refs, &dict).unwrap();
        let flat = batch.flat.unwrap();

        assert_eq!(flat.kc_ids.row(0).to_vec(), vec![0, 0, 1, 2]);
        assert_eq!(flat.labels.row(0).to_vec(), vec![0, 1, 1, 0]);
        assert_eq!(flat.turn_end_idxs.row(0).to_vec(), vec![0, 2, 3]);
        assert_eq!(flat.kc_ids.row(1).to_vec(), vec![1, 2, 0, 0]);
        assert_eq!(flat.turn_end_idxs.row(1).to_vec(), vec![0, 1, 0]);
    }

    #[test]
    fn test_unknown_kc_is_error() {
        let (dialogues, _) = dialogues();
        let refs: Vec<&Dialogue> = dialogues.iter().collect();
        let dict: KcDict = ["a"].into_iter().collect();
        assert!(BaselineCollator::new(false).collate(&refs, &dict).is_err());
    }

    #[test]
    fn test_batches_chunking_and_shuffle() {
        let (dialogues, dict) = dialogues();
        let collator = BaselineCollator::new(true);
        let batches = collator.batches::<StdRng>(&dialogues, &dict, 1, None).unwrap();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].dialogue_idxs, vec![7]);

        let mut rng = StdRng::seed_from_u64(3);
        let shuffled = collator.batches(&dialogues, &dict, 2, Some(&mut rng)).unwrap();
        let mut seen = shuffled[0].dialogue_idxs.clone();
        seen.sort_unstable();
        assert_eq!(seen, vec![7, 9]);
    }

    #[test]
    fn test_majority_class() {
        let (dialogues, _) = dialogues();
        assert_eq!(majority_class(&dialogues), 1);

        let negative = vec![Dialogue {
            dialogue_idx: 0,
            subject: None,
            turns: vec![turn(&["a"], Some(false)), turn(&["a"], Some(false))],
        }];
        assert_eq!(majority_class(&negative), 0);
    }
}
