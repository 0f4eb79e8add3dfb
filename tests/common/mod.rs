//! Mock collaborators shared by the integration tests

#![allow(dead_code)]

use lmkt::config::{ModelType, RunArgs, RunConfig};
use lmkt::data::{
    DataSource, Dialogue, Fold, KcDict, LmBatch, PackedLmBatch, Splits, Turn, TurnMeta,
    UnpackedLmBatch, NUM_FOLDS,
};
use lmkt::model::{
    BaselineModelFactory, BaselineSpec, LanguageModel, LanguageModelLoader, LmInput, LmSpec,
    LoadedLm, LogitGrad, ModelInputs, Param, Parameterized, Precision, PromptEncoder,
    PromptOptions, SequenceGrad, SequenceModel, SequenceOutput,
};
use lmkt::{Error, Result};
use ndarray::{Array1, Array2, Array3};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

pub const KCS: [&str; 3] = ["add", "sub", "mul"];
pub const SUBJECTS: [&str; 2] = ["algebra", "geometry"];

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// `add` turns are answered correctly, `sub` turns are not; the last turn alternates by dialogue
pub fn dialogue(idx: usize) -> Dialogue {
    let mut turns = vec![
        Turn { kcs: vec!["add".into()], correct: None },
        Turn { kcs: vec!["add".into(), "mul".into()], correct: Some(true) },
        Turn { kcs: vec!["sub".into()], correct: Some(false) },
        Turn { kcs: vec!["add".into()], correct: Some(true) },
    ];
    let last = if idx % 2 == 0 {
        Turn { kcs: vec!["add".into()], correct: Some(true) }
    } else {
        Turn { kcs: vec!["sub".into(), "mul".into()], correct: Some(false) }
    };
    turns.push(last);
    Dialogue { dialogue_idx: idx, subject: Some(SUBJECTS[(idx / 2) % 2].to_string()), turns }
}

/// In-memory dataset of 24 dialogues
pub struct MemorySource {
    pub dialogues: Vec<Dialogue>,
}

impl Default for MemorySource {
    fn default() -> Self {
        Self { dialogues: (0..24).map(dialogue).collect() }
    }
}

impl DataSource for MemorySource {
    fn load_annotated_data(&self, _config: &RunConfig, fold: Option<&Fold>) -> Result<Splits> {
        let mut splits = Splits::default();
        for (i, d) in self.dialogues.iter().cloned().enumerate() {
            let bucket = match fold {
                None => match i {
                    0..=15 => 2,
                    16..=19 => 1,
                    _ => 0,
                },
                Some(Fold::Index(k)) => match (i / 2 + k) % NUM_FOLDS {
                    0 => 0,
                    1 => 1,
                    _ => 2,
                },
                Some(Fold::Subject(s)) => {
                    if d.subject.as_deref() == Some(s.as_str()) {
                        0
                    } else if i % 6 == 0 || i % 6 == 1 {
                        1
                    } else {
                        2
                    }
                }
            };
            match bucket {
                0 => splits.test.push(d),
                1 => splits.val.push(d),
                _ => splits.train.push(d),
            }
        }
        Ok(splits)
    }

    fn load_kc_dict(&self, _config: &RunConfig) -> Result<KcDict> {
        Ok(KCS.into_iter().collect())
    }

    fn subjects(&self, _config: &RunConfig) -> Result<Vec<String>> {
        Ok(SUBJECTS.iter().map(|s| s.to_string()).collect())
    }
}

pub fn run_config(model_type: ModelType, model_name: Option<&str>) -> RunConfig {
    RunConfig::resolve(RunArgs {
        model_type: Some(model_type),
        dataset: Some("toy".to_string()),
        model_name: model_name.map(str::to_string),
        epochs: Some(3),
        lr: Some(0.05),
        batch_size: Some(4),
        grad_accum_steps: Some(1),
        ..Default::default()
    })
    .unwrap()
}

// ===== Sequence models =====

/// One logit per KC, broadcast to every position
pub struct TableModel {
    pub logits: Param,
    pub num_kcs: usize,
    aux: Option<f32>,
    last_shape: (usize, usize),
}

impl TableModel {
    pub fn new(num_kcs: usize, aux: Option<f32>) -> Self {
        Self { logits: Param::zeros(vec![num_kcs]), num_kcs, aux, last_shape: (0, 0) }
    }
}

impl Parameterized for TableModel {
    fn named_parameters(&self) -> Vec<(String, &Param)> {
        vec![("kc_logits".to_string(), &self.logits)]
    }

    fn named_parameters_mut(&mut self) -> Vec<(String, &mut Param)> {
        vec![("kc_logits".to_string(), &mut self.logits)]
    }
}

impl SequenceModel for TableModel {
    fn forward(&mut self, inputs: &ModelInputs<'_>) -> Result<SequenceOutput> {
        let shape = match inputs {
            ModelInputs::Turns(batch) => (batch.batch_size(), batch.max_turns()),
            ModelInputs::Interactions { kc_ids, .. } | ModelInputs::Rasch { kc_ids, .. } => {
                kc_ids.dim()
            }
            ModelInputs::ExerciseResponses { exercises, .. } => exercises.dim(),
            // The look-ahead architecture prepends a start position
            ModelInputs::Lookahead { kc_ids, .. } => (kc_ids.nrows(), kc_ids.ncols() + 1),
        };
        self.last_shape = shape;
        let probs = self.logits.data().mapv(sigmoid);
        let y = Array3::from_shape_fn((shape.0, shape.1, self.num_kcs), |(_, _, k)| probs[k]);
        Ok(SequenceOutput { y, aux_loss: self.aux })
    }

    fn backward(&mut self, grad: &SequenceGrad) -> Result<()> {
        if grad.y.dim() != (self.last_shape.0, self.last_shape.1, self.num_kcs) {
            return Err(Error::Model("gradient shape differs from the last output".into()));
        }
        let probs = self.logits.data().mapv(sigmoid);
        let mut g = Array1::zeros(self.num_kcs);
        for ((_, _, k), v) in grad.y.indexed_iter() {
            g[k] += v * probs[k] * (1.0 - probs[k]);
        }
        self.logits.accumulate_grad(&g);
        Ok(())
    }
}

#[derive(Default)]
pub struct TableFactory;

impl BaselineModelFactory for TableFactory {
    fn build(&self, spec: &BaselineSpec<'_>) -> Result<Box<dyn SequenceModel>> {
        let aux = (spec.model_type == ModelType::Akt).then_some(0.125);
        match spec.model_type {
            ModelType::Lmkt | ModelType::Random | ModelType::Majority => {
                Err(Error::UnsupportedModel(spec.model_type.to_string()))
            }
            _ => Ok(Box::new(TableModel::new(spec.kc_dict.len(), aux))),
        }
    }
}

// ===== Language model =====

pub const TRUE_TOKEN: u32 = 0;
pub const FALSE_TOKEN: u32 = 1;
const KC_TOKEN_OFFSET: u32 = 2;

/// Logit of "True" at a position is a learned bias of the KC token there; "False" stays at 0
pub struct BiasLm {
    pub bias: Param,
    last_input: Option<Array2<u32>>,
}

impl BiasLm {
    pub fn new(vocab: usize) -> Self {
        Self { bias: Param::zeros(vec![vocab]), last_input: None }
    }

    fn vocab(&self) -> usize {
        self.bias.len()
    }
}

impl Parameterized for BiasLm {
    fn named_parameters(&self) -> Vec<(String, &Param)> {
        vec![("lora_bias".to_string(), &self.bias)]
    }

    fn named_parameters_mut(&mut self) -> Vec<(String, &mut Param)> {
        vec![("lora_bias".to_string(), &mut self.bias)]
    }
}

impl LanguageModel for BiasLm {
    fn forward(&mut self, input: &LmInput<'_>) -> Result<Array3<f32>> {
        let (rows, seq_len) = input.input_ids.dim();
        let bias = self.bias.data();
        let mut logits = Array3::zeros((rows, seq_len, self.vocab()));
        for ((r, p), &token) in input.input_ids.indexed_iter() {
            logits[[r, p, TRUE_TOKEN as usize]] = bias[token as usize];
        }
        self.last_input = Some(input.input_ids.to_owned());
        Ok(logits)
    }

    fn backward(&mut self, grad: &LogitGrad) -> Result<()> {
        let input = self
            .last_input
            .as_ref()
            .ok_or_else(|| Error::Model("backward before forward".into()))?;
        let mut g = Array1::zeros(self.vocab());
        for e in grad.entries.iter().filter(|e| e.token == TRUE_TOKEN) {
            g[input[[e.row, e.position]] as usize] += e.value;
        }
        self.bias.accumulate_grad(&g);
        Ok(())
    }

    fn precision(&self) -> Precision {
        Precision::Fp32
    }
}

/// One token per KC; unpacked rows hold a single token, packed rows all KCs of a turn
pub struct ToyEncoder {
    kc_dict: KcDict,
}

impl ToyEncoder {
    fn token(&self, kc: &str) -> Result<u32> {
        self.kc_dict
            .id(kc)
            .map(|id| id as u32 + KC_TOKEN_OFFSET)
            .ok_or_else(|| Error::Data(format!("unknown KC {kc}")))
    }

    fn unpacked(&self, turns: &[(TurnMeta, f32)]) -> Result<UnpackedLmBatch> {
        let tokens: Vec<u32> = turns
            .iter()
            .flat_map(|(meta, _)| meta.kcs.iter())
            .map(|kc| self.token(kc))
            .collect::<Result<_>>()?;
        let rows = tokens.len();
        Ok(UnpackedLmBatch {
            input_ids: Array2::from_shape_vec((rows, 1), tokens)
                .map_err(|e| Error::Data(e.to_string()))?,
            attention_mask: Array2::ones((rows, 1)),
            last_idxs: vec![0; rows],
            num_kcs: turns.iter().map(|(meta, _)| meta.kcs.len()).collect(),
            labels: turns.iter().map(|(_, label)| *label).collect(),
            meta_data: turns.iter().map(|(meta, _)| meta.clone()).collect(),
        })
    }

    fn packed(&self, turns: &[(TurnMeta, f32)]) -> Result<PackedLmBatch> {
        let max_kcs = turns.iter().map(|(meta, _)| meta.kcs.len()).max().unwrap_or(1);
        let n = turns.len();
        let mut input_ids = Array2::zeros((n, max_kcs));
        let mut attention_mask = Array3::zeros((n, max_kcs, max_kcs));
        let mut last_idxs = Array2::zeros((n, max_kcs));
        for (row, (meta, _)) in turns.iter().enumerate() {
            for (k, kc) in meta.kcs.iter().enumerate() {
                input_ids[[row, k]] = self.token(kc)?;
                attention_mask[[row, k, k]] = 1.0;
                last_idxs[[row, k]] = k;
            }
        }
        Ok(PackedLmBatch {
            input_ids,
            attention_mask,
            position_ids: Array2::zeros((n, max_kcs)),
            last_idxs,
            num_kcs: turns.iter().map(|(meta, _)| meta.kcs.len()).collect(),
            labels: turns.iter().map(|(_, label)| *label).collect(),
            meta_data: turns.iter().map(|(meta, _)| meta.clone()).collect(),
        })
    }
}

impl PromptEncoder for ToyEncoder {
    fn true_false_tokens(&self) -> (u32, u32) {
        (TRUE_TOKEN, FALSE_TOKEN)
    }

    fn encode(&self, dialogues: &[Dialogue], options: &PromptOptions) -> Result<Vec<LmBatch>> {
        let skip = usize::from(options.skip_first_turn);
        let mut turns: Vec<(TurnMeta, f32)> = dialogues
            .iter()
            .flat_map(|d| {
                d.turns.iter().enumerate().skip(skip).filter_map(move |(t, turn)| {
                    let label = turn.correct?;
                    let meta =
                        TurnMeta { dialogue_idx: d.dialogue_idx, turn_idx: t, kcs: turn.kcs.clone() };
                    Some((meta, if label { 1.0 } else { 0.0 }))
                })
            })
            .collect();
        if let Some(seed) = options.shuffle_seed {
            turns.shuffle(&mut StdRng::seed_from_u64(seed));
        }
        turns
            .chunks(options.batch_size.max(1))
            .map(|chunk| {
                Ok(if options.packed {
                    LmBatch::Packed(self.packed(chunk)?)
                } else {
                    LmBatch::Unpacked(self.unpacked(chunk)?)
                })
            })
            .collect()
    }
}

/// Loads a [`BiasLm`]; records every spec it was asked for
#[derive(Default)]
pub struct ToyLoader {
    pub requests: std::cell::RefCell<Vec<(usize, usize, Option<String>)>>,
}

impl LanguageModelLoader for ToyLoader {
    fn load(&self, spec: &LmSpec<'_>) -> Result<LoadedLm> {
        self.requests.borrow_mut().push((
            spec.r,
            spec.lora_alpha,
            spec.pt_model_name.map(str::to_string),
        ));
        let kc_dict: KcDict = KCS.into_iter().collect();
        let vocab = kc_dict.len() + KC_TOKEN_OFFSET as usize;
        Ok(LoadedLm {
            model: Box::new(BiasLm::new(vocab)),
            encoder: Box::new(ToyEncoder { kc_dict }),
        })
    }
}

/// All-turn metric report lines as written to disk
pub fn read_report(path: &std::path::Path) -> String {
    std::fs::read_to_string(path).unwrap()
}
