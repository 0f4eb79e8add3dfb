//! Per-architecture loss and inference adapters
//!
//! Each model family hides its tensor layout behind the same three operations:
//! selecting the output vectors that represent turns, computing the loss (with the gradient
//! on the raw model output when training), and predicting correctness probabilities.

use crate::aggregate::{
    aggregate_next_turn, aggregate_packed, aggregate_unpacked, scatter_flat_grad,
    select_flat_out_vectors, to_additive_mask, Aggregate, AnswerTokens, GradMode,
};
use crate::config::ModelType;
use crate::data::{BaselineBatch, FlatSequence, LmBatch};
use crate::model::{
    AttentionMask, LanguageModel, LmInput, LogitGrad, ModelInputs, Param, Parameterized,
    SequenceGrad, SequenceModel,
};
use crate::{Error, Result};
use ndarray::{s, Array2, Array3, ArrayView3, Axis};

/// How a flat architecture wants its interaction sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlatLayout {
    Interactions,
    Rasch,
    ExerciseResponses,
    Lookahead,
}

/// Loss adapter, one variant per architecture family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Adapter {
    /// Generative LM answering True/False per KC
    LanguageModel,
    /// Models consuming every KC of a turn at once
    MultiKc,
    /// Models consuming one KC per step
    Flat {
        layout: FlatLayout,
        /// Read each turn's output one step after its last KC
        shift: bool,
        /// Add the model's auxiliary loss to the objective
        aux_loss: bool,
    },
}

impl Adapter {
    pub fn for_model(model_type: ModelType) -> Result<Self> {
        let flat = |layout, shift| Adapter::Flat { layout, shift, aux_loss: false };
        Ok(match model_type {
            ModelType::Lmkt => Adapter::LanguageModel,
            ModelType::DktMulti | ModelType::DktSem => Adapter::MultiKc,
            ModelType::Dkt => flat(FlatLayout::Interactions, false),
            ModelType::Akt => Adapter::Flat { layout: FlatLayout::Rasch, shift: true, aux_loss: true },
            ModelType::Dkvmn => flat(FlatLayout::Interactions, true),
            ModelType::Saint => flat(FlatLayout::ExerciseResponses, true),
            ModelType::SimpleKt => flat(FlatLayout::Lookahead, true),
            ModelType::Random | ModelType::Majority => {
                return Err(Error::NotTrainable(model_type.to_string()))
            }
        })
    }

    /// Forward inputs for a baseline batch
    pub fn model_inputs<'a>(&self, batch: &'a BaselineBatch) -> Result<ModelInputs<'a>> {
        let layout = match self {
            Adapter::MultiKc => return Ok(ModelInputs::Turns(batch)),
            Adapter::Flat { layout, .. } => *layout,
            Adapter::LanguageModel => {
                return Err(Error::Model("language-model adapter given a baseline batch".into()))
            }
        };
        let flat = require_flat(batch)?;
        let kc_ids = flat.kc_ids.view();
        let labels = flat.labels.view();
        Ok(match layout {
            FlatLayout::Interactions => ModelInputs::Interactions { kc_ids, labels },
            FlatLayout::Rasch => ModelInputs::Rasch { kc_ids, labels, problem_ids: kc_ids },
            FlatLayout::ExerciseResponses => ModelInputs::ExerciseResponses {
                exercises: kc_ids,
                categories: kc_ids,
                responses: labels.slice_move(s![.., ..-1]),
            },
            FlatLayout::Lookahead => ModelInputs::Lookahead {
                kc_ids: kc_ids.slice_move(s![.., ..-1]),
                labels: labels.slice_move(s![.., ..-1]),
                next_kc_ids: flat.kc_ids.slice(s![.., 1..]),
                next_labels: flat.labels.slice(s![.., 1..]),
            },
        })
    }

    /// Per-turn output vectors, plus the flat indices they were read from
    pub fn select_output_vectors(
        &self,
        y: ArrayView3<'_, f32>,
        batch: &BaselineBatch,
    ) -> Result<(Array3<f32>, Option<Array2<usize>>)> {
        match self {
            Adapter::Flat { shift, .. } => {
                let flat = require_flat(batch)?;
                let positions = y.len_of(Axis(1));
                let needed = flat.turn_end_idxs.iter().copied().max().unwrap_or(0) + 1;
                if positions < needed {
                    return Err(Error::Model(format!(
                        "model returned {positions} positions, the flat sequence needs {needed}"
                    )));
                }
                let (out, idxs) = select_flat_out_vectors(y, flat.turn_end_idxs.view(), *shift);
                Ok((out, Some(idxs)))
            }
            _ => {
                let turns = y.len_of(Axis(1));
                if turns != batch.max_turns() {
                    return Err(Error::Model(format!(
                        "model returned {turns} positions for {} turns",
                        batch.max_turns()
                    )));
                }
                Ok((y.to_owned(), None))
            }
        }
    }

    /// Loss and next-turn correctness probabilities of a baseline batch
    pub fn compute_loss(
        &self,
        model: &mut dyn SequenceModel,
        batch: &BaselineBatch,
        mode: GradMode,
    ) -> Result<BaselineStep> {
        let inputs = self.model_inputs(batch)?;
        let output = model.forward(&inputs)?;
        let (turn_vectors, idxs) = self.select_output_vectors(output.y.view(), batch)?;
        let agg = aggregate_next_turn(
            turn_vectors.view(),
            batch.kc_ids.view(),
            batch.num_kcs.view(),
            batch.labels.view(),
            mode,
        )?;

        let routes_aux = matches!(self, Adapter::Flat { aux_loss: true, .. });
        let aux = if routes_aux { output.aux_loss.unwrap_or(0.0) } else { 0.0 };

        let grad = agg.grad.map(|g| {
            let y = match &idxs {
                Some(idxs) => scatter_flat_grad(g.view(), idxs.view(), output.y.len_of(Axis(1))),
                None => g,
            };
            SequenceGrad { y, aux_loss: if routes_aux { 1.0 } else { 0.0 } }
        });

        Ok(BaselineStep { loss: agg.loss + aux, corr_probs: agg.corr_probs, grad })
    }

    /// No-gradient loss and predictions
    pub fn predict(
        &self,
        model: &mut dyn SequenceModel,
        batch: &BaselineBatch,
    ) -> Result<(f32, Array2<f32>)> {
        let step = self.compute_loss(model, batch, GradMode::Disabled)?;
        Ok((step.loss, step.corr_probs))
    }
}

fn require_flat(batch: &BaselineBatch) -> Result<&FlatSequence> {
    batch
        .flat
        .as_ref()
        .ok_or_else(|| Error::Data("flat architecture needs a flattened batch".into()))
}

/// Output of one baseline loss computation
#[derive(Debug, Clone)]
pub struct BaselineStep {
    pub loss: f32,
    /// `batch x (turns - 1)`: correctness of turn `t + 1`
    pub corr_probs: Array2<f32>,
    pub grad: Option<SequenceGrad>,
}

/// Run a language model on one batch and aggregate its answers
pub fn compute_lm_loss(
    model: &mut dyn LanguageModel,
    batch: &LmBatch,
    tokens: AnswerTokens,
    mode: GradMode,
) -> Result<(Aggregate, Option<LogitGrad>)> {
    match batch {
        LmBatch::Unpacked(b) => {
            let input = LmInput {
                input_ids: b.input_ids.view(),
                attention_mask: AttentionMask::Padding(b.attention_mask.view()),
                position_ids: None,
            };
            let logits = model.forward(&input)?;
            aggregate_unpacked(
                logits.view(),
                &b.last_idxs,
                &b.num_kcs,
                b.labels.view(),
                tokens,
                mode,
            )
        }
        LmBatch::Packed(b) => {
            let mask = to_additive_mask(b.attention_mask.view(), model.precision());
            let input = LmInput {
                input_ids: b.input_ids.view(),
                attention_mask: AttentionMask::Additive(mask.view()),
                position_ids: Some(b.position_ids.view()),
            };
            let logits = model.forward(&input)?;
            aggregate_packed(
                logits.view(),
                b.last_idxs.view(),
                &b.num_kcs,
                b.labels.view(),
                tokens,
                mode,
            )
        }
    }
}

/// A model plus the adapter that turns its output into a loss
///
/// `forward_backward` leaves gradients scaled by `grad_scale` accumulated on the parameters.
pub trait Learner: Parameterized {
    type Batch;

    /// Training-mode loss of one batch, back-propagated with `grad_scale`; returns the unscaled loss
    fn forward_backward(&mut self, batch: &Self::Batch, grad_scale: f32) -> Result<f32>;

    fn evaluate_loss(&mut self, batch: &Self::Batch) -> Result<f32>;
}

pub struct LmLearner {
    pub model: Box<dyn LanguageModel>,
    pub tokens: AnswerTokens,
}

impl Parameterized for LmLearner {
    fn named_parameters(&self) -> Vec<(String, &Param)> {
        self.model.named_parameters()
    }

    fn named_parameters_mut(&mut self) -> Vec<(String, &mut Param)> {
        self.model.named_parameters_mut()
    }

    fn set_training(&mut self, training: bool) {
        self.model.set_training(training);
    }
}

impl Learner for LmLearner {
    type Batch = LmBatch;

    fn forward_backward(&mut self, batch: &LmBatch, grad_scale: f32) -> Result<f32> {
        let (agg, grad) = compute_lm_loss(self.model.as_mut(), batch, self.tokens, GradMode::Enabled)?;
        if let Some(grad) = grad {
            self.model.backward(&grad.scaled(grad_scale))?;
        }
        Ok(agg.loss)
    }

    fn evaluate_loss(&mut self, batch: &LmBatch) -> Result<f32> {
        let (agg, _) = compute_lm_loss(self.model.as_mut(), batch, self.tokens, GradMode::Disabled)?;
        Ok(agg.loss)
    }
}

pub struct BaselineLearner {
    pub model: Box<dyn SequenceModel>,
    pub adapter: Adapter,
}

impl Parameterized for BaselineLearner {
    fn named_parameters(&self) -> Vec<(String, &Param)> {
        self.model.named_parameters()
    }

    fn named_parameters_mut(&mut self) -> Vec<(String, &mut Param)> {
        self.model.named_parameters_mut()
    }

    fn set_training(&mut self, training: bool) {
        self.model.set_training(training);
    }
}

impl Learner for BaselineLearner {
    type Batch = BaselineBatch;

    fn forward_backward(&mut self, batch: &BaselineBatch, grad_scale: f32) -> Result<f32> {
        let step = self.adapter.compute_loss(self.model.as_mut(), batch, GradMode::Enabled)?;
        if let Some(grad) = step.grad {
            self.model.backward(&grad.scaled(grad_scale))?;
        }
        Ok(step.loss)
    }

    fn evaluate_loss(&mut self, batch: &BaselineBatch) -> Result<f32> {
        Ok(self.adapter.predict(self.model.as_mut(), batch)?.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{BaselineCollator, Dialogue, KcDict, Turn};
    use crate::model::SequenceOutput;
    use approx::assert_abs_diff_eq;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Outputs a constant probability for every KC; records the layout it was called with
    struct ConstantModel {
        p: f32,
        kcs: usize,
        aux: Option<f32>,
        seen: Option<&'static str>,
        last_grad: Rc<RefCell<Option<SequenceGrad>>>,
    }

    impl ConstantModel {
        fn new(p: f32, kcs: usize) -> Self {
            Self { p, kcs, aux: None, seen: None, last_grad: Rc::default() }
        }
    }

    impl Parameterized for ConstantModel {
        fn named_parameters(&self) -> Vec<(String, &Param)> {
            vec![]
        }

        fn named_parameters_mut(&mut self) -> Vec<(String, &mut Param)> {
            vec![]
        }
    }

    impl SequenceModel for ConstantModel {
        fn forward(&mut self, inputs: &ModelInputs<'_>) -> Result<SequenceOutput> {
            let (batch, positions, name) = match inputs {
                ModelInputs::Turns(b) => (b.batch_size(), b.max_turns(), "turns"),
                ModelInputs::Interactions { kc_ids, .. } => (kc_ids.nrows(), kc_ids.ncols(), "interactions"),
                ModelInputs::Rasch { kc_ids, .. } => (kc_ids.nrows(), kc_ids.ncols(), "rasch"),
                ModelInputs::ExerciseResponses { exercises, responses, .. } => {
                    assert_eq!(responses.ncols() + 1, exercises.ncols());
                    (exercises.nrows(), exercises.ncols(), "saint")
                }
                ModelInputs::Lookahead { kc_ids, next_kc_ids, .. } => {
                    assert_eq!(kc_ids.ncols(), next_kc_ids.ncols());
                    (kc_ids.nrows(), kc_ids.ncols() + 1, "lookahead")
                }
            };
            self.seen = Some(name);
            Ok(SequenceOutput {
                y: Array3::from_elem((batch, positions, self.kcs), self.p),
                aux_loss: self.aux,
            })
        }

        fn backward(&mut self, grad: &SequenceGrad) -> Result<()> {
            *self.last_grad.borrow_mut() = Some(grad.clone());
            Ok(())
        }
    }

    fn batch(flatten: bool) -> BaselineBatch {
        let turn = |kcs: &[&str], correct| Turn { kcs: kcs.iter().map(|s| s.to_string()).collect(), correct };
        let dialogue = Dialogue {
            dialogue_idx: 0,
            subject: None,
            turns: vec![turn(&["a"], None), turn(&["a", "b"], Some(true)), turn(&["b"], Some(false))],
        };
        let dict: KcDict = ["a", "b"].into_iter().collect();
        BaselineCollator::new(flatten).collate(&[&dialogue], &dict).unwrap()
    }

    #[test]
    fn test_dispatch_table() {
        assert_eq!(Adapter::for_model(ModelType::Lmkt).unwrap(), Adapter::LanguageModel);
        assert_eq!(Adapter::for_model(ModelType::DktSem).unwrap(), Adapter::MultiKc);
        assert!(matches!(
            Adapter::for_model(ModelType::Dkt).unwrap(),
            Adapter::Flat { shift: false, .. }
        ));
        for shifted in [ModelType::Akt, ModelType::Dkvmn, ModelType::Saint, ModelType::SimpleKt] {
            assert!(matches!(Adapter::for_model(shifted).unwrap(), Adapter::Flat { shift: true, .. }));
        }
        let err = Adapter::for_model(ModelType::Majority).unwrap_err();
        assert!(matches!(err, Error::NotTrainable(_)));
    }

    #[test]
    fn test_multi_kc_loss() {
        let adapter = Adapter::for_model(ModelType::DktMulti).unwrap();
        let mut model = ConstantModel::new(0.5, 2);
        let (loss, corr) = adapter.predict(&mut model, &batch(false)).unwrap();
        assert_eq!(model.seen, Some("turns"));
        assert_abs_diff_eq!(corr[[0, 0]], 0.25, epsilon = 1e-6);
        assert_abs_diff_eq!(corr[[0, 1]], 0.5, epsilon = 1e-6);
        let expected = -((0.25f32).ln() + (0.5f32).ln()) / 2.0;
        assert_abs_diff_eq!(loss, expected, epsilon = 1e-5);
    }

    #[test]
    fn test_each_flat_layout_reaches_the_model() {
        let cases = [
            (ModelType::Dkt, "interactions"),
            (ModelType::Akt, "rasch"),
            (ModelType::Dkvmn, "interactions"),
            (ModelType::Saint, "saint"),
            (ModelType::SimpleKt, "lookahead"),
        ];
        for (model_type, expected) in cases {
            let adapter = Adapter::for_model(model_type).unwrap();
            let mut model = ConstantModel::new(0.5, 2);
            let (_, corr) = adapter.predict(&mut model, &batch(true)).unwrap();
            assert_eq!(model.seen, Some(expected), "{model_type}");
            assert_eq!(corr.dim(), (1, 2));
        }
    }

    #[test]
    fn test_flat_model_rejects_unflattened_batch() {
        let adapter = Adapter::for_model(ModelType::Dkt).unwrap();
        let mut model = ConstantModel::new(0.5, 2);
        assert!(adapter.predict(&mut model, &batch(false)).is_err());
    }

    #[test]
    fn test_aux_loss_routed_only_for_akt() {
        let mut model = ConstantModel::new(0.5, 2);
        model.aux = Some(0.75);
        let dkt = Adapter::for_model(ModelType::Dkt).unwrap().predict(&mut model, &batch(true)).unwrap().0;
        let akt = Adapter::for_model(ModelType::Akt).unwrap().predict(&mut model, &batch(true)).unwrap().0;
        assert_abs_diff_eq!(akt - dkt, 0.75, epsilon = 1e-6);
    }

    #[test]
    fn test_flat_gradient_lands_on_selected_positions() {
        let adapter = Adapter::for_model(ModelType::Dkt).unwrap();
        let batch = batch(true);

        // Turn ends in the flat sequence [a, a, b, b] are 0, 2, 3
        let step = adapter
            .compute_loss(&mut ConstantModel::new(0.5, 2), &batch, GradMode::Enabled)
            .unwrap();
        let grad = step.grad.unwrap();
        assert_eq!(grad.y.dim(), (1, 4, 2));
        assert_eq!(grad.y.slice(s![0, 1, ..]).sum(), 0.0);
        assert!(grad.y[[0, 0, 0]] != 0.0);
        assert!(grad.y[[0, 2, 1]] != 0.0);
        assert_eq!(grad.aux_loss, 0.0);

        // The learner back-propagates the same gradient scaled by its grad_scale
        let model = ConstantModel::new(0.5, 2);
        let received = Rc::clone(&model.last_grad);
        let mut learner = BaselineLearner { model: Box::new(model), adapter };
        let loss = learner.forward_backward(&batch, 0.5).unwrap();
        assert_abs_diff_eq!(loss, step.loss, epsilon = 1e-6);

        let received = received.borrow();
        let scaled = received.as_ref().unwrap();
        for (got, full) in scaled.y.iter().zip(grad.y.iter()) {
            assert_abs_diff_eq!(*got, 0.5 * full, epsilon = 1e-6);
        }
        assert_eq!(scaled.y.slice(s![0, 1, ..]).sum(), 0.0);
    }

    #[test]
    fn test_output_too_short_is_model_error() {
        let adapter = Adapter::for_model(ModelType::Dkt).unwrap();
        let y = Array3::<f32>::zeros((1, 2, 2));
        let err = adapter.select_output_vectors(y.view(), &batch(true)).unwrap_err();
        assert!(matches!(err, Error::Model(_)));
    }
}
