//! Adafactor optimizer with factored second moments
//!
//! Runs with an external learning rate scaled by the parameter RMS, no first moment,
//! and a second-moment decay of `1 - t^-0.8`. Parameters with two or more dimensions keep
//! row and column statistics instead of a full second-moment buffer.

use super::Optimizer;
use crate::model::Param;
use ndarray::{Array1, Array2, Array3, Axis};

const EPS_SQ: f32 = 1e-30;
const EPS_SCALE: f32 = 1e-3;
const CLIP_THRESHOLD: f32 = 1.0;
const DECAY_RATE: f32 = -0.8;

enum SecondMoment {
    Factored { row: Array2<f32>, col: Array2<f32> },
    Full(Array1<f32>),
}

pub struct Adafactor {
    lr: f32,
    weight_decay: f32,
    t: u64,
    state: Vec<Option<SecondMoment>>,
}

impl Adafactor {
    pub fn new(lr: f32, weight_decay: f32) -> Self {
        Self { lr, weight_decay, t: 0, state: Vec::new() }
    }

    #[must_use]
    pub fn step_count(&self) -> u64 {
        self.t
    }
}

fn rms(values: &Array1<f32>) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    (values.iter().map(|x| x * x).sum::<f32>() / values.len() as f32).sqrt()
}

/// Leading dimensions are treated as a batch of matrices
fn matrix_dims(shape: &[usize]) -> Option<(usize, usize, usize)> {
    match shape {
        [.., rows, cols] => {
            let batch = shape[..shape.len() - 2].iter().product();
            Some((batch, *rows, *cols))
        }
        _ => None,
    }
}

impl Optimizer for Adafactor {
    fn step(&mut self, params: &mut [&mut Param]) {
        if self.state.len() < params.len() {
            self.state.resize_with(params.len(), || None);
        }
        self.t += 1;
        let beta2t = 1.0 - (self.t as f32).powf(DECAY_RATE);

        for (i, param) in params.iter_mut().enumerate() {
            let Some(grad) = param.grad().cloned() else {
                continue;
            };
            let lr = self.lr * rms(param.data()).max(EPS_SCALE);
            let factored = matrix_dims(param.shape())
                .and_then(|dims| Array3::from_shape_vec(dims, grad.to_vec()).ok());

            let mut update = match factored {
                Some(grad3) => {
                    let sq = grad3.mapv(|g| g * g + EPS_SQ);
                    factored_update(&mut self.state[i], &sq, &grad3, beta2t)
                }
                None => {
                    let sq = grad.mapv(|g| g * g + EPS_SQ);
                    full_update(&mut self.state[i], &sq, &grad, beta2t)
                }
            };

            let scale = (rms(&update) / CLIP_THRESHOLD).max(1.0);
            update.mapv_inplace(|u| u / scale * lr);

            if self.weight_decay != 0.0 {
                let decay = -self.weight_decay * lr;
                let data = param.data().clone();
                param.data_mut().scaled_add(decay, &data);
            }
            *param.data_mut() -= &update;
        }
    }

    fn lr(&self) -> f32 {
        self.lr
    }

    fn set_lr(&mut self, lr: f32) {
        self.lr = lr;
    }
}

fn full_update(
    state: &mut Option<SecondMoment>,
    sq: &Array1<f32>,
    grad: &Array1<f32>,
    beta2t: f32,
) -> Array1<f32> {
    let v = match state.take() {
        Some(SecondMoment::Full(v)) => v * beta2t + sq * (1.0 - beta2t),
        _ => sq * (1.0 - beta2t),
    };
    let update = grad / &v.mapv(f32::sqrt);
    *state = Some(SecondMoment::Full(v));
    update
}

fn factored_update(
    state: &mut Option<SecondMoment>,
    sq: &Array3<f32>,
    grad: &Array3<f32>,
    beta2t: f32,
) -> Array1<f32> {
    let row_mean = sq.mean_axis(Axis(2)).unwrap_or_else(|| Array2::zeros((sq.dim().0, sq.dim().1)));
    let col_mean = sq.mean_axis(Axis(1)).unwrap_or_else(|| Array2::zeros((sq.dim().0, sq.dim().2)));
    let (row, col) = match state.take() {
        Some(SecondMoment::Factored { row, col }) => {
            (row * beta2t + &row_mean * (1.0 - beta2t), col * beta2t + &col_mean * (1.0 - beta2t))
        }
        _ => (row_mean * (1.0 - beta2t), col_mean * (1.0 - beta2t)),
    };

    let (batch, rows, cols) = grad.dim();
    let mut update = Array3::zeros((batch, rows, cols));
    for b in 0..batch {
        let row_b = row.row(b);
        let row_avg = row_b.mean().unwrap_or(1.0);
        for r in 0..rows {
            let r_factor = (row_b[r] / row_avg).sqrt().recip();
            for c in 0..cols {
                let c_factor = col[[b, c]].sqrt().recip();
                update[[b, r, c]] = grad[[b, r, c]] * r_factor * c_factor;
            }
        }
    }
    *state = Some(SecondMoment::Factored { row, col });
    Array1::from_iter(update)
}
