//! Optimizer trait

use crate::model::Param;

/// Trait for optimization algorithms
///
/// Parameters are borrowed from a model, in the model's `named_parameters` order. The
/// order must stay stable across steps since per-parameter state is kept by position.
pub trait Optimizer {
    /// Perform a single optimization step; parameters without a gradient are left alone
    fn step(&mut self, params: &mut [&mut Param]);

    /// Zero gradients on referenced parameters
    fn zero_grad(&mut self, params: &mut [&mut Param]) {
        for param in params.iter_mut() {
            param.zero_grad();
        }
    }

    /// Get learning rate
    fn lr(&self) -> f32;

    /// Set learning rate
    fn set_lr(&mut self, lr: f32);
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr1;

    struct PlainDescent {
        lr: f32,
    }

    impl Optimizer for PlainDescent {
        fn step(&mut self, params: &mut [&mut Param]) {
            for param in params.iter_mut() {
                if let Some(grad) = param.grad().cloned() {
                    param.data_mut().scaled_add(-self.lr, &grad);
                }
            }
        }

        fn lr(&self) -> f32 {
            self.lr
        }

        fn set_lr(&mut self, lr: f32) {
            self.lr = lr;
        }
    }

    #[test]
    fn test_zero_grad_clears_every_param() {
        let mut opt = PlainDescent { lr: 0.1 };
        let mut a = Param::from_vec(vec![1.0, 2.0]);
        let mut b = Param::from_vec(vec![3.0]);
        a.set_grad(arr1(&[0.5, 1.0]));
        b.set_grad(arr1(&[1.5]));

        opt.step(&mut [&mut a, &mut b]);
        assert!((a.data()[0] - 0.95).abs() < 1e-6);
        assert!((b.data()[0] - 2.85).abs() < 1e-6);

        opt.zero_grad(&mut [&mut a, &mut b]);
        assert!(a.grad().is_none());
        assert!(b.grad().is_none());
    }

    #[test]
    fn test_set_lr() {
        let mut opt = PlainDescent { lr: 0.1 };
        opt.set_lr(0.01);
        assert_eq!(opt.lr(), 0.01);
    }
}
