//! Trainable parameters exposed by model collaborators

use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// A flat parameter buffer with an optional accumulated gradient
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    data: Array1<f32>,
    shape: Vec<usize>,
    #[serde(skip)]
    grad: Option<Array1<f32>>,
}

impl Param {
    /// Create a parameter from row-major data and its logical shape
    pub fn new(data: Vec<f32>, shape: Vec<usize>) -> Self {
        debug_assert_eq!(data.len(), shape.iter().product::<usize>());
        Self { data: Array1::from(data), shape, grad: None }
    }

    /// One-dimensional parameter
    pub fn from_vec(data: Vec<f32>) -> Self {
        let len = data.len();
        Self::new(data, vec![len])
    }

    pub fn zeros(shape: Vec<usize>) -> Self {
        let len = shape.iter().product();
        Self::new(vec![0.0; len], shape)
    }

    pub fn data(&self) -> &Array1<f32> {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut Array1<f32> {
        &mut self.data
    }

    /// Replace the values wholesale (checkpoint restore); shape follows the data
    pub fn assign(&mut self, data: Array1<f32>, shape: Vec<usize>) {
        self.data = data;
        self.shape = shape;
        self.grad = None;
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn grad(&self) -> Option<&Array1<f32>> {
        self.grad.as_ref()
    }

    pub fn set_grad(&mut self, grad: Array1<f32>) {
        self.grad = Some(grad);
    }

    /// Add to the stored gradient; gradients accumulate until [`Param::zero_grad`]
    pub fn accumulate_grad(&mut self, grad: &Array1<f32>) {
        match self.grad.as_mut() {
            Some(existing) => *existing += grad,
            None => self.grad = Some(grad.clone()),
        }
    }

    pub fn zero_grad(&mut self) {
        self.grad = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr1;

    #[test]
    fn test_accumulate_grad() {
        let mut p = Param::from_vec(vec![1.0, 2.0]);
        assert!(p.grad().is_none());
        p.accumulate_grad(&arr1(&[0.5, 0.5]));
        p.accumulate_grad(&arr1(&[0.25, -0.5]));
        assert_eq!(p.grad().unwrap(), &arr1(&[0.75, 0.0]));
        p.zero_grad();
        assert!(p.grad().is_none());
    }

    #[test]
    fn test_shapes() {
        let p = Param::zeros(vec![2, 3]);
        assert_eq!(p.len(), 6);
        assert_eq!(p.shape(), &[2, 3]);
    }

    #[test]
    fn test_assign_clears_grad() {
        let mut p = Param::from_vec(vec![1.0]);
        p.set_grad(arr1(&[1.0]));
        p.assign(arr1(&[2.0, 3.0]), vec![2]);
        assert_eq!(p.len(), 2);
        assert!(p.grad().is_none());
    }
}
