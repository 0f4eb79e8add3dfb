//! Gradient clipping utilities

use crate::model::Param;

/// Clip gradients by global norm
///
/// 1. global_norm = sqrt(sum of all gradient squared norms)
/// 2. If global_norm > max_norm every gradient is scaled by max_norm / global_norm
///
/// Returns the global norm before clipping.
pub fn clip_grad_norm(params: &mut [&mut Param], max_norm: f32) -> f32 {
    let total_norm_sq: f32 = params
        .iter()
        .filter_map(|p| p.grad())
        .map(|g| g.iter().map(|&x| x * x).sum::<f32>())
        .sum();
    let global_norm = total_norm_sq.sqrt();

    if global_norm > max_norm {
        let clip_coef = max_norm / global_norm;
        for param in params.iter_mut() {
            if let Some(grad) = param.grad() {
                let clipped = grad * clip_coef;
                param.set_grad(clipped);
            }
        }
    }

    global_norm
}
