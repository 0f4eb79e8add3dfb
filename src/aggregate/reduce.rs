//! Scalar building blocks shared by every aggregation layout

/// P(True) from a (true-token, false-token) logit pair: softmax over the two, first entry
pub fn true_probability(true_logit: f32, false_logit: f32) -> f32 {
    let x = true_logit - false_logit;
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

/// Probability that every KC is mastered, under independence; empty turns are certain
pub fn correctness_probability(kc_probs: &[f32]) -> f32 {
    kc_probs.iter().product()
}

/// For each entry, the product of all other entries (∂Πp/∂p_i), exact even with zeros
pub fn product_of_others(kc_probs: &[f32]) -> Vec<f32> {
    let n = kc_probs.len();
    let mut out = vec![1.0; n];
    let mut prefix = 1.0;
    for i in 0..n {
        out[i] = prefix;
        prefix *= kc_probs[i];
    }
    let mut suffix = 1.0;
    for i in (0..n).rev() {
        out[i] *= suffix;
        suffix *= kc_probs[i];
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use proptest::prelude::*;

    #[test]
    fn test_true_probability() {
        assert_abs_diff_eq!(true_probability(0.0, 0.0), 0.5);
        let (t, f) = (2.0f32, 0.5f32);
        let expected = t.exp() / (t.exp() + f.exp());
        assert_abs_diff_eq!(true_probability(t, f), expected, epsilon = 1e-6);
        assert!(true_probability(-1000.0, 1000.0) >= 0.0);
        assert!(true_probability(1000.0, -1000.0) <= 1.0);
    }

    #[test]
    fn test_zero_absorbs() {
        assert_eq!(correctness_probability(&[0.9, 0.0, 0.7]), 0.0);
        assert_eq!(correctness_probability(&[]), 1.0);
    }

    #[test]
    fn test_product_of_others_with_zero() {
        let others = product_of_others(&[0.5, 0.0, 0.4]);
        assert_abs_diff_eq!(others[0], 0.0);
        assert_abs_diff_eq!(others[1], 0.2);
        assert_abs_diff_eq!(others[2], 0.0);
    }

    proptest! {
        #[test]
        fn prop_product_matches_fold(p in prop::collection::vec(0.0f32..=1.0, 0..8)) {
            let expected = p.iter().fold(1.0f32, |acc, &x| acc * x);
            prop_assert!((correctness_probability(&p) - expected).abs() < 1e-6);
        }

        #[test]
        fn prop_neutral_padding_invariant(
            p in prop::collection::vec(0.0f32..=1.0, 1..8),
            pad in 0usize..6
        ) {
            let mut padded = p.clone();
            padded.extend(std::iter::repeat(1.0).take(pad));
            prop_assert_eq!(correctness_probability(&p), correctness_probability(&padded));
        }

        #[test]
        fn prop_product_of_others(p in prop::collection::vec(0.01f32..=1.0, 1..8)) {
            let total = correctness_probability(&p);
            for (i, other) in product_of_others(&p).into_iter().enumerate() {
                prop_assert!((other * p[i] - total).abs() < 1e-5);
            }
        }
    }
}
