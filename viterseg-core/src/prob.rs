//! Log-space probability helpers for numerically stable computation.
//!
//! Probabilities are handled as natural logarithms throughout Viterseg.
//! Negative infinity stands for impossibility and propagates through sums
//! without producing NaN as long as no `+inf` enters the computation.

/// Numerically stable computation of `ln(exp(a) + exp(b))`.
///
/// Handles the cases where `a` or `b` are negative infinity.
pub fn log_sum_exp(a: f64, b: f64) -> f64 {
    if a == f64::NEG_INFINITY {
        return b;
    }
    if b == f64::NEG_INFINITY {
        return a;
    }
    let (max, min) = if a >= b { (a, b) } else { (b, a) };
    max + (min - max).exp().ln_1p()
}

/// Log-sum-exp over a slice. Empty slices yield -inf.
pub fn log_sum_exp_slice(xs: &[f64]) -> f64 {
    let max = xs.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if max == f64::NEG_INFINITY {
        return f64::NEG_INFINITY;
    }
    let sum: f64 = xs.iter().map(|&x| (x - max).exp()).sum();
    max + sum.ln()
}

/// Normalize non-negative counts into log-probabilities.
///
/// Zero counts become `-inf`. Returns `None` when the total is zero, since
/// there is no distribution to speak of; callers decide how to report it.
pub fn log_normalize(counts: &[f64]) -> Option<Vec<f64>> {
    let total: f64 = counts.iter().sum();
    if !(total > 0.0) || !total.is_finite() {
        return None;
    }
    Some(counts.iter().map(|&c| (c / total).ln()).collect())
}

/// Whether `exp` of the given log-probabilities sums to one within `tol`.
pub fn is_log_normalized(log_probs: &[f64], tol: f64) -> bool {
    let sum: f64 = log_probs.iter().map(|p| p.exp()).sum();
    (sum - 1.0).abs() <= tol
}
