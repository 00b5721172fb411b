//! Diagonal-covariance Gaussian mixture model.
//!
//! EM runs in log-space: component responsibilities are computed from
//! log-densities with a log-sum-exp per frame, so frames far from every
//! component do not underflow to a zero total.

use std::f64::consts::PI;

use viterseg_core::prob::log_sum_exp_slice;
use viterseg_core::{Result, Summarizable, VitersegError};

use crate::model::{check_data, AdaptConfig, EmissionModel, ParamSet};

/// Components whose total responsibility falls below this keep their
/// previous mean and variance.
const MIN_COMPONENT_MASS: f64 = 1e-10;

/// A Gaussian mixture with diagonal covariances.
///
/// Parameters are stored flat: component `k` owns
/// `means[k * n_features..(k + 1) * n_features]` (likewise `variances`).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DiagGmm {
    n_features: usize,
    weights: Vec<f64>,
    means: Vec<f64>,
    variances: Vec<f64>,
}

impl DiagGmm {
    /// Create a mixture after validating dimensions and parameter ranges.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `n_features` is zero or there are no components
    /// - `means` / `variances` do not hold `n_components * n_features` values
    /// - weights are negative or do not sum to approximately 1.0 (tolerance 1e-6)
    /// - any variance is not strictly positive, or any mean is not finite
    pub fn new(
        n_features: usize,
        weights: Vec<f64>,
        means: Vec<f64>,
        variances: Vec<f64>,
    ) -> Result<Self> {
        if n_features == 0 {
            return Err(VitersegError::InvalidInput("n_features must be > 0".into()));
        }
        let k = weights.len();
        if k == 0 {
            return Err(VitersegError::InvalidInput(
                "mixture needs at least one component".into(),
            ));
        }
        if means.len() != k * n_features || variances.len() != k * n_features {
            return Err(VitersegError::InvalidInput(format!(
                "means/variances must hold {} values, got {}/{}",
                k * n_features,
                means.len(),
                variances.len()
            )));
        }
        if weights.iter().any(|&w| !(w >= 0.0)) {
            return Err(VitersegError::InvalidInput(
                "mixture weights must be >= 0".into(),
            ));
        }
        let w_sum: f64 = weights.iter().sum();
        if (w_sum - 1.0).abs() > 1e-6 {
            return Err(VitersegError::InvalidInput(format!(
                "mixture weights sum to {w_sum}, expected ~1.0"
            )));
        }
        if variances.iter().any(|&v| !(v > 0.0) || !v.is_finite()) {
            return Err(VitersegError::InvalidInput(
                "variances must be finite and > 0".into(),
            ));
        }
        if means.iter().any(|m| !m.is_finite()) {
            return Err(VitersegError::InvalidInput("means must be finite".into()));
        }
        Ok(Self {
            n_features,
            weights,
            means,
            variances,
        })
    }

    /// Maximum-likelihood single Gaussian for `data`, variances floored at
    /// `min_covar`.
    pub fn from_data(data: &[&[f64]], min_covar: f64) -> Result<Self> {
        let d = check_data(data, None)?;
        let n = data.len() as f64;

        let mut mean = vec![0.0; d];
        for row in data {
            for (m, &x) in mean.iter_mut().zip(row.iter()) {
                *m += x;
            }
        }
        for m in mean.iter_mut() {
            *m /= n;
        }

        let mut var = vec![0.0; d];
        for row in data {
            for j in 0..d {
                let diff = row[j] - mean[j];
                var[j] += diff * diff;
            }
        }
        for v in var.iter_mut() {
            *v = (*v / n).max(min_covar);
        }

        Ok(Self {
            n_features: d,
            weights: vec![1.0],
            means: mean,
            variances: var,
        })
    }

    /// Number of mixture components.
    pub fn n_components(&self) -> usize {
        self.weights.len()
    }

    /// Mixture weights.
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// Mean vector of component `k`.
    pub fn mean(&self, k: usize) -> &[f64] {
        &self.means[k * self.n_features..(k + 1) * self.n_features]
    }

    /// Diagonal variances of component `k`.
    pub fn variance(&self, k: usize) -> &[f64] {
        &self.variances[k * self.n_features..(k + 1) * self.n_features]
    }

    /// `ln w_k + ln N(x; mu_k, diag(var_k))` for every component.
    fn component_log_densities(&self, x: &[f64], out: &mut [f64]) {
        let d = self.n_features;
        let log_2pi = (2.0 * PI).ln();
        for (k, slot) in out.iter_mut().enumerate() {
            let mu = &self.means[k * d..(k + 1) * d];
            let var = &self.variances[k * d..(k + 1) * d];
            let mut acc = 0.0;
            for j in 0..d {
                let diff = x[j] - mu[j];
                acc += log_2pi + var[j].ln() + diff * diff / var[j];
            }
            *slot = self.weights[k].ln() - 0.5 * acc;
        }
    }

    /// Log-likelihood of a single feature vector.
    pub fn score_sample(&self, x: &[f64]) -> f64 {
        let mut buf = vec![0.0; self.n_components()];
        self.component_log_densities(x, &mut buf);
        log_sum_exp_slice(&buf)
    }

    /// One EM iteration touching only `params`.
    ///
    /// Returns the mean log-likelihood of `data` under the parameters
    /// *before* the update.
    ///
    /// # Errors
    ///
    /// Returns an error if `data` is empty, has the wrong dimension, or if
    /// the likelihood is not finite.
    pub fn em_step(&mut self, data: &[&[f64]], params: ParamSet, min_covar: f64) -> Result<f64> {
        let d = check_data(data, Some(self.n_features))?;
        let k = self.n_components();

        let mut mass = vec![0.0; k];
        let mut sum_x = vec![0.0; k * d];
        let mut sum_x2 = vec![0.0; k * d];
        let mut log_dens = vec![0.0; k];
        let mut total_ll = 0.0;

        // E-step: accumulate sufficient statistics
        for row in data {
            self.component_log_densities(row, &mut log_dens);
            let ll = log_sum_exp_slice(&log_dens);
            if !ll.is_finite() {
                return Err(VitersegError::Numerical(
                    "frame log-likelihood is not finite".into(),
                ));
            }
            total_ll += ll;
            for c in 0..k {
                let r = (log_dens[c] - ll).exp();
                if r == 0.0 {
                    continue;
                }
                mass[c] += r;
                for j in 0..d {
                    sum_x[c * d + j] += r * row[j];
                    sum_x2[c * d + j] += r * row[j] * row[j];
                }
            }
        }
        let n = data.len() as f64;
        let mean_ll = total_ll / n;

        // M-step
        for c in 0..k {
            if mass[c] < MIN_COMPONENT_MASS {
                continue;
            }
            for j in 0..d {
                let ex = sum_x[c * d + j] / mass[c];
                let ex2 = sum_x2[c * d + j] / mass[c];
                let mu = if params.means { ex } else { self.means[c * d + j] };
                if params.covars {
                    let var = ex2 - 2.0 * mu * ex + mu * mu;
                    self.variances[c * d + j] = var.max(min_covar);
                }
                self.means[c * d + j] = mu;
            }
        }
        if params.weights {
            let total: f64 = mass.iter().sum();
            for (w, m) in self.weights.iter_mut().zip(mass.iter()) {
                *w = m / total;
            }
        }

        Ok(mean_ll)
    }

    /// Run EM until the mean log-likelihood improves by less than `thresh`
    /// or `n_iter` iterations have been performed.
    ///
    /// Returns the mean log-likelihood under the final parameters.
    pub fn em(
        &mut self,
        data: &[&[f64]],
        params: ParamSet,
        n_iter: usize,
        thresh: f64,
        min_covar: f64,
    ) -> Result<f64> {
        let mut prev_ll = f64::NEG_INFINITY;
        if !params.is_empty() {
            for iter in 0..n_iter {
                let ll = self.em_step(data, params, min_covar)?;
                if (ll - prev_ll).abs() < thresh {
                    tracing::trace!(iter, ll, "EM converged");
                    break;
                }
                prev_ll = ll;
            }
        }
        let ll = self.mean_score(data)?;
        if !ll.is_finite() {
            return Err(VitersegError::Numerical(
                "mean log-likelihood is not finite after EM".into(),
            ));
        }
        Ok(ll)
    }

    /// Split the components listed in `which` into two, moving their means
    /// by `± disturb * sqrt(var)` and halving their weights. New components
    /// are appended after the existing ones.
    pub(crate) fn split(&self, which: &[usize], disturb: f64) -> Self {
        let d = self.n_features;
        let mut out = self.clone();
        for &c in which {
            let half = self.weights[c] / 2.0;
            out.weights[c] = half;
            out.weights.push(half);
            for j in 0..d {
                let shift = disturb * self.variances[c * d + j].sqrt();
                out.means[c * d + j] = self.means[c * d + j] - shift;
            }
            for j in 0..d {
                let shift = disturb * self.variances[c * d + j].sqrt();
                out.means.push(self.means[c * d + j] + shift);
                out.variances.push(self.variances[c * d + j]);
            }
        }
        out
    }
}

impl EmissionModel for DiagGmm {
    fn n_features(&self) -> usize {
        self.n_features
    }

    fn score(&self, data: &[&[f64]]) -> Result<Vec<f64>> {
        if data.is_empty() {
            return Ok(Vec::new());
        }
        check_data(data, Some(self.n_features))?;
        let mut buf = vec![0.0; self.n_components()];
        Ok(data
            .iter()
            .map(|row| {
                self.component_log_densities(row, &mut buf);
                log_sum_exp_slice(&buf)
            })
            .collect())
    }

    fn adapt(&self, data: &[&[f64]], config: &AdaptConfig) -> Result<Self> {
        config.validate()?;
        let mut adapted = self.clone();
        adapted.em(
            data,
            config.params,
            config.n_iter,
            config.thresh,
            config.min_covar,
        )?;
        Ok(adapted)
    }
}

impl Summarizable for DiagGmm {
    fn summary(&self) -> String {
        format!(
            "DiagGmm: {} components \u{00d7} {} features",
            self.n_components(),
            self.n_features
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn refs(rows: &[Vec<f64>]) -> Vec<&[f64]> {
        rows.iter().map(|r| r.as_slice()).collect()
    }

    /// Deterministic pseudo-normal noise (sum of uniforms).
    fn cloud(center: &[f64], spread: f64, n: usize, seed: u64) -> Vec<Vec<f64>> {
        let mut state = seed;
        let mut uniform = move || {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            (state >> 11) as f64 / (1u64 << 53) as f64
        };
        (0..n)
            .map(|_| {
                center
                    .iter()
                    .map(|&c| {
                        let z: f64 = (0..12).map(|_| uniform()).sum::<f64>() - 6.0;
                        c + spread * z
                    })
                    .collect()
            })
            .collect()
    }

    #[test]
    fn new_validates() {
        assert!(DiagGmm::new(0, vec![1.0], vec![], vec![]).is_err());
        assert!(DiagGmm::new(1, vec![], vec![], vec![]).is_err());
        assert!(DiagGmm::new(1, vec![1.0], vec![0.0, 1.0], vec![1.0]).is_err());
        assert!(DiagGmm::new(1, vec![0.3, 0.3], vec![0.0, 1.0], vec![1.0, 1.0]).is_err());
        assert!(DiagGmm::new(1, vec![1.0], vec![0.0], vec![0.0]).is_err());
        assert!(DiagGmm::new(1, vec![1.0], vec![0.0], vec![1.0]).is_ok());
    }

    #[test]
    fn standard_normal_density() {
        let g = DiagGmm::new(1, vec![1.0], vec![0.0], vec![1.0]).unwrap();
        let expected = -0.5 * (2.0 * PI).ln();
        assert!((g.score_sample(&[0.0]) - expected).abs() < 1e-12);
        assert!((g.score_sample(&[1.0]) - (expected - 0.5)).abs() < 1e-12);
    }

    #[test]
    fn from_data_matches_moments() {
        let rows = vec![vec![1.0, 10.0], vec![3.0, 10.0]];
        let g = DiagGmm::from_data(&refs(&rows), 1e-3).unwrap();
        assert_eq!(g.mean(0), &[2.0, 10.0]);
        assert!((g.variance(0)[0] - 1.0).abs() < 1e-12);
        // constant dimension is floored
        assert!((g.variance(0)[1] - 1e-3).abs() < 1e-15);
    }

    #[test]
    fn em_recovers_two_clusters() {
        let mut rows = cloud(&[-4.0], 0.5, 200, 7);
        rows.extend(cloud(&[4.0], 0.5, 200, 11));
        let data = refs(&rows);
        let mut g = DiagGmm::new(1, vec![0.5, 0.5], vec![-1.0, 1.0], vec![4.0, 4.0]).unwrap();
        let before = g.mean_score(&data).unwrap();
        let after = g.em(&data, ParamSet::ALL, 50, 1e-6, 1e-3).unwrap();
        assert!(after > before);
        assert!((g.mean(0)[0] + 4.0).abs() < 0.3, "mean 0 = {}", g.mean(0)[0]);
        assert!((g.mean(1)[0] - 4.0).abs() < 0.3, "mean 1 = {}", g.mean(1)[0]);
        assert!((g.weights()[0] - 0.5).abs() < 0.05);
    }

    #[test]
    fn em_never_decreases_likelihood() {
        let mut rows = cloud(&[0.0, 1.0], 1.0, 100, 3);
        rows.extend(cloud(&[3.0, -2.0], 0.7, 60, 5));
        let data = refs(&rows);
        let mut g = DiagGmm::new(
            2,
            vec![0.5, 0.5],
            vec![-1.0, 0.0, 1.0, 0.0],
            vec![1.0, 1.0, 1.0, 1.0],
        )
        .unwrap();
        let mut prev = f64::NEG_INFINITY;
        for _ in 0..15 {
            let ll = g.em_step(&data, ParamSet::ALL, 1e-3).unwrap();
            assert!(ll >= prev - 1e-9, "prev={prev}, ll={ll}");
            prev = ll;
        }
    }

    #[test]
    fn restricted_update_keeps_fixed_params() {
        let rows = cloud(&[2.0], 0.3, 100, 9);
        let data = refs(&rows);
        let base = DiagGmm::new(1, vec![0.4, 0.6], vec![-1.0, 1.0], vec![1.0, 2.0]).unwrap();
        let mut g = base.clone();
        g.em(&data, ParamSet::MEANS, 5, 0.0, 1e-3).unwrap();
        assert_eq!(g.weights(), base.weights());
        assert_eq!(g.variance(0), base.variance(0));
        assert_eq!(g.variance(1), base.variance(1));
        assert_ne!(g.mean(1), base.mean(1));
    }

    #[test]
    fn empty_param_set_is_noop() {
        let rows = cloud(&[2.0], 0.3, 20, 9);
        let data = refs(&rows);
        let base = DiagGmm::new(1, vec![1.0], vec![0.0], vec![1.0]).unwrap();
        let mut g = base.clone();
        g.em(&data, ParamSet::NONE, 10, 0.0, 1e-3).unwrap();
        assert_eq!(g, base);
    }

    #[test]
    fn score_checks_dimension() {
        let g = DiagGmm::new(2, vec![1.0], vec![0.0, 0.0], vec![1.0, 1.0]).unwrap();
        let bad: &[f64] = &[1.0];
        assert!(g.score(&[bad]).is_err());
        assert!(g.score(&[]).unwrap().is_empty());
        assert!(g.mean_score(&[]).is_err());
    }

    #[test]
    fn adapt_rejects_empty_data() {
        let g = DiagGmm::new(1, vec![1.0], vec![0.0], vec![1.0]).unwrap();
        assert!(g.adapt(&[], &AdaptConfig::default()).is_err());
    }

    #[test]
    fn split_doubles_components() {
        let g = DiagGmm::new(1, vec![1.0], vec![0.0], vec![4.0]).unwrap();
        let s = g.split(&[0], 0.5);
        assert_eq!(s.n_components(), 2);
        assert_eq!(s.weights(), &[0.5, 0.5]);
        assert_eq!(s.mean(0), &[-1.0]);
        assert_eq!(s.mean(1), &[1.0]);
        assert_eq!(s.variance(1), &[4.0]);
    }
}
