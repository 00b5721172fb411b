//! Linde–Buzo–Gray mixture training.
//!
//! Training starts from a single Gaussian fitted to all data and repeatedly
//! splits the heaviest components in two, re-estimating with EM after every
//! split, until the requested number of components is reached. A last EM
//! pass always runs on the full data set.

use viterseg_core::{Result, VitersegError};

use crate::gmm::DiagGmm;
use crate::model::{check_data, EmissionTrainer, ParamSet};

/// Configuration for LBG training.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LbgConfig {
    /// Final number of mixture components.
    pub n_components: usize,
    /// Maximum EM iterations after each split (and for the final pass).
    pub n_iter: usize,
    /// EM convergence threshold on the mean log-likelihood.
    pub thresh: f64,
    /// Floor on every variance.
    pub min_covar: f64,
    /// Relative mean displacement when splitting: `mu ± disturb * sqrt(var)`.
    pub disturb: f64,
    /// When > 0, intermediate EM passes use at most `sampling` frames per
    /// component. The final pass always uses all frames.
    pub sampling: usize,
    /// Seed for the subsampling generator.
    pub seed: u64,
}

impl Default for LbgConfig {
    fn default() -> Self {
        Self {
            n_components: 1,
            n_iter: 10,
            thresh: 1e-2,
            min_covar: 1e-3,
            disturb: 0.05,
            sampling: 0,
            seed: 42,
        }
    }
}

impl LbgConfig {
    /// Check parameter ranges.
    pub fn validate(&self) -> Result<()> {
        if self.n_components == 0 {
            return Err(VitersegError::InvalidInput(
                "n_components must be > 0".into(),
            ));
        }
        if !(self.thresh >= 0.0) {
            return Err(VitersegError::InvalidInput("thresh must be >= 0".into()));
        }
        if !(self.min_covar > 0.0) {
            return Err(VitersegError::InvalidInput("min_covar must be > 0".into()));
        }
        if !(self.disturb > 0.0) || !self.disturb.is_finite() {
            return Err(VitersegError::InvalidInput("disturb must be > 0".into()));
        }
        Ok(())
    }
}

/// LBG trainer producing [`DiagGmm`] models.
#[derive(Debug, Clone)]
pub struct Lbg {
    config: LbgConfig,
}

impl Lbg {
    /// Create a trainer after validating `config`.
    pub fn new(config: LbgConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// The trainer's configuration.
    pub fn config(&self) -> &LbgConfig {
        &self.config
    }

    /// Train a mixture on `data`.
    ///
    /// # Errors
    ///
    /// Returns an error if `data` is empty, malformed, holds fewer frames
    /// than requested components, or if EM produces non-finite likelihoods.
    pub fn train(&self, data: &[&[f64]]) -> Result<DiagGmm> {
        let cfg = &self.config;
        check_data(data, None)?;
        if data.len() < cfg.n_components {
            return Err(VitersegError::InvalidInput(format!(
                "{} frames cannot support {} components",
                data.len(),
                cfg.n_components
            )));
        }

        let mut gmm = DiagGmm::from_data(data, cfg.min_covar)?;
        let mut rng = Xorshift64(cfg.seed.max(1));

        while gmm.n_components() < cfg.n_components {
            let k = gmm.n_components();
            let target = (2 * k).min(cfg.n_components);

            // heaviest components first, lower index on ties
            let mut order: Vec<usize> = (0..k).collect();
            let weights = gmm.weights();
            order.sort_by(|&a, &b| weights[b].total_cmp(&weights[a]).then(a.cmp(&b)));
            order.truncate(target - k);

            gmm = gmm.split(&order, cfg.disturb);

            let sample = subsample(data, cfg.sampling * target, &mut rng);
            let ll = gmm.em(&sample, ParamSet::ALL, cfg.n_iter, cfg.thresh, cfg.min_covar)?;
            tracing::debug!(
                components = target,
                frames = sample.len(),
                ll,
                "LBG split"
            );
        }

        gmm.em(data, ParamSet::ALL, cfg.n_iter, cfg.thresh, cfg.min_covar)?;
        Ok(gmm)
    }
}

impl EmissionTrainer for Lbg {
    type Model = DiagGmm;

    fn fit(&self, data: &[&[f64]]) -> Result<DiagGmm> {
        self.train(data)
    }
}

/// Up to `limit` rows chosen without replacement, kept in original order.
/// A `limit` of zero means no subsampling.
fn subsample<'a>(data: &[&'a [f64]], limit: usize, rng: &mut Xorshift64) -> Vec<&'a [f64]> {
    let n = data.len();
    if limit == 0 || limit >= n {
        return data.to_vec();
    }
    let mut idx: Vec<usize> = (0..n).collect();
    for i in 0..limit {
        let j = i + rng.next_bounded((n - i) as u64) as usize;
        idx.swap(i, j);
    }
    idx.truncate(limit);
    idx.sort_unstable();
    idx.into_iter().map(|i| data[i]).collect()
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Minimal xorshift64 PRNG for reproducible subsampling.
struct Xorshift64(u64);

impl Xorshift64 {
    fn next_u64(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }

    fn next_bounded(&mut self, bound: u64) -> u64 {
        self.next_u64() % bound
    }
}
