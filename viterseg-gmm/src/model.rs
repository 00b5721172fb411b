//! The emission-model capability consumed by the segmentation HMM.
//!
//! The HMM never looks inside an emission model. It trains one through an
//! [`EmissionTrainer`], specializes it with [`EmissionModel::adapt`] and asks
//! it for per-frame log-likelihoods with [`EmissionModel::score`].

use std::fmt;
use std::str::FromStr;

use viterseg_core::{Result, VitersegError};

/// Subset of mixture parameters an EM update is allowed to modify.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ParamSet {
    pub weights: bool,
    pub means: bool,
    pub covars: bool,
}

impl ParamSet {
    /// Update everything.
    pub const ALL: Self = Self {
        weights: true,
        means: true,
        covars: true,
    };

    /// Update means only; the usual choice for adapting a group model.
    pub const MEANS: Self = Self {
        weights: false,
        means: true,
        covars: false,
    };

    /// Update nothing.
    pub const NONE: Self = Self {
        weights: false,
        means: false,
        covars: false,
    };

    /// Whether no parameter would be touched.
    pub fn is_empty(&self) -> bool {
        !(self.weights || self.means || self.covars)
    }
}

/// Parses the conventional letter string: `w`eights, `m`eans, `c`ovariances.
///
/// ```
/// use viterseg_gmm::ParamSet;
///
/// assert_eq!("m".parse::<ParamSet>().unwrap(), ParamSet::MEANS);
/// assert_eq!("wmc".parse::<ParamSet>().unwrap(), ParamSet::ALL);
/// assert!("mx".parse::<ParamSet>().is_err());
/// ```
impl FromStr for ParamSet {
    type Err = VitersegError;

    fn from_str(s: &str) -> Result<Self> {
        let mut set = ParamSet::NONE;
        for c in s.chars() {
            match c {
                'w' => set.weights = true,
                'm' => set.means = true,
                'c' => set.covars = true,
                other => {
                    return Err(VitersegError::InvalidInput(format!(
                        "unknown parameter letter '{other}' (expected any of \"wmc\")"
                    )))
                }
            }
        }
        Ok(set)
    }
}

impl fmt::Display for ParamSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.weights {
            f.write_str("w")?;
        }
        if self.means {
            f.write_str("m")?;
        }
        if self.covars {
            f.write_str("c")?;
        }
        Ok(())
    }
}

/// Configuration for adapting a group model to one target's data.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AdaptConfig {
    /// Parameters re-estimated from the target data; the rest stay fixed.
    pub params: ParamSet,
    /// Maximum number of EM iterations.
    pub n_iter: usize,
    /// Stop once the mean log-likelihood improves by less than this.
    pub thresh: f64,
    /// Floor on every variance.
    pub min_covar: f64,
}

impl Default for AdaptConfig {
    fn default() -> Self {
        Self {
            params: ParamSet::MEANS,
            n_iter: 10,
            thresh: 1e-2,
            min_covar: 1e-3,
        }
    }
}

impl AdaptConfig {
    /// Check parameter ranges.
    pub fn validate(&self) -> Result<()> {
        if !(self.thresh >= 0.0) {
            return Err(VitersegError::InvalidInput(
                "adaptation thresh must be >= 0".into(),
            ));
        }
        if !(self.min_covar > 0.0) {
            return Err(VitersegError::InvalidInput(
                "adaptation min_covar must be > 0".into(),
            ));
        }
        Ok(())
    }
}

/// A trained generative model scoring feature vectors.
///
/// Implementations are immutable once trained: adaptation returns a new
/// model and leaves `self` untouched, so one group model can seed many
/// targets concurrently.
pub trait EmissionModel: Clone + Send + Sync {
    /// Dimension of the feature vectors the model was trained on.
    fn n_features(&self) -> usize;

    /// Log-likelihood of every row of `data`.
    fn score(&self, data: &[&[f64]]) -> Result<Vec<f64>>;

    /// A copy of this model re-estimated on `data`, changing only the
    /// parameters selected by `config.params`.
    fn adapt(&self, data: &[&[f64]], config: &AdaptConfig) -> Result<Self>;

    /// Average log-likelihood of `data`.
    fn mean_score(&self, data: &[&[f64]]) -> Result<f64> {
        let scores = self.score(data)?;
        if scores.is_empty() {
            return Err(VitersegError::InvalidInput("no data to score".into()));
        }
        Ok(scores.iter().sum::<f64>() / scores.len() as f64)
    }
}

/// Something that fits an [`EmissionModel`] from scratch.
pub trait EmissionTrainer: Send + Sync {
    type Model: EmissionModel;

    /// Fit a new model on `data` (one feature vector per row).
    fn fit(&self, data: &[&[f64]]) -> Result<Self::Model>;
}

/// Validate a data matrix against an expected dimension.
///
/// `None` accepts whatever dimension the first row has.
pub(crate) fn check_data(data: &[&[f64]], n_features: Option<usize>) -> Result<usize> {
    let first = data
        .first()
        .ok_or_else(|| VitersegError::InvalidInput("empty data".into()))?;
    let dim = n_features.unwrap_or(first.len());
    if dim == 0 {
        return Err(VitersegError::InvalidInput("zero-dimensional data".into()));
    }
    for (i, row) in data.iter().enumerate() {
        if row.len() != dim {
            return Err(VitersegError::InvalidInput(format!(
                "row {} has dimension {}, expected {}",
                i,
                row.len(),
                dim
            )));
        }
        if row.iter().any(|v| !v.is_finite()) {
            return Err(VitersegError::InvalidInput(format!(
                "row {i} contains a non-finite value"
            )));
        }
    }
    Ok(dim)
}
