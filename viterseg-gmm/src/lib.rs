//! Gaussian mixture emission models for the Viterseg ecosystem.
//!
//! - **Capability** — [`EmissionModel`] / [`EmissionTrainer`], the only view
//!   the segmentation HMM has of its emission models
//! - **Mixtures** — [`DiagGmm`], a diagonal-covariance GMM with restricted EM
//! - **Training** — [`Lbg`], Linde–Buzo–Gray splitting from a single Gaussian
//!
//! # Quick start
//!
//! ```
//! use viterseg_gmm::{AdaptConfig, EmissionModel, EmissionTrainer, Lbg, LbgConfig};
//!
//! let low: Vec<Vec<f64>> = (0..20).map(|i| vec![-2.0 + 0.01 * i as f64]).collect();
//! let high: Vec<Vec<f64>> = (0..20).map(|i| vec![2.0 + 0.01 * i as f64]).collect();
//! let low: Vec<&[f64]> = low.iter().map(|r| r.as_slice()).collect();
//! let high: Vec<&[f64]> = high.iter().map(|r| r.as_slice()).collect();
//! let pooled: Vec<&[f64]> = low.iter().chain(high.iter()).copied().collect();
//!
//! let ubm = Lbg::new(LbgConfig::default()).unwrap().fit(&pooled).unwrap();
//! let adapted = ubm.adapt(&low, &AdaptConfig::default()).unwrap();
//! assert!(adapted.mean_score(&low).unwrap() > ubm.mean_score(&low).unwrap());
//! ```

pub mod gmm;
pub mod lbg;
pub mod model;

pub use gmm::DiagGmm;
pub use lbg::{Lbg, LbgConfig};
pub use model::{AdaptConfig, EmissionModel, EmissionTrainer, ParamSet};
