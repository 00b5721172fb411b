//! One emission model per target, trained independently or by adapting a
//! shared group model.
//!
//! For each group, a single model is fitted to the pooled data of all its
//! members and then adapted to each member's own data. Targets outside
//! every group are fitted on their own data. Per-target work is independent
//! and runs in parallel with the `parallel` feature.

use std::collections::HashMap;

use viterseg_core::{Label, Result, VitersegError};
use viterseg_gmm::{AdaptConfig, EmissionModel, EmissionTrainer};

use crate::params::EmissionScores;
use crate::targets::TargetIndex;

/// Trained emission models, indexed by state.
#[derive(Debug, Clone, PartialEq)]
pub struct EmissionModelBank<M> {
    models: Vec<M>,
}

/// Training data of each target, one feature vector per frame.
pub type TargetData<'a, L> = HashMap<L, Vec<&'a [f64]>>;

impl<M: EmissionModel> EmissionModelBank<M> {
    /// Wrap already-trained models, one per state.
    ///
    /// # Errors
    ///
    /// Returns an error if `models` is empty or the models disagree on the
    /// feature dimension.
    pub fn from_models(models: Vec<M>) -> Result<Self> {
        let first = models
            .first()
            .ok_or_else(|| VitersegError::InvalidInput("no emission models".into()))?;
        let dim = first.n_features();
        if models.iter().any(|m| m.n_features() != dim) {
            return Err(VitersegError::InvalidInput(
                "emission models disagree on the feature dimension".into(),
            ));
        }
        Ok(Self { models })
    }

    /// Train one model per target.
    ///
    /// `groups` lists sets of targets sharing a group model; a target listed
    /// by several groups is adapted from the first one. When adaptation
    /// fails (or the target has no data) the target keeps the unadapted
    /// group model and the failure is returned in the diagnostics. When a
    /// group model cannot be fitted at all, its members are fitted
    /// independently.
    ///
    /// # Errors
    ///
    /// Returns an error if a group names an unknown target, if the adaptation
    /// config is invalid, or if a target that is fitted independently has no
    /// data or cannot be fitted.
    pub fn train<L, T>(
        trainer: &T,
        adapt: &AdaptConfig,
        targets: &TargetIndex<L>,
        groups: &[Vec<L>],
        data: &TargetData<'_, L>,
    ) -> Result<(Self, Vec<VitersegError>)>
    where
        L: Label,
        T: EmissionTrainer<Model = M>,
    {
        adapt.validate()?;

        let mut assigned: Vec<Option<usize>> = vec![None; targets.len()];
        for (g, members) in groups.iter().enumerate() {
            for label in members {
                let k = targets.state(label).ok_or_else(|| {
                    VitersegError::InvalidInput(format!(
                        "group {g} names unknown target {label:?}"
                    ))
                })?;
                if assigned[k].is_none() {
                    assigned[k] = Some(g);
                }
            }
        }

        tracing::info!(
            targets = targets.len(),
            groups = groups.len(),
            "training emission models"
        );

        let mut diagnostics = Vec::new();

        let group_models: Vec<Result<M>> = map_indices(groups.len(), |g| {
            let pooled: Vec<&[f64]> = groups[g]
                .iter()
                .filter_map(|label| data.get(label))
                .flat_map(|rows| rows.iter().copied())
                .collect();
            tracing::debug!(group = g, frames = pooled.len(), "fitting group model");
            trainer.fit(&pooled)
        });
        let group_models: Vec<Option<M>> = group_models
            .into_iter()
            .enumerate()
            .map(|(g, fitted)| match fitted {
                Ok(m) => Some(m),
                Err(e) => {
                    let err = VitersegError::Other(format!(
                        "group {:?} model could not be fitted ({e}); members are fitted independently",
                        groups[g]
                    ));
                    tracing::warn!("{err}");
                    diagnostics.push(err);
                    None
                }
            })
            .collect();

        let per_target: Vec<Result<(M, Option<VitersegError>)>> =
            map_indices(targets.len(), |k| {
                let label = &targets.labels()[k];
                let rows: &[&[f64]] = data.get(label).map(|r| r.as_slice()).unwrap_or(&[]);
                let group_model = assigned[k].and_then(|g| group_models[g].as_ref());
                match group_model {
                    Some(base) => Ok(adapt_or_fall_back(base, label, rows, adapt)),
                    None => fit_independently(trainer, label, rows).map(|m| (m, None)),
                }
            });

        let mut models = Vec::with_capacity(targets.len());
        for result in per_target {
            let (model, diagnostic) = result?;
            models.push(model);
            diagnostics.extend(diagnostic);
        }

        tracing::info!(
            models = models.len(),
            issues = diagnostics.len(),
            "emission models trained"
        );
        Ok((Self::from_models(models)?, diagnostics))
    }

    /// Number of models (= number of states).
    pub fn len(&self) -> usize {
        self.models.len()
    }

    /// Whether the bank holds no models. Never true for a constructed bank.
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Model of state `k`.
    pub fn model(&self, k: usize) -> Option<&M> {
        self.models.get(k)
    }

    /// All models in state order.
    pub fn models(&self) -> &[M] {
        &self.models
    }

    /// Feature dimension shared by every model.
    pub fn n_features(&self) -> usize {
        self.models.first().map(|m| m.n_features()).unwrap_or(0)
    }

    /// Score every frame against every model.
    pub fn score(&self, frames: &[&[f64]]) -> Result<EmissionScores> {
        let columns: Vec<Result<Vec<f64>>> =
            map_indices(self.models.len(), |k| self.models[k].score(frames));
        let columns = columns.into_iter().collect::<Result<Vec<_>>>()?;
        if let Some(bad) = columns.iter().position(|c| c.len() != frames.len()) {
            return Err(VitersegError::Numerical(format!(
                "model {bad} returned {} scores for {} frames",
                columns[bad].len(),
                frames.len()
            )));
        }
        EmissionScores::from_columns(&columns)
    }
}

/// Adapt `base` to one target; on failure keep `base` and report why.
fn adapt_or_fall_back<L: Label, M: EmissionModel>(
    base: &M,
    label: &L,
    rows: &[&[f64]],
    config: &AdaptConfig,
) -> (M, Option<VitersegError>) {
    let outcome = if rows.is_empty() {
        Err(VitersegError::InvalidInput("no training data".into()))
    } else {
        base.adapt(rows, config)
    };
    match outcome {
        Ok(model) => {
            tracing::debug!(target_label = ?label, frames = rows.len(), "adapted group model");
            (model, None)
        }
        Err(e) => {
            let err = VitersegError::ModelAdaptation {
                target: format!("{label:?}"),
                reason: e.to_string(),
            };
            tracing::warn!("{err}; keeping the group model");
            (base.clone(), Some(err))
        }
    }
}

fn fit_independently<L: Label, T: EmissionTrainer>(
    trainer: &T,
    label: &L,
    rows: &[&[f64]],
) -> Result<T::Model> {
    if rows.is_empty() {
        return Err(VitersegError::InvalidInput(format!(
            "no training data for target {label:?}"
        )));
    }
    let model = trainer.fit(rows).map_err(|e| {
        VitersegError::Other(format!("cannot fit model for target {label:?}: {e}"))
    })?;
    tracing::debug!(target_label = ?label, frames = rows.len(), "fitted independent model");
    Ok(model)
}

/// `(0..n).map(f)`, spread over the rayon pool with the `parallel` feature.
fn map_indices<R, F>(n: usize, f: F) -> Vec<R>
where
    R: Send,
    F: Fn(usize) -> R + Send + Sync,
{
    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;
        (0..n).into_par_iter().map(f).collect()
    }
    #[cfg(not(feature = "parallel"))]
    (0..n).map(f).collect()
}
