//! Train-then-apply segmentation: the full HMM pipeline behind one type.
//!
//! Training estimates start and transition probabilities from the reference
//! annotations and fits one emission model per target from the frames each
//! target covers. Applying scores a new feature sequence against every
//! model, resolves time-domain constraints through the sequence's sliding
//! window, decodes, and assembles the path back into an annotation.

use std::collections::HashMap;

use viterseg_core::{Annotation, FrameFeatures, Label, Result, Summarizable, VitersegError};
use viterseg_gmm::{AdaptConfig, DiagGmm, EmissionModel, EmissionTrainer, Lbg, LbgConfig};

use crate::assemble::SegmentAssembler;
use crate::bank::EmissionModelBank;
use crate::constraint::{resolve_constraints, MinDuration, TimedConstraint};
use crate::params::{InitialVector, TransitionMatrix};
use crate::targets::TargetIndex;
use crate::transition::{LabeledSequence, TransitionEstimator};
use crate::viterbi::{ConstrainedViterbiDecoder, DecodedPath};

/// Configuration for [`ViterbiHmm::fit`].
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ViterbiHmmConfig {
    /// Mixture training for group models and independently fitted targets.
    pub gmm: LbgConfig,
    /// Adaptation of group models to their members.
    pub adapt: AdaptConfig,
    /// Count `n - 1` self-transitions for every run of `n` frames.
    pub frame_persistence: bool,
    /// Let the last decoded run be shorter than its minimum duration.
    pub truncate_final_run: bool,
}

impl Default for ViterbiHmmConfig {
    fn default() -> Self {
        Self {
            gmm: LbgConfig::default(),
            adapt: AdaptConfig::default(),
            frame_persistence: true,
            truncate_final_run: true,
        }
    }
}

impl ViterbiHmmConfig {
    /// Check every nested configuration.
    pub fn validate(&self) -> Result<()> {
        self.gmm.validate()?;
        self.adapt.validate()
    }
}

/// Recoverable problems met while training.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainingReport {
    pub diagnostics: Vec<VitersegError>,
}

impl TrainingReport {
    /// Whether training went through without any recoverable issue.
    pub fn is_clean(&self) -> bool {
        self.diagnostics.is_empty()
    }
}

impl Summarizable for TrainingReport {
    fn summary(&self) -> String {
        let degenerate = self
            .diagnostics
            .iter()
            .filter(|e| matches!(e, VitersegError::DegenerateTrainingData(_)))
            .count();
        let adaptation = self
            .diagnostics
            .iter()
            .filter(|e| matches!(e, VitersegError::ModelAdaptation { .. }))
            .count();
        format!(
            "TrainingReport: {} issues ({} degenerate, {} failed adaptations)",
            self.diagnostics.len(),
            degenerate,
            adaptation
        )
    }
}

/// A trained segmentation HMM.
#[derive(Debug, Clone)]
pub struct ViterbiHmm<L: Label, M = DiagGmm> {
    targets: TargetIndex<L>,
    initial: InitialVector,
    transition: TransitionMatrix,
    bank: EmissionModelBank<M>,
    min_duration: MinDuration<L>,
    truncate_final_run: bool,
}

impl<L: Label> ViterbiHmm<L, DiagGmm> {
    /// Train with LBG mixtures configured by `config.gmm`.
    ///
    /// See [`fit_with`](Self::fit_with).
    pub fn fit(
        config: &ViterbiHmmConfig,
        targets: Option<Vec<L>>,
        groups: &[Vec<L>],
        training: &[(Annotation<L>, FrameFeatures)],
    ) -> Result<(Self, TrainingReport)> {
        config.validate()?;
        let trainer = Lbg::new(config.gmm.clone())?;
        Self::fit_with(&trainer, config, targets, groups, training)
    }
}

impl<L: Label, M: EmissionModel> ViterbiHmm<L, M> {
    /// Train on annotated feature sequences using `trainer` for emission
    /// models.
    ///
    /// Targets default to the sorted union of the training labels. `groups`
    /// lists targets that share a group model.
    ///
    /// # Errors
    ///
    /// Returns an error on invalid configuration, empty training data,
    /// inconsistent feature dimensions, training labels outside explicit
    /// targets, or a target that cannot be fitted at all. Recoverable issues
    /// go to the returned [`TrainingReport`].
    pub fn fit_with<T>(
        trainer: &T,
        config: &ViterbiHmmConfig,
        targets: Option<Vec<L>>,
        groups: &[Vec<L>],
        training: &[(Annotation<L>, FrameFeatures)],
    ) -> Result<(Self, TrainingReport)>
    where
        T: EmissionTrainer<Model = M>,
    {
        config.validate()?;
        let (_, first) = training
            .first()
            .ok_or_else(|| VitersegError::InvalidInput("no training data".into()))?;
        let dim = first.n_features();
        if training.iter().any(|(_, f)| f.n_features() != dim) {
            return Err(VitersegError::InvalidInput(
                "training features disagree on dimension".into(),
            ));
        }

        let targets = match targets {
            Some(labels) => TargetIndex::new(labels)?,
            None => TargetIndex::infer(training.iter().map(|(a, _)| a))?,
        };
        tracing::info!(
            targets = targets.len(),
            sequences = training.len(),
            "training segmentation HMM"
        );

        let sequences: Vec<LabeledSequence<L>> = training
            .iter()
            .map(|(a, f)| LabeledSequence::from_annotation(a, f.window()))
            .collect();
        let estimate = TransitionEstimator::new()
            .with_frame_persistence(config.frame_persistence)
            .estimate(&targets, &sequences)?;

        let mut data: HashMap<L, Vec<&[f64]>> = HashMap::with_capacity(targets.len());
        for label in targets.labels() {
            let rows: Vec<&[f64]> = training
                .iter()
                .flat_map(|(a, f)| f.crop(&a.label_coverage(label)))
                .collect();
            tracing::debug!(target_label = ?label, frames = rows.len(), "gathered training frames");
            data.insert(label.clone(), rows);
        }

        let (bank, bank_issues) =
            EmissionModelBank::train(trainer, &config.adapt, &targets, groups, &data)?;

        let mut report = TrainingReport {
            diagnostics: estimate.diagnostics,
        };
        report.diagnostics.extend(bank_issues);
        tracing::info!("{}", report.summary());

        Ok((
            Self {
                targets,
                initial: estimate.initial,
                transition: estimate.transition,
                bank,
                min_duration: MinDuration::None,
                truncate_final_run: config.truncate_final_run,
            },
            report,
        ))
    }

    /// Assemble a model from already-estimated parts.
    ///
    /// # Errors
    ///
    /// Returns an error if the parts disagree on the number of states.
    pub fn from_parts(
        targets: TargetIndex<L>,
        initial: InitialVector,
        transition: TransitionMatrix,
        bank: EmissionModelBank<M>,
    ) -> Result<Self> {
        let k = targets.len();
        if initial.n_states() != k || transition.n_states() != k || bank.len() != k {
            return Err(VitersegError::InvalidInput(format!(
                "{k} targets but initial {}, transition {}, models {}",
                initial.n_states(),
                transition.n_states(),
                bank.len()
            )));
        }
        Ok(Self {
            targets,
            initial,
            transition,
            bank,
            min_duration: MinDuration::None,
            truncate_final_run: true,
        })
    }

    /// Minimum duration enforced when decoding.
    pub fn with_min_duration(mut self, min_duration: MinDuration<L>) -> Self {
        self.min_duration = min_duration;
        self
    }

    /// Whether the last decoded run may be shorter than its minimum duration.
    pub fn with_truncated_final_run(mut self, allowed: bool) -> Self {
        self.truncate_final_run = allowed;
        self
    }

    pub fn targets(&self) -> &TargetIndex<L> {
        &self.targets
    }

    pub fn initial(&self) -> &InitialVector {
        &self.initial
    }

    pub fn transition(&self) -> &TransitionMatrix {
        &self.transition
    }

    pub fn bank(&self) -> &EmissionModelBank<M> {
        &self.bank
    }

    pub fn min_duration(&self) -> &MinDuration<L> {
        &self.min_duration
    }

    /// Most likely per-frame state path of `features`.
    ///
    /// Constraints and minimum durations that cannot be applied are dropped
    /// and only logged; use
    /// [`decode_with_diagnostics`](Self::decode_with_diagnostics) to get them.
    ///
    /// # Errors
    ///
    /// Returns an error if the feature dimension does not match the models,
    /// or [`VitersegError::NoAdmissiblePath`] if the constraints leave no
    /// admissible path.
    pub fn decode(
        &self,
        features: &FrameFeatures,
        constraints: &[TimedConstraint<L>],
    ) -> Result<DecodedPath> {
        self.decode_with_diagnostics(features, constraints).map(|(path, _)| path)
    }

    /// Like [`decode`](Self::decode), also returning every dropped
    /// constraint or minimum duration: unknown targets as
    /// [`VitersegError::InvalidConstraintTarget`], unusable durations as
    /// `InvalidInput`.
    pub fn decode_with_diagnostics(
        &self,
        features: &FrameFeatures,
        constraints: &[TimedConstraint<L>],
    ) -> Result<(DecodedPath, Vec<VitersegError>)> {
        if features.n_features() != self.bank.n_features() {
            return Err(VitersegError::InvalidInput(format!(
                "features have dimension {}, models expect {}",
                features.n_features(),
                self.bank.n_features()
            )));
        }
        let window = features.window();
        let emission = self.bank.score(&features.rows())?;
        let (floor, mut dropped) = self.min_duration.resolve(&self.targets, window);
        let (matrix, dropped_constraints) =
            resolve_constraints(constraints, &self.targets, window, features.n_frames());
        dropped.extend(dropped_constraints);

        let decoder = ConstrainedViterbiDecoder::new(&self.transition, &self.initial, &floor)?
            .with_truncated_final_run(self.truncate_final_run);
        let matrix = (!constraints.is_empty()).then_some(&matrix);
        let path = decoder.decode(&emission, matrix)?;
        Ok((path, dropped))
    }

    /// Segment `features` into labeled time spans.
    ///
    /// Dropped constraints are only logged, as in [`decode`](Self::decode).
    pub fn apply(
        &self,
        features: &FrameFeatures,
        constraints: &[TimedConstraint<L>],
    ) -> Result<Annotation<L>> {
        self.apply_with_diagnostics(features, constraints).map(|(annotation, _)| annotation)
    }

    /// Like [`apply`](Self::apply), also returning dropped constraints.
    pub fn apply_with_diagnostics(
        &self,
        features: &FrameFeatures,
        constraints: &[TimedConstraint<L>],
    ) -> Result<(Annotation<L>, Vec<VitersegError>)> {
        let (path, dropped) = self.decode_with_diagnostics(features, constraints)?;
        let annotation =
            SegmentAssembler::new(*features.window()).assemble(&path, &self.targets)?;
        Ok((annotation, dropped))
    }
}

impl<L: Label, M> Summarizable for ViterbiHmm<L, M> {
    fn summary(&self) -> String {
        format!(
            "ViterbiHmm: {} targets {:?}",
            self.targets.len(),
            self.targets.labels()
        )
    }
}
