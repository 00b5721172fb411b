//! Initial-state and transition probability estimation from labeled data.
//!
//! Counts are collected per training sequence and normalized row by row.
//! A state that never starts a sequence gets an initial log-probability of
//! `-inf`; a state with no outgoing support at all gets a transition row of
//! `-inf` and is reported as degenerate training data.

use viterseg_core::prob::log_normalize;
use viterseg_core::{Annotation, Label, Result, SlidingWindow, VitersegError};

use crate::params::{InitialVector, TransitionMatrix};
use crate::targets::TargetIndex;

/// A chronological list of `(label, frame_count)` runs.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledSequence<L> {
    runs: Vec<(L, usize)>,
}

impl<L: Label> LabeledSequence<L> {
    /// Wrap runs that are already in chronological order.
    pub fn new(runs: Vec<(L, usize)>) -> Self {
        Self { runs }
    }

    /// Runs of an annotation, with frame counts derived from each track's
    /// duration at the window's frame rate.
    pub fn from_annotation(annotation: &Annotation<L>, window: &SlidingWindow) -> Self {
        let runs = annotation
            .iter()
            .map(|(segment, label)| {
                (
                    label.clone(),
                    window.duration_to_frame_count(segment.duration()),
                )
            })
            .collect();
        Self { runs }
    }

    /// The runs in order.
    pub fn runs(&self) -> &[(L, usize)] {
        &self.runs
    }

    /// Whether the sequence has no runs.
    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }
}

/// Learned start and transition log-probabilities.
#[derive(Debug, Clone)]
pub struct TransitionEstimate {
    pub initial: InitialVector,
    pub transition: TransitionMatrix,
    /// Degenerate normalizations encountered while estimating.
    pub diagnostics: Vec<VitersegError>,
}

/// Count-based estimator for [`InitialVector`] and [`TransitionMatrix`].
#[derive(Debug, Clone, Copy)]
pub struct TransitionEstimator {
    frame_persistence: bool,
}

impl Default for TransitionEstimator {
    fn default() -> Self {
        Self {
            frame_persistence: true,
        }
    }
}

impl TransitionEstimator {
    /// Estimator with per-frame persistence counting enabled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a run of `n` frames adds `n - 1` self-transitions.
    ///
    /// Enabled by default. When disabled, self-transitions are only counted
    /// between two adjacent runs carrying the same label.
    pub fn with_frame_persistence(mut self, enabled: bool) -> Self {
        self.frame_persistence = enabled;
        self
    }

    /// Whether per-frame persistence counting is enabled.
    pub fn frame_persistence(&self) -> bool {
        self.frame_persistence
    }

    /// Estimate initial and transition log-probabilities over `targets`.
    ///
    /// Empty sequences are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if a sequence mentions a label outside `targets`.
    /// Zero-count rows are not errors: they become `-inf` and are returned
    /// in [`TransitionEstimate::diagnostics`].
    pub fn estimate<L: Label>(
        &self,
        targets: &TargetIndex<L>,
        sequences: &[LabeledSequence<L>],
    ) -> Result<TransitionEstimate> {
        let k = targets.len();
        let mut initial = vec![0.0; k];
        let mut transition = vec![0.0; k * k];

        for sequence in sequences {
            let mut prev: Option<usize> = None;
            for (label, n_frames) in sequence.runs() {
                let s = targets.state(label).ok_or_else(|| {
                    VitersegError::InvalidInput(format!(
                        "training label {label:?} is not a target"
                    ))
                })?;
                match prev {
                    None => initial[s] += 1.0,
                    Some(p) => transition[p * k + s] += 1.0,
                }
                if self.frame_persistence {
                    transition[s * k + s] += n_frames.saturating_sub(1) as f64;
                }
                prev = Some(s);
            }
        }

        let mut diagnostics = Vec::new();

        let initial = match log_normalize(&initial) {
            Some(v) => {
                for (s, p) in v.iter().enumerate() {
                    if *p == f64::NEG_INFINITY {
                        tracing::debug!(target_label = ?targets.labels()[s], "target never starts a sequence");
                    }
                }
                v
            }
            None => {
                let err = VitersegError::DegenerateTrainingData(
                    "no sequence provides an initial state".into(),
                );
                tracing::warn!("{err}");
                diagnostics.push(err);
                vec![f64::NEG_INFINITY; k]
            }
        };

        let mut log_transition = Vec::with_capacity(k * k);
        for (s, row) in transition.chunks_exact(k).enumerate() {
            match log_normalize(row) {
                Some(v) => log_transition.extend(v),
                None => {
                    let err = VitersegError::DegenerateTrainingData(format!(
                        "no outgoing transition observed from {:?}",
                        targets.labels()[s]
                    ));
                    tracing::warn!("{err}");
                    diagnostics.push(err);
                    log_transition.extend(std::iter::repeat(f64::NEG_INFINITY).take(k));
                }
            }
        }

        Ok(TransitionEstimate {
            initial: InitialVector::from_raw(initial),
            transition: TransitionMatrix::from_raw(k, log_transition),
            diagnostics,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use viterseg_core::Segment;

    fn seq(runs: &[(&'static str, usize)]) -> LabeledSequence<&'static str> {
        LabeledSequence::new(runs.to_vec())
    }

    #[test]
    fn counts_starts_transitions_and_persistence() {
        let targets = TargetIndex::new(vec!["a", "b"]).unwrap();
        let est = TransitionEstimator::new()
            .estimate(
                &targets,
                &[seq(&[("a", 3), ("b", 2)]), seq(&[("b", 1), ("a", 1)])],
            )
            .unwrap();

        // one start each
        assert!((est.initial.get(0) - 0.5f64.ln()).abs() < 1e-12);
        assert!((est.initial.get(1) - 0.5f64.ln()).abs() < 1e-12);
        // a: a->a 2, a->b 1
        assert!((est.transition.get(0, 0) - (2.0f64 / 3.0).ln()).abs() < 1e-12);
        assert!((est.transition.get(0, 1) - (1.0f64 / 3.0).ln()).abs() < 1e-12);
        // b: b->b 1, b->a 1
        assert!((est.transition.get(1, 0) - 0.5f64.ln()).abs() < 1e-12);
        assert!(est.diagnostics.is_empty());
    }

    #[test]
    fn unseen_start_is_negative_infinity() {
        let targets = TargetIndex::new(vec!["a", "b"]).unwrap();
        let est = TransitionEstimator::new()
            .estimate(&targets, &[seq(&[("a", 2), ("b", 2)])])
            .unwrap();
        assert_eq!(est.initial.get(0), 0.0);
        assert_eq!(est.initial.get(1), f64::NEG_INFINITY);
    }

    #[test]
    fn persistence_can_be_disabled() {
        let targets = TargetIndex::new(vec!["a", "b"]).unwrap();
        let est = TransitionEstimator::new()
            .with_frame_persistence(false)
            .estimate(&targets, &[seq(&[("a", 50), ("b", 50), ("a", 1)])])
            .unwrap();
        assert_eq!(est.transition.get(0, 0), f64::NEG_INFINITY);
        assert_eq!(est.transition.get(0, 1), 0.0);
        assert_eq!(est.transition.get(1, 0), 0.0);
    }

    #[test]
    fn zero_support_row_is_degenerate_not_fatal() {
        let targets = TargetIndex::new(vec!["a", "b", "c"]).unwrap();
        let est = TransitionEstimator::new()
            .estimate(&targets, &[seq(&[("a", 1), ("b", 1)])])
            .unwrap();
        assert!(est.transition.row(1).iter().all(|&v| v == f64::NEG_INFINITY));
        assert!(est.transition.row(2).iter().all(|&v| v == f64::NEG_INFINITY));
        assert_eq!(est.diagnostics.len(), 2);
        assert!(matches!(
            est.diagnostics[0],
            VitersegError::DegenerateTrainingData(_)
        ));
    }

    #[test]
    fn no_sequences_gives_degenerate_initial() {
        let targets = TargetIndex::new(vec!["a"]).unwrap();
        let est = TransitionEstimator::new().estimate(&targets, &[]).unwrap();
        assert_eq!(est.initial.get(0), f64::NEG_INFINITY);
        assert_eq!(est.diagnostics.len(), 2);
    }

    #[test]
    fn unknown_label_is_rejected() {
        let targets = TargetIndex::new(vec!["a"]).unwrap();
        let res = TransitionEstimator::new().estimate(&targets, &[seq(&[("z", 1)])]);
        assert!(res.is_err());
    }

    #[test]
    fn runs_from_annotation() {
        let window = SlidingWindow::contiguous(0.0, 0.1).unwrap();
        let mut a = Annotation::new();
        a.push(Segment::new(0.0, 1.0), "x");
        a.push(Segment::new(1.0, 1.3), "y");
        let s = LabeledSequence::from_annotation(&a, &window);
        assert_eq!(s.runs(), &[("x", 10), ("y", 3)]);
    }
}
