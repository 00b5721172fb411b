//! Duration- and constraint-aware HMM segmentation.
//!
//! `viterseg-hmm` labels every frame of a feature sequence with one of a
//! fixed set of targets:
//!
//! - **Estimation** — [`TransitionEstimator`] learns start and transition
//!   log-probabilities from labeled runs
//! - **Emission models** — [`EmissionModelBank`] trains one model per target,
//!   optionally by adapting a shared group model
//! - **Decoding** — [`ConstrainedViterbiDecoder`] finds the best path under
//!   per-state duration floors and per-frame admissibility flags
//! - **Assembly** — [`SegmentAssembler`] turns a path into labeled segments
//! - **Pipeline** — [`ViterbiHmm`] wires all of the above together
//!
//! # Quick start
//!
//! ```
//! use viterseg_hmm::{
//!     viterbi_decode, DurationFloor, EmissionScores, InitialVector, TransitionMatrix,
//! };
//!
//! let ln = f64::ln;
//! let initial = InitialVector::from_log_probs(vec![ln(0.6), ln(0.4)]).unwrap();
//! let transition = TransitionMatrix::from_rows(&[
//!     vec![ln(0.9), ln(0.1)],
//!     vec![ln(0.2), ln(0.8)],
//! ])
//! .unwrap();
//! let emission = EmissionScores::from_rows(&[
//!     vec![ln(0.9), ln(0.1)],
//!     vec![ln(0.8), ln(0.2)],
//!     vec![ln(0.1), ln(0.9)],
//!     vec![ln(0.1), ln(0.9)],
//! ])
//! .unwrap();
//!
//! let path = viterbi_decode(&emission, &transition, &initial, &DurationFloor::none(2), None)
//!     .unwrap();
//! assert_eq!(path.states(), &[0, 0, 1, 1]);
//! ```

pub mod assemble;
pub mod bank;
pub mod constraint;
pub mod params;
pub mod segmenter;
pub mod targets;
pub mod transition;
pub mod viterbi;

pub use assemble::SegmentAssembler;
pub use bank::{EmissionModelBank, TargetData};
pub use constraint::{
    resolve_constraints, Admissibility, ConstraintMatrix, DurationFloor, MinDuration,
    TimedConstraint,
};
pub use params::{EmissionScores, InitialVector, TransitionMatrix};
pub use segmenter::{TrainingReport, ViterbiHmm, ViterbiHmmConfig};
pub use targets::TargetIndex;
pub use transition::{LabeledSequence, TransitionEstimate, TransitionEstimator};
pub use viterbi::{viterbi_decode, ConstrainedViterbiDecoder, DecodedPath, SubStateTable};
