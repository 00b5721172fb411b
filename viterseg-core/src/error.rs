//! Structured error types for the Viterseg ecosystem.

use thiserror::Error;

/// Unified error type for all Viterseg operations.
///
/// Some variants describe conditions that are recovered from locally
/// (degenerate statistics, failed adaptations, constraints naming unknown
/// targets). Those are logged and collected rather than returned, but share
/// this type so callers can inspect them uniformly.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum VitersegError {
    /// Invalid input (bad arguments, mismatched dimensions, out-of-range values)
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A normalization had zero total count; the affected log-probabilities are -inf
    #[error("degenerate training data: {0}")]
    DegenerateTrainingData(String),

    /// Adapting a group model to one target failed
    #[error("adaptation failed for target {target}: {reason}")]
    ModelAdaptation { target: String, reason: String },

    /// Every (sub-)state scores -inf from `frame` onwards
    #[error("no admissible path: all states are excluded at frame {frame}")]
    NoAdmissiblePath { frame: usize },

    /// A constraint or duration entry references a target outside the trained set
    #[error("constraint references unknown target {0}")]
    InvalidConstraintTarget(String),

    /// Non-finite likelihoods or collapsed parameters during model fitting
    #[error("numerical error: {0}")]
    Numerical(String),

    /// Catch-all for other errors
    #[error("{0}")]
    Other(String),
}

/// Convenience alias used throughout the Viterseg ecosystem.
pub type Result<T> = std::result::Result<T, VitersegError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        let err = VitersegError::NoAdmissiblePath { frame: 3 };
        assert_eq!(
            err.to_string(),
            "no admissible path: all states are excluded at frame 3"
        );

        let err = VitersegError::ModelAdaptation {
            target: "\"alice\"".into(),
            reason: "empty data".into(),
        };
        assert_eq!(
            err.to_string(),
            "adaptation failed for target \"alice\": empty data"
        );
    }
}
