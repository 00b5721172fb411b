//! Log-probability value objects: initial vector, transition matrix, and
//! per-frame emission scores.
//!
//! All three are immutable once built. Entries are natural logarithms;
//! `-inf` marks an impossible initial state, transition, or emission.

use viterseg_core::prob::is_log_normalized;
use viterseg_core::{Result, VitersegError};

/// Tolerance when checking that probabilities sum to one.
const NORM_TOL: f64 = 1e-6;

fn check_log_row(row: &[f64], what: &str) -> Result<()> {
    if row.iter().any(|&v| v.is_nan() || v == f64::INFINITY || v > 1e-12) {
        return Err(VitersegError::InvalidInput(format!(
            "{what} must hold log-probabilities (<= 0, not NaN)"
        )));
    }
    let all_impossible = row.iter().all(|&v| v == f64::NEG_INFINITY);
    if !all_impossible && !is_log_normalized(row, NORM_TOL) {
        return Err(VitersegError::InvalidInput(format!(
            "{what} does not sum to 1 in probability space"
        )));
    }
    Ok(())
}

/// Log-probability of starting in each state.
#[derive(Debug, Clone, PartialEq)]
pub struct InitialVector(Vec<f64>);

impl InitialVector {
    /// Wrap log-probabilities.
    ///
    /// An all `-inf` vector is accepted: it is what degenerate training
    /// produces, and decoding with it reports no admissible path.
    ///
    /// # Errors
    ///
    /// Returns an error if the vector is empty, contains NaN or positive
    /// values, or does not sum to one in probability space.
    pub fn from_log_probs(log_probs: Vec<f64>) -> Result<Self> {
        if log_probs.is_empty() {
            return Err(VitersegError::InvalidInput(
                "initial vector is empty".into(),
            ));
        }
        check_log_row(&log_probs, "initial vector")?;
        Ok(Self(log_probs))
    }

    /// Uniform start over `n_states` states.
    pub fn uniform(n_states: usize) -> Self {
        Self(vec![-(n_states as f64).ln(); n_states])
    }

    pub(crate) fn from_raw(log_probs: Vec<f64>) -> Self {
        Self(log_probs)
    }

    /// Number of states.
    pub fn n_states(&self) -> usize {
        self.0.len()
    }

    /// Log-probability of starting in state `k`.
    pub fn get(&self, k: usize) -> f64 {
        self.0[k]
    }

    /// All entries in state order.
    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }
}

/// K × K state transition log-probabilities, row = from, column = to.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionMatrix {
    n_states: usize,
    data: Vec<f64>,
}

impl TransitionMatrix {
    /// Wrap a row-major matrix of log-probabilities.
    ///
    /// Rows that are entirely `-inf` are accepted: such a state can be
    /// occupied but never left (other than by staying, which is also
    /// impossible), so decoding simply never routes through it twice.
    ///
    /// # Errors
    ///
    /// Returns an error if the dimensions do not match or a row is neither
    /// normalized nor entirely `-inf`.
    pub fn from_log_probs(n_states: usize, data: Vec<f64>) -> Result<Self> {
        if n_states == 0 {
            return Err(VitersegError::InvalidInput("n_states must be > 0".into()));
        }
        if data.len() != n_states * n_states {
            return Err(VitersegError::InvalidInput(format!(
                "transition length {} != n_states*n_states {}",
                data.len(),
                n_states * n_states
            )));
        }
        for (i, row) in data.chunks_exact(n_states).enumerate() {
            check_log_row(row, &format!("transition row {i}"))?;
        }
        Ok(Self { n_states, data })
    }

    /// Build from nested rows, mainly for tests and hand-written models.
    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self> {
        let n = rows.len();
        if rows.iter().any(|r| r.len() != n) {
            return Err(VitersegError::InvalidInput(
                "transition matrix must be square".into(),
            ));
        }
        Self::from_log_probs(n, rows.concat())
    }

    pub(crate) fn from_raw(n_states: usize, data: Vec<f64>) -> Self {
        Self { n_states, data }
    }

    /// Number of states.
    pub fn n_states(&self) -> usize {
        self.n_states
    }

    /// Log-probability of moving from state `i` to state `j`.
    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.data[i * self.n_states + j]
    }

    /// Outgoing log-probabilities of state `i`.
    pub fn row(&self, i: usize) -> &[f64] {
        &self.data[i * self.n_states..(i + 1) * self.n_states]
    }
}

/// T × K matrix of per-frame emission log-likelihoods.
#[derive(Debug, Clone, PartialEq)]
pub struct EmissionScores {
    n_frames: usize,
    n_states: usize,
    data: Vec<f64>,
}

impl EmissionScores {
    /// Wrap a row-major T × K matrix.
    ///
    /// # Errors
    ///
    /// Returns an error on a dimension mismatch or if any score is NaN or
    /// `+inf` (`-inf` is allowed and means "cannot emit").
    pub fn new(n_frames: usize, n_states: usize, data: Vec<f64>) -> Result<Self> {
        if n_states == 0 {
            return Err(VitersegError::InvalidInput("n_states must be > 0".into()));
        }
        if data.len() != n_frames * n_states {
            return Err(VitersegError::InvalidInput(format!(
                "emission length {} != n_frames*n_states {}",
                data.len(),
                n_frames * n_states
            )));
        }
        if let Some(pos) = data
            .iter()
            .position(|&v| v.is_nan() || v == f64::INFINITY)
        {
            return Err(VitersegError::InvalidInput(format!(
                "invalid emission score at frame {}, state {}",
                pos / n_states,
                pos % n_states
            )));
        }
        Ok(Self {
            n_frames,
            n_states,
            data,
        })
    }

    /// Build from one score vector per state (each of length T).
    pub fn from_columns(columns: &[Vec<f64>]) -> Result<Self> {
        let n_states = columns.len();
        let n_frames = columns.first().map(|c| c.len()).unwrap_or(0);
        if columns.iter().any(|c| c.len() != n_frames) {
            return Err(VitersegError::InvalidInput(
                "emission columns differ in length".into(),
            ));
        }
        let mut data = Vec::with_capacity(n_frames * n_states);
        for t in 0..n_frames {
            data.extend(columns.iter().map(|c| c[t]));
        }
        Self::new(n_frames, n_states, data)
    }

    /// Build from one score vector per frame (each of length K).
    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self> {
        let n_states = rows.first().map(|r| r.len()).unwrap_or(0);
        if rows.iter().any(|r| r.len() != n_states) {
            return Err(VitersegError::InvalidInput(
                "emission rows differ in length".into(),
            ));
        }
        Self::new(rows.len(), n_states, rows.concat())
    }

    /// Number of frames (T).
    pub fn n_frames(&self) -> usize {
        self.n_frames
    }

    /// Number of states (K).
    pub fn n_states(&self) -> usize {
        self.n_states
    }

    /// Score of state `k` at frame `t`.
    pub fn get(&self, t: usize, k: usize) -> f64 {
        self.data[t * self.n_states + k]
    }

    /// Scores of every state at frame `t`.
    pub fn row(&self, t: usize) -> &[f64] {
        &self.data[t * self.n_states..(t + 1) * self.n_states]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_vector_validation() {
        assert!(InitialVector::from_log_probs(vec![0.6f64.ln(), 0.4f64.ln()]).is_ok());
        assert!(InitialVector::from_log_probs(vec![0.0, f64::NEG_INFINITY]).is_ok());
        assert!(InitialVector::from_log_probs(vec![f64::NEG_INFINITY; 3]).is_ok());
        assert!(InitialVector::from_log_probs(vec![0.5f64.ln(); 3]).is_err());
        assert!(InitialVector::from_log_probs(vec![f64::NAN, 0.0]).is_err());
        assert!(InitialVector::from_log_probs(vec![]).is_err());
    }

    #[test]
    fn uniform_initial() {
        let u = InitialVector::uniform(4);
        assert!(is_log_normalized(u.as_slice(), 1e-12));
    }

    #[test]
    fn transition_validation() {
        let ok = TransitionMatrix::from_rows(&[
            vec![0.9f64.ln(), 0.1f64.ln()],
            vec![f64::NEG_INFINITY, f64::NEG_INFINITY],
        ])
        .unwrap();
        assert_eq!(ok.n_states(), 2);
        assert!((ok.get(0, 1) - 0.1f64.ln()).abs() < 1e-15);
        assert_eq!(ok.row(1), &[f64::NEG_INFINITY, f64::NEG_INFINITY]);

        assert!(TransitionMatrix::from_rows(&[vec![0.0, 0.0], vec![0.0, 0.0]]).is_err());
        assert!(TransitionMatrix::from_rows(&[vec![0.0], vec![0.0]]).is_err());
        assert!(TransitionMatrix::from_log_probs(2, vec![0.0; 3]).is_err());
    }

    #[test]
    fn emission_layouts_agree() {
        let by_rows = EmissionScores::from_rows(&[vec![-1.0, -2.0], vec![-3.0, -4.0]]).unwrap();
        let by_cols = EmissionScores::from_columns(&[vec![-1.0, -3.0], vec![-2.0, -4.0]]).unwrap();
        assert_eq!(by_rows, by_cols);
        assert_eq!(by_rows.get(1, 0), -3.0);
        assert_eq!(by_rows.row(0), &[-1.0, -2.0]);
    }

    #[test]
    fn emission_rejects_nan_and_positive_infinity() {
        assert!(EmissionScores::new(1, 2, vec![f64::NAN, 0.0]).is_err());
        assert!(EmissionScores::new(1, 2, vec![f64::INFINITY, 0.0]).is_err());
        assert!(EmissionScores::new(1, 2, vec![f64::NEG_INFINITY, 0.0]).is_ok());
        assert!(EmissionScores::new(2, 2, vec![0.0; 3]).is_err());
    }
}
