//! Decode-time constraints: per-frame admissibility and per-state duration
//! floors, plus their resolution from time-domain descriptions.

use std::collections::HashMap;

use viterseg_core::{Label, Result, Segment, SlidingWindow, VitersegError};

use crate::targets::TargetIndex;

/// Tri-state admissibility flag of one state at one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Admissibility {
    #[default]
    Unconstrained,
    /// The state may not be occupied at this frame.
    Forbidden,
    /// No other state may be occupied at this frame.
    Mandatory,
}

/// Integer codes: 0 unconstrained, 1 forbidden, 2 mandatory.
impl TryFrom<u8> for Admissibility {
    type Error = VitersegError;

    fn try_from(code: u8) -> Result<Self> {
        match code {
            0 => Ok(Self::Unconstrained),
            1 => Ok(Self::Forbidden),
            2 => Ok(Self::Mandatory),
            other => Err(VitersegError::InvalidInput(format!(
                "admissibility code {other} (expected 0, 1 or 2)"
            ))),
        }
    }
}

/// T × K admissibility flags.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstraintMatrix {
    n_frames: usize,
    n_states: usize,
    flags: Vec<Admissibility>,
}

impl ConstraintMatrix {
    /// All-unconstrained matrix.
    pub fn new(n_frames: usize, n_states: usize) -> Self {
        Self {
            n_frames,
            n_states,
            flags: vec![Admissibility::Unconstrained; n_frames * n_states],
        }
    }

    /// Build from integer codes, one row of `n_states` per frame.
    pub fn from_codes(rows: &[Vec<u8>]) -> Result<Self> {
        let n_states = rows.first().map(|r| r.len()).unwrap_or(0);
        let mut m = Self::new(rows.len(), n_states);
        for (t, row) in rows.iter().enumerate() {
            if row.len() != n_states {
                return Err(VitersegError::InvalidInput(format!(
                    "constraint row {t} has {} entries, expected {n_states}",
                    row.len()
                )));
            }
            for (k, &code) in row.iter().enumerate() {
                m.set(t, k, Admissibility::try_from(code)?);
            }
        }
        Ok(m)
    }

    /// Number of frames.
    pub fn n_frames(&self) -> usize {
        self.n_frames
    }

    /// Number of states.
    pub fn n_states(&self) -> usize {
        self.n_states
    }

    /// Flag of state `k` at frame `t`.
    pub fn get(&self, t: usize, k: usize) -> Admissibility {
        self.flags[t * self.n_states + k]
    }

    /// Set the flag of state `k` at frame `t`.
    pub fn set(&mut self, t: usize, k: usize, value: Admissibility) {
        self.flags[t * self.n_states + k] = value;
    }

    /// Set state `k` on frames `t0 .. t0 + n`, clipped to the matrix.
    pub fn set_range(&mut self, t0: usize, n: usize, k: usize, value: Admissibility) {
        let end = t0.saturating_add(n).min(self.n_frames);
        for t in t0.min(end)..end {
            self.set(t, k, value);
        }
    }

    /// Whether state `k` may be occupied at frame `t`.
    ///
    /// False if `k` is forbidden there, or if any other state is mandatory.
    pub fn admits(&self, t: usize, k: usize) -> bool {
        let row = &self.flags[t * self.n_states..(t + 1) * self.n_states];
        if row[k] == Admissibility::Forbidden {
            return false;
        }
        row.iter()
            .enumerate()
            .all(|(j, &a)| j == k || a != Admissibility::Mandatory)
    }

    /// Fill `out` with [`admits`](Self::admits) for every state of frame `t`,
    /// scanning the row once.
    pub fn admitted(&self, t: usize, out: &mut [bool]) {
        let row = &self.flags[t * self.n_states..(t + 1) * self.n_states];
        let mut required = row
            .iter()
            .enumerate()
            .filter(|&(_, &a)| a == Admissibility::Mandatory)
            .map(|(k, _)| k);
        let first = required.next();
        let conflict = required.next().is_some();
        for (k, (ok, &a)) in out.iter_mut().zip(row).enumerate() {
            *ok = !conflict && a != Admissibility::Forbidden && first.map_or(true, |m| m == k);
        }
    }
}

/// Minimum run length, in frames, of every state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DurationFloor(Vec<usize>);

impl DurationFloor {
    /// No constraint: every floor is one frame.
    pub fn none(n_states: usize) -> Self {
        Self(vec![1; n_states])
    }

    /// Same floor for every state.
    pub fn uniform(n_states: usize, frames: usize) -> Result<Self> {
        Self::new(vec![frames; n_states])
    }

    /// Explicit per-state floors.
    ///
    /// # Errors
    ///
    /// Returns an error if the vector is empty or any floor is zero.
    pub fn new(floors: Vec<usize>) -> Result<Self> {
        if floors.is_empty() {
            return Err(VitersegError::InvalidInput("no duration floors".into()));
        }
        if floors.contains(&0) {
            return Err(VitersegError::InvalidInput(
                "duration floors must be >= 1".into(),
            ));
        }
        Ok(Self(floors))
    }

    /// Number of states.
    pub fn n_states(&self) -> usize {
        self.0.len()
    }

    /// Floor of state `k`.
    pub fn get(&self, k: usize) -> usize {
        self.0[k]
    }

    /// All floors in state order.
    pub fn as_slice(&self) -> &[usize] {
        &self.0
    }
}

/// Minimum duration expressed in seconds.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MinDuration<L: Label> {
    #[default]
    None,
    /// The same minimum for every target.
    Uniform(f64),
    /// Per-target minimum; targets not listed are unconstrained.
    PerTarget(HashMap<L, f64>),
}

impl<L: Label> MinDuration<L> {
    /// Convert to frame floors at the window's frame rate.
    ///
    /// Durations shorter than one frame resolve to a floor of one. Negative
    /// or non-finite durations, and entries naming unknown targets, are
    /// dropped with a warning and returned.
    pub fn resolve(
        &self,
        targets: &TargetIndex<L>,
        window: &SlidingWindow,
    ) -> (DurationFloor, Vec<VitersegError>) {
        let mut floors = vec![1; targets.len()];
        let mut dropped = Vec::new();
        match self {
            MinDuration::None => {}
            MinDuration::Uniform(secs) => match floor_frames(*secs, window) {
                Ok(frames) => floors.iter_mut().for_each(|f| *f = frames),
                Err(err) => dropped.push(err),
            },
            MinDuration::PerTarget(map) => {
                for (label, secs) in map {
                    let Some(k) = targets.state(label) else {
                        let err = VitersegError::InvalidConstraintTarget(format!("{label:?}"));
                        tracing::warn!("{err}; minimum duration dropped");
                        dropped.push(err);
                        continue;
                    };
                    match floor_frames(*secs, window) {
                        Ok(frames) => floors[k] = frames,
                        Err(err) => dropped.push(err),
                    }
                }
            }
        }
        (DurationFloor(floors), dropped)
    }
}

/// Floor in frames of a minimum duration in seconds.
fn floor_frames(secs: f64, window: &SlidingWindow) -> Result<usize> {
    if !secs.is_finite() || secs < 0.0 {
        let err = VitersegError::InvalidInput(format!("minimum duration of {secs} s"));
        tracing::warn!("{err}; minimum duration dropped");
        return Err(err);
    }
    Ok(window.duration_to_frame_count(secs).max(1))
}

/// Admissibility of one target over a span of time.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TimedConstraint<L> {
    pub segment: Segment,
    pub label: L,
    pub value: Admissibility,
}

impl<L> TimedConstraint<L> {
    pub fn forbid(segment: Segment, label: L) -> Self {
        Self {
            segment,
            label,
            value: Admissibility::Forbidden,
        }
    }

    pub fn require(segment: Segment, label: L) -> Self {
        Self {
            segment,
            label,
            value: Admissibility::Mandatory,
        }
    }
}

/// Rasterize timed constraints into a `n_frames` × K matrix.
///
/// Later entries overwrite earlier ones on the frames they share. Entries
/// naming unknown targets are dropped with a warning and returned.
pub fn resolve_constraints<L: Label>(
    constraints: &[TimedConstraint<L>],
    targets: &TargetIndex<L>,
    window: &SlidingWindow,
    n_frames: usize,
) -> (ConstraintMatrix, Vec<VitersegError>) {
    let mut matrix = ConstraintMatrix::new(n_frames, targets.len());
    let mut dropped = Vec::new();
    for c in constraints {
        let Some(k) = targets.state(&c.label) else {
            let err = VitersegError::InvalidConstraintTarget(format!("{:?}", c.label));
            tracing::warn!("{err}; constraint dropped");
            dropped.push(err);
            continue;
        };
        let (t0, n) = window.segment_to_frame_range(&c.segment);
        matrix.set_range(t0, n, k, c.value);
    }
    (matrix, dropped)
}
