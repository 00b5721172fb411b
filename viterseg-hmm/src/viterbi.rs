//! Viterbi decoding with per-state duration floors and per-frame
//! admissibility constraints.
//!
//! A state `k` with floor `d > 1` is expanded into `d` ordered sub-states
//! counting the frames spent in `k` so far (the last one meaning "at least
//! `d`"). A run always enters at the first sub-state and must advance one
//! sub-state per frame until saturation; only the saturated sub-state may
//! self-loop or leave, using the ordinary transition matrix. States with a
//! floor of one are plain HMM states.
//!
//! All scores are natural-log probabilities. Ties are broken toward the
//! lowest predecessor sub-state index, and the final state is the lowest
//! sub-state index among the maxima, so decoding is deterministic.

use std::ops::Range;

use viterseg_core::{Result, Summarizable, VitersegError};

use crate::constraint::{ConstraintMatrix, DurationFloor};
use crate::params::{EmissionScores, InitialVector, TransitionMatrix};

// ---------------------------------------------------------------------------
// Sub-state table
// ---------------------------------------------------------------------------

/// Explicit index table of the duration-expanded state space.
///
/// Sub-states of state `k` are the contiguous range
/// `entry(k) ..= saturated(k)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubStateTable {
    parent: Vec<usize>,
    offset: Vec<usize>,
    floor: Vec<usize>,
}

impl SubStateTable {
    /// Expand every state into `floor[k]` sub-states for a sequence of
    /// `n_frames` frames.
    ///
    /// Floors above `n_frames + 1` are capped there: such a run can never
    /// saturate within the sequence, whatever the exact floor.
    ///
    /// # Errors
    ///
    /// Returns an error if the expanded state space does not fit in `usize`.
    pub fn new(floor: &DurationFloor, n_frames: usize) -> Result<Self> {
        let cap = n_frames.saturating_add(1);
        let floors: Vec<usize> = floor.as_slice().iter().map(|&d| d.min(cap)).collect();
        let total = floors
            .iter()
            .try_fold(0usize, |acc, &d| acc.checked_add(d))
            .ok_or_else(|| {
                VitersegError::InvalidInput("duration-expanded state space overflows".into())
            })?;
        let mut offset = Vec::with_capacity(floors.len());
        let mut parent = Vec::with_capacity(total);
        for (k, &d) in floors.iter().enumerate() {
            offset.push(parent.len());
            parent.extend(std::iter::repeat(k).take(d));
        }
        Ok(Self {
            parent,
            offset,
            floor: floors,
        })
    }

    /// Total number of sub-states.
    pub fn len(&self) -> usize {
        self.parent.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.parent.is_empty()
    }

    /// Number of original states.
    pub fn n_states(&self) -> usize {
        self.floor.len()
    }

    /// Duration floor of state `k`.
    pub fn floor(&self, k: usize) -> usize {
        self.floor[k]
    }

    /// Sub-state ids of state `k`.
    pub fn sub_states(&self, k: usize) -> Range<usize> {
        self.offset[k]..self.offset[k] + self.floor[k]
    }

    /// First sub-state of `k`: one frame spent so far.
    pub fn entry(&self, k: usize) -> usize {
        self.offset[k]
    }

    /// Last sub-state of `k`: the floor has been reached.
    pub fn saturated(&self, k: usize) -> usize {
        self.offset[k] + self.floor[k] - 1
    }

    /// Whether sub-state `s` is the saturated sub-state of its parent.
    pub fn is_saturated(&self, s: usize) -> bool {
        s == self.saturated(self.parent[s])
    }

    /// State owning sub-state `s`.
    pub fn parent(&self, s: usize) -> usize {
        self.parent[s]
    }
}

// ---------------------------------------------------------------------------
// Decoded path
// ---------------------------------------------------------------------------

/// One state index per frame, plus the log-probability of that path when it
/// comes from the decoder.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedPath {
    states: Vec<usize>,
    log_prob: Option<f64>,
}

impl DecodedPath {
    /// A path that was not produced by decoding (e.g. resampled from an
    /// annotation) and therefore carries no score.
    pub fn from_states(states: Vec<usize>) -> Self {
        Self {
            states,
            log_prob: None,
        }
    }

    /// State of every frame.
    pub fn states(&self) -> &[usize] {
        &self.states
    }

    /// Consume the path, returning the state sequence.
    pub fn into_states(self) -> Vec<usize> {
        self.states
    }

    /// Log-probability of the path, if decoded.
    pub fn log_prob(&self) -> Option<f64> {
        self.log_prob
    }

    /// Number of frames.
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Whether the path has no frames.
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Maximal runs of identical states as `(state, first_frame, n_frames)`.
    pub fn runs(&self) -> Vec<(usize, usize, usize)> {
        let mut runs: Vec<(usize, usize, usize)> = Vec::new();
        for (t, &s) in self.states.iter().enumerate() {
            match runs.last_mut() {
                Some((state, _, n)) if *state == s => *n += 1,
                _ => runs.push((s, t, 1)),
            }
        }
        runs
    }
}

impl Summarizable for DecodedPath {
    fn summary(&self) -> String {
        match self.log_prob {
            Some(lp) => format!(
                "DecodedPath: {} frames, {} runs, log-prob {:.4}",
                self.len(),
                self.runs().len(),
                lp
            ),
            None => format!(
                "DecodedPath: {} frames, {} runs",
                self.len(),
                self.runs().len()
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// Decoder
// ---------------------------------------------------------------------------

/// Viterbi decoder over a fixed model, reusable across sequences.
#[derive(Debug, Clone)]
pub struct ConstrainedViterbiDecoder<'a> {
    transition: &'a TransitionMatrix,
    initial: &'a InitialVector,
    floor: DurationFloor,
    truncate_final_run: bool,
}

impl<'a> ConstrainedViterbiDecoder<'a> {
    /// Build the decoder. The sub-state table is laid out per sequence, once
    /// its length is known.
    ///
    /// # Errors
    ///
    /// Returns an error if the three inputs disagree on the number of states.
    pub fn new(
        transition: &'a TransitionMatrix,
        initial: &'a InitialVector,
        floor: &DurationFloor,
    ) -> Result<Self> {
        let k = transition.n_states();
        if initial.n_states() != k || floor.n_states() != k {
            return Err(VitersegError::InvalidInput(format!(
                "state count mismatch: transition {k}, initial {}, floor {}",
                initial.n_states(),
                floor.n_states()
            )));
        }
        Ok(Self {
            transition,
            initial,
            floor: floor.clone(),
            truncate_final_run: true,
        })
    }

    /// Whether the last run may be shorter than its floor.
    ///
    /// Defaults to `true`: the sequence end cuts the run short. With `false`
    /// the path must end in a saturated sub-state.
    pub fn with_truncated_final_run(mut self, allowed: bool) -> Self {
        self.truncate_final_run = allowed;
        self
    }

    /// Duration floors, before capping to a sequence length.
    pub fn floor(&self) -> &DurationFloor {
        &self.floor
    }

    /// The expanded state space used for a sequence of `n_frames` frames.
    pub fn table(&self, n_frames: usize) -> Result<SubStateTable> {
        SubStateTable::new(&self.floor, n_frames)
    }

    /// Most likely state path for `emission` under `constraints`.
    ///
    /// # Errors
    ///
    /// Returns [`VitersegError::NoAdmissiblePath`] with the first frame at
    /// which every sub-state scores `-inf`, and `InvalidInput` on dimension
    /// mismatches or an empty sequence.
    pub fn decode(
        &self,
        emission: &EmissionScores,
        constraints: Option<&ConstraintMatrix>,
    ) -> Result<DecodedPath> {
        let n_states = self.floor.n_states();
        let n_frames = emission.n_frames();
        if emission.n_states() != n_states {
            return Err(VitersegError::InvalidInput(format!(
                "emission has {} states, model has {n_states}",
                emission.n_states()
            )));
        }
        if n_frames == 0 {
            return Err(VitersegError::InvalidInput("no frames to decode".into()));
        }
        if let Some(c) = constraints {
            if c.n_frames() != n_frames || c.n_states() != n_states {
                return Err(VitersegError::InvalidInput(format!(
                    "constraints are {}x{}, emission is {n_frames}x{n_states}",
                    c.n_frames(),
                    c.n_states()
                )));
            }
        }

        let table = self.table(n_frames)?;
        let n_sub = table.len();
        let psi_len = n_frames.checked_mul(n_sub).ok_or_else(|| {
            VitersegError::InvalidInput(format!(
                "{n_frames} frames x {n_sub} sub-states overflows the backpointer table"
            ))
        })?;
        let mut obs = vec![f64::NEG_INFINITY; n_states];
        let mut admitted = vec![true; n_states];
        let mut delta = vec![f64::NEG_INFINITY; n_sub];
        let mut next = vec![f64::NEG_INFINITY; n_sub];
        let mut psi = vec![0usize; psi_len];

        // Initialization: a run can only start at its entry sub-state.
        observe(emission, constraints, 0, &mut admitted, &mut obs);
        for k in 0..n_states {
            delta[table.entry(k)] = self.initial.get(k) + obs[k];
        }
        if delta.iter().all(|&v| v == f64::NEG_INFINITY) {
            return Err(VitersegError::NoAdmissiblePath { frame: 0 });
        }

        // Induction
        for t in 1..n_frames {
            observe(emission, constraints, t, &mut admitted, &mut obs);
            let psi_t = &mut psi[t * n_sub..(t + 1) * n_sub];

            for k in 0..n_states {
                let d = table.floor(k);
                let entry = table.entry(k);

                // Entering k: from any saturated state j != k, or a plain
                // self-loop when k has no floor.
                let mut best = f64::NEG_INFINITY;
                let mut arg = entry;
                for j in 0..n_states {
                    if j == k && d > 1 {
                        continue;
                    }
                    let from = table.saturated(j);
                    let v = delta[from] + self.transition.get(j, k);
                    if v > best {
                        best = v;
                        arg = from;
                    }
                }
                next[entry] = best + obs[k];
                psi_t[entry] = arg;

                // Forced advance through the floor; the saturated sub-state
                // may also self-loop.
                for s in entry + 1..entry + d {
                    let mut best = delta[s - 1];
                    let mut arg = s - 1;
                    if s == entry + d - 1 {
                        let stay = delta[s] + self.transition.get(k, k);
                        if stay > best {
                            best = stay;
                            arg = s;
                        }
                    }
                    next[s] = best + obs[k];
                    psi_t[s] = arg;
                }
            }

            if next.iter().all(|&v| v == f64::NEG_INFINITY) {
                return Err(VitersegError::NoAdmissiblePath { frame: t });
            }
            std::mem::swap(&mut delta, &mut next);
        }

        // Termination
        let mut best = f64::NEG_INFINITY;
        let mut last = 0;
        for (s, &v) in delta.iter().enumerate() {
            if !self.truncate_final_run && !table.is_saturated(s) {
                continue;
            }
            if v > best {
                best = v;
                last = s;
            }
        }
        if best == f64::NEG_INFINITY {
            return Err(VitersegError::NoAdmissiblePath {
                frame: n_frames - 1,
            });
        }

        // Backtrace
        let mut sub = vec![0usize; n_frames];
        sub[n_frames - 1] = last;
        for t in (1..n_frames).rev() {
            sub[t - 1] = psi[t * n_sub + sub[t]];
        }

        Ok(DecodedPath {
            states: sub.into_iter().map(|s| table.parent(s)).collect(),
            log_prob: Some(best),
        })
    }

    /// Decode independent sequences, in parallel with the `parallel`
    /// feature. Results are in input order.
    pub fn decode_many(
        &self,
        inputs: &[(&EmissionScores, Option<&ConstraintMatrix>)],
    ) -> Vec<Result<DecodedPath>> {
        #[cfg(feature = "parallel")]
        {
            use rayon::prelude::*;
            inputs
                .par_iter()
                .map(|(emission, constraints)| self.decode(emission, *constraints))
                .collect()
        }
        #[cfg(not(feature = "parallel"))]
        inputs
            .iter()
            .map(|(emission, constraints)| self.decode(emission, *constraints))
            .collect()
    }
}

/// One-shot decoding: build a decoder and run it on a single sequence.
pub fn viterbi_decode(
    emission: &EmissionScores,
    transition: &TransitionMatrix,
    initial: &InitialVector,
    floor: &DurationFloor,
    constraints: Option<&ConstraintMatrix>,
) -> Result<DecodedPath> {
    ConstrainedViterbiDecoder::new(transition, initial, floor)?.decode(emission, constraints)
}

/// Emission scores of frame `t` with inadmissible states set to `-inf`.
fn observe(
    emission: &EmissionScores,
    constraints: Option<&ConstraintMatrix>,
    t: usize,
    admitted: &mut [bool],
    out: &mut [f64],
) {
    match constraints {
        Some(c) => c.admitted(t, admitted),
        None => admitted.fill(true),
    }
    for (k, o) in out.iter_mut().enumerate() {
        *o = if admitted[k] {
            emission.get(t, k)
        } else {
            f64::NEG_INFINITY
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraint::Admissibility;

    fn ln(p: f64) -> f64 {
        p.ln()
    }

    fn toy() -> (InitialVector, TransitionMatrix, EmissionScores) {
        let initial = InitialVector::from_log_probs(vec![ln(0.6), ln(0.4)]).unwrap();
        let transition = TransitionMatrix::from_rows(&[
            vec![ln(0.9), ln(0.1)],
            vec![ln(0.2), ln(0.8)],
        ])
        .unwrap();
        let emission = EmissionScores::from_rows(&[
            vec![ln(0.9), ln(0.1)],
            vec![ln(0.8), ln(0.2)],
            vec![ln(0.1), ln(0.9)],
            vec![ln(0.1), ln(0.9)],
        ])
        .unwrap();
        (initial, transition, emission)
    }

    #[test]
    fn sub_state_table_layout() {
        let table = SubStateTable::new(&DurationFloor::new(vec![1, 3, 2]).unwrap(), 10).unwrap();
        assert_eq!(table.len(), 6);
        assert_eq!(table.sub_states(1), 1..4);
        assert_eq!(table.entry(2), 4);
        assert_eq!(table.saturated(2), 5);
        assert_eq!(table.parent(3), 1);
        assert!(table.is_saturated(0));
        assert!(!table.is_saturated(1));
        assert!(table.is_saturated(3));
    }

    #[test]
    fn unconstrained_toy_hmm() {
        let (initial, transition, emission) = toy();
        let path = viterbi_decode(
            &emission,
            &transition,
            &initial,
            &DurationFloor::none(2),
            None,
        )
        .unwrap();
        assert_eq!(path.states(), &[0, 0, 1, 1]);
        // 0.6*0.9 * 0.9*0.8 * 0.1*0.9 * 0.8*0.9
        let expected = 0.02519424f64.ln();
        assert!((path.log_prob().unwrap() - expected).abs() < 1e-12);
    }

    #[test]
    fn duration_floor_with_and_without_final_truncation() {
        let (initial, transition, emission) = toy();
        let floor = DurationFloor::new(vec![1, 3]).unwrap();
        let decoder = ConstrainedViterbiDecoder::new(&transition, &initial, &floor).unwrap();

        let path = decoder.decode(&emission, None).unwrap();
        assert_eq!(path.states(), &[0, 0, 1, 1]);

        let strict = decoder.clone().with_truncated_final_run(false);
        let path = strict.decode(&emission, None).unwrap();
        assert_eq!(path.states(), &[0, 1, 1, 1]);
    }

    #[test]
    fn long_floor_holds_the_first_state() {
        let (initial, transition, emission) = toy();
        let floor = DurationFloor::new(vec![4, 1]).unwrap();
        let path = viterbi_decode(&emission, &transition, &initial, &floor, None).unwrap();
        assert_eq!(path.states(), &[0, 0, 0, 0]);
    }

    #[test]
    fn floors_are_capped_to_the_sequence() {
        let floor = DurationFloor::new(vec![usize::MAX, 2, usize::MAX]).unwrap();
        let table = SubStateTable::new(&floor, 5).unwrap();
        assert_eq!(table.floor(0), 6);
        assert_eq!(table.floor(1), 2);
        assert_eq!(table.len(), 14);

        let table = SubStateTable::new(&floor, usize::MAX).unwrap_err();
        assert!(matches!(table, VitersegError::InvalidInput(_)));
    }

    #[test]
    fn floors_beyond_the_sequence_force_a_single_run() {
        let (initial, transition, emission) = toy();
        let huge = DurationFloor::uniform(2, usize::MAX).unwrap();
        let exact = DurationFloor::uniform(2, 4).unwrap();

        let path = viterbi_decode(&emission, &transition, &initial, &huge, None).unwrap();
        // 0.4*0.1 * 0.2 * 0.9 * 0.9 beats 0.6*0.9 * 0.8 * 0.1 * 0.1
        assert_eq!(path.states(), &[1, 1, 1, 1]);
        let reference = viterbi_decode(&emission, &transition, &initial, &exact, None).unwrap();
        assert_eq!(path, reference);

        let strict = ConstrainedViterbiDecoder::new(&transition, &initial, &huge)
            .unwrap()
            .with_truncated_final_run(false);
        assert_eq!(
            strict.decode(&emission, None).unwrap_err(),
            VitersegError::NoAdmissiblePath { frame: 3 }
        );
    }

    #[test]
    fn mandatory_and_forbidden_override_emissions() {
        let (initial, transition, emission) = toy();
        let mut c = ConstraintMatrix::new(4, 2);
        c.set(1, 1, Admissibility::Mandatory);
        c.set(3, 1, Admissibility::Forbidden);
        let path = viterbi_decode(
            &emission,
            &transition,
            &initial,
            &DurationFloor::none(2),
            Some(&c),
        )
        .unwrap();
        assert_eq!(path.states()[1], 1);
        assert_eq!(path.states()[3], 0);
    }

    #[test]
    fn single_forbidden_frame_has_no_path() {
        let initial = InitialVector::from_log_probs(vec![0.0]).unwrap();
        let transition = TransitionMatrix::from_rows(&[vec![0.0]]).unwrap();
        let emission = EmissionScores::from_rows(&[vec![-1.0]]).unwrap();
        let c = ConstraintMatrix::from_codes(&[vec![1]]).unwrap();
        let err = viterbi_decode(
            &emission,
            &transition,
            &initial,
            &DurationFloor::none(1),
            Some(&c),
        )
        .unwrap_err();
        assert_eq!(err, VitersegError::NoAdmissiblePath { frame: 0 });
    }

    #[test]
    fn conflicting_mandatory_states_have_no_path() {
        let (initial, transition, emission) = toy();
        let mut c = ConstraintMatrix::new(4, 2);
        c.set(2, 0, Admissibility::Mandatory);
        c.set(2, 1, Admissibility::Mandatory);
        let err = viterbi_decode(
            &emission,
            &transition,
            &initial,
            &DurationFloor::none(2),
            Some(&c),
        )
        .unwrap_err();
        assert_eq!(err, VitersegError::NoAdmissiblePath { frame: 2 });
    }

    #[test]
    fn dead_end_state_is_never_revisited() {
        let initial = InitialVector::from_log_probs(vec![ln(0.5), ln(0.5)]).unwrap();
        let transition = TransitionMatrix::from_rows(&[
            vec![ln(0.5), ln(0.5)],
            vec![f64::NEG_INFINITY, f64::NEG_INFINITY],
        ])
        .unwrap();
        let emission =
            EmissionScores::from_rows(&[vec![-5.0, -0.1], vec![-1.0, -2.0], vec![-1.0, -2.0]])
                .unwrap();
        let path = viterbi_decode(
            &emission,
            &transition,
            &initial,
            &DurationFloor::none(2),
            None,
        )
        .unwrap();
        assert_eq!(path.states(), &[0, 0, 0]);
    }

    #[test]
    fn dimension_mismatches_are_rejected() {
        let (initial, transition, emission) = toy();
        assert!(
            ConstrainedViterbiDecoder::new(&transition, &initial, &DurationFloor::none(3))
                .is_err()
        );
        let decoder =
            ConstrainedViterbiDecoder::new(&transition, &initial, &DurationFloor::none(2)).unwrap();
        assert!(decoder
            .decode(&emission, Some(&ConstraintMatrix::new(3, 2)))
            .is_err());
        let empty = EmissionScores::new(0, 2, vec![]).unwrap();
        assert!(decoder.decode(&empty, None).is_err());
    }

    #[test]
    fn decode_many_keeps_order() {
        let (initial, transition, emission) = toy();
        let decoder =
            ConstrainedViterbiDecoder::new(&transition, &initial, &DurationFloor::none(2)).unwrap();
        let mut c = ConstraintMatrix::new(4, 2);
        c.set_range(0, 4, 1, Admissibility::Mandatory);
        let results = decoder.decode_many(&[(&emission, None), (&emission, Some(&c))]);
        assert_eq!(results[0].as_ref().unwrap().states(), &[0, 0, 1, 1]);
        assert_eq!(results[1].as_ref().unwrap().states(), &[1, 1, 1, 1]);
    }

    #[test]
    fn runs_of_a_path() {
        let path = DecodedPath::from_states(vec![2, 2, 0, 1, 1, 1]);
        assert_eq!(path.runs(), vec![(2, 0, 2), (0, 2, 1), (1, 3, 3)]);
        assert_eq!(path.log_prob(), None);
        assert_eq!(path.summary(), "DecodedPath: 6 frames, 3 runs");
    }
}
