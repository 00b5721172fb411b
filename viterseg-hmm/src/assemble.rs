//! Conversion between decoded frame paths and labeled time segments.

use viterseg_core::{Annotation, Label, Result, SlidingWindow, VitersegError};

use crate::targets::TargetIndex;
use crate::viterbi::DecodedPath;

/// Turns per-frame state paths into annotations and back.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentAssembler {
    window: SlidingWindow,
}

impl SegmentAssembler {
    /// Assembler for frames laid out on `window`.
    pub fn new(window: SlidingWindow) -> Self {
        Self { window }
    }

    /// Assembler for contiguous frames of `frame_duration` seconds starting
    /// at `start_time`.
    pub fn from_frame_rate(start_time: f64, frame_duration: f64) -> Result<Self> {
        Ok(Self::new(SlidingWindow::contiguous(start_time, frame_duration)?))
    }

    /// The frame layout.
    pub fn window(&self) -> &SlidingWindow {
        &self.window
    }

    /// One segment per maximal run of identical states.
    ///
    /// The segments are contiguous, non-overlapping and cover exactly the
    /// time span of the path's frames.
    ///
    /// # Errors
    ///
    /// Returns an error if the path contains a state outside `targets`.
    pub fn assemble<L: Label>(
        &self,
        path: &DecodedPath,
        targets: &TargetIndex<L>,
    ) -> Result<Annotation<L>> {
        let tracks = path
            .runs()
            .into_iter()
            .map(|(k, t0, n)| {
                let label = targets.label(k).ok_or_else(|| {
                    VitersegError::InvalidInput(format!("state {k} has no target"))
                })?;
                Ok((self.window.frame_range_to_segment(t0, n), label.clone()))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Annotation::from_tracks(tracks))
    }

    /// Per-frame state path of an annotation over `n_frames` frames.
    ///
    /// Later tracks overwrite earlier ones where they overlap.
    ///
    /// # Errors
    ///
    /// Returns an error if a track's label is not a target or if some frame
    /// is covered by no track.
    pub fn resample<L: Label>(
        &self,
        annotation: &Annotation<L>,
        targets: &TargetIndex<L>,
        n_frames: usize,
    ) -> Result<DecodedPath> {
        let mut states: Vec<Option<usize>> = vec![None; n_frames];
        for (segment, label) in annotation.iter() {
            let k = targets.state(label).ok_or_else(|| {
                VitersegError::InvalidInput(format!("label {label:?} is not a target"))
            })?;
            let (t0, n) = self.window.segment_to_frame_range(segment);
            let end = t0.saturating_add(n).min(n_frames);
            for slot in &mut states[t0.min(end)..end] {
                *slot = Some(k);
            }
        }
        let states = states
            .into_iter()
            .enumerate()
            .map(|(t, s)| {
                s.ok_or_else(|| {
                    VitersegError::InvalidInput(format!("frame {t} is not covered by any track"))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(DecodedPath::from_states(states))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use viterseg_core::Segment;

    fn targets() -> TargetIndex<&'static str> {
        TargetIndex::new(vec!["music", "speech"]).unwrap()
    }

    #[test]
    fn runs_become_contiguous_segments() {
        let asm = SegmentAssembler::from_frame_rate(10.0, 0.5).unwrap();
        let path = DecodedPath::from_states(vec![1, 1, 0, 0, 0, 1]);
        let ann = asm.assemble(&path, &targets()).unwrap();
        let tracks: Vec<_> = ann.iter().map(|(s, l)| (*s, *l)).collect();
        assert_eq!(
            tracks,
            vec![
                (Segment::new(10.0, 11.0), "speech"),
                (Segment::new(11.0, 12.5), "music"),
                (Segment::new(12.5, 13.0), "speech"),
            ]
        );
    }

    #[test]
    fn unknown_state_is_an_error() {
        let asm = SegmentAssembler::from_frame_rate(0.0, 1.0).unwrap();
        let path = DecodedPath::from_states(vec![0, 5]);
        assert!(asm.assemble(&path, &targets()).is_err());
    }

    #[test]
    fn resample_requires_full_coverage() {
        let asm = SegmentAssembler::from_frame_rate(0.0, 1.0).unwrap();
        let mut ann = Annotation::new();
        ann.push(Segment::new(0.0, 2.0), "music");
        assert!(asm.resample(&ann, &targets(), 3).is_err());
        ann.push(Segment::new(2.0, 3.0), "speech");
        let path = asm.resample(&ann, &targets(), 3).unwrap();
        assert_eq!(path.states(), &[0, 0, 1]);
    }

    #[test]
    fn empty_path_gives_empty_annotation() {
        let asm = SegmentAssembler::from_frame_rate(0.0, 1.0).unwrap();
        let ann = asm
            .assemble(&DecodedPath::from_states(vec![]), &targets())
            .unwrap();
        assert!(ann.is_empty());
    }
}
