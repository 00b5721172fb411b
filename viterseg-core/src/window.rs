//! Conversion between real time and frame indices.
//!
//! Features are computed on a sliding window: frame `i` starts at
//! `start + i * step` and lasts `duration` seconds. For segmentation each
//! frame is credited with the tile of length `step` centred on its middle,
//! so consecutive tiles are contiguous and every instant belongs to exactly
//! one frame.

use crate::annotation::Segment;
use crate::{Result, VitersegError};

/// A fixed-rate sliding window.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SlidingWindow {
    start: f64,
    duration: f64,
    step: f64,
}

impl SlidingWindow {
    /// Create a sliding window.
    ///
    /// # Errors
    ///
    /// Returns an error if `duration` or `step` is not strictly positive, or
    /// if any argument is not finite.
    pub fn new(start: f64, duration: f64, step: f64) -> Result<Self> {
        if !start.is_finite() || !duration.is_finite() || !step.is_finite() {
            return Err(VitersegError::InvalidInput(
                "sliding window parameters must be finite".into(),
            ));
        }
        if duration <= 0.0 || step <= 0.0 {
            return Err(VitersegError::InvalidInput(format!(
                "sliding window duration ({duration}) and step ({step}) must be > 0"
            )));
        }
        Ok(Self {
            start,
            duration,
            step,
        })
    }

    /// Window whose frames abut exactly: `duration == step`.
    pub fn contiguous(start: f64, frame_duration: f64) -> Result<Self> {
        Self::new(start, frame_duration, frame_duration)
    }

    /// Start time of frame 0.
    pub fn start(&self) -> f64 {
        self.start
    }

    /// Length of each analysis window in seconds.
    pub fn duration(&self) -> f64 {
        self.duration
    }

    /// Time between consecutive frames in seconds.
    pub fn step(&self) -> f64 {
        self.step
    }

    /// Middle time of frame `i`.
    pub fn frame_middle(&self, i: usize) -> f64 {
        self.start + i as f64 * self.step + 0.5 * self.duration
    }

    /// Time span covered by frames `i0 .. i0 + n`.
    pub fn frame_range_to_segment(&self, i0: usize, n: usize) -> Segment {
        let start = self.frame_middle(i0) - 0.5 * self.step;
        Segment::new(start, start + n as f64 * self.step)
    }

    /// Frames `(i0, n)` whose tiles cover `segment`, rounding each bound to
    /// the nearest tile boundary and clipping at frame 0.
    ///
    /// Exact inverse of [`frame_range_to_segment`](Self::frame_range_to_segment).
    pub fn segment_to_frame_range(&self, segment: &Segment) -> (usize, usize) {
        let first = self.tile_boundary(segment.start);
        let last = self.tile_boundary(segment.end);
        (first, last.saturating_sub(first))
    }

    /// Number of frames spanning `seconds`, rounded to the nearest integer.
    pub fn duration_to_frame_count(&self, seconds: f64) -> usize {
        if !(seconds > 0.0) {
            return 0;
        }
        (seconds / self.step).round() as usize
    }

    fn tile_boundary(&self, t: f64) -> usize {
        let offset = (t - self.start - 0.5 * self.duration) / self.step + 0.5;
        offset.round().max(0.0) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mfcc_window() -> SlidingWindow {
        SlidingWindow::new(0.0, 0.025, 0.010).unwrap()
    }

    #[test]
    fn rejects_bad_parameters() {
        assert!(SlidingWindow::new(0.0, 0.0, 0.01).is_err());
        assert!(SlidingWindow::new(0.0, 0.02, -0.01).is_err());
        assert!(SlidingWindow::new(f64::NAN, 0.02, 0.01).is_err());
    }

    #[test]
    fn frame_middle_positions() {
        let w = mfcc_window();
        assert!((w.frame_middle(0) - 0.0125).abs() < 1e-12);
        assert!((w.frame_middle(10) - 0.1125).abs() < 1e-12);
    }

    #[test]
    fn range_segment_round_trip() {
        let w = mfcc_window();
        for &(i0, n) in &[(0, 1), (3, 7), (120, 45), (999, 1)] {
            let seg = w.frame_range_to_segment(i0, n);
            assert!((seg.duration() - n as f64 * 0.01).abs() < 1e-9);
            assert_eq!(w.segment_to_frame_range(&seg), (i0, n));
        }
    }

    #[test]
    fn consecutive_ranges_are_contiguous() {
        let w = mfcc_window();
        let a = w.frame_range_to_segment(0, 5);
        let b = w.frame_range_to_segment(5, 3);
        assert!((a.end - b.start).abs() < 1e-12);
    }

    #[test]
    fn segment_before_origin_is_clipped() {
        let w = SlidingWindow::contiguous(1.0, 0.5).unwrap();
        let (i0, n) = w.segment_to_frame_range(&Segment::new(0.0, 2.0));
        assert_eq!(i0, 0);
        assert_eq!(n, 2);
    }

    #[test]
    fn duration_to_frames() {
        let w = mfcc_window();
        assert_eq!(w.duration_to_frame_count(1.0), 100);
        assert_eq!(w.duration_to_frame_count(0.014), 1);
        assert_eq!(w.duration_to_frame_count(0.0), 0);
        assert_eq!(w.duration_to_frame_count(-3.0), 0);
    }
}
