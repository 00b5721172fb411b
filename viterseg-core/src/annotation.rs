//! Time segments and labeled annotations.
//!
//! [`Segment`] is a half-open time span in seconds. [`Annotation`] is an
//! ordered collection of `(segment, label)` tracks: the training input of the
//! segmentation pipeline and the form its output is returned in.

use std::collections::BTreeSet;

use crate::{Label, Summarizable};

/// A time span `[start, end)` in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Segment {
    pub start: f64,
    pub end: f64,
}

impl Segment {
    /// Create a segment. Bounds are taken as given; see [`Segment::is_empty`].
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    /// Length of the span in seconds (never negative).
    pub fn duration(&self) -> f64 {
        (self.end - self.start).max(0.0)
    }

    /// Whether the span covers no time at all.
    pub fn is_empty(&self) -> bool {
        !(self.end > self.start)
    }

    /// Whether two spans share some time.
    pub fn overlaps(&self, other: &Segment) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Whether time `t` falls inside the span.
    pub fn contains(&self, t: f64) -> bool {
        self.start <= t && t < self.end
    }
}

/// An ordered collection of labeled segments.
///
/// Tracks are kept sorted by segment start (ties keep insertion order).
/// Nothing prevents overlapping tracks; the segmentation output never
/// produces them.
#[derive(Debug, Clone, PartialEq)]
pub struct Annotation<L> {
    tracks: Vec<(Segment, L)>,
}

impl<L> Default for Annotation<L> {
    fn default() -> Self {
        Self { tracks: Vec::new() }
    }
}

impl<L: Label> Annotation<L> {
    /// Create an empty annotation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an annotation from existing tracks.
    pub fn from_tracks(mut tracks: Vec<(Segment, L)>) -> Self {
        tracks.sort_by(|a, b| a.0.start.total_cmp(&b.0.start));
        Self { tracks }
    }

    /// Add a track at its chronological position.
    pub fn push(&mut self, segment: Segment, label: L) {
        let at = self
            .tracks
            .partition_point(|(s, _)| s.start <= segment.start);
        self.tracks.insert(at, (segment, label));
    }

    /// Number of tracks.
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    /// Whether the annotation has no tracks.
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Iterate over tracks in chronological order.
    pub fn iter(&self) -> impl Iterator<Item = (&Segment, &L)> {
        self.tracks.iter().map(|(s, l)| (s, l))
    }

    /// Distinct labels, sorted.
    pub fn labels(&self) -> Vec<L> {
        self.tracks
            .iter()
            .map(|(_, l)| l.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Segments carrying `label`, in chronological order.
    pub fn label_coverage(&self, label: &L) -> Vec<Segment> {
        self.tracks
            .iter()
            .filter(|(_, l)| l == label)
            .map(|(s, _)| *s)
            .collect()
    }

    /// Keep only the tracks whose label satisfies `keep`.
    pub fn subset<F>(&self, keep: F) -> Self
    where
        F: Fn(&L) -> bool,
    {
        Self {
            tracks: self
                .tracks
                .iter()
                .filter(|(_, l)| keep(l))
                .cloned()
                .collect(),
        }
    }

    /// Smallest segment covering every track, or `None` when empty.
    pub fn extent(&self) -> Option<Segment> {
        let start = self.tracks.first()?.0.start;
        let end = self
            .tracks
            .iter()
            .map(|(s, _)| s.end)
            .fold(f64::NEG_INFINITY, f64::max);
        Some(Segment::new(start, end))
    }
}

impl<L: Label> Summarizable for Annotation<L> {
    fn summary(&self) -> String {
        let span = self.extent().map(|s| s.duration()).unwrap_or(0.0);
        format!(
            "Annotation: {} tracks, {} labels, {:.3}s",
            self.len(),
            self.labels().len(),
            span
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Annotation<&'static str> {
        let mut a = Annotation::new();
        a.push(Segment::new(2.0, 3.0), "bob");
        a.push(Segment::new(0.0, 2.0), "alice");
        a.push(Segment::new(3.0, 5.0), "alice");
        a
    }

    #[test]
    fn segment_basics() {
        let s = Segment::new(1.0, 2.5);
        assert!((s.duration() - 1.5).abs() < 1e-12);
        assert!(!s.is_empty());
        assert!(s.contains(1.0));
        assert!(!s.contains(2.5));
        assert!(Segment::new(2.0, 2.0).is_empty());
        assert!(s.overlaps(&Segment::new(2.0, 3.0)));
        assert!(!s.overlaps(&Segment::new(2.5, 3.0)));
    }

    #[test]
    fn push_keeps_chronological_order() {
        let a = sample();
        let starts: Vec<f64> = a.iter().map(|(s, _)| s.start).collect();
        assert_eq!(starts, vec![0.0, 2.0, 3.0]);
    }

    #[test]
    fn labels_and_coverage() {
        let a = sample();
        assert_eq!(a.labels(), vec!["alice", "bob"]);
        let cov = a.label_coverage(&"alice");
        assert_eq!(cov, vec![Segment::new(0.0, 2.0), Segment::new(3.0, 5.0)]);
        assert!(a.label_coverage(&"carol").is_empty());
    }

    #[test]
    fn subset_and_extent() {
        let a = sample();
        let bob = a.subset(|l| *l == "bob");
        assert_eq!(bob.len(), 1);
        assert_eq!(a.extent(), Some(Segment::new(0.0, 5.0)));
        assert_eq!(Annotation::<&str>::new().extent(), None);
    }

    #[test]
    fn summary_format() {
        assert_eq!(sample().summary(), "Annotation: 3 tracks, 2 labels, 5.000s");
    }
}
