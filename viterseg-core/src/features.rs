//! Frame-level feature matrices.

use crate::annotation::Segment;
use crate::window::SlidingWindow;
use crate::{Result, Summarizable, VitersegError};

/// A T × D matrix of per-frame feature vectors together with the sliding
/// window that produced it.
///
/// Storage is flat and row-major: frame `t` occupies
/// `data[t * n_features..(t + 1) * n_features]`.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameFeatures {
    data: Vec<f64>,
    n_features: usize,
    window: SlidingWindow,
}

impl FrameFeatures {
    /// Wrap flat row-major feature data.
    ///
    /// # Errors
    ///
    /// Returns an error if `n_features` is zero, if `data.len()` is not a
    /// multiple of `n_features`, or if any value is not finite.
    pub fn new(data: Vec<f64>, n_features: usize, window: SlidingWindow) -> Result<Self> {
        if n_features == 0 {
            return Err(VitersegError::InvalidInput(
                "n_features must be > 0".into(),
            ));
        }
        if data.len() % n_features != 0 {
            return Err(VitersegError::InvalidInput(format!(
                "data length {} is not a multiple of n_features {}",
                data.len(),
                n_features
            )));
        }
        if let Some(pos) = data.iter().position(|v| !v.is_finite()) {
            return Err(VitersegError::InvalidInput(format!(
                "non-finite feature value at frame {}",
                pos / n_features
            )));
        }
        Ok(Self {
            data,
            n_features,
            window,
        })
    }

    /// Build from one vector per frame.
    ///
    /// # Errors
    ///
    /// Returns an error if `rows` is empty or rows differ in length.
    pub fn from_rows(rows: &[Vec<f64>], window: SlidingWindow) -> Result<Self> {
        let n_features = rows
            .first()
            .map(|r| r.len())
            .ok_or_else(|| VitersegError::InvalidInput("no feature rows".into()))?;
        for (t, row) in rows.iter().enumerate() {
            if row.len() != n_features {
                return Err(VitersegError::InvalidInput(format!(
                    "frame {} has dimension {}, expected {}",
                    t,
                    row.len(),
                    n_features
                )));
            }
        }
        Self::new(rows.concat(), n_features, window)
    }

    /// Number of frames (T).
    pub fn n_frames(&self) -> usize {
        self.data.len() / self.n_features
    }

    /// Feature dimension (D).
    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// The sliding window the frames were computed on.
    pub fn window(&self) -> &SlidingWindow {
        &self.window
    }

    /// Feature vector of frame `t`.
    ///
    /// # Panics
    ///
    /// Panics if `t >= n_frames()`.
    pub fn row(&self, t: usize) -> &[f64] {
        &self.data[t * self.n_features..(t + 1) * self.n_features]
    }

    /// All frames as borrowed rows.
    pub fn rows(&self) -> Vec<&[f64]> {
        self.data.chunks_exact(self.n_features).collect()
    }

    /// Frames whose tiles fall inside any of `segments`, in segment order.
    ///
    /// Ranges are clipped to the available frames.
    pub fn crop(&self, segments: &[Segment]) -> Vec<&[f64]> {
        let n_frames = self.n_frames();
        let mut out = Vec::new();
        for segment in segments {
            let (i0, n) = self.window.segment_to_frame_range(segment);
            let end = (i0 + n).min(n_frames);
            for t in i0.min(end)..end {
                out.push(self.row(t));
            }
        }
        out
    }
}

impl Summarizable for FrameFeatures {
    fn summary(&self) -> String {
        format!(
            "FrameFeatures: {} frames \u{00d7} {} features, step {}s",
            self.n_frames(),
            self.n_features,
            self.window.step()
        )
    }
}
