//! Shared primitives for the Viterseg segmentation ecosystem.
//!
//! `viterseg-core` provides the foundation the model and decoding crates
//! build on:
//!
//! - **Error types** — [`VitersegError`] and [`Result`] for structured error handling
//! - **Traits** — [`Label`] for target identifiers, [`Summarizable`]
//! - **Log-space helpers** — stable log-sum-exp and count normalization
//! - **Time conversion** — [`SlidingWindow`] between seconds and frame indices
//! - **Containers** — [`Segment`], [`Annotation`] and [`FrameFeatures`]
//!
//! # Quick start
//!
//! ```
//! use viterseg_core::{Segment, SlidingWindow};
//!
//! let window = SlidingWindow::contiguous(0.0, 0.01).unwrap();
//! let segment = window.frame_range_to_segment(100, 50);
//! assert_eq!(window.segment_to_frame_range(&segment), (100, 50));
//! assert_eq!(window.duration_to_frame_count(0.25), 25);
//! # let _ = Segment::new(0.0, 1.0);
//! ```

pub mod annotation;
pub mod error;
pub mod features;
pub mod prob;
pub mod traits;
pub mod window;

pub use annotation::{Annotation, Segment};
pub use error::{Result, VitersegError};
pub use features::FrameFeatures;
pub use traits::*;
pub use window::SlidingWindow;
