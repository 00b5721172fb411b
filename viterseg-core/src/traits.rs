//! Core trait definitions for the Viterseg ecosystem.

use std::fmt::Debug;
use std::hash::Hash;

/// A target label: speaker name, acoustic class, or any other identifier.
///
/// Labels are opaque to the algorithms. The only requirements are equality
/// and hashing (to look up state indices), a total order (to infer a stable
/// state order from training data), and thread-safety for parallel training.
pub trait Label: Clone + Eq + Hash + Ord + Debug + Send + Sync {}

impl<T> Label for T where T: Clone + Eq + Hash + Ord + Debug + Send + Sync {}

/// A type that can produce a summary of its contents.
pub trait Summarizable {
    /// A one-line summary suitable for display.
    fn summary(&self) -> String;
}
