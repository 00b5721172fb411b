//! Bidirectional mapping between target labels and dense state indices.

use std::collections::{BTreeSet, HashMap};

use viterseg_core::{Annotation, Label, Result, VitersegError};

/// The fixed set of targets an HMM is trained for.
///
/// State `k` is the `k`-th label. The mapping is built once, before
/// training, and never changes afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetIndex<L: Label> {
    labels: Vec<L>,
    states: HashMap<L, usize>,
}

impl<L: Label> TargetIndex<L> {
    /// Use the given labels in the given order.
    ///
    /// # Errors
    ///
    /// Returns an error if `labels` is empty or contains duplicates.
    pub fn new(labels: Vec<L>) -> Result<Self> {
        if labels.is_empty() {
            return Err(VitersegError::InvalidInput("no targets".into()));
        }
        let mut states = HashMap::with_capacity(labels.len());
        for (k, label) in labels.iter().enumerate() {
            if states.insert(label.clone(), k).is_some() {
                return Err(VitersegError::InvalidInput(format!(
                    "duplicate target {label:?}"
                )));
            }
        }
        Ok(Self { labels, states })
    }

    /// Sorted union of every label found in `annotations`.
    pub fn infer<'a, I>(annotations: I) -> Result<Self>
    where
        I: IntoIterator<Item = &'a Annotation<L>>,
        L: 'a,
    {
        let labels: BTreeSet<L> = annotations
            .into_iter()
            .flat_map(|a| a.labels())
            .collect();
        Self::new(labels.into_iter().collect())
    }

    /// Number of targets (= number of HMM states).
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Whether there are no targets. Never true for a constructed index.
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// State index of `label`.
    pub fn state(&self, label: &L) -> Option<usize> {
        self.states.get(label).copied()
    }

    /// Label of state `k`.
    pub fn label(&self, k: usize) -> Option<&L> {
        self.labels.get(k)
    }

    /// Labels in state order.
    pub fn labels(&self) -> &[L] {
        &self.labels
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use viterseg_core::Segment;

    #[test]
    fn explicit_order_is_kept() {
        let t = TargetIndex::new(vec!["speech", "music", "noise"]).unwrap();
        assert_eq!(t.len(), 3);
        assert_eq!(t.state(&"music"), Some(1));
        assert_eq!(t.label(2), Some(&"noise"));
        assert_eq!(t.state(&"silence"), None);
        assert_eq!(t.label(3), None);
    }

    #[test]
    fn rejects_empty_and_duplicates() {
        assert!(TargetIndex::<&str>::new(vec![]).is_err());
        assert!(TargetIndex::new(vec!["a", "b", "a"]).is_err());
    }

    #[test]
    fn inferred_targets_are_sorted() {
        let mut a = Annotation::new();
        a.push(Segment::new(0.0, 1.0), "zoe".to_string());
        a.push(Segment::new(1.0, 2.0), "adam".to_string());
        let mut b = Annotation::new();
        b.push(Segment::new(0.0, 1.0), "mia".to_string());
        b.push(Segment::new(1.0, 2.0), "adam".to_string());

        let t = TargetIndex::infer([&a, &b]).unwrap();
        assert_eq!(t.labels(), &["adam", "mia", "zoe"]);
    }
}
