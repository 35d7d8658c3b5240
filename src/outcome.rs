//! Aggregate traversal results and fan-in folding.
//!
//! Every stage of a traversal reports an [`Outcome`]: did it succeed, and did
//! it change anything on disk. Fan-in points combine child outcomes with
//! [`Outcome::all`] - success is the AND across children, changed is the OR.

use serde::Serialize;

/// Result of one traversal step: a node, a subtree, or a whole root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Outcome {
    /// Whether the step (and everything it covered) succeeded.
    pub success: bool,
    /// Whether any install actually changed an installed version.
    pub changed: bool,
}

impl Outcome {
    pub fn new(success: bool, changed: bool) -> Self {
        Self { success, changed }
    }

    /// Successful no-op: nothing to do, nothing changed.
    pub fn ok() -> Self {
        Self::new(true, false)
    }

    /// Failure with no observed state change.
    pub fn fail() -> Self {
        Self::new(false, false)
    }

    /// Combine with a sibling outcome: AND success, OR changed.
    pub fn and(self, other: Outcome) -> Outcome {
        Outcome::new(self.success && other.success, self.changed || other.changed)
    }

    /// Fold a fan-in: all children must succeed, any change counts.
    ///
    /// An empty iterator folds to [`Outcome::ok`], matching the
    /// empty-dependency-list and empty-hook-list contracts.
    pub fn all(outcomes: impl IntoIterator<Item = Outcome>) -> Outcome {
        outcomes.into_iter().fold(Outcome::ok(), Outcome::and)
    }
}
