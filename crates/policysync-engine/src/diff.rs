//! Object-name delta between two extracted sets.

use std::collections::HashSet;

/// Names that gained and lost public readability between two policies.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicyDelta {
    /// Names present in `next` but not in `previous`.
    pub added: Vec<String>,
    /// Names present in `previous` but not in `next`.
    pub removed: Vec<String>,
}

impl PolicyDelta {
    /// Whether nothing changed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Compute `added = next \ previous` and `removed = previous \ next`.
///
/// Membership only: an element is kept if its value is absent from the other
/// side, regardless of how often it occurs on either side. Kept elements
/// retain their order and their duplicates.
///
/// # Examples
///
/// ```
/// use policysync_engine::diff::diff;
///
/// let previous = vec!["a".to_owned(), "b".to_owned()];
/// let next = vec!["b".to_owned(), "c".to_owned()];
/// let delta = diff(&previous, &next);
/// assert_eq!(delta.added, vec!["c"]);
/// assert_eq!(delta.removed, vec!["a"]);
/// ```
#[must_use]
pub fn diff(previous: &[String], next: &[String]) -> PolicyDelta {
    PolicyDelta {
        added: difference(next, previous),
        removed: difference(previous, next),
    }
}

/// Elements of `left` whose value does not occur in `right`.
fn difference(left: &[String], right: &[String]) -> Vec<String> {
    let right: HashSet<&str> = right.iter().map(String::as_str).collect();
    left.iter()
        .filter(|name| !right.contains(name.as_str()))
        .cloned()
        .collect()
}
