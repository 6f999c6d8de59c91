//! Label selector matching
//!
//! A target matches a selector when every selector key/value pair is
//! present and equal in the target's labels. An empty selector matches
//! everything: a service whose own label map is empty exposes every pod.

use crate::models::LabelMap;

/// Equality-based label selector
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Selector<'a> {
    match_labels: &'a LabelMap,
}

impl<'a> Selector<'a> {
    pub fn new(match_labels: &'a LabelMap) -> Self {
        Self { match_labels }
    }

    /// True when the selector has no requirements and selects everything
    pub fn is_empty(&self) -> bool {
        self.match_labels.is_empty()
    }

    pub fn matches(&self, labels: &LabelMap) -> bool {
        self.match_labels
            .iter()
            .all(|(k, v)| labels.get(k) == Some(v))
    }
}
