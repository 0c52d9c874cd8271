use std::collections::HashSet;

use crate::types::PostKey;

/// Set of post keys already processed during this run.
///
/// Membership only grows: keys are never evicted.
#[derive(Debug, Default)]
pub struct DedupSet {
    keys: HashSet<PostKey>,
}

impl DedupSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if `key` has been marked.
    pub fn seen(&self, key: &PostKey) -> bool {
        self.keys.contains(key)
    }

    /// Marks `key` as seen. Marking an already seen key has no effect.
    pub fn mark(&mut self, key: PostKey) {
        self.keys.insert(key);
    }

    /// Marks `key` and returns `true` if it was not seen before.
    pub fn insert(&mut self, key: PostKey) -> bool {
        self.keys.insert(key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
