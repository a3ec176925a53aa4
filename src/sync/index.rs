//! Snapshot of the bucket listing, consumed as local files are matched.

use crate::store::{ListedObject, ObjectMeta};
use std::collections::HashMap;

#[derive(Debug, Default, Clone)]
pub struct RemoteObjectIndex {
    entries: HashMap<String, ObjectMeta>,
}

impl RemoteObjectIndex {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_listing(objects: Vec<ListedObject>) -> Self {
        Self {
            entries: objects.into_iter().map(|o| (o.key, o.meta)).collect(),
        }
    }

    /// Removes and returns the entry; a removed key is no longer a straggler.
    pub fn take(&mut self, key: &str) -> Option<ObjectMeta> {
        self.entries.remove(key)
    }

    /// Drops `prefix` and every key below it; returns how many were removed.
    pub fn take_subtree(&mut self, prefix: &str) -> usize {
        let below = format!("{}/", prefix);
        let before = self.entries.len();
        self.entries
            .retain(|key, _| key != prefix && !key.starts_with(&below));
        before - self.entries.len()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remaining keys, sorted.
    pub fn remaining_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Empties the index and returns what was left, sorted.
    pub fn drain_stragglers(&mut self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.drain().map(|(k, _)| k).collect();
        keys.sort();
        keys
    }
}
