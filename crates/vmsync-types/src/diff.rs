//! Keyed inventory diff
//!
//! Compares the source of truth (`current`) against what the CMDB holds
//! (`previous`). Equality is exact structural equality of the values, so a
//! single differing field anywhere in a record marks the key as changed.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Partition of the key space of two keyed collections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InventoryDiff<K: Ord> {
    /// Keys only in `current`
    pub added: BTreeSet<K>,

    /// Keys only in `previous`
    pub removed: BTreeSet<K>,

    /// Keys in both whose values differ
    pub changed: BTreeSet<K>,

    /// Keys in both whose values are equal
    pub unchanged: BTreeSet<K>,
}

impl<K: Ord> Default for InventoryDiff<K> {
    fn default() -> Self {
        Self {
            added: BTreeSet::new(),
            removed: BTreeSet::new(),
            changed: BTreeSet::new(),
            unchanged: BTreeSet::new(),
        }
    }
}

impl<K: Ord + Clone> InventoryDiff<K> {
    /// Compute the diff between `current` and `previous`.
    pub fn compute<V: PartialEq>(
        current: &BTreeMap<K, V>,
        previous: &BTreeMap<K, V>,
    ) -> Self {
        let mut diff = Self::default();

        for (key, value) in current {
            match previous.get(key) {
                None => {
                    diff.added.insert(key.clone());
                }
                Some(old) if old != value => {
                    diff.changed.insert(key.clone());
                }
                Some(_) => {
                    diff.unchanged.insert(key.clone());
                }
            }
        }

        diff.removed = previous
            .keys()
            .filter(|key| !current.contains_key(*key))
            .cloned()
            .collect();

        diff
    }
}

impl<K: Ord> InventoryDiff<K> {
    /// True when nothing needs to be written to the target.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.changed.is_empty() && self.removed.is_empty()
    }

    /// Number of keys that need a mutation.
    pub fn pending(&self) -> usize {
        self.added.len() + self.changed.len() + self.removed.len()
    }
}
