/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Types that store pending updates to the app state.

use std::{
    collections::{hash_map, hash_set, HashMap, HashSet},
    hash::Hash,
};

/// Generic set of key-value updates that take effect together, e.g., when the block that produced them
/// is accepted.
///
/// # Uniqueness of Key between `inserts` and `deletes`
///
/// A key is never both in `inserts` and in `deletes`: the most recent of [`insert`](Self::insert) and
/// [`delete`](Self::delete) wins.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpdateSet<K: Eq + Hash, V: Eq> {
    inserts: HashMap<K, V>,
    deletes: HashSet<K>,
}

impl<K: Eq + Hash, V: Eq> UpdateSet<K, V> {
    /// Create a new `UpdateSet` with empty `inserts` and `deletes`.
    pub fn new() -> Self {
        Self {
            inserts: HashMap::new(),
            deletes: HashSet::new(),
        }
    }

    /// Schedule the insertion of a `key`-`value` pair.
    ///
    /// This cancels the deletion of `key`, if it has been scheduled using [`delete`](Self::delete).
    pub fn insert(&mut self, key: K, value: V) {
        self.deletes.remove(&key);
        self.inserts.insert(key, value);
    }

    /// Schedule the deletion of `key`.
    ///
    /// This cancels the insertion of `key`, if it has been scheduled using [`insert`](Self::insert).
    pub fn delete(&mut self, key: K) {
        self.inserts.remove(&key);
        self.deletes.insert(key);
    }

    /// Get whether the `UpdateSet` is scheduled to insert a value to `key`, and if so, returns a
    /// reference to that value.
    pub fn get_insert(&self, key: &K) -> Option<&V> {
        self.inserts.get(key)
    }

    /// Check whether the `UpdateSet` is scheduled to delete `key`.
    pub fn contains_delete(&self, key: &K) -> bool {
        self.deletes.contains(key)
    }

    /// Get an iterator over all of the key-value pairs that this `UpdateSet` will insert.
    pub fn inserts(&self) -> hash_map::Iter<K, V> {
        self.inserts.iter()
    }

    /// Get an iterator over all of the keys that this `UpdateSet` will delete.
    pub fn deletes(&self) -> hash_set::Iter<K> {
        self.deletes.iter()
    }

    /// Total number of scheduled insertions and deletions.
    pub fn len(&self) -> usize {
        self.inserts.len() + self.deletes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inserts.is_empty() && self.deletes.is_empty()
    }
}

impl<K: Eq + Hash + Clone, V: Eq + Clone> UpdateSet<K, V> {
    /// Layer the updates in `other` on top of the updates in `self`.
    pub fn extend(&mut self, other: &UpdateSet<K, V>) {
        for (key, value) in other.inserts() {
            self.insert(key.clone(), value.clone());
        }
        for key in other.deletes() {
            self.delete(key.clone());
        }
    }
}

impl<K: Eq + Hash, V: Eq> Default for UpdateSet<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

/// Set of key-value updates applied to the app state.
pub type AppStateUpdates = UpdateSet<Vec<u8>, Vec<u8>>;
