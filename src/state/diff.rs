/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Speculative state: writable overlays on top of the state of a parent block.
//!
//! A [`Diff`] records the changes that a block would make to the state of its parent if it were
//! accepted. The parent of a diff is fixed at creation, and is identified by the parent *block*'s id:
//! reads that miss the diff's own layer are resolved by asking a [`Versions`] for the state of that
//! block, which is either the diff of a pending block or, if the parent is the last accepted block,
//! the persistent [`State`]. Writes only ever touch the diff's own layer.
//!
//! When a block is accepted, only its own layer is [applied](Diff::apply) to the persistent state:
//! the layers of its ancestors were applied when the ancestors themselves were accepted.

use crate::types::{
    data_types::{BlockId, Timestamp, TxId, TxStatus},
    transaction::Tx,
    update_sets::AppStateUpdates,
};

use super::{
    base::{State, StateError},
    pluggables::KVStore,
};

/// Read access to a version of the chain state.
pub trait Chain {
    fn get_timestamp(&self) -> Result<Timestamp, StateError>;

    fn get_app_state(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StateError>;

    /// Status of the transaction `tx`, if it is included in this version of the state.
    fn get_tx_status(&self, tx: &TxId) -> Result<Option<TxStatus>, StateError>;
}

/// A lookup from block ids to the state after each block.
pub trait Versions {
    /// Get the state after `block`, if it is currently available.
    fn get_state(&self, block: &BlockId) -> Option<StateRef<'_>>;
}

/// A borrowed version of the chain state.
pub enum StateRef<'a> {
    Diff(DiffView<'a>),
    Base(&'a dyn Chain),
}

impl Chain for StateRef<'_> {
    fn get_timestamp(&self) -> Result<Timestamp, StateError> {
        match self {
            StateRef::Diff(view) => view.get_timestamp(),
            StateRef::Base(base) => base.get_timestamp(),
        }
    }

    fn get_app_state(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StateError> {
        match self {
            StateRef::Diff(view) => view.get_app_state(key),
            StateRef::Base(base) => base.get_app_state(key),
        }
    }

    fn get_tx_status(&self, tx: &TxId) -> Result<Option<TxStatus>, StateError> {
        match self {
            StateRef::Diff(view) => view.get_tx_status(tx),
            StateRef::Base(base) => base.get_tx_status(tx),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Diff {
    parent: BlockId,
    timestamp: Timestamp,
    app_state_updates: AppStateUpdates,
    added_txs: Vec<(Tx, TxStatus)>,
}

impl Diff {
    /// Create an empty diff on top of the state after `parent`.
    ///
    /// Fails with [`StateError::MissingParentState`] if `versions` has no state for `parent`.
    pub fn new(parent: BlockId, versions: &dyn Versions) -> Result<Diff, StateError> {
        let parent_state = versions
            .get_state(&parent)
            .ok_or(StateError::MissingParentState { block: parent })?;
        Ok(Diff {
            parent,
            timestamp: parent_state.get_timestamp()?,
            app_state_updates: AppStateUpdates::new(),
            added_txs: Vec::new(),
        })
    }

    pub fn parent(&self) -> BlockId {
        self.parent
    }

    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    pub fn set_timestamp(&mut self, timestamp: Timestamp) {
        self.timestamp = timestamp;
    }

    pub fn put(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.app_state_updates.insert(key, value);
    }

    pub fn delete(&mut self, key: Vec<u8>) {
        self.app_state_updates.delete(key);
    }

    pub fn add_tx(&mut self, tx: &Tx, status: TxStatus) {
        self.added_txs.push((tx.clone(), status));
    }

    pub fn app_state_updates(&self) -> &AppStateUpdates {
        &self.app_state_updates
    }

    pub fn added_txs(&self) -> &[(Tx, TxStatus)] {
        &self.added_txs
    }

    /// Get read access to this diff, reading through to its ancestors via `versions`.
    pub fn view<'a>(&'a self, versions: &'a dyn Versions) -> DiffView<'a> {
        DiffView {
            diff: self,
            versions,
        }
    }

    /// Buffer the writes of this diff's own layer into `state`.
    pub fn apply<K: KVStore>(&self, state: &mut State<K>) -> Result<(), StateError> {
        state.set_timestamp(self.timestamp)?;
        for (key, value) in self.app_state_updates.inserts() {
            state.put_app_state(key, value.clone());
        }
        for key in self.app_state_updates.deletes() {
            state.delete_app_state(key);
        }
        for (tx, status) in &self.added_txs {
            state.add_tx(tx, *status)?;
        }
        Ok(())
    }
}

/// A [`Diff`] paired with the [`Versions`] that resolve its ancestors.
pub struct DiffView<'a> {
    diff: &'a Diff,
    versions: &'a dyn Versions,
}

impl<'a> DiffView<'a> {
    pub fn diff(&self) -> &'a Diff {
        self.diff
    }

    fn parent_state(&self) -> Result<StateRef<'a>, StateError> {
        self.versions
            .get_state(&self.diff.parent)
            .ok_or(StateError::MissingParentState {
                block: self.diff.parent,
            })
    }
}

impl Chain for DiffView<'_> {
    fn get_timestamp(&self) -> Result<Timestamp, StateError> {
        Ok(self.diff.timestamp)
    }

    fn get_app_state(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StateError> {
        let key = key.to_vec();
        if let Some(value) = self.diff.app_state_updates.get_insert(&key) {
            return Ok(Some(value.clone()));
        }
        if self.diff.app_state_updates.contains_delete(&key) {
            return Ok(None);
        }
        self.parent_state()?.get_app_state(&key)
    }

    fn get_tx_status(&self, tx: &TxId) -> Result<Option<TxStatus>, StateError> {
        if let Some((_, status)) = self
            .diff
            .added_txs
            .iter()
            .find(|(added, _)| added.id() == *tx)
        {
            return Ok(Some(*status));
        }
        self.parent_state()?.get_tx_status(tx)
    }
}

/// App state changes that are computed once and then applied to one or more diffs, e.g., the
/// side-effects of advancing the chain time, which are identical on both branches of a proposal.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StateChanges {
    updates: AppStateUpdates,
}

impl StateChanges {
    pub fn new() -> StateChanges {
        StateChanges::default()
    }

    pub fn put(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.updates.insert(key, value);
    }

    pub fn delete(&mut self, key: Vec<u8>) {
        self.updates.delete(key);
    }

    pub fn len(&self) -> usize {
        self.updates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }

    pub fn apply(&self, diff: &mut Diff) {
        diff.app_state_updates.extend(&self.updates);
    }
}
