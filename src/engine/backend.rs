/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The shared, in-memory table of pending blocks, and the lookups the verifier, acceptor and rejector
//! perform against it.
//!
//! A block is *pending* between its successful verification and its acceptance or rejection (or the
//! acceptance of a sibling, for option blocks). Every pending block has exactly one [`BlockState`]
//! in the table. Blocks that are no longer pending are either in the persistent store (accepted), or
//! forgotten (rejected).

use std::{collections::HashMap, num::NonZeroUsize, time::SystemTime};

use lru::LruCache;

use crate::{
    block::Block,
    events::{DropTxEvent, Event, EventPublisher},
    mempool::Mempool,
    state::{pluggables::KVStore, Diff, State, StateError, StateRef, Versions},
    types::data_types::{BlockId, Timestamp, TxId},
};

use super::block_state::BlockState;

pub struct Backend<K: KVStore, M: Mempool> {
    pub(crate) mempool: M,
    pub(crate) state: State<K>,
    last_accepted: BlockId,
    block_states: HashMap<BlockId, BlockState>,
    /// Recently dropped transactions and why. `None` if the cache size is 0.
    dropped_txs: Option<LruCache<TxId, String>>,
    pub(crate) events: EventPublisher,
}

impl<K: KVStore, M: Mempool> Backend<K, M> {
    pub(crate) fn new(
        state: State<K>,
        mempool: M,
        dropped_tx_cache_size: usize,
        events: EventPublisher,
    ) -> Result<Backend<K, M>, StateError> {
        let last_accepted = state.get_last_accepted()?;
        Ok(Backend {
            mempool,
            state,
            last_accepted,
            block_states: HashMap::new(),
            dropped_txs: NonZeroUsize::new(dropped_tx_cache_size).map(LruCache::new),
            events,
        })
    }

    /// Get a pending block, or else a block from the persistent store.
    pub fn get_block(&self, block: &BlockId) -> Result<Block, StateError> {
        if let Some(block_state) = self.block_states.get(block) {
            return Ok(block_state.block.clone());
        }
        Ok(self.state.get_stateless_block(block)?.0)
    }

    /// Chain time after `block`. For a block that is not pending, this is the chain time after the last
    /// block written into the persistent store.
    pub fn get_timestamp(&self, block: &BlockId) -> Result<Timestamp, StateError> {
        match self.block_states.get(block) {
            Some(block_state) => Ok(block_state.timestamp),
            None => self.state.get_timestamp(),
        }
    }

    pub fn get_on_commit_state(&self, block: &BlockId) -> Option<&Diff> {
        self.block_states
            .get(block)
            .and_then(|block_state| block_state.proposal.as_ref())
            .map(|proposal| &proposal.on_commit_state)
    }

    pub fn get_on_abort_state(&self, block: &BlockId) -> Option<&Diff> {
        self.block_states
            .get(block)
            .and_then(|block_state| block_state.proposal.as_ref())
            .map(|proposal| &proposal.on_abort_state)
    }

    pub fn last_accepted(&self) -> BlockId {
        self.last_accepted
    }

    pub(crate) fn set_last_accepted(&mut self, block: BlockId) {
        self.last_accepted = block;
    }

    pub fn is_pending(&self, block: &BlockId) -> bool {
        self.block_states.contains_key(block)
    }

    pub(crate) fn block_state(&self, block: &BlockId) -> Option<&BlockState> {
        self.block_states.get(block)
    }

    pub(crate) fn block_state_mut(&mut self, block: &BlockId) -> Option<&mut BlockState> {
        self.block_states.get_mut(block)
    }

    pub(crate) fn insert(&mut self, block_state: BlockState) {
        self.block_states
            .insert(block_state.block.id(), block_state);
    }

    /// Forget the pending state of `block`. Freeing a block that is not pending does nothing.
    pub(crate) fn free(&mut self, block: &BlockId) -> Option<BlockState> {
        self.block_states.remove(block)
    }

    pub fn num_pending(&self) -> usize {
        self.block_states.len()
    }

    /// Remember that `tx` failed execution, and why.
    pub(crate) fn mark_dropped(&mut self, tx: TxId, reason: String) {
        self.events.publish(Event::DropTx(DropTxEvent {
            timestamp: SystemTime::now(),
            tx,
            reason: reason.clone(),
        }));
        if let Some(dropped_txs) = &mut self.dropped_txs {
            dropped_txs.put(tx, reason);
        }
    }

    /// The reason `tx` was dropped, if it was dropped recently.
    pub fn drop_reason(&self, tx: &TxId) -> Option<&str> {
        self.dropped_txs
            .as_ref()
            .and_then(|dropped_txs| dropped_txs.peek(tx))
            .map(String::as_str)
    }
}

impl<K: KVStore, M: Mempool> Versions for Backend<K, M> {
    /// The state after a pending block, if it has one, or else the persistent state, if `block` is the
    /// last block written into it.
    ///
    /// A proposal block that was accepted ahead of its options is still pending, and has no state.
    fn get_state(&self, block: &BlockId) -> Option<StateRef<'_>> {
        if let Some(block_state) = self.block_states.get(block) {
            return block_state
                .on_accept_state
                .as_ref()
                .map(|diff| StateRef::Diff(diff.view(self)));
        }

        match self.state.get_last_accepted() {
            Ok(last_accepted) if last_accepted == *block => Some(StateRef::Base(&self.state)),
            _ => None,
        }
    }
}
