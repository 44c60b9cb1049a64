/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The persistent, accepted state of the chain.
//!
//! [`State`] wraps the user-provided [`KVStore`] and buffers every write in memory until
//! [`commit`](State::commit) is called, which writes the buffered updates in a single
//! [`WriteBatch`]. Reads through `State` observe the buffered writes, so a sequence of updates made on
//! behalf of one accepted block is visible to itself before it is durably committed.

use std::{
    fmt::{self, Display, Formatter},
    io,
};

use borsh::BorshSerialize;

use crate::{
    block::{Block, BlockError},
    codec::{CodecError, GENESIS_CODEC},
    types::{
        data_types::{BlockId, BlockStatus, Timestamp, TxId, TxStatus},
        transaction::{AtomicRequestsByChain, Tx},
        update_sets::{AppStateUpdates, UpdateSet},
    },
};

use super::{
    diff::{Chain, Diff},
    pluggables::{KVGet, KVGetError, KVStore, Key, StoredBlock, StoredTx, WriteBatch},
    variables::{self, concat},
};

pub struct State<K: KVStore> {
    kv_store: K,
    buffered: UpdateSet<Vec<u8>, Vec<u8>>,
}

impl<K: KVStore> State<K> {
    /// Open a key-value store that has already been [initialized](State::initialize).
    pub fn new(kv_store: K) -> Result<State<K>, StateError> {
        if kv_store.last_accepted()?.is_none() {
            return Err(StateError::NotFound(Key::LastAccepted));
        }
        Ok(State {
            kv_store,
            buffered: UpdateSet::new(),
        })
    }

    /// Open a key-value store, first writing the genesis state into it if it is empty.
    ///
    /// The genesis block is stored as accepted and becomes the last accepted block, the chain time is
    /// set to `genesis_time`, and `initial_app_state` is written into the app state. If the store
    /// already holds a last accepted block, it is opened as-is.
    pub fn initialize(
        kv_store: K,
        genesis: &Block,
        genesis_time: Timestamp,
        initial_app_state: &AppStateUpdates,
    ) -> Result<State<K>, StateError> {
        if kv_store.last_accepted()?.is_some() {
            return State::new(kv_store);
        }

        let mut state = State {
            kv_store,
            buffered: UpdateSet::new(),
        };
        state.add_block(genesis, BlockStatus::Accepted)?;
        state.set_last_accepted(&genesis.id())?;
        state.set_timestamp(genesis_time)?;
        for (key, value) in initial_app_state.inserts() {
            state.put_app_state(key, value.clone());
        }
        for key in initial_app_state.deletes() {
            state.delete_app_state(key);
        }
        state.commit()?;

        log::debug!("Initialized state with genesis block {}", genesis.id());
        Ok(state)
    }

    /* ↓↓↓ Timestamp ↓↓↓ */

    pub fn get_timestamp(&self) -> Result<Timestamp, StateError> {
        self.timestamp()?
            .ok_or(StateError::NotFound(Key::Timestamp))
    }

    pub fn set_timestamp(&mut self, timestamp: Timestamp) -> Result<(), StateError> {
        self.set(variables::TIMESTAMP.to_vec(), &timestamp)
    }

    /* ↓↓↓ Last Accepted ↓↓↓ */

    pub fn get_last_accepted(&self) -> Result<BlockId, StateError> {
        self.last_accepted()?
            .ok_or(StateError::NotFound(Key::LastAccepted))
    }

    pub fn set_last_accepted(&mut self, block: &BlockId) -> Result<(), StateError> {
        self.set(variables::LAST_ACCEPTED.to_vec(), block)
    }

    /* ↓↓↓ Blocks ↓↓↓ */

    /// Get a block that was written into the store, together with its status.
    pub fn get_stateless_block(&self, block: &BlockId) -> Result<(Block, BlockStatus), StateError> {
        let stored = self
            .block(block)?
            .ok_or(StateError::NotFound(Key::Block { block: *block }))?;
        Ok((Block::parse(&GENESIS_CODEC, &stored.bytes)?, stored.status))
    }

    pub fn add_block(&mut self, block: &Block, status: BlockStatus) -> Result<(), StateError> {
        self.set(
            concat(&variables::BLOCKS, &block.id().bytes()),
            &StoredBlock {
                bytes: block.bytes().to_vec(),
                status,
            },
        )
    }

    /* ↓↓↓ Transactions ↓↓↓ */

    pub fn get_tx(&self, tx: &TxId) -> Result<Option<(Tx, TxStatus)>, StateError> {
        match self.tx(tx)? {
            Some(stored) => Ok(Some((Tx::parse(&GENESIS_CODEC, &stored.bytes)?, stored.status))),
            None => Ok(None),
        }
    }

    pub fn add_tx(&mut self, tx: &Tx, status: TxStatus) -> Result<(), StateError> {
        self.set(
            concat(&variables::TXS, &tx.id().bytes()),
            &StoredTx {
                bytes: tx.bytes().to_vec(),
                status,
            },
        )
    }

    /* ↓↓↓ App State ↓↓↓ */

    pub fn put_app_state(&mut self, key: &[u8], value: Vec<u8>) {
        self.buffered
            .insert(concat(&variables::APP_STATE, key), value);
    }

    pub fn delete_app_state(&mut self, key: &[u8]) {
        self.buffered.delete(concat(&variables::APP_STATE, key));
    }

    /* ↓↓↓ Atomic Requests ↓↓↓ */

    /// Record the shared memory requests made by an accepted block, for the process that relays them to
    /// the other chains.
    pub fn add_atomic_requests(
        &mut self,
        block: &BlockId,
        requests: &AtomicRequestsByChain,
    ) -> Result<(), StateError> {
        self.set(concat(&variables::ATOMIC_REQUESTS, &block.bytes()), requests)
    }

    pub fn get_atomic_requests(
        &self,
        block: &BlockId,
    ) -> Result<Option<AtomicRequestsByChain>, StateError> {
        Ok(self.atomic_requests(block)?)
    }

    /* ↓↓↓ Writing ↓↓↓ */

    /// Buffer the writes of the topmost layer of `diff`.
    pub fn apply(&mut self, diff: &Diff) -> Result<(), StateError> {
        diff.apply(self)
    }

    /// Durably write every buffered update in a single, atomic write batch.
    pub fn commit(&mut self) -> Result<(), StateError> {
        let mut wb = K::WriteBatch::new();
        for (key, value) in self.buffered.inserts() {
            wb.set(key, value);
        }
        for key in self.buffered.deletes() {
            wb.delete(key);
        }
        let num_updates = self.buffered.len();
        self.buffered = UpdateSet::new();

        self.kv_store.write(wb).map_err(StateError::Write)?;
        log::trace!("Committed {} updates to the key-value store", num_updates);
        Ok(())
    }

    /// Discard every buffered update.
    pub fn abort(&mut self) {
        self.buffered = UpdateSet::new();
    }

    fn set<T: BorshSerialize>(&mut self, key: Vec<u8>, value: &T) -> Result<(), StateError> {
        let value = value
            .try_to_vec()
            .map_err(|err| StateError::Codec(CodecError::Serialize(err)))?;
        self.buffered.insert(key, value);
        Ok(())
    }
}

impl<K: KVStore> KVGet for State<K> {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        let key = key.to_vec();
        if let Some(value) = self.buffered.get_insert(&key) {
            return Some(value.clone());
        }
        if self.buffered.contains_delete(&key) {
            return None;
        }
        self.kv_store.get(&key)
    }
}

impl<K: KVStore> Chain for State<K> {
    fn get_timestamp(&self) -> Result<Timestamp, StateError> {
        State::get_timestamp(self)
    }

    fn get_app_state(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StateError> {
        Ok(self.app_state(key))
    }

    fn get_tx_status(&self, tx: &TxId) -> Result<Option<TxStatus>, StateError> {
        Ok(self.tx(tx)?.map(|stored| stored.status))
    }
}

#[derive(Debug)]
pub enum StateError {
    KVGet(KVGetError),
    Codec(CodecError),
    Block(BlockError),
    NotFound(Key),
    /// The state a diff reads through to is no longer, or not yet, available.
    MissingParentState { block: BlockId },
    Write(io::Error),
}

impl From<KVGetError> for StateError {
    fn from(value: KVGetError) -> Self {
        StateError::KVGet(value)
    }
}

impl From<CodecError> for StateError {
    fn from(value: CodecError) -> Self {
        StateError::Codec(value)
    }
}

impl From<BlockError> for StateError {
    fn from(value: BlockError) -> Self {
        StateError::Block(value)
    }
}

impl Display for StateError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            StateError::KVGet(err) => write!(f, "{}", err),
            StateError::Codec(err) => write!(f, "{}", err),
            StateError::Block(err) => write!(f, "{}", err),
            StateError::NotFound(key) => write!(f, "{} not found", key),
            StateError::MissingParentState { block } => {
                write!(f, "missing parent state of block {}", block)
            }
            StateError::Write(err) => write!(f, "couldn't write to the key-value store: {}", err),
        }
    }
}

impl std::error::Error for StateError {}
