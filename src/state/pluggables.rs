/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Traits for pluggable chain state persistence.
//!
//! The library user provides a key-value store by implementing [`KVStore`]. Reading persisted
//! variables through the provided methods of [`KVGet`] deserializes them from the
//! [locations](super::variables) they are stored at.

use std::fmt::{self, Display, Formatter};

use borsh::{BorshDeserialize, BorshSerialize};

use crate::types::{
    data_types::{BlockId, BlockStatus, Timestamp, TxId, TxStatus},
    transaction::AtomicRequestsByChain,
};

use super::variables::{self, concat};

pub trait KVStore: KVGet + Clone + Send + 'static {
    type WriteBatch: WriteBatch;

    /// Atomically apply every write in `wb`. On error, none of them may have been applied.
    fn write(&mut self, wb: Self::WriteBatch) -> std::io::Result<()>;
}

pub trait KVGet {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>>;

    /* ↓↓↓ Timestamp ↓↓↓ */

    fn timestamp(&self) -> Result<Option<Timestamp>, KVGetError> {
        deserialize_at(self.get(&variables::TIMESTAMP), Key::Timestamp)
    }

    /* ↓↓↓ Last Accepted ↓↓↓ */

    fn last_accepted(&self) -> Result<Option<BlockId>, KVGetError> {
        deserialize_at(self.get(&variables::LAST_ACCEPTED), Key::LastAccepted)
    }

    /* ↓↓↓ Blocks ↓↓↓ */

    fn block(&self, block: &BlockId) -> Result<Option<StoredBlock>, KVGetError> {
        deserialize_at(
            self.get(&concat(&variables::BLOCKS, &block.bytes())),
            Key::Block { block: *block },
        )
    }

    /* ↓↓↓ Transactions ↓↓↓ */

    fn tx(&self, tx: &TxId) -> Result<Option<StoredTx>, KVGetError> {
        deserialize_at(
            self.get(&concat(&variables::TXS, &tx.bytes())),
            Key::Tx { tx: *tx },
        )
    }

    /* ↓↓↓ App State ↓↓↓ */

    fn app_state(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.get(&concat(&variables::APP_STATE, key))
    }

    /* ↓↓↓ Atomic Requests ↓↓↓ */

    fn atomic_requests(&self, block: &BlockId) -> Result<Option<AtomicRequestsByChain>, KVGetError> {
        deserialize_at(
            self.get(&concat(&variables::ATOMIC_REQUESTS, &block.bytes())),
            Key::AtomicRequests { block: *block },
        )
    }
}

fn deserialize_at<T: BorshDeserialize>(
    bytes: Option<Vec<u8>>,
    key: Key,
) -> Result<Option<T>, KVGetError> {
    match bytes {
        Some(bytes) => Ok(Some(
            T::deserialize(&mut bytes.as_slice())
                .map_err(|err| KVGetError::DeserializeValueError { key, source: err })?,
        )),
        None => Ok(None),
    }
}

pub trait WriteBatch {
    fn new() -> Self;
    fn set(&mut self, key: &[u8], value: &[u8]);
    fn delete(&mut self, key: &[u8]);
}

/// How a block is persisted: its canonical bytes, and whether it was accepted or rejected.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct StoredBlock {
    pub bytes: Vec<u8>,
    pub status: BlockStatus,
}

/// How a transaction is persisted: its canonical bytes, and whether it was committed or aborted.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct StoredTx {
    pub bytes: Vec<u8>,
    pub status: TxStatus,
}

#[derive(Debug)]
pub enum KVGetError {
    DeserializeValueError { key: Key, source: std::io::Error },
}

impl Display for KVGetError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            KVGetError::DeserializeValueError { key, source } => {
                write!(f, "couldn't deserialize {}: {}", key, source)
            }
        }
    }
}

impl std::error::Error for KVGetError {}

#[derive(Debug)]
pub enum Key {
    Timestamp,
    LastAccepted,
    Block { block: BlockId },
    Tx { tx: TxId },
    AtomicRequests { block: BlockId },
}

impl Display for Key {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self {
            &Key::Timestamp => write!(f, "Timestamp"),
            &Key::LastAccepted => write!(f, "Last Accepted"),
            &Key::Block { block } => write!(f, "Block {}", block),
            &Key::Tx { tx } => write!(f, "Transaction {}", tx),
            &Key::AtomicRequests { block } => write!(f, "Atomic Requests for block {}", block),
        }
    }
}
