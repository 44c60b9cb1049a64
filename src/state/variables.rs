/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Byte-prefixes that specify where each persisted chain variable is stored in the user-provided
//! key-value store.
//!
//! # List of State Variables
//!
//! |Variable|Type|Description|
//! |---|---|---|
//! |Timestamp|[`Timestamp`](crate::types::data_types::Timestamp)|The chain time after the last accepted block.|
//! |Last Accepted|[`BlockId`](crate::types::data_types::BlockId)|The id of the last block written into the store as accepted.|
//! |Blocks|[`BlockId`](crate::types::data_types::BlockId) -> [`StoredBlock`](super::pluggables::StoredBlock)|The canonical bytes and status of every accepted block.|
//! |Transactions|[`TxId`](crate::types::data_types::TxId) -> [`StoredTx`](super::pluggables::StoredTx)|The canonical bytes and status of every transaction in an accepted block.|
//! |App State|[`Vec<u8>`] -> [`Vec<u8>`]|The key-value pairs written by accepted transactions.|
//! |Atomic Requests|[`BlockId`](crate::types::data_types::BlockId) -> [`AtomicRequestsByChain`](crate::types::transaction::AtomicRequestsByChain)|The shared memory requests each accepted block made on other chains.|
//!
//! # Persistence of state variables
//!
//! Every variable is stored as a **Borsh-serialized value**, except app state values, which are stored
//! as the raw bytes transactions wrote. Single values sit at their one-byte prefix. Mappings sit at the
//! concatenation of their one-byte prefix and the bytes of the key (the 32 raw bytes for ids, the raw
//! key bytes for app state).

pub const TIMESTAMP: [u8; 1] = [0];
pub const LAST_ACCEPTED: [u8; 1] = [1];
pub const BLOCKS: [u8; 1] = [2];
pub const TXS: [u8; 1] = [3];
pub const APP_STATE: [u8; 1] = [4];
pub const ATOMIC_REQUESTS: [u8; 1] = [5];

/// Concatenate two byteslices into one vector.
pub fn concat(a: &[u8], b: &[u8]) -> Vec<u8> {
    let mut res = Vec::with_capacity(a.len() + b.len());
    res.extend_from_slice(a);
    res.extend_from_slice(b);
    res
}
