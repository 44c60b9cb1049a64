/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Transactions carried by blocks, and the cross-chain requests they produce.
//!
//! A [`Tx`] is an [`UnsignedTx`] plus the credentials that authorize it. Verifying credentials is the
//! business of a [transaction executor](crate::executor::TxExecutor); this module only fixes the
//! encoding and the identity of transactions. Like blocks, a transaction's id is the hash of its
//! canonical bytes, computed once when the transaction is created or initialized after decoding.

use std::collections::BTreeMap;

use borsh::{BorshDeserialize, BorshSerialize};

use crate::codec::{Codec, CodecError, CODEC, CODEC_VERSION};

use super::data_types::{ChainId, CryptoHash, InputId, Timestamp, TxId};

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Tx {
    unsigned: UnsignedTx,
    creds: Vec<Credential>,
    #[borsh_skip]
    id: TxId,
    #[borsh_skip]
    bytes: Vec<u8>,
}

impl Tx {
    /// Create a new transaction and compute its canonical bytes and id using the regular [`CODEC`].
    pub fn new(unsigned: UnsignedTx, creds: Vec<Credential>) -> Result<Tx, CodecError> {
        let mut tx = Tx {
            unsigned,
            creds,
            id: TxId::default(),
            bytes: Vec::new(),
        };
        tx.initialize(&CODEC)?;
        Ok(tx)
    }

    /// Compute and cache the canonical bytes and the id of a transaction that was just decoded as part
    /// of a larger value, e.g., a block.
    pub(crate) fn initialize(&mut self, codec: &Codec) -> Result<(), CodecError> {
        self.bytes = codec.marshal(CODEC_VERSION, self)?;
        self.id = TxId::digest(&self.bytes);
        Ok(())
    }

    /// Decode a standalone transaction, e.g., one read back from the persistent store.
    pub fn parse(codec: &Codec, bytes: &[u8]) -> Result<Tx, CodecError> {
        let mut tx: Tx = codec.unmarshal(bytes)?;
        tx.bytes = bytes.to_vec();
        tx.id = TxId::digest(bytes);
        Ok(tx)
    }

    pub fn id(&self) -> TxId {
        self.id
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn unsigned(&self) -> &UnsignedTx {
        &self.unsigned
    }

    pub fn creds(&self) -> &[Credential] {
        &self.creds
    }
}

/// An opaque authorization attached to a transaction.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Credential(pub Vec<u8>);

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub enum UnsignedTx {
    /// Spend local UTXOs into new local UTXOs.
    Base(BaseTx),

    /// Consume UTXOs exported to this chain by `source_chain`.
    Import(ImportTx),

    /// Move value out of this chain into `destination_chain`.
    Export(ExportTx),

    /// Schedule an app state entry that is present only between its start and end times.
    AddTimelock(AddTimelockTx),

    /// Move the chain time forward. Only valid inside untimestamped proposal blocks.
    AdvanceTime(AdvanceTimeTx),
}

impl UnsignedTx {
    /// Name of the transaction kind in PascalCase, for logging.
    pub fn kind_name(&self) -> &'static str {
        match self {
            UnsignedTx::Base(_) => "Base",
            UnsignedTx::Import(_) => "Import",
            UnsignedTx::Export(_) => "Export",
            UnsignedTx::AddTimelock(_) => "AddTimelock",
            UnsignedTx::AdvanceTime(_) => "AdvanceTime",
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct BaseTx {
    pub inputs: Vec<InputId>,
    pub outputs: Vec<Utxo>,
    pub memo: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct ImportTx {
    pub base: BaseTx,
    pub source_chain: ChainId,
    pub imported_inputs: Vec<ImportedInput>,
}

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct ImportedInput {
    pub utxo_id: InputId,
    pub amount: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct ExportTx {
    pub base: BaseTx,
    pub destination_chain: ChainId,
    pub exported_outputs: Vec<Utxo>,
}

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct AddTimelockTx {
    pub base: BaseTx,
    pub entry: TimelockEntry,
}

/// An app state entry that is inserted once the chain time reaches `start_time` and deleted once it
/// reaches `end_time`.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct TimelockEntry {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    pub start_time: Timestamp,
    pub end_time: Timestamp,
}

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct AdvanceTimeTx {
    pub time: Timestamp,
}

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Utxo {
    pub amount: u64,
    pub owner: Vec<u8>,
}

/// Id of the `index`-th output produced by transaction `tx`.
pub fn utxo_id(tx: &TxId, index: u32) -> InputId {
    let mut preimage = tx.bytes().to_vec();
    preimage.extend_from_slice(&index.to_le_bytes());
    CryptoHash::digest(&preimage)
}

/// A key-value pair to be written into the shared memory of another chain.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Element {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

/// Writes and removals a block performs on the shared memory of one other chain once it is accepted.
#[derive(Clone, Debug, Default, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct AtomicRequests {
    pub put_requests: Vec<Element>,
    pub remove_requests: Vec<Vec<u8>>,
}

impl AtomicRequests {
    /// Append the requests in `other` after the requests already in `self`.
    pub fn merge(&mut self, other: AtomicRequests) {
        self.put_requests.extend(other.put_requests);
        self.remove_requests.extend(other.remove_requests);
    }

    pub fn is_empty(&self) -> bool {
        self.put_requests.is_empty() && self.remove_requests.is_empty()
    }
}

pub type AtomicRequestsByChain = BTreeMap<ChainId, AtomicRequests>;
