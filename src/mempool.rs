/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Trait for the pluggable pool of transactions waiting to be included in a block.

use std::fmt::{self, Display, Formatter};

use crate::types::{data_types::TxId, transaction::Tx};

pub trait Mempool: Send + 'static {
    /// Add `tx` to the pool, e.g., to re-issue a transaction of a rejected block.
    fn add(&mut self, tx: &Tx) -> Result<(), MempoolError>;

    /// Remove `txs` from the pool, e.g., because a verified block includes them. Transactions that are
    /// not in the pool are ignored.
    fn remove(&mut self, txs: &[Tx]);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MempoolError {
    Duplicate { tx: TxId },
    Full { tx: TxId },
    Rejected { tx: TxId, reason: String },
}

impl Display for MempoolError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            MempoolError::Duplicate { tx } => write!(f, "transaction {} is already in the mempool", tx),
            MempoolError::Full { tx } => write!(f, "mempool is full, couldn't add transaction {}", tx),
            MempoolError::Rejected { tx, reason } => {
                write!(f, "mempool rejected transaction {}: {}", tx, reason)
            }
        }
    }
}

impl std::error::Error for MempoolError {}
