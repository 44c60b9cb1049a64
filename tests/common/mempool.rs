//! [`MockMempool`], a shared, in-memory implementation of [`Mempool`].

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use platform_blocks::{
    mempool::{Mempool, MempoolError},
    types::{data_types::TxId, transaction::Tx},
};

#[derive(Default)]
struct Inner {
    txs: HashMap<TxId, Tx>,
    reject_adds: bool,
}

/// A mempool whose clones share the same contents, so that a test can observe the transactions the
/// block engine adds and removes.
#[derive(Clone, Default)]
pub(crate) struct MockMempool(Arc<Mutex<Inner>>);

impl MockMempool {
    pub(crate) fn new() -> MockMempool {
        MockMempool::default()
    }

    pub(crate) fn contains(&self, tx: &TxId) -> bool {
        self.0.lock().unwrap().txs.contains_key(tx)
    }

    pub(crate) fn len(&self) -> usize {
        self.0.lock().unwrap().txs.len()
    }

    /// Make every subsequent [`add`](Mempool::add) fail.
    pub(crate) fn set_reject_adds(&self, reject: bool) {
        self.0.lock().unwrap().reject_adds = reject;
    }
}

impl Mempool for MockMempool {
    fn add(&mut self, tx: &Tx) -> Result<(), MempoolError> {
        let mut inner = self.0.lock().unwrap();
        if inner.reject_adds {
            return Err(MempoolError::Rejected {
                tx: tx.id(),
                reason: "mock mempool rejects every transaction".to_string(),
            });
        }
        if inner.txs.contains_key(&tx.id()) {
            return Err(MempoolError::Duplicate { tx: tx.id() });
        }
        inner.txs.insert(tx.id(), tx.clone());
        Ok(())
    }

    fn remove(&mut self, txs: &[Tx]) {
        let mut inner = self.0.lock().unwrap();
        for tx in txs {
            inner.txs.remove(&tx.id());
        }
    }
}
