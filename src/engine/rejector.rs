/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Rejection of pending blocks.
//!
//! Rejecting a block forgets its pending state and, outside of bootstrapping, hands its transactions
//! back to the mempool so that they can be included in another block. Re-issuing is best-effort: a
//! transaction the mempool refuses is logged and skipped.

use std::{convert::Infallible, time::SystemTime};

use crate::{
    block::{visitor::Visitor, Block},
    events::{Event, RejectBlockEvent},
    mempool::Mempool,
    state::pluggables::KVStore,
    types::{data_types::Timestamp, transaction::Tx},
};

use super::backend::Backend;

pub(crate) struct Rejector<'a, K: KVStore, M: Mempool> {
    pub(crate) backend: &'a mut Backend<K, M>,
    pub(crate) add_txs_to_mempool: bool,
}

impl<K: KVStore, M: Mempool> Rejector<'_, K, M> {
    fn reject_block(&mut self, block: &Block) -> Result<(), Infallible> {
        self.backend.free(&block.id());

        log::trace!(
            "Rejecting {} block {} at height {} with parent {}",
            block.kind_name(),
            block.id(),
            block.height(),
            block.parent()
        );

        if self.add_txs_to_mempool {
            for tx in block.txs() {
                if let Err(err) = self.backend.mempool.add(tx) {
                    log::debug!(
                        "Failed to reissue transaction {} of rejected block {}: {}",
                        tx.id(),
                        block.id(),
                        err
                    );
                }
            }
        }

        self.backend.events.publish(Event::RejectBlock(RejectBlockEvent {
            timestamp: SystemTime::now(),
            block: block.id(),
            kind: block.kind_name(),
            height: block.height(),
        }));
        Ok(())
    }
}

impl<K: KVStore, M: Mempool> Visitor for Rejector<'_, K, M> {
    type Error = Infallible;

    fn banff_abort(&mut self, block: &Block, _: Timestamp) -> Result<(), Self::Error> {
        self.reject_block(block)
    }

    fn banff_commit(&mut self, block: &Block, _: Timestamp) -> Result<(), Self::Error> {
        self.reject_block(block)
    }

    fn banff_proposal(
        &mut self,
        block: &Block,
        _: Timestamp,
        _: &Tx,
        _: &[Tx],
    ) -> Result<(), Self::Error> {
        self.reject_block(block)
    }

    fn banff_standard(&mut self, block: &Block, _: Timestamp, _: &[Tx]) -> Result<(), Self::Error> {
        self.reject_block(block)
    }

    fn apricot_abort(&mut self, block: &Block) -> Result<(), Self::Error> {
        self.reject_block(block)
    }

    fn apricot_commit(&mut self, block: &Block) -> Result<(), Self::Error> {
        self.reject_block(block)
    }

    fn apricot_proposal(&mut self, block: &Block, _: &Tx) -> Result<(), Self::Error> {
        self.reject_block(block)
    }

    fn apricot_standard(&mut self, block: &Block, _: &[Tx]) -> Result<(), Self::Error> {
        self.reject_block(block)
    }

    fn apricot_atomic(&mut self, block: &Block, _: &Tx) -> Result<(), Self::Error> {
        self.reject_block(block)
    }
}
