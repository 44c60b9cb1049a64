/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Acceptance of pending blocks into the persistent state.
//!
//! ## Standard and atomic blocks
//!
//! The block's diff is applied to the persistent state, the block is stored as accepted together with
//! its atomic requests, and it becomes the last accepted block, all in one atomic write. Once the write
//! succeeds, the block's pending state is freed and its post-accept callback runs.
//!
//! ## Proposal blocks
//!
//! A proposal only becomes the last accepted block in memory. It stays pending, since its options
//! still need its diffs, and it is written into the persistent state together with whichever of its
//! options is accepted next.
//!
//! ## Option blocks
//!
//! The parent proposal and the option are both stored as accepted, the option's diff is applied, and
//! the option becomes the last accepted block, all in one atomic write. Once the write succeeds, the
//! pending states of the proposal, the option, and the option's sibling are freed.
//!
//! If the write fails, nothing reaches the persistent store and the freed pending states are put back.
//! A failure to commit into the store is still reported as fatal, and the caller must stop driving this
//! engine.

use std::{
    fmt::{self, Display, Formatter},
    time::SystemTime,
};

use crate::{
    block::{
        options::{build_options, OptionsError},
        visitor::Visitor,
        Block,
    },
    events::{AcceptBlockEvent, Event},
    mempool::Mempool,
    state::{pluggables::KVStore, State, StateError},
    types::{
        data_types::{BlockId, BlockStatus, Timestamp},
        transaction::Tx,
    },
};

use super::backend::Backend;

pub(crate) struct Acceptor<'a, K: KVStore, M: Mempool> {
    pub(crate) backend: &'a mut Backend<K, M>,
}

impl<K: KVStore, M: Mempool> Acceptor<'_, K, M> {
    fn publish(&self, block: &Block) {
        self.backend.events.publish(Event::AcceptBlock(AcceptBlockEvent {
            timestamp: SystemTime::now(),
            block: block.id(),
            kind: block.kind_name(),
            height: block.height(),
        }));
    }

    /// Buffer the writes of `stage` and commit them in one write batch. If staging or committing fails,
    /// nothing is written.
    fn write_atomically(
        &mut self,
        stage: impl FnOnce(&mut State<K>) -> Result<(), AcceptError>,
    ) -> Result<(), AcceptError> {
        let state = &mut self.backend.state;
        if let Err(err) = stage(state) {
            state.abort();
            return Err(err);
        }
        state.commit().map_err(AcceptError::Commit)
    }

    fn standard_block(&mut self, block: &Block) -> Result<(), AcceptError> {
        let block_id = block.id();
        let block_state = self
            .backend
            .free(&block_id)
            .ok_or(AcceptError::MissingBlockState { block: block_id })?;

        let written = self.write_atomically(|state| {
            let on_accept_state = block_state
                .on_accept_state
                .as_ref()
                .ok_or(AcceptError::MissingBlockState { block: block_id })?;
            state.add_block(block, BlockStatus::Accepted)?;
            state.set_last_accepted(&block_id)?;
            on_accept_state.apply(state)?;
            if !block_state.atomic_requests.is_empty() {
                state.add_atomic_requests(&block_id, &block_state.atomic_requests)?;
            }
            Ok(())
        });
        if let Err(err) = written {
            self.backend.insert(block_state);
            return Err(err);
        }

        self.backend.set_last_accepted(block_id);
        if let Some(on_accept) = block_state.on_accept {
            on_accept();
        }

        self.publish(block);
        Ok(())
    }

    fn proposal_block(&mut self, block: &Block) -> Result<(), AcceptError> {
        if !self.backend.is_pending(&block.id()) {
            return Err(AcceptError::MissingBlockState { block: block.id() });
        }
        self.backend.set_last_accepted(block.id());

        self.publish(block);
        Ok(())
    }

    fn option_block(&mut self, block: &Block) -> Result<(), AcceptError> {
        let block_id = block.id();
        let parent = block.parent();
        let parent_block = match self.backend.block_state(&parent) {
            Some(parent_state) => parent_state.block.clone(),
            None => return Err(AcceptError::MissingBlockState { block: parent }),
        };
        let (commit_block, abort_block) = build_options(&parent_block)?;
        let sibling = if commit_block.id() == block_id {
            abort_block.id()
        } else {
            commit_block.id()
        };

        let block_state = self
            .backend
            .free(&block_id)
            .ok_or(AcceptError::MissingBlockState { block: block_id })?;
        let parent_state = self.backend.free(&parent);
        let sibling_state = self.backend.free(&sibling);

        let written = self.write_atomically(|state| {
            let on_accept_state = block_state
                .on_accept_state
                .as_ref()
                .ok_or(AcceptError::MissingBlockState { block: block_id })?;
            state.add_block(&parent_block, BlockStatus::Accepted)?;
            state.add_block(block, BlockStatus::Accepted)?;
            state.set_last_accepted(&block_id)?;
            on_accept_state.apply(state)?;
            Ok(())
        });
        if let Err(err) = written {
            for freed in [Some(block_state), parent_state, sibling_state].into_iter().flatten() {
                self.backend.insert(freed);
            }
            return Err(err);
        }

        self.backend.set_last_accepted(block_id);
        if let Some(on_accept) = parent_state.and_then(|parent_state| parent_state.on_accept) {
            on_accept();
        }

        self.publish(block);
        Ok(())
    }
}

impl<K: KVStore, M: Mempool> Visitor for Acceptor<'_, K, M> {
    type Error = AcceptError;

    fn banff_abort(&mut self, block: &Block, _: Timestamp) -> Result<(), Self::Error> {
        self.option_block(block)
    }

    fn banff_commit(&mut self, block: &Block, _: Timestamp) -> Result<(), Self::Error> {
        self.option_block(block)
    }

    fn banff_proposal(
        &mut self,
        block: &Block,
        _: Timestamp,
        _: &Tx,
        _: &[Tx],
    ) -> Result<(), Self::Error> {
        self.proposal_block(block)
    }

    fn banff_standard(&mut self, block: &Block, _: Timestamp, _: &[Tx]) -> Result<(), Self::Error> {
        self.standard_block(block)
    }

    fn apricot_abort(&mut self, block: &Block) -> Result<(), Self::Error> {
        self.option_block(block)
    }

    fn apricot_commit(&mut self, block: &Block) -> Result<(), Self::Error> {
        self.option_block(block)
    }

    fn apricot_proposal(&mut self, block: &Block, _: &Tx) -> Result<(), Self::Error> {
        self.proposal_block(block)
    }

    fn apricot_standard(&mut self, block: &Block, _: &[Tx]) -> Result<(), Self::Error> {
        self.standard_block(block)
    }

    fn apricot_atomic(&mut self, block: &Block, _: &Tx) -> Result<(), Self::Error> {
        self.standard_block(block)
    }
}

#[derive(Debug)]
pub enum AcceptError {
    /// Writing into the persistent store failed. Fatal.
    Commit(StateError),
    State(StateError),
    /// The block, or the proposal an option block depends on, is not pending.
    MissingBlockState { block: BlockId },
    Options(OptionsError),
}

impl From<StateError> for AcceptError {
    fn from(value: StateError) -> Self {
        AcceptError::State(value)
    }
}

impl From<OptionsError> for AcceptError {
    fn from(value: OptionsError) -> Self {
        AcceptError::Options(value)
    }
}

impl Display for AcceptError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            AcceptError::Commit(err) => write!(f, "couldn't commit accepted block: {}", err),
            AcceptError::State(err) => write!(f, "{}", err),
            AcceptError::MissingBlockState { block } => {
                write!(f, "block {} is not pending", block)
            }
            AcceptError::Options(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for AcceptError {}
