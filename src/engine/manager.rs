/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The facade that the consensus layer drives.
//!
//! A [`Manager`] owns the [`Backend`] and hands it to the verifier, acceptor and rejector one
//! operation at a time. Every mutating method takes `&mut self`, so at most one operation runs on the
//! block engine at any moment.
//!
//! ## Lifecycle of a block
//!
//! 1. [`parse_block`](Manager::parse_block) turns bytes received from a peer into a [`Block`].
//! 2. [`verify`](Manager::verify) checks the block against the state of its parent and makes it
//!    pending.
//! 3. Consensus decides on the block, and calls either [`accept`](Manager::accept) or
//!    [`reject`](Manager::reject).
//!
//! For a proposal block, consensus also asks for its two [`options`](Manager::options), verifies them,
//! and later accepts one of them. Accepting an option implicitly discards the other.
//!
//! ## Example
//!
//! ```ignore
//! let mut manager = Manager::new(configuration, state, mempool, BasicTxExecutor::new(), Box::new(SystemClock), None)?;
//!
//! let block = manager.parse_block(&bytes)?;
//! manager.verify(&block)?;
//! manager.accept(&block.id())?;
//! ```

use std::sync::mpsc::Sender;

use crate::{
    block::{
        options::{build_options, OptionsError},
        Block, BlockError,
    },
    clock::Clock,
    codec::CODEC,
    config::Configuration,
    events::{Event, EventPublisher},
    executor::TxExecutor,
    mempool::Mempool,
    state::{pluggables::KVStore, State, StateError, StateRef, Versions},
    types::data_types::{BlockId, BlockStatus, TxId},
};

use super::{
    acceptor::{AcceptError, Acceptor},
    backend::Backend,
    rejector::Rejector,
    verifier::{VerifyError, Verifier},
};

pub struct Manager<K: KVStore, M: Mempool, E: TxExecutor> {
    backend: Backend<K, M>,
    executor: E,
    config: Configuration,
    clock: Box<dyn Clock>,
    bootstrapped: bool,
}

impl<K: KVStore, M: Mempool, E: TxExecutor> Manager<K, M, E> {
    /// Create a manager on top of an [initialized](State::initialize) persistent state. The manager
    /// starts out not bootstrapped.
    pub fn new(
        config: Configuration,
        state: State<K>,
        mempool: M,
        executor: E,
        clock: Box<dyn Clock>,
        event_sender: Option<Sender<Event>>,
    ) -> Result<Manager<K, M, E>, StateError> {
        let events = EventPublisher::new(config.log_events, event_sender);
        let backend = Backend::new(state, mempool, config.dropped_tx_cache_size, events)?;
        Ok(Manager {
            backend,
            executor,
            config,
            clock,
            bootstrapped: false,
        })
    }

    pub fn parse_block(&self, bytes: &[u8]) -> Result<Block, BlockError> {
        Block::parse(&CODEC, bytes)
    }

    /// Verify `block`. Verifying a block that is already pending succeeds without doing anything.
    pub fn verify(&mut self, block: &Block) -> Result<(), VerifyError> {
        if self.backend.is_pending(&block.id()) {
            return Ok(());
        }

        let now = self.clock.now();
        let mut verifier = Verifier {
            backend: &mut self.backend,
            executor: &self.executor,
            config: &self.config,
            now,
        };
        verifier.verify(block)
    }

    /// Accept the pending block `block`.
    ///
    /// # Errors
    ///
    /// [`AcceptError::Commit`] means the persistent store could not be written. The block engine must
    /// not be used anymore after this error.
    pub fn accept(&mut self, block: &BlockId) -> Result<(), AcceptError> {
        let block = match self.backend.block_state(block) {
            Some(block_state) => block_state.block.clone(),
            None => return Err(AcceptError::MissingBlockState { block: *block }),
        };

        let mut acceptor = Acceptor {
            backend: &mut self.backend,
        };
        block.visit(&mut acceptor)
    }

    /// Reject `block`. Rejecting a block that is not pending does nothing.
    pub fn reject(&mut self, block: &BlockId) {
        let block = match self.backend.block_state(block) {
            Some(block_state) => block_state.block.clone(),
            None => {
                log::trace!("Ignoring rejection of block {}, which is not pending", block);
                return;
            }
        };

        let mut rejector = Rejector {
            backend: &mut self.backend,
            add_txs_to_mempool: self.bootstrapped,
        };
        match block.visit(&mut rejector) {
            Ok(()) => {}
            Err(never) => match never {},
        }
    }

    pub fn get_block(&self, block: &BlockId) -> Result<Block, StateError> {
        self.backend.get_block(block)
    }

    /// The state after `block`, if it is available. See [`Versions::get_state`].
    pub fn get_state(&self, block: &BlockId) -> Option<StateRef<'_>> {
        self.backend.get_state(block)
    }

    pub fn last_accepted(&self) -> BlockId {
        self.backend.last_accepted()
    }

    /// The `(commit, abort)` options of the pending proposal `block`, ordered so that the option the
    /// local node initially prefers comes first.
    pub fn options(&self, block: &BlockId) -> Result<[Block; 2], OptionsError> {
        let block_state = self
            .backend
            .block_state(block)
            .ok_or(OptionsError::MissingBlockState { block: *block })?;
        let (commit_block, abort_block) = build_options(&block_state.block)?;

        let prefers_commit = block_state
            .proposal
            .as_ref()
            .map_or(true, |proposal| proposal.initially_prefer_commit);
        if prefers_commit {
            Ok([commit_block, abort_block])
        } else {
            Ok([abort_block, commit_block])
        }
    }

    /// [`BlockStatus::Processing`] for pending blocks, else the status recorded in the persistent
    /// store, else [`BlockStatus::Unknown`].
    pub fn status(&self, block: &BlockId) -> Result<BlockStatus, StateError> {
        if self.backend.is_pending(block) {
            return Ok(BlockStatus::Processing);
        }
        match self.backend.state.get_stateless_block(block) {
            Ok((_, status)) => Ok(status),
            Err(StateError::NotFound(_)) => Ok(BlockStatus::Unknown),
            Err(err) => Err(err),
        }
    }

    /// Set whether the node finished bootstrapping. Only a bootstrapped node hands the transactions of
    /// rejected blocks back to the mempool.
    pub fn set_bootstrapped(&mut self, bootstrapped: bool) {
        self.bootstrapped = bootstrapped;
    }

    pub fn drop_reason(&self, tx: &TxId) -> Option<&str> {
        self.backend.drop_reason(tx)
    }

    pub fn backend(&self) -> &Backend<K, M> {
        &self.backend
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }
}
