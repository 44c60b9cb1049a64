/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Verification of blocks against the state of their parents.
//!
//! A block that passes verification gets a [`BlockState`] in the [`Backend`], holding the diff(s) its
//! acceptance would apply. A block that fails verification leaves no trace in the backend, except that
//! a transaction that failed execution is remembered as dropped.
//!
//! ## Checks common to all blocks
//!
//! 1. The parent must be known, either pending or in the persistent store.
//! 2. The height must be exactly one more than the parent's.
//!
//! ## Checks specific to each family
//!
//! - Apricot blocks (except atomic blocks) are invalid once Banff is active at the parent's chain time.
//! - Banff blocks that are not options may not move the chain time backwards, past the local clock plus
//!   the configured sync bound, or past the next time the state is scheduled to change on its own.
//! - Banff option blocks must carry exactly the timestamp of their parent proposal.
//! - Atomic blocks are invalid once Apricot Phase 5 is active at the parent's chain time.
//!
//! ## Conflicts
//!
//! Two transactions in the same block may not consume the same input, and the inputs of a block may
//! not overlap with the inputs of any of its pending ancestors. Ancestors that are no longer pending
//! were accepted, and their inputs are gone from the state the block executed against.

use std::{
    collections::HashSet,
    fmt::{self, Display, Formatter},
    time::SystemTime,
};

use crate::{
    block::{visitor::Visitor, Block},
    config::Configuration,
    events::{Event, VerifyBlockEvent},
    executor::{
        verify_new_chain_time, ChainTimeError, ExecutionContext, OnAcceptFn, TxError, TxExecutor,
    },
    mempool::Mempool,
    state::{pluggables::KVStore, Chain, Diff, StateError, Versions},
    types::{
        data_types::{BlockHeight, BlockId, InputId, Timestamp, TxId, TxStatus},
        transaction::{AtomicRequestsByChain, Tx},
    },
};

use super::{
    backend::Backend,
    block_state::{BlockState, ProposalBlockState},
};

pub(crate) struct Verifier<'a, K: KVStore, M: Mempool> {
    pub(crate) backend: &'a mut Backend<K, M>,
    pub(crate) executor: &'a dyn TxExecutor,
    pub(crate) config: &'a Configuration,
    pub(crate) now: Timestamp,
}

impl<'a, K: KVStore, M: Mempool> Verifier<'a, K, M> {
    /// Verify `block`, and if it is valid, record its state in the backend.
    pub(crate) fn verify(&mut self, block: &Block) -> Result<(), VerifyError> {
        block.visit(self)?;

        self.backend.events.publish(Event::VerifyBlock(VerifyBlockEvent {
            timestamp: SystemTime::now(),
            block: block.id(),
            kind: block.kind_name(),
            height: block.height(),
        }));
        Ok(())
    }

    fn ctx(&self) -> ExecutionContext<'a> {
        ExecutionContext {
            config: self.config,
            now: self.now,
        }
    }

    fn common_block(&self, block: &Block) -> Result<(), VerifyError> {
        let parent = self
            .backend
            .get_block(&block.parent())
            .map_err(|err| match err {
                StateError::NotFound(_) => VerifyError::ParentNotFound {
                    block: block.id(),
                    parent: block.parent(),
                },
                err => VerifyError::from(err),
            })?;

        let expected = parent
            .height()
            .checked_add(1)
            .ok_or(VerifyError::HeightOverflow {
                block: block.id(),
                parent: block.parent(),
            })?;
        if block.height() != expected {
            return Err(VerifyError::IncorrectHeight {
                block: block.id(),
                expected,
                found: block.height(),
            });
        }
        Ok(())
    }

    fn apricot_common_block(&self, block: &Block) -> Result<(), VerifyError> {
        // Apricot blocks do not move the chain time on their own, so the parent's chain time is the
        // chain time this block is issued at.
        let timestamp = self.backend.get_timestamp(&block.parent())?;
        if self.config.is_banff_activated(timestamp) {
            return Err(VerifyError::ApricotBlockAfterFork {
                block: block.id(),
                timestamp,
            });
        }
        self.common_block(block)
    }

    fn banff_non_option_block(&self, block: &Block, time: Timestamp) -> Result<(), VerifyError> {
        self.common_block(block)?;

        let parent = block.parent();
        let parent_state = self
            .backend
            .get_state(&parent)
            .ok_or(VerifyError::MissingParentState { parent })?;

        let parent_timestamp = parent_state.get_timestamp()?;
        if time < parent_timestamp {
            return Err(VerifyError::ChildEarlierThanParent {
                block: block.id(),
                parent_timestamp,
                timestamp: time,
            });
        }

        let next_change_time = self
            .executor
            .next_change_time(&parent_state)
            .map_err(VerifyError::Executor)?;
        verify_new_chain_time(time, next_change_time, self.now, self.config.sync_bound)?;
        Ok(())
    }

    /// Verify a Commit (`commit == true`) or Abort option block, which takes over the corresponding
    /// diff of its parent proposal.
    fn option_block(
        &mut self,
        block: &Block,
        commit: bool,
        time: Option<Timestamp>,
    ) -> Result<(), VerifyError> {
        let parent = block.parent();
        let parent_option_state = if commit {
            self.backend.get_on_commit_state(&parent)
        } else {
            self.backend.get_on_abort_state(&parent)
        };
        let on_accept_state = parent_option_state
            .cloned()
            .ok_or(VerifyError::MissingParentState { parent })?;

        match time {
            Some(time) => {
                self.common_block(block)?;
                let parent_timestamp = self.backend.get_timestamp(&parent)?;
                if time != parent_timestamp {
                    return Err(VerifyError::OptionTimestampMismatch {
                        block: block.id(),
                        parent_timestamp,
                        timestamp: time,
                    });
                }
            }
            None => self.apricot_common_block(block)?,
        }

        self.backend
            .insert(BlockState::new(block.clone(), on_accept_state));
        Ok(())
    }

    /// Create the commit and abort diffs of a proposal block on top of its parent.
    fn proposal_diffs(&self, block: &Block) -> Result<(Diff, Diff), VerifyError> {
        let on_commit_state = Diff::new(block.parent(), &*self.backend)?;
        let on_abort_state = Diff::new(block.parent(), &*self.backend)?;
        Ok((on_commit_state, on_abort_state))
    }

    fn proposal_block(
        &mut self,
        block: &Block,
        tx: &Tx,
        mut on_commit_state: Diff,
        mut on_abort_state: Diff,
    ) -> Result<(), VerifyError> {
        let outcome = match self.executor.execute_proposal(
            self.ctx(),
            tx,
            &mut on_commit_state,
            &mut on_abort_state,
            &*self.backend,
        ) {
            Ok(outcome) => outcome,
            Err(err) => return Err(self.tx_failed(tx, err)),
        };

        on_commit_state.add_tx(tx, TxStatus::Committed);
        on_abort_state.add_tx(tx, TxStatus::Aborted);

        // Options never move the chain time, so either diff gives the chain time after the proposal.
        let timestamp = on_abort_state.timestamp();
        self.backend.insert(BlockState {
            block: block.clone(),
            on_accept_state: None,
            timestamp,
            inputs: HashSet::new(),
            atomic_requests: AtomicRequestsByChain::new(),
            on_accept: None,
            proposal: Some(ProposalBlockState {
                on_commit_state,
                on_abort_state,
                initially_prefer_commit: outcome.prefers_commit,
            }),
        });

        self.backend.mempool.remove(std::slice::from_ref(tx));
        Ok(())
    }

    fn standard_block(
        &mut self,
        block: &Block,
        transactions: &[Tx],
        mut on_accept_state: Diff,
    ) -> Result<(), VerifyError> {
        let mut inputs: HashSet<InputId> = HashSet::new();
        let mut atomic_requests = AtomicRequestsByChain::new();
        let mut on_accept_fns: Vec<OnAcceptFn> = Vec::new();

        for tx in transactions {
            let outcome = match self.executor.execute_standard(
                self.ctx(),
                tx,
                &mut on_accept_state,
                &*self.backend,
            ) {
                Ok(outcome) => outcome,
                Err(err) => return Err(self.tx_failed(tx, err)),
            };

            if !inputs.is_disjoint(&outcome.inputs) {
                return Err(VerifyError::ConflictingBatchTxs { block: block.id() });
            }
            inputs.extend(outcome.inputs);

            on_accept_state.add_tx(tx, TxStatus::Committed);
            if let Some(on_accept) = outcome.on_accept {
                on_accept_fns.push(on_accept);
            }

            for (chain, requests) in outcome.atomic_requests {
                atomic_requests.entry(chain).or_default().merge(requests);
            }
        }

        self.verify_unique_inputs(block, &inputs)?;

        let on_accept: Option<OnAcceptFn> = match on_accept_fns.len() {
            0 => None,
            1 => on_accept_fns.pop(),
            _ => Some(Box::new(move || {
                for on_accept in on_accept_fns {
                    on_accept()
                }
            })),
        };

        self.backend.insert(BlockState {
            block: block.clone(),
            timestamp: on_accept_state.timestamp(),
            on_accept_state: Some(on_accept_state),
            inputs,
            atomic_requests,
            on_accept,
            proposal: None,
        });

        self.backend.mempool.remove(transactions);
        Ok(())
    }

    /// Check that none of `inputs` were consumed by a pending ancestor of `block`.
    fn verify_unique_inputs(
        &self,
        block: &Block,
        inputs: &HashSet<InputId>,
    ) -> Result<(), VerifyError> {
        if inputs.is_empty() {
            return Ok(());
        }

        let mut ancestor = block.parent();
        while let Some(ancestor_state) = self.backend.block_state(&ancestor) {
            if !ancestor_state.inputs.is_disjoint(inputs) {
                return Err(VerifyError::ConflictingParentTxs {
                    block: block.id(),
                    ancestor,
                });
            }
            ancestor = ancestor_state.block.parent();
        }
        Ok(())
    }

    fn tx_failed(&mut self, tx: &Tx, err: TxError) -> VerifyError {
        self.backend.mark_dropped(tx.id(), err.to_string());
        VerifyError::TxFailed {
            tx: tx.id(),
            source: err,
        }
    }
}

impl<K: KVStore, M: Mempool> Visitor for Verifier<'_, K, M> {
    type Error = VerifyError;

    fn banff_abort(&mut self, block: &Block, time: Timestamp) -> Result<(), Self::Error> {
        self.option_block(block, false, Some(time))
    }

    fn banff_commit(&mut self, block: &Block, time: Timestamp) -> Result<(), Self::Error> {
        self.option_block(block, true, Some(time))
    }

    fn banff_proposal(
        &mut self,
        block: &Block,
        time: Timestamp,
        tx: &Tx,
        transactions: &[Tx],
    ) -> Result<(), Self::Error> {
        if !transactions.is_empty() {
            return Err(VerifyError::MultipleTransactions { block: block.id() });
        }
        self.banff_non_option_block(block, time)?;

        let (mut on_commit_state, mut on_abort_state) = self.proposal_diffs(block)?;

        let changes = self
            .executor
            .advance_time_to(self.ctx(), &on_commit_state.view(&*self.backend), time)
            .map_err(VerifyError::Executor)?;

        on_commit_state.set_timestamp(time);
        changes.apply(&mut on_commit_state);

        on_abort_state.set_timestamp(time);
        changes.apply(&mut on_abort_state);

        self.proposal_block(block, tx, on_commit_state, on_abort_state)
    }

    fn banff_standard(
        &mut self,
        block: &Block,
        time: Timestamp,
        transactions: &[Tx],
    ) -> Result<(), Self::Error> {
        self.banff_non_option_block(block, time)?;

        let mut on_accept_state = Diff::new(block.parent(), &*self.backend)?;

        let changes = self
            .executor
            .advance_time_to(self.ctx(), &on_accept_state.view(&*self.backend), time)
            .map_err(VerifyError::Executor)?;

        if changes.is_empty() && transactions.is_empty() {
            return Err(VerifyError::EmptyStandardBlock { block: block.id() });
        }

        on_accept_state.set_timestamp(time);
        changes.apply(&mut on_accept_state);

        self.standard_block(block, transactions, on_accept_state)
    }

    fn apricot_abort(&mut self, block: &Block) -> Result<(), Self::Error> {
        self.option_block(block, false, None)
    }

    fn apricot_commit(&mut self, block: &Block) -> Result<(), Self::Error> {
        self.option_block(block, true, None)
    }

    fn apricot_proposal(&mut self, block: &Block, tx: &Tx) -> Result<(), Self::Error> {
        self.apricot_common_block(block)?;

        let (on_commit_state, on_abort_state) = self.proposal_diffs(block)?;
        self.proposal_block(block, tx, on_commit_state, on_abort_state)
    }

    fn apricot_standard(&mut self, block: &Block, transactions: &[Tx]) -> Result<(), Self::Error> {
        self.apricot_common_block(block)?;

        let on_accept_state = Diff::new(block.parent(), &*self.backend)?;
        self.standard_block(block, transactions, on_accept_state)
    }

    fn apricot_atomic(&mut self, block: &Block, tx: &Tx) -> Result<(), Self::Error> {
        // Atomic blocks are checked against Apricot Phase 5 instead of Banff, which activates later.
        self.common_block(block)?;

        let parent = block.parent();
        let timestamp = self.backend.get_timestamp(&parent)?;
        if self.config.is_apricot_phase5_activated(timestamp) {
            return Err(VerifyError::AtomicAfterFork {
                block: block.id(),
                timestamp,
            });
        }

        let mut on_accept_state = Diff::new(parent, &*self.backend)?;
        let outcome = match self.executor.execute_atomic(
            self.ctx(),
            tx,
            &mut on_accept_state,
            &*self.backend,
        ) {
            Ok(outcome) => outcome,
            Err(err) => return Err(self.tx_failed(tx, err)),
        };

        on_accept_state.add_tx(tx, TxStatus::Committed);

        self.verify_unique_inputs(block, &outcome.inputs)?;

        self.backend.insert(BlockState {
            block: block.clone(),
            timestamp: on_accept_state.timestamp(),
            on_accept_state: Some(on_accept_state),
            inputs: outcome.inputs,
            atomic_requests: outcome.atomic_requests,
            on_accept: outcome.on_accept,
            proposal: None,
        });

        self.backend.mempool.remove(std::slice::from_ref(tx));
        Ok(())
    }
}

#[derive(Debug)]
pub enum VerifyError {
    ParentNotFound {
        block: BlockId,
        parent: BlockId,
    },
    IncorrectHeight {
        block: BlockId,
        expected: BlockHeight,
        found: BlockHeight,
    },
    /// The parent is at the greatest representable height, so no block can extend it.
    HeightOverflow {
        block: BlockId,
        parent: BlockId,
    },
    /// The state the block must be executed against is not available: the parent is neither pending
    /// (with a state) nor the last accepted block.
    MissingParentState {
        parent: BlockId,
    },
    OptionTimestampMismatch {
        block: BlockId,
        parent_timestamp: Timestamp,
        timestamp: Timestamp,
    },
    ChildEarlierThanParent {
        block: BlockId,
        parent_timestamp: Timestamp,
        timestamp: Timestamp,
    },
    ChainTime(ChainTimeError),
    EmptyStandardBlock {
        block: BlockId,
    },
    MultipleTransactions {
        block: BlockId,
    },
    AtomicAfterFork {
        block: BlockId,
        timestamp: Timestamp,
    },
    ApricotBlockAfterFork {
        block: BlockId,
        timestamp: Timestamp,
    },
    ConflictingBatchTxs {
        block: BlockId,
    },
    ConflictingParentTxs {
        block: BlockId,
        ancestor: BlockId,
    },
    TxFailed {
        tx: TxId,
        source: TxError,
    },
    /// The transaction executor failed outside of the execution of a specific transaction, e.g., while
    /// computing the effects of advancing the chain time.
    Executor(TxError),
    State(StateError),
}

impl From<StateError> for VerifyError {
    fn from(value: StateError) -> Self {
        match value {
            StateError::MissingParentState { block } => {
                VerifyError::MissingParentState { parent: block }
            }
            err => VerifyError::State(err),
        }
    }
}

impl From<ChainTimeError> for VerifyError {
    fn from(value: ChainTimeError) -> Self {
        VerifyError::ChainTime(value)
    }
}

impl Display for VerifyError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            VerifyError::ParentNotFound { block, parent } => {
                write!(f, "parent {} of block {} not found", parent, block)
            }
            VerifyError::IncorrectHeight {
                block,
                expected,
                found,
            } => write!(
                f,
                "incorrect height of block {}: expected {}, but found {}",
                block, expected, found
            ),
            VerifyError::HeightOverflow { block, parent } => write!(
                f,
                "block {} extends parent {}, which is at the greatest height",
                block, parent
            ),
            VerifyError::MissingParentState { parent } => {
                write!(f, "missing state of parent block {}", parent)
            }
            VerifyError::OptionTimestampMismatch {
                block,
                parent_timestamp,
                timestamp,
            } => write!(
                f,
                "option block {} has timestamp {}, but its parent has timestamp {}",
                block, timestamp, parent_timestamp
            ),
            VerifyError::ChildEarlierThanParent {
                block,
                parent_timestamp,
                timestamp,
            } => write!(
                f,
                "block {} has timestamp {}, which is before the chain time {}",
                block, timestamp, parent_timestamp
            ),
            VerifyError::ChainTime(err) => write!(f, "{}", err),
            VerifyError::EmptyStandardBlock { block } => {
                write!(f, "standard block {} performs no state changes", block)
            }
            VerifyError::MultipleTransactions { block } => {
                write!(f, "proposal block {} contains multiple transactions", block)
            }
            VerifyError::AtomicAfterFork { block, timestamp } => write!(
                f,
                "atomic block {} issued at chain time {}, after Apricot Phase 5",
                block, timestamp
            ),
            VerifyError::ApricotBlockAfterFork { block, timestamp } => write!(
                f,
                "apricot block {} issued at chain time {}, after Banff",
                block, timestamp
            ),
            VerifyError::ConflictingBatchTxs { block } => {
                write!(f, "block {} contains conflicting transactions", block)
            }
            VerifyError::ConflictingParentTxs { block, ancestor } => write!(
                f,
                "block {} contains a transaction that conflicts with pending ancestor {}",
                block, ancestor
            ),
            VerifyError::TxFailed { tx, source } => {
                write!(f, "transaction {} failed execution: {}", tx, source)
            }
            VerifyError::Executor(err) => write!(f, "{}", err),
            VerifyError::State(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for VerifyError {}
