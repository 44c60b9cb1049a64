/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The pluggable seam between block verification and transaction-level business logic.
//!
//! The [verifier](crate::engine::verifier) decides *where* a transaction executes (which diff, in which
//! kind of block), and *what* to do with the outcome (conflict detection, merging atomic requests,
//! recording statuses). A [`TxExecutor`] decides whether a transaction is valid and what it changes.
//!
//! [`BasicTxExecutor`](basic::BasicTxExecutor) is a small reference executor that makes the block
//! engine usable end-to-end.

pub mod basic;

use std::{
    collections::HashSet,
    fmt::{self, Display, Formatter},
    time::Duration,
};

use crate::{
    codec::CodecError,
    config::Configuration,
    state::{Chain, Diff, StateChanges, StateError, Versions},
    types::{
        data_types::{InputId, Timestamp, TxId},
        transaction::{AtomicRequestsByChain, Tx},
    },
};

/// Callback that runs after the block that produced it is durably accepted.
pub type OnAcceptFn = Box<dyn FnOnce() + Send>;

/// Environment of a single block verification.
#[derive(Clone, Copy)]
pub struct ExecutionContext<'a> {
    pub config: &'a Configuration,

    /// The local clock's time at the start of the verification.
    pub now: Timestamp,
}

/// Side-effects of a transaction executed in a standard or atomic block, besides its writes to the
/// diff.
#[derive(Default)]
pub struct TxOutcome {
    /// Inputs consumed from outside of the chain's own state, e.g., from the shared memory of another
    /// chain. Two pending transactions on the same branch may never consume the same input.
    pub inputs: HashSet<InputId>,
    pub atomic_requests: AtomicRequestsByChain,
    pub on_accept: Option<OnAcceptFn>,
}

/// Result of a transaction executed in a proposal block.
pub struct ProposalTxOutcome {
    /// Whether the local node should initially prefer the commit option of the proposal.
    pub prefers_commit: bool,
}

pub trait TxExecutor {
    /// The next chain time at which the state changes on its own, e.g., because a scheduled entry
    /// starts or ends. [`Timestamp::MAX`] if no such change is scheduled.
    fn next_change_time(&self, chain: &dyn Chain) -> Result<Timestamp, TxError>;

    /// Compute the state changes caused by moving the chain time of `chain` to `new_time`.
    fn advance_time_to(
        &self,
        ctx: ExecutionContext,
        chain: &dyn Chain,
        new_time: Timestamp,
    ) -> Result<StateChanges, TxError>;

    /// Execute a transaction of a standard block against `diff`.
    fn execute_standard(
        &self,
        ctx: ExecutionContext,
        tx: &Tx,
        diff: &mut Diff,
        versions: &dyn Versions,
    ) -> Result<TxOutcome, TxError>;

    /// Execute the transaction of a proposal block, writing the outcome of committing it into
    /// `on_commit`, and the outcome of aborting it into `on_abort`.
    fn execute_proposal(
        &self,
        ctx: ExecutionContext,
        tx: &Tx,
        on_commit: &mut Diff,
        on_abort: &mut Diff,
        versions: &dyn Versions,
    ) -> Result<ProposalTxOutcome, TxError>;

    /// Execute the transaction of an atomic block against `diff`.
    fn execute_atomic(
        &self,
        ctx: ExecutionContext,
        tx: &Tx,
        diff: &mut Diff,
        versions: &dyn Versions,
    ) -> Result<TxOutcome, TxError>;
}

/// Check that the chain may move to `new_time`, given the time of its next scheduled change and the
/// local clock.
pub fn verify_new_chain_time(
    new_time: Timestamp,
    next_change_time: Timestamp,
    now: Timestamp,
    sync_bound: Duration,
) -> Result<(), ChainTimeError> {
    let upper_bound = now.saturating_add(sync_bound);
    if new_time > upper_bound {
        return Err(ChainTimeError::BeyondSyncBound {
            proposed: new_time,
            upper_bound,
        });
    }
    if new_time > next_change_time {
        return Err(ChainTimeError::AfterNextChangeTime {
            proposed: new_time,
            next_change_time,
        });
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainTimeError {
    BeyondSyncBound {
        proposed: Timestamp,
        upper_bound: Timestamp,
    },
    AfterNextChangeTime {
        proposed: Timestamp,
        next_change_time: Timestamp,
    },
}

impl Display for ChainTimeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ChainTimeError::BeyondSyncBound {
                proposed,
                upper_bound,
            } => write!(
                f,
                "proposed chain time {} is after the local sync bound {}",
                proposed, upper_bound
            ),
            ChainTimeError::AfterNextChangeTime {
                proposed,
                next_change_time,
            } => write!(
                f,
                "proposed chain time {} is after the next state change time {}",
                proposed, next_change_time
            ),
        }
    }
}

impl std::error::Error for ChainTimeError {}

#[derive(Debug)]
pub enum TxError {
    /// The kind of transaction cannot be carried by the kind of block it was found in.
    WrongTxType {
        tx: TxId,
        kind: &'static str,
        block_kind: &'static str,
    },
    MissingUtxo {
        tx: TxId,
        utxo: InputId,
    },
    DuplicateInput {
        tx: TxId,
        input: InputId,
    },
    InsufficientFunds {
        tx: TxId,
        consumed: u64,
        produced: u64,
    },
    InvalidTimelock {
        tx: TxId,
        reason: &'static str,
    },
    TimeNotAfterChainTime {
        tx: TxId,
        proposed: Timestamp,
        chain_time: Timestamp,
    },
    AdvanceTimeAfterBanff {
        tx: TxId,
    },
    ChainTime(ChainTimeError),
    State(StateError),
    Codec(CodecError),
}

impl From<StateError> for TxError {
    fn from(value: StateError) -> Self {
        TxError::State(value)
    }
}

impl From<CodecError> for TxError {
    fn from(value: CodecError) -> Self {
        TxError::Codec(value)
    }
}

impl From<ChainTimeError> for TxError {
    fn from(value: ChainTimeError) -> Self {
        TxError::ChainTime(value)
    }
}

impl Display for TxError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            TxError::WrongTxType {
                tx,
                kind,
                block_kind,
            } => write!(f, "{} transaction {} is not allowed in a {} block", kind, tx, block_kind),
            TxError::MissingUtxo { tx, utxo } => {
                write!(f, "transaction {} spends missing UTXO {}", tx, utxo)
            }
            TxError::DuplicateInput { tx, input } => {
                write!(f, "transaction {} spends input {} more than once", tx, input)
            }
            TxError::InsufficientFunds {
                tx,
                consumed,
                produced,
            } => write!(
                f,
                "transaction {} produces {} but only consumes {}",
                tx, produced, consumed
            ),
            TxError::InvalidTimelock { tx, reason } => {
                write!(f, "transaction {} schedules an invalid entry: {}", tx, reason)
            }
            TxError::TimeNotAfterChainTime {
                tx,
                proposed,
                chain_time,
            } => write!(
                f,
                "transaction {} proposes time {}, which is not after chain time {}",
                tx, proposed, chain_time
            ),
            TxError::AdvanceTimeAfterBanff { tx } => {
                write!(f, "transaction {} advances the time after the Banff fork", tx)
            }
            TxError::ChainTime(err) => write!(f, "{}", err),
            TxError::State(err) => write!(f, "{}", err),
            TxError::Codec(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for TxError {}
