/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

use std::collections::HashSet;

use crate::{
    block::Block,
    executor::OnAcceptFn,
    state::Diff,
    types::{
        data_types::{InputId, Timestamp},
        transaction::AtomicRequestsByChain,
    },
};

/// The result of verifying a block, kept in memory until the block is accepted or rejected.
pub(crate) struct BlockState {
    pub(crate) block: Block,

    /// State after accepting the block. `None` for proposal blocks, whose state after acceptance
    /// depends on which of their options is accepted.
    pub(crate) on_accept_state: Option<Diff>,

    /// Chain time after the block.
    pub(crate) timestamp: Timestamp,

    pub(crate) inputs: HashSet<InputId>,
    pub(crate) atomic_requests: AtomicRequestsByChain,
    pub(crate) on_accept: Option<OnAcceptFn>,

    pub(crate) proposal: Option<ProposalBlockState>,
}

pub(crate) struct ProposalBlockState {
    pub(crate) on_commit_state: Diff,
    pub(crate) on_abort_state: Diff,
    pub(crate) initially_prefer_commit: bool,
}

impl BlockState {
    /// State of a block that carries no transactions of its own.
    pub(crate) fn new(block: Block, on_accept_state: Diff) -> BlockState {
        BlockState {
            block,
            timestamp: on_accept_state.timestamp(),
            on_accept_state: Some(on_accept_state),
            inputs: HashSet::new(),
            atomic_requests: AtomicRequestsByChain::new(),
            on_accept: None,
            proposal: None,
        }
    }
}
