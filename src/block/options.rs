/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Deterministic construction of the two option blocks of a proposal block.
//!
//! The Commit and Abort children of a proposal are fully determined by the proposal itself: they
//! sit at the next height, point at the proposal, and (for Banff proposals) carry exactly the
//! proposal's timestamp. Every node therefore derives byte-identical option blocks, with identical
//! ids.

use std::fmt::{self, Display, Formatter};

use crate::types::{
    data_types::{BlockHeight, BlockId, Timestamp},
    transaction::Tx,
};

use super::{visitor::Visitor, Block, BlockError};

/// Build the `(commit, abort)` children of `proposal`.
pub fn build_options(proposal: &Block) -> Result<(Block, Block), OptionsError> {
    let mut options = Options::default();
    proposal.visit(&mut options)?;
    match (options.commit_block, options.abort_block) {
        (Some(commit_block), Some(abort_block)) => Ok((commit_block, abort_block)),
        _ => Err(OptionsError::NotOracle {
            block: proposal.id(),
        }),
    }
}

fn next_height(proposal: &Block) -> Result<BlockHeight, OptionsError> {
    proposal
        .height()
        .checked_add(1)
        .ok_or(OptionsError::HeightOverflow {
            block: proposal.id(),
        })
}

#[derive(Default)]
struct Options {
    commit_block: Option<Block>,
    abort_block: Option<Block>,
}

impl Visitor for Options {
    type Error = OptionsError;

    fn banff_abort(&mut self, block: &Block, _: Timestamp) -> Result<(), Self::Error> {
        Err(OptionsError::NotOracle { block: block.id() })
    }

    fn banff_commit(&mut self, block: &Block, _: Timestamp) -> Result<(), Self::Error> {
        Err(OptionsError::NotOracle { block: block.id() })
    }

    fn banff_proposal(
        &mut self,
        block: &Block,
        time: Timestamp,
        _: &Tx,
        _: &[Tx],
    ) -> Result<(), Self::Error> {
        let next_height = next_height(block)?;
        self.commit_block = Some(Block::new_banff_commit(time, block.id(), next_height)?);
        self.abort_block = Some(Block::new_banff_abort(time, block.id(), next_height)?);
        Ok(())
    }

    fn banff_standard(&mut self, block: &Block, _: Timestamp, _: &[Tx]) -> Result<(), Self::Error> {
        Err(OptionsError::NotOracle { block: block.id() })
    }

    fn apricot_abort(&mut self, block: &Block) -> Result<(), Self::Error> {
        Err(OptionsError::NotOracle { block: block.id() })
    }

    fn apricot_commit(&mut self, block: &Block) -> Result<(), Self::Error> {
        Err(OptionsError::NotOracle { block: block.id() })
    }

    fn apricot_proposal(&mut self, block: &Block, _: &Tx) -> Result<(), Self::Error> {
        let next_height = next_height(block)?;
        self.commit_block = Some(Block::new_apricot_commit(block.id(), next_height)?);
        self.abort_block = Some(Block::new_apricot_abort(block.id(), next_height)?);
        Ok(())
    }

    fn apricot_standard(&mut self, block: &Block, _: &[Tx]) -> Result<(), Self::Error> {
        Err(OptionsError::NotOracle { block: block.id() })
    }

    fn apricot_atomic(&mut self, block: &Block, _: &Tx) -> Result<(), Self::Error> {
        Err(OptionsError::NotOracle { block: block.id() })
    }
}

#[derive(Debug)]
pub enum OptionsError {
    /// The block is not a proposal, and therefore has no options.
    NotOracle { block: BlockId },
    /// The proposal is not pending, so the local preference between its options is unknown.
    MissingBlockState { block: BlockId },
    /// The proposal is at the greatest representable height.
    HeightOverflow { block: BlockId },
    Block(BlockError),
}

impl From<BlockError> for OptionsError {
    fn from(value: BlockError) -> Self {
        OptionsError::Block(value)
    }
}

impl Display for OptionsError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            OptionsError::NotOracle { block } => write!(f, "block {} has no options", block),
            OptionsError::MissingBlockState { block } => {
                write!(f, "proposal block {} is not pending", block)
            }
            OptionsError::HeightOverflow { block } => {
                write!(f, "proposal block {} has no next height", block)
            }
            OptionsError::Block(err) => write!(f, "couldn't build option block: {}", err),
        }
    }
}

impl std::error::Error for OptionsError {}
