/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Per-kind dispatch over blocks.
//!
//! Every component that behaves differently depending on the kind of a block (verification,
//! acceptance, rejection, option building) implements [`Visitor`], and is driven by
//! [`Block::visit`]. `Visitor` has no provided methods: adding a kind of block fails compilation of
//! every visitor until it handles the new kind.

use crate::types::{data_types::Timestamp, transaction::Tx};

use super::{Block, BlockKind};

pub trait Visitor {
    type Error;

    fn banff_abort(&mut self, block: &Block, time: Timestamp) -> Result<(), Self::Error>;

    fn banff_commit(&mut self, block: &Block, time: Timestamp) -> Result<(), Self::Error>;

    fn banff_proposal(
        &mut self,
        block: &Block,
        time: Timestamp,
        tx: &Tx,
        transactions: &[Tx],
    ) -> Result<(), Self::Error>;

    fn banff_standard(
        &mut self,
        block: &Block,
        time: Timestamp,
        transactions: &[Tx],
    ) -> Result<(), Self::Error>;

    fn apricot_abort(&mut self, block: &Block) -> Result<(), Self::Error>;

    fn apricot_commit(&mut self, block: &Block) -> Result<(), Self::Error>;

    fn apricot_proposal(&mut self, block: &Block, tx: &Tx) -> Result<(), Self::Error>;

    fn apricot_standard(&mut self, block: &Block, transactions: &[Tx]) -> Result<(), Self::Error>;

    fn apricot_atomic(&mut self, block: &Block, tx: &Tx) -> Result<(), Self::Error>;
}

impl Block {
    /// Call the method of `visitor` that matches the kind of this block.
    pub fn visit<V: Visitor + ?Sized>(&self, visitor: &mut V) -> Result<(), V::Error> {
        match &self.kind {
            BlockKind::BanffAbort { time } => visitor.banff_abort(self, *time),
            BlockKind::BanffCommit { time } => visitor.banff_commit(self, *time),
            BlockKind::BanffProposal {
                time,
                tx,
                transactions,
            } => visitor.banff_proposal(self, *time, tx, transactions),
            BlockKind::BanffStandard { time, transactions } => {
                visitor.banff_standard(self, *time, transactions)
            }
            BlockKind::ApricotAbort => visitor.apricot_abort(self),
            BlockKind::ApricotCommit => visitor.apricot_commit(self),
            BlockKind::ApricotProposal { tx } => visitor.apricot_proposal(self, tx),
            BlockKind::ApricotStandard { transactions } => {
                visitor.apricot_standard(self, transactions)
            }
            BlockKind::ApricotAtomic { tx } => visitor.apricot_atomic(self, tx),
        }
    }
}
