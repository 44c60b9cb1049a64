/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The block model: the nine kinds of block a platform chain can contain, and their canonical encoding.
//!
//! ## Kinds of block
//!
//! Blocks come in two families. **Banff** blocks carry an explicit timestamp, and advance the chain time
//! to it. **Apricot** blocks carry no timestamp, and only change the chain time through a transaction
//! that does so explicitly. Within each family there are the following kinds:
//!
//! |Kind|Families|Payload|
//! |---|---|---|
//! |Standard|Banff, Apricot|An ordered list of transactions.|
//! |Proposal|Banff, Apricot|Exactly one transaction with two alternative outcomes.|
//! |Commit|Banff, Apricot|Nothing. Accepts the "commit" outcome of its parent proposal.|
//! |Abort|Banff, Apricot|Nothing. Accepts the "abort" outcome of its parent proposal.|
//! |Atomic|Apricot|Exactly one cross-chain transaction. Only valid before Apricot Phase 5.|
//!
//! Commit and Abort blocks are called **option** blocks. They are never independently constructed by
//! a block producer, but mechanically derived from a proposal by the [options] builder.
//!
//! ## Encoding and identity
//!
//! A block is encoded by the [codec](crate::codec) as a version number followed by a one-byte tag that
//! selects the kind of block, and then the fields of that kind. The tags are:
//!
//! |Tag|Kind|
//! |---|---|
//! |0|Apricot Proposal|
//! |1|Apricot Abort|
//! |2|Apricot Commit|
//! |3|Apricot Standard|
//! |4|Apricot Atomic|
//! |5|Banff Proposal|
//! |6|Banff Abort|
//! |7|Banff Commit|
//! |8|Banff Standard|
//!
//! A block's [id](Block::id) is the SHA256 hash of its complete encoding. Both the bytes and the id are
//! computed once, when the block is constructed or parsed, and never change afterwards.

pub mod options;

pub mod visitor;

use std::fmt::{self, Display, Formatter};

use borsh::{BorshDeserialize, BorshSerialize};

use crate::codec::{Codec, CodecError, CODEC, CODEC_VERSION};
use crate::types::{
    data_types::{BlockHeight, BlockId, Timestamp},
    transaction::Tx,
};

/// An immutable, content-addressed block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Block {
    id: BlockId,
    parent: BlockId,
    height: BlockHeight,
    bytes: Vec<u8>,
    kind: BlockKind,
}

/// The kind-specific payload of a [`Block`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BlockKind {
    BanffAbort {
        time: Timestamp,
    },
    BanffCommit {
        time: Timestamp,
    },
    BanffProposal {
        time: Timestamp,
        tx: Tx,
        /// Currently unused. A block that populates this list is invalid.
        transactions: Vec<Tx>,
    },
    BanffStandard {
        time: Timestamp,
        transactions: Vec<Tx>,
    },
    ApricotAbort,
    ApricotCommit,
    ApricotProposal {
        tx: Tx,
    },
    ApricotStandard {
        transactions: Vec<Tx>,
    },
    ApricotAtomic {
        tx: Tx,
    },
}

/// The encoded form of a block. Variant order fixes the tag of each kind, and must never change.
#[derive(BorshSerialize, BorshDeserialize)]
enum WireBlock {
    ApricotProposal {
        parent: BlockId,
        height: BlockHeight,
        tx: Tx,
    },
    ApricotAbort {
        parent: BlockId,
        height: BlockHeight,
    },
    ApricotCommit {
        parent: BlockId,
        height: BlockHeight,
    },
    ApricotStandard {
        parent: BlockId,
        height: BlockHeight,
        transactions: Vec<Tx>,
    },
    ApricotAtomic {
        parent: BlockId,
        height: BlockHeight,
        tx: Tx,
    },
    BanffProposal {
        time: Timestamp,
        parent: BlockId,
        height: BlockHeight,
        transactions: Vec<Tx>,
        tx: Tx,
    },
    BanffAbort {
        time: Timestamp,
        parent: BlockId,
        height: BlockHeight,
    },
    BanffCommit {
        time: Timestamp,
        parent: BlockId,
        height: BlockHeight,
    },
    BanffStandard {
        time: Timestamp,
        parent: BlockId,
        height: BlockHeight,
        transactions: Vec<Tx>,
    },
}

impl Block {
    /// Decode a block from its canonical encoding.
    ///
    /// Blocks received from peers are parsed with [`CODEC`](crate::codec::CODEC). Blocks read back
    /// from the persistent store, and the genesis block, are parsed with
    /// [`GENESIS_CODEC`](crate::codec::GENESIS_CODEC).
    pub fn parse(codec: &Codec, bytes: &[u8]) -> Result<Block, BlockError> {
        let wire: WireBlock = codec.unmarshal(bytes)?;
        Block::from_wire(codec, wire, bytes.to_vec())
    }

    pub fn new_banff_standard(
        time: Timestamp,
        parent: BlockId,
        height: BlockHeight,
        transactions: Vec<Tx>,
    ) -> Result<Block, BlockError> {
        Block::encode(WireBlock::BanffStandard {
            time,
            parent,
            height,
            transactions,
        })
    }

    pub fn new_banff_proposal(
        time: Timestamp,
        parent: BlockId,
        height: BlockHeight,
        tx: Tx,
        transactions: Vec<Tx>,
    ) -> Result<Block, BlockError> {
        Block::encode(WireBlock::BanffProposal {
            time,
            parent,
            height,
            transactions,
            tx,
        })
    }

    pub fn new_banff_commit(
        time: Timestamp,
        parent: BlockId,
        height: BlockHeight,
    ) -> Result<Block, BlockError> {
        Block::encode(WireBlock::BanffCommit {
            time,
            parent,
            height,
        })
    }

    pub fn new_banff_abort(
        time: Timestamp,
        parent: BlockId,
        height: BlockHeight,
    ) -> Result<Block, BlockError> {
        Block::encode(WireBlock::BanffAbort {
            time,
            parent,
            height,
        })
    }

    pub fn new_apricot_standard(
        parent: BlockId,
        height: BlockHeight,
        transactions: Vec<Tx>,
    ) -> Result<Block, BlockError> {
        Block::encode(WireBlock::ApricotStandard {
            parent,
            height,
            transactions,
        })
    }

    pub fn new_apricot_proposal(
        parent: BlockId,
        height: BlockHeight,
        tx: Tx,
    ) -> Result<Block, BlockError> {
        Block::encode(WireBlock::ApricotProposal { parent, height, tx })
    }

    pub fn new_apricot_commit(parent: BlockId, height: BlockHeight) -> Result<Block, BlockError> {
        Block::encode(WireBlock::ApricotCommit { parent, height })
    }

    pub fn new_apricot_abort(parent: BlockId, height: BlockHeight) -> Result<Block, BlockError> {
        Block::encode(WireBlock::ApricotAbort { parent, height })
    }

    pub fn new_apricot_atomic(
        parent: BlockId,
        height: BlockHeight,
        tx: Tx,
    ) -> Result<Block, BlockError> {
        Block::encode(WireBlock::ApricotAtomic { parent, height, tx })
    }

    fn encode(wire: WireBlock) -> Result<Block, BlockError> {
        let bytes = CODEC.marshal(CODEC_VERSION, &wire)?;
        Block::from_wire(&CODEC, wire, bytes)
    }

    fn from_wire(codec: &Codec, wire: WireBlock, bytes: Vec<u8>) -> Result<Block, BlockError> {
        let (parent, height, mut kind) = match wire {
            WireBlock::ApricotProposal { parent, height, tx } => {
                (parent, height, BlockKind::ApricotProposal { tx })
            }
            WireBlock::ApricotAbort { parent, height } => (parent, height, BlockKind::ApricotAbort),
            WireBlock::ApricotCommit { parent, height } => {
                (parent, height, BlockKind::ApricotCommit)
            }
            WireBlock::ApricotStandard {
                parent,
                height,
                transactions,
            } => (parent, height, BlockKind::ApricotStandard { transactions }),
            WireBlock::ApricotAtomic { parent, height, tx } => {
                (parent, height, BlockKind::ApricotAtomic { tx })
            }
            WireBlock::BanffProposal {
                time,
                parent,
                height,
                transactions,
                tx,
            } => (
                parent,
                height,
                BlockKind::BanffProposal {
                    time,
                    tx,
                    transactions,
                },
            ),
            WireBlock::BanffAbort {
                time,
                parent,
                height,
            } => (parent, height, BlockKind::BanffAbort { time }),
            WireBlock::BanffCommit {
                time,
                parent,
                height,
            } => (parent, height, BlockKind::BanffCommit { time }),
            WireBlock::BanffStandard {
                time,
                parent,
                height,
                transactions,
            } => (parent, height, BlockKind::BanffStandard { time, transactions }),
        };

        for tx in kind.txs_mut() {
            tx.initialize(codec).map_err(|source| BlockError::InitializeTx { source })?;
        }

        Ok(Block {
            id: BlockId::digest(&bytes),
            parent,
            height,
            bytes,
            kind,
        })
    }

    pub fn id(&self) -> BlockId {
        self.id
    }

    pub fn parent(&self) -> BlockId {
        self.parent
    }

    pub fn height(&self) -> BlockHeight {
        self.height
    }

    /// The canonical encoding of this block, exactly as it was constructed or parsed.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn kind(&self) -> &BlockKind {
        &self.kind
    }

    /// The timestamp of a Banff block. Apricot blocks have none.
    pub fn timestamp(&self) -> Option<Timestamp> {
        match &self.kind {
            BlockKind::BanffAbort { time }
            | BlockKind::BanffCommit { time }
            | BlockKind::BanffProposal { time, .. }
            | BlockKind::BanffStandard { time, .. } => Some(*time),
            BlockKind::ApricotAbort
            | BlockKind::ApricotCommit
            | BlockKind::ApricotProposal { .. }
            | BlockKind::ApricotStandard { .. }
            | BlockKind::ApricotAtomic { .. } => None,
        }
    }

    /// All the transactions this block carries, in block order.
    pub fn txs(&self) -> Vec<&Tx> {
        match &self.kind {
            BlockKind::BanffProposal {
                tx, transactions, ..
            } => transactions.iter().chain(std::iter::once(tx)).collect(),
            BlockKind::BanffStandard { transactions, .. }
            | BlockKind::ApricotStandard { transactions } => transactions.iter().collect(),
            BlockKind::ApricotProposal { tx } | BlockKind::ApricotAtomic { tx } => vec![tx],
            BlockKind::BanffAbort { .. }
            | BlockKind::BanffCommit { .. }
            | BlockKind::ApricotAbort
            | BlockKind::ApricotCommit => Vec::new(),
        }
    }

    /// Whether this is a Commit or an Abort block.
    pub fn is_option(&self) -> bool {
        matches!(
            self.kind,
            BlockKind::BanffAbort { .. }
                | BlockKind::BanffCommit { .. }
                | BlockKind::ApricotAbort
                | BlockKind::ApricotCommit
        )
    }

    pub fn is_proposal(&self) -> bool {
        matches!(
            self.kind,
            BlockKind::BanffProposal { .. } | BlockKind::ApricotProposal { .. }
        )
    }

    /// Name of the kind of this block in PascalCase, for logging.
    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            BlockKind::BanffAbort { .. } => "BanffAbort",
            BlockKind::BanffCommit { .. } => "BanffCommit",
            BlockKind::BanffProposal { .. } => "BanffProposal",
            BlockKind::BanffStandard { .. } => "BanffStandard",
            BlockKind::ApricotAbort => "ApricotAbort",
            BlockKind::ApricotCommit => "ApricotCommit",
            BlockKind::ApricotProposal { .. } => "ApricotProposal",
            BlockKind::ApricotStandard { .. } => "ApricotStandard",
            BlockKind::ApricotAtomic { .. } => "ApricotAtomic",
        }
    }
}

impl BlockKind {
    fn txs_mut(&mut self) -> Vec<&mut Tx> {
        match self {
            BlockKind::BanffProposal {
                tx, transactions, ..
            } => transactions.iter_mut().chain(std::iter::once(tx)).collect(),
            BlockKind::BanffStandard { transactions, .. }
            | BlockKind::ApricotStandard { transactions } => transactions.iter_mut().collect(),
            BlockKind::ApricotProposal { tx } | BlockKind::ApricotAtomic { tx } => vec![tx],
            BlockKind::BanffAbort { .. }
            | BlockKind::BanffCommit { .. }
            | BlockKind::ApricotAbort
            | BlockKind::ApricotCommit => Vec::new(),
        }
    }
}

impl Display for Block {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} at height {}", self.kind_name(), self.id, self.height)
    }
}

#[derive(Debug)]
pub enum BlockError {
    Codec(CodecError),
    InitializeTx { source: CodecError },
}

impl From<CodecError> for BlockError {
    fn from(value: CodecError) -> Self {
        BlockError::Codec(value)
    }
}

impl Display for BlockError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            BlockError::Codec(err) => write!(f, "couldn't encode or decode block: {}", err),
            BlockError::InitializeTx { source } => {
                write!(f, "couldn't initialize a transaction of the block: {}", source)
            }
        }
    }
}

impl std::error::Error for BlockError {}
