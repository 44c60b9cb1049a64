/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Types that exist only to store bytes, and do not have any major "active" behavior.

use std::{
    fmt::{self, Debug, Display, Formatter},
    time::{Duration, SystemTime},
};

use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine as _};
use borsh::{BorshDeserialize, BorshSerialize};
use sha2::{Digest, Sha256};

/// A 32-byte SHA256 digest.
///
/// Blocks, transactions, UTXOs and chains are all identified by a `CryptoHash`. The hash of a block or
/// a transaction is always the digest of its canonical [encoding](crate::codec), computed once when the
/// value is constructed or parsed.
#[derive(
    Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, BorshDeserialize, BorshSerialize,
)]
pub struct CryptoHash([u8; 32]);

impl CryptoHash {
    /// Create a new `CryptoHash` wrapping `bytes`.
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the inner bytes of this `CryptoHash`.
    pub const fn bytes(&self) -> [u8; 32] {
        self.0
    }

    /// Compute the SHA256 digest of `bytes`.
    pub fn digest(bytes: &[u8]) -> Self {
        Self(Sha256::digest(bytes).into())
    }
}

impl Display for CryptoHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", STANDARD_NO_PAD.encode(self.0))
    }
}

impl Debug for CryptoHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(self, f)
    }
}

/// Identifier of a block: the hash of its canonical bytes.
pub type BlockId = CryptoHash;

/// Identifier of a transaction: the hash of its canonical bytes.
pub type TxId = CryptoHash;

/// Identifier of a consumable input (UTXO), used for conflict detection.
pub type InputId = CryptoHash;

/// Identifier of a chain that atomic transactions move funds to or from.
pub type ChainId = CryptoHash;

/// Height of a block in the chain. The genesis block has height 0.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize, BorshSerialize,
)]
pub struct BlockHeight(u64);

impl BlockHeight {
    pub const fn new(int: u64) -> Self {
        Self(int)
    }

    pub const fn int(&self) -> u64 {
        self.0
    }

    /// The height `rhs` blocks above this one, or `None` if it does not fit in a `u64`.
    pub const fn checked_add(self, rhs: u64) -> Option<BlockHeight> {
        match self.0.checked_add(rhs) {
            Some(int) => Some(BlockHeight(int)),
            None => None,
        }
    }
}

impl Display for BlockHeight {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// Chain time, in whole seconds since the Unix Epoch.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize, BorshSerialize,
)]
pub struct Timestamp(u64);

impl Timestamp {
    /// A timestamp that no real chain time will ever reach. Used as the "next change time" of a state
    /// that has no scheduled changes.
    pub const MAX: Timestamp = Timestamp(u64::MAX);

    pub const fn from_secs(secs: u64) -> Self {
        Self(secs)
    }

    pub const fn secs(&self) -> u64 {
        self.0
    }

    /// Add `duration` to this timestamp, clamping at [`Timestamp::MAX`].
    pub fn saturating_add(self, duration: Duration) -> Timestamp {
        Timestamp(self.0.saturating_add(duration.as_secs()))
    }
}

impl From<SystemTime> for Timestamp {
    fn from(time: SystemTime) -> Self {
        Timestamp(
            time.duration_since(SystemTime::UNIX_EPOCH)
                .map(|duration| duration.as_secs())
                .unwrap_or(0),
        )
    }
}

impl Display for Timestamp {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// Status of a block, as known to the local node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub enum BlockStatus {
    /// Verified and held in memory, waiting for consensus to decide on it.
    Processing,
    Accepted,
    Unknown,
}

/// Status of a transaction, as recorded in a state (diff or persistent).
#[derive(Clone, Copy, Debug, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub enum TxStatus {
    /// Included in an accepted (or, in a diff, a would-be-accepted) block.
    Committed,

    /// The rejected outcome of a proposal transaction.
    Aborted,
}
