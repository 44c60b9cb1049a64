/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Versioned, size-limited Borsh encoding shared by blocks and transactions.
//!
//! Every encoded value starts with the codec version as a little-endian `u16`, followed by the
//! [Borsh](https://borsh.io) serialization of the value. Borsh encodes enums with a one-byte variant
//! tag, integers as fixed-width little-endian, and vectors with a `u32` length prefix, which makes the
//! encoding canonical: a value has exactly one valid encoding, and decoding rejects trailing bytes.

use std::fmt::{self, Display, Formatter};
use std::io;

use borsh::{BorshDeserialize, BorshSerialize};

/// The only codec version currently understood.
pub const CODEC_VERSION: u16 = 0;

/// Maximum size, in bytes, of a value encoded by [`CODEC`].
pub const DEFAULT_MAX_SIZE: usize = 2 * 1024 * 1024;

/// Maximum size, in bytes, of a value encoded by [`GENESIS_CODEC`].
pub const GENESIS_MAX_SIZE: usize = i32::MAX as usize;

/// Codec used for blocks and transactions received during normal operation.
pub const CODEC: Codec = Codec::new(DEFAULT_MAX_SIZE);

/// Codec used for the genesis block and for blocks read back from the persistent store, which may be
/// larger than what would be accepted from a peer.
pub const GENESIS_CODEC: Codec = Codec::new(GENESIS_MAX_SIZE);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Codec {
    max_size: usize,
}

impl Codec {
    pub const fn new(max_size: usize) -> Codec {
        Codec { max_size }
    }

    pub const fn max_size(&self) -> usize {
        self.max_size
    }

    /// Encode `value`, prefixed with `version`.
    pub fn marshal<T: BorshSerialize>(&self, version: u16, value: &T) -> Result<Vec<u8>, CodecError> {
        if version != CODEC_VERSION {
            return Err(CodecError::UnknownVersion { version });
        }

        let mut bytes = version.to_le_bytes().to_vec();
        value
            .serialize(&mut bytes)
            .map_err(CodecError::Serialize)?;

        if bytes.len() > self.max_size {
            return Err(CodecError::TooLarge {
                size: bytes.len(),
                max_size: self.max_size,
            });
        }
        Ok(bytes)
    }

    /// Decode a value from `bytes`, which must contain exactly one versioned encoding.
    pub fn unmarshal<T: BorshDeserialize>(&self, bytes: &[u8]) -> Result<T, CodecError> {
        if bytes.len() > self.max_size {
            return Err(CodecError::TooLarge {
                size: bytes.len(),
                max_size: self.max_size,
            });
        }
        if bytes.len() < 2 {
            return Err(CodecError::MissingVersion);
        }

        let version = u16::from_le_bytes([bytes[0], bytes[1]]);
        if version != CODEC_VERSION {
            return Err(CodecError::UnknownVersion { version });
        }

        T::try_from_slice(&bytes[2..]).map_err(CodecError::Deserialize)
    }
}

#[derive(Debug)]
pub enum CodecError {
    Serialize(io::Error),
    Deserialize(io::Error),
    MissingVersion,
    UnknownVersion { version: u16 },
    TooLarge { size: usize, max_size: usize },
}

impl Display for CodecError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            CodecError::Serialize(err) => write!(f, "couldn't serialize value: {}", err),
            CodecError::Deserialize(err) => write!(f, "couldn't deserialize value: {}", err),
            CodecError::MissingVersion => write!(f, "encoding is too short to contain a codec version"),
            CodecError::UnknownVersion { version } => write!(f, "unknown codec version {}", version),
            CodecError::TooLarge { size, max_size } => {
                write!(f, "encoding of {} bytes exceeds the maximum of {} bytes", size, max_size)
            }
        }
    }
}

impl std::error::Error for CodecError {}
