/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Functions that log out events.
//!
//! The logs defined in this module are printed if the user enabled them via the engine's
//! [config](crate::config::Configuration).
//!
//! The block engine logs using the [log](https://docs.rs/log/latest/log/) crate. To get these messages
//! printed onto a terminal or to a file, set up a
//! [logging implementation](https://docs.rs/log/latest/log/#available-logging-implementations).
//!
//! ## Log message format
//!
//! Log messages are CSVs (Comma Separated Values) with at least two values. The first two values are
//! always:
//! 1. The name of the [event](crate::events) in PascalCase (defined in this module as constants).
//! 2. The time the event was emitted (as number of seconds since the Unix Epoch).
//!
//! The rest of the values differ depending on the kind of event. For example, the following snippet
//! is how a [VerifyBlock](crate::events::VerifyBlockEvent) is printed:
//!
//! ```text
//! VerifyBlock, 1701329264, fNGCJyk, BanffStandard, 12
//! ```
//!
//! In the snippet:
//! - The third value is the first seven characters of the Base64 encoding of the id of the block.
//! - The fourth value is the kind of the block.
//! - The fifth value is the height of the block.

use std::time::SystemTime;

use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine as _};

use crate::events::*;

// Names of each event in PascalCase for printing:
pub const VERIFY_BLOCK: &str = "VerifyBlock";
pub const ACCEPT_BLOCK: &str = "AcceptBlock";
pub const REJECT_BLOCK: &str = "RejectBlock";
pub const DROP_TX: &str = "DropTx";

/// Implemented by event types. Used to get a closure that logs the event.
pub(crate) trait Logger {
    /// Returns a pointer to the default logging handler for a given event type.
    fn get_logger() -> Box<dyn Fn(&Self) + Send>;
}

impl Logger for VerifyBlockEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |verify_block_event: &VerifyBlockEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                VERIFY_BLOCK,
                secs_since_unix_epoch(verify_block_event.timestamp),
                first_seven_base64_chars(&verify_block_event.block.bytes()),
                verify_block_event.kind,
                verify_block_event.height
            )
        };
        Box::new(logger)
    }
}

impl Logger for AcceptBlockEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |accept_block_event: &AcceptBlockEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                ACCEPT_BLOCK,
                secs_since_unix_epoch(accept_block_event.timestamp),
                first_seven_base64_chars(&accept_block_event.block.bytes()),
                accept_block_event.kind,
                accept_block_event.height
            )
        };
        Box::new(logger)
    }
}

impl Logger for RejectBlockEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |reject_block_event: &RejectBlockEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                REJECT_BLOCK,
                secs_since_unix_epoch(reject_block_event.timestamp),
                first_seven_base64_chars(&reject_block_event.block.bytes()),
                reject_block_event.kind,
                reject_block_event.height
            )
        };
        Box::new(logger)
    }
}

impl Logger for DropTxEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |drop_tx_event: &DropTxEvent| {
            log::info!(
                "{}, {}, {}, {}",
                DROP_TX,
                secs_since_unix_epoch(drop_tx_event.timestamp),
                first_seven_base64_chars(&drop_tx_event.tx.bytes()),
                drop_tx_event.reason
            )
        };
        Box::new(logger)
    }
}

// Get a more readable representation of a bytesequence by base64-encoding it and taking the first 7 characters.
pub(crate) fn first_seven_base64_chars(bytes: &[u8]) -> String {
    let encoded = STANDARD_NO_PAD.encode(bytes);
    if encoded.len() > 7 {
        encoded[0..7].to_string()
    } else {
        encoded
    }
}

fn secs_since_unix_epoch(timestamp: SystemTime) -> u64 {
    timestamp
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|duration| duration.as_secs())
        .unwrap_or(0)
}
