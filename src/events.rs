/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Definitions of block engine events for event handling and logging.
//!
//! Note: an event for a given action indicates that the action has been completed.

use std::sync::mpsc::Sender;
use std::time::SystemTime;

use crate::logging::Logger;
use crate::types::data_types::{BlockHeight, BlockId, TxId};

pub enum Event {
    VerifyBlock(VerifyBlockEvent),
    AcceptBlock(AcceptBlockEvent),
    RejectBlock(RejectBlockEvent),
    DropTx(DropTxEvent),
}

/// A block passed verification and is now pending.
pub struct VerifyBlockEvent {
    pub timestamp: SystemTime,
    pub block: BlockId,
    pub kind: &'static str,
    pub height: BlockHeight,
}

/// A block was accepted. For a proposal block, this only moves the last accepted pointer: its writes
/// reach the store together with its accepted option.
pub struct AcceptBlockEvent {
    pub timestamp: SystemTime,
    pub block: BlockId,
    pub kind: &'static str,
    pub height: BlockHeight,
}

pub struct RejectBlockEvent {
    pub timestamp: SystemTime,
    pub block: BlockId,
    pub kind: &'static str,
    pub height: BlockHeight,
}

/// A transaction failed execution while verifying a block, and was remembered as dropped.
pub struct DropTxEvent {
    pub timestamp: SystemTime,
    pub tx: TxId,
    pub reason: String,
}

/// Logs events if enabled, then forwards them to the user's event channel, if any.
pub(crate) struct EventPublisher {
    log_events: bool,
    sender: Option<Sender<Event>>,
}

impl EventPublisher {
    pub(crate) fn new(log_events: bool, sender: Option<Sender<Event>>) -> EventPublisher {
        EventPublisher { log_events, sender }
    }

    pub(crate) fn publish(&self, event: Event) {
        if self.log_events {
            match &event {
                Event::VerifyBlock(e) => VerifyBlockEvent::get_logger()(e),
                Event::AcceptBlock(e) => AcceptBlockEvent::get_logger()(e),
                Event::RejectBlock(e) => RejectBlockEvent::get_logger()(e),
                Event::DropTx(e) => DropTxEvent::get_logger()(e),
            }
        }

        if let Some(sender) = &self.sender {
            if sender.send(event).is_err() {
                log::trace!("Event receiver was dropped, event discarded");
            }
        }
    }
}
