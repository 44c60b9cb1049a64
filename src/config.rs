/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Operator-specified configuration of the block engine.

use std::time::Duration;

use typed_builder::TypedBuilder;

use crate::types::data_types::Timestamp;

/// Fork activation times, timing bounds, and logging switches of the block engine.
///
/// Every node of a chain must be configured with the same fork activation times: whether a fork is
/// active at a given chain time decides the validity of blocks.
#[derive(Clone, Debug, TypedBuilder)]
#[builder(builder_method(doc = "
    Create a builder for building a [Configuration]. On the builder call the following methods to construct a valid [Configuration].

    Required:
    - `.apricot_phase5_time(...)`
    - `.banff_time(...)`

    Optional:
    - `.sync_bound(...)`
    - `.max_future_start_time(...)`
    - `.dropped_tx_cache_size(...)`
    - `.log_events(...)`
"))]
pub struct Configuration {
    #[builder(setter(
        doc = "Set the chain time from which atomic transactions must be carried by standard blocks. Required."
    ))]
    pub apricot_phase5_time: Timestamp,

    #[builder(setter(
        doc = "Set the chain time from which only timestamped (Banff) blocks are valid. Required."
    ))]
    pub banff_time: Timestamp,

    #[builder(
        default = Duration::from_secs(10),
        setter(doc = "Set how far ahead of the local clock a block may move the chain time. Defaults to 10 seconds.")
    )]
    pub sync_bound: Duration,

    #[builder(
        default = Duration::from_secs(14 * 24 * 60 * 60),
        setter(doc = "Set how far ahead of the chain time a scheduled entry may start. Defaults to 14 days.")
    )]
    pub max_future_start_time: Duration,

    #[builder(
        default = 64,
        setter(doc = "Set how many dropped transactions are remembered, with the reason they were dropped. The least recently dropped one is forgotten first, and 0 remembers none. Defaults to 64.")
    )]
    pub dropped_tx_cache_size: usize,

    #[builder(
        default = false,
        setter(doc = "Enable logging of block engine events? Defaults to false.")
    )]
    pub log_events: bool,
}

impl Configuration {
    /// Whether Apricot Phase 5 is active at chain time `timestamp`.
    pub fn is_apricot_phase5_activated(&self, timestamp: Timestamp) -> bool {
        timestamp >= self.apricot_phase5_time
    }

    /// Whether Banff is active at chain time `timestamp`.
    pub fn is_banff_activated(&self, timestamp: Timestamp) -> bool {
        timestamp >= self.banff_time
    }
}
