/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Block processing core of a platform chain.
//!
//! This crate parses platform chain blocks, verifies them against the state of their parents, and
//! accepts or rejects them on the instruction of a consensus layer. Blocks come in two families: the
//! legacy Apricot family, and the timestamped Banff family that replaces it once the Banff fork
//! activates. See [`block`] for the block model, and [`engine::Manager`] for the entry point.
//!
//! The crate is generic over the persistent key-value store ([`state::pluggables::KVStore`]), the pool
//! of pending transactions ([`mempool::Mempool`]), the transaction business logic
//! ([`executor::TxExecutor`]), and the local clock ([`clock::Clock`]).

pub mod block;

pub mod clock;

pub mod codec;

pub mod config;

pub mod engine;

pub mod events;

pub mod executor;

pub(crate) mod logging;

pub mod mempool;

pub mod state;

pub mod types;
