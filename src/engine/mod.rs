/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The block engine: verification, acceptance and rejection of blocks, and the in-memory table of
//! pending blocks they share.
//!
//! Users drive the engine through a [`Manager`]. The verifier, acceptor and rejector are
//! [visitors](crate::block::visitor::Visitor) over the nine kinds of blocks, each borrowing the
//! [`Backend`] for the duration of a single operation.

pub mod acceptor;

pub mod backend;

pub(crate) mod block_state;

pub mod manager;

pub(crate) mod rejector;

pub mod verifier;

pub use acceptor::AcceptError;
pub use backend::Backend;
pub use manager::Manager;
pub use verifier::VerifyError;
