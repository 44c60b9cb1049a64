/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Chain state: the persistent, accepted [`State`](base::State), and the speculative
//! [`Diff`](diff::Diff)s layered on top of it by pending blocks.

pub mod base;

pub mod diff;

pub mod pluggables;

pub mod variables;

pub use base::{State, StateError};
pub use diff::{Chain, Diff, DiffView, StateChanges, StateRef, Versions};
