/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Types that are used across multiple components of the crate.
//!
//! Types specific to a single component, e.g., [`Block`](crate::block::Block), live in the
//! component's own module.

pub mod data_types;

pub mod transaction;

pub mod update_sets;
