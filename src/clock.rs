/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Source of the local wall-clock time, used to bound how far a block may move the chain time.

use std::time::SystemTime;

use crate::types::data_types::Timestamp;

pub trait Clock: Send {
    fn now(&self) -> Timestamp;
}

/// A [`Clock`] that reads the operating system's clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::from(SystemTime::now())
    }
}
