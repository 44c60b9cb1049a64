use std::sync::{Arc, Mutex};

use platform_blocks::{clock::Clock, types::data_types::Timestamp};

/// A clock that only moves when told to. Clones share the same time.
#[derive(Clone)]
pub(crate) struct MockClock(Arc<Mutex<Timestamp>>);

impl MockClock {
    pub(crate) fn new(now: Timestamp) -> MockClock {
        MockClock(Arc::new(Mutex::new(now)))
    }

    pub(crate) fn set(&self, now: Timestamp) {
        *self.0.lock().unwrap() = now;
    }
}

impl Clock for MockClock {
    fn now(&self) -> Timestamp {
        *self.0.lock().unwrap()
    }
}
