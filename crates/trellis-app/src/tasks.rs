//! Background task queues and the client callback interval.
//!
//! Applications that enqueue server-side work create task queues; while at
//! least one queue exists, the client polls the server at the smallest
//! interval requested by any queue (500 ms for queues with no explicit
//! request).

use std::collections::HashMap;

/// Default polling interval for a queue with no explicit setting.
pub const DEFAULT_CALLBACK_INTERVAL_MS: u64 = 500;

#[derive(Debug, Default)]
pub struct TaskQueues {
    intervals: HashMap<String, Option<u64>>,
}

impl TaskQueues {
    /// Creates (or keeps) a queue with the default interval.
    pub fn add_queue(&mut self, name: impl Into<String>) {
        self.intervals.entry(name.into()).or_insert(None);
    }

    pub fn set_interval(&mut self, name: impl Into<String>, millis: u64) {
        self.intervals.insert(name.into(), Some(millis));
    }

    pub fn remove_queue(&mut self, name: &str) {
        self.intervals.remove(name);
    }

    /// The interval the client should poll at: the minimum over all queues,
    /// or `None` when no queues exist (no polling).
    pub fn callback_interval(&self) -> Option<u64> {
        self.intervals
            .values()
            .map(|v| v.unwrap_or(DEFAULT_CALLBACK_INTERVAL_MS))
            .min()
    }
}
