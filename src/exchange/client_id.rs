use std::sync::Mutex;

use chrono::Utc;

pub const CLIENT_TAG: &str = "x-AZA737";
const COUNTER_START: u64 = 1_000_000;

/// Mints client order ids: tag + epoch millis + counter.
///
/// The counter is bumped and read under one lock, so two ids requested in
/// the same millisecond still differ.
#[derive(Debug)]
pub struct ClientOrderIdGenerator {
    tag: String,
    counter: Mutex<u64>,
}

impl ClientOrderIdGenerator {
    pub fn new() -> Self {
        Self::with_tag(CLIENT_TAG)
    }

    pub fn with_tag(tag: &str) -> Self {
        Self {
            tag: tag.to_string(),
            counter: Mutex::new(COUNTER_START),
        }
    }

    pub fn next(&self) -> String {
        let count = {
            // A poisoned counter still holds a valid value.
            let mut guard = self.counter.lock().unwrap_or_else(|e| e.into_inner());
            *guard += 1;
            *guard
        };
        format!("{}{}{}", self.tag, Utc::now().timestamp_millis(), count)
    }
}

impl Default for ClientOrderIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}
