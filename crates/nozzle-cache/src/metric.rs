use serde::Serialize;
use std::time::Instant;

/// One timestamped sample with an expiry instant.
///
/// The expiry is fixed at construction; there is no "never expires" state.
/// Only `value` and `timestamp` appear in the JSON representation.
#[derive(Debug, Clone, Serialize)]
pub struct Metric {
    pub value: f64,
    pub timestamp: i64,
    #[serde(skip)]
    expires_at: Instant,
}

impl Metric {
    pub fn new(value: f64, timestamp: i64, expires_at: Instant) -> Self {
        Self {
            value,
            timestamp,
            expires_at,
        }
    }

    pub fn expired(&self, now: Instant) -> bool {
        self.expires_at <= now
    }
}
