//! Cumulative per-user byte counters.

use dashmap::DashMap;
use std::collections::BTreeMap;

/// Bytes streamed per user since startup.
#[derive(Debug, Default)]
pub struct UserStats {
    bytes_streamed: DashMap<String, u64>,
}

impl UserStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_bytes_streamed(&self, username: &str, bytes: u64) {
        if bytes == 0 {
            return;
        }
        *self.bytes_streamed.entry(username.to_string()).or_insert(0) += bytes;
    }

    pub fn bytes_streamed(&self, username: &str) -> u64 {
        self.bytes_streamed.get(username).map(|b| *b).unwrap_or(0)
    }

    pub fn snapshot(&self) -> BTreeMap<String, u64> {
        self.bytes_streamed
            .iter()
            .map(|e| (e.key().clone(), *e.value()))
            .collect()
    }
}
