//! Consecutive-failure accounting shared by the drivers.

use k4_core::error::K4Error;
use tracing::warn;

/// Counts consecutive failures; a success resets the streak.
#[derive(Debug, Clone)]
pub struct ErrorStreak {
    count: u64,
    max_retries: u64,
}

impl ErrorStreak {
    pub fn new(max_retries: u64) -> Self {
        Self { count: 0, max_retries }
    }

    pub fn reset(&mut self) {
        self.count = 0;
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    /// Record a failure. Returns the error back once the streak exceeds the
    /// retry budget, so the caller can propagate it unchanged. Usage errors
    /// come back at once: the same request would fail the same way.
    pub fn record(&mut self, err: K4Error, context: &str) -> Result<(), K4Error> {
        if err.is_usage() {
            return Err(err);
        }
        self.count += 1;
        if self.count > self.max_retries {
            return Err(err);
        }
        warn!("[paginate] {context} failed ({}/{}), retrying: {err}", self.count, self.max_retries);
        Ok(())
    }
}
