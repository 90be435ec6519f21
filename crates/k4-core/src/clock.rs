//! Clock abstraction used by the scheduler and the deterministic paginator.
//!
//! Production code uses [`SystemClock`] (wall clock + Tokio timers). Tests
//! use [`VirtualClock`], whose `sleep` advances virtual time instantly so
//! that rate-limit schedules spanning seconds run in microseconds and
//! produce exact, repeatable timestamps.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::time_util;

/// Source of "now" and of suspension.
#[async_trait]
pub trait Clock: Send + Sync {
    /// Milliseconds since the clock's epoch, with sub-millisecond precision.
    fn now_ms(&self) -> f64;

    /// Suspend the calling task for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// Wall clock backed by `SystemTime` and `tokio::time::sleep`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SystemClock {
    pub fn shared() -> Arc<dyn Clock> {
        Arc::new(Self)
    }
}

#[async_trait]
impl Clock for SystemClock {
    fn now_ms(&self) -> f64 {
        time_util::now_us() as f64 / 1000.0
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Manually driven clock for tests and simulations.
///
/// Time only moves when [`advance`](VirtualClock::advance) or
/// [`sleep`](Clock::sleep) is called. Resolution is one microsecond.
#[derive(Debug, Default)]
pub struct VirtualClock {
    now_us: AtomicU64,
}

impl VirtualClock {
    /// Create a clock reading `start_ms`.
    pub fn new(start_ms: u64) -> Self {
        Self { now_us: AtomicU64::new(start_ms * 1000) }
    }

    pub fn shared(start_ms: u64) -> Arc<Self> {
        Arc::new(Self::new(start_ms))
    }

    /// Move time forward by `duration`.
    pub fn advance(&self, duration: Duration) {
        self.now_us.fetch_add(duration.as_micros() as u64, Ordering::SeqCst);
    }

    /// Jump to an absolute reading. Going backwards is allowed, which lets
    /// tests simulate a wall-clock step.
    pub fn set_ms(&self, ms: u64) {
        self.now_us.store(ms * 1000, Ordering::SeqCst);
    }
}

#[async_trait]
impl Clock for VirtualClock {
    fn now_ms(&self) -> f64 {
        self.now_us.load(Ordering::SeqCst) as f64 / 1000.0
    }

    async fn sleep(&self, duration: Duration) {
        self.advance(duration);
        // Let tasks woken before the sleep observe the old reading first.
        tokio::task::yield_now().await;
    }
}
