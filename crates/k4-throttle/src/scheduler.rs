//! The scheduler: a lazily started Tokio task that drains the admission queue
//! through the rate model.
//!
//! # Lifecycle
//!
//! ```text
//!            acquire() on empty/idle throttler
//!   Idle ─────────────────────────────────────► Running (loop task spawned)
//!    ▲                                              │
//!    └──────────── queue drained (loop returns) ◄───┘
//! ```
//!
//! Enqueue and the drain check happen under the same lock, so a request can
//! never be stranded between a loop deciding to stop and a new loop being
//! spawned. At most one loop task mutates the state at any time. A loop task
//! dropped mid-drain (runtime shutdown) hands the phase back to Idle, so the
//! next `acquire` starts a fresh loop.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use k4_core::clock::{Clock, SystemClock};
use k4_core::error::K4Result;
use tracing::{debug, trace, warn};

use crate::config::ThrottleConfig;
use crate::queue::{Admission, AdmissionQueue, AdmissionRequest};
use crate::rate_model::{self, Decision, RateModel};

/// Loop state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopPhase {
    Idle,
    Running,
}

/// What one loop iteration did.
#[derive(Debug)]
enum Step {
    Drained,
    Admitted,
    Discarded,
    Wait(Duration),
}

struct SchedulerState {
    queue: AdmissionQueue,
    model: Box<dyn RateModel>,
    phase: LoopPhase,
    next_sequence: u64,
}

impl SchedulerState {
    fn step(&mut self, now_ms: f64) -> Step {
        let Some(head) = self.queue.head() else {
            self.phase = LoopPhase::Idle;
            return Step::Drained;
        };

        if head.is_abandoned() {
            let _ = self.queue.pop();
            return Step::Discarded;
        }

        match self.model.decide(now_ms, head.cost()) {
            Decision::Admit => {
                let Some(request) = self.queue.pop() else {
                    self.phase = LoopPhase::Idle;
                    return Step::Drained;
                };
                let sequence = self.next_sequence;
                self.next_sequence += 1;
                if !request.resolve(sequence, now_ms) {
                    trace!("[throttle] admission #{sequence} abandoned after being charged");
                }
                Step::Admitted
            }
            Decision::Wait(wait) => Step::Wait(wait),
        }
    }
}

struct Inner {
    state: Mutex<SchedulerState>,
    clock: Arc<dyn Clock>,
    default_cost: f64,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// FIFO admission scheduler shared by every outbound call of one client.
///
/// Cloning is cheap and yields a handle to the same queue and rate state.
/// [`acquire`](Throttler::acquire) must be called from within a Tokio
/// runtime, since the first request after an idle period spawns the loop.
#[derive(Clone)]
pub struct Throttler {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Throttler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.lock();
        f.debug_struct("Throttler")
            .field("model", &state.model.name())
            .field("phase", &state.phase)
            .field("queued", &state.queue.len())
            .finish()
    }
}

impl Throttler {
    /// Build a throttler on the wall clock.
    pub fn new(config: &ThrottleConfig) -> K4Result<Self> {
        Self::with_clock(config, SystemClock::shared())
    }

    /// Build a throttler reading time from `clock`.
    pub fn with_clock(config: &ThrottleConfig, clock: Arc<dyn Clock>) -> K4Result<Self> {
        config.validate()?;
        Ok(Self::from_model(rate_model::from_config(config), config.cost, clock))
    }

    /// Build a throttler around a custom rate model.
    pub fn from_model(model: Box<dyn RateModel>, default_cost: f64, clock: Arc<dyn Clock>) -> Self {
        let state = SchedulerState {
            queue: AdmissionQueue::new(),
            model,
            phase: LoopPhase::Idle,
            next_sequence: 0,
        };
        Self { inner: Arc::new(Inner { state: Mutex::new(state), clock, default_cost }) }
    }

    /// Enqueue a request of `cost` units and return its admission handle.
    ///
    /// The request takes its place in the queue immediately, before the
    /// handle is first polled. A cost that is not a finite non-negative number
    /// is replaced by the configured default.
    pub fn acquire(&self, cost: f64) -> Admission {
        let cost = if cost.is_finite() && cost >= 0.0 {
            cost
        } else {
            warn!("[throttle] invalid cost {cost}, using default {}", self.inner.default_cost);
            self.inner.default_cost
        };

        let (request, admission) = AdmissionRequest::new(cost);
        let start = {
            let mut state = self.inner.lock();
            state.queue.push(request);
            if state.phase == LoopPhase::Idle {
                state.phase = LoopPhase::Running;
                true
            } else {
                false
            }
        };

        if start {
            let guard = RunningGuard { inner: Arc::clone(&self.inner), armed: true };
            tokio::spawn(run_loop(guard));
        }
        admission
    }

    /// Enqueue a request charged at the configured default cost.
    pub fn acquire_default(&self) -> Admission {
        self.acquire(self.inner.default_cost)
    }

    /// Cost charged when the caller has no specific weight.
    pub fn default_cost(&self) -> f64 {
        self.inner.default_cost
    }

    /// Number of requests waiting for admission.
    pub fn queue_len(&self) -> usize {
        self.inner.lock().queue.len()
    }

    /// Whether a loop task is currently draining the queue.
    pub fn is_running(&self) -> bool {
        self.inner.lock().phase == LoopPhase::Running
    }
}

/// Ownership of the Running phase, moved into the loop task.
///
/// Puts the phase back to Idle when the task is dropped before draining, as
/// happens when its runtime shuts down (polled or not). Disarmed on a normal
/// exit, where `step` has already set Idle under the lock.
struct RunningGuard {
    inner: Arc<Inner>,
    armed: bool,
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        if self.armed {
            warn!("[throttle] scheduler loop dropped while running, marking idle");
            self.inner.lock().phase = LoopPhase::Idle;
        }
    }
}

/// Drain the queue, then return. Never runs concurrently with itself.
async fn run_loop(mut guard: RunningGuard) {
    debug!("[throttle] scheduler loop started");
    let inner = Arc::clone(&guard.inner);
    let mut admitted = 0u64;

    loop {
        let now = inner.clock.now_ms();
        let step = inner.lock().step(now);

        match step {
            Step::Drained => {
                guard.armed = false;
                break;
            }
            Step::Admitted => {
                admitted += 1;
                tokio::task::yield_now().await;
            }
            Step::Discarded => trace!("[throttle] discarded abandoned request"),
            Step::Wait(wait) => {
                trace!("[throttle] head blocked, sleeping {wait:?}");
                inner.clock.sleep(wait).await;
            }
        }
    }

    debug!("[throttle] scheduler idle after {admitted} admission(s)");
}

#[cfg(test)]
mod tests {
    use super::*;
    use k4_core::clock::VirtualClock;
    use k4_core::error::K4Error;

    fn bucket(clock: &Arc<VirtualClock>, capacity: f64, refill_rate: f64) -> Throttler {
        let config = ThrottleConfig {
            capacity,
            refill_rate: Some(refill_rate),
            ..ThrottleConfig::default()
        };
        Throttler::with_clock(&config, clock.clone()).unwrap()
    }

    #[tokio::test]
    async fn leaky_bucket_spaces_admissions() {
        let clock = VirtualClock::shared(0);
        let throttler = bucket(&clock, 1.0, 0.001);

        let handles: Vec<_> = (0..5).map(|_| throttler.acquire(1.0)).collect();
        let mut times = Vec::new();
        for h in handles {
            times.push(h.await.unwrap().at_ms);
        }

        assert_eq!(times[0], 0.0);
        for pair in times.windows(2) {
            let gap = pair[1] - pair[0];
            assert!((999.0..=1002.0).contains(&gap), "gap {gap} in {times:?}");
        }
    }

    #[tokio::test]
    async fn admissions_follow_enqueue_order() {
        let clock = VirtualClock::shared(0);
        let throttler = bucket(&clock, 3.0, 0.01);

        let costs = [2.0, 0.5, 3.0, 1.0, 1.0, 2.5, 0.1];
        let handles: Vec<_> = costs.iter().map(|&c| throttler.acquire(c)).collect();

        let mut last: Option<(u64, f64)> = None;
        for (i, h) in handles.into_iter().enumerate() {
            let a = h.await.unwrap();
            assert_eq!(a.sequence, i as u64);
            assert_eq!(a.cost, costs[i]);
            if let Some((seq, at)) = last {
                assert!(a.sequence > seq);
                assert!(a.at_ms >= at);
            }
            last = Some((a.sequence, a.at_ms));
        }
    }

    #[tokio::test]
    async fn loop_stops_when_idle_and_restarts() {
        let clock = VirtualClock::shared(0);
        let throttler = bucket(&clock, 1.0, 1.0);
        assert!(!throttler.is_running());

        throttler.acquire(1.0).await.unwrap();
        // Let the loop observe the empty queue.
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert!(!throttler.is_running());
        assert_eq!(throttler.queue_len(), 0);

        let second = throttler.acquire(1.0).await.unwrap();
        assert_eq!(second.sequence, 1);
    }

    #[tokio::test]
    async fn dropped_admission_is_not_charged() {
        let clock = VirtualClock::shared(0);
        let throttler = bucket(&clock, 1.0, 0.001);

        let first = throttler.acquire(1.0);
        let abandoned = throttler.acquire(1.0);
        let third = throttler.acquire(1.0);
        drop(abandoned);

        assert_eq!(first.await.unwrap().at_ms, 0.0);
        let third = third.await.unwrap();
        assert_eq!(third.sequence, 1);
        assert!(third.at_ms < 1_500.0, "third admitted at {}", third.at_ms);
    }

    #[tokio::test]
    async fn cancel_while_blocked_at_head() {
        let clock = VirtualClock::shared(0);
        let throttler = bucket(&clock, 1.0, 0.001);

        throttler.acquire(1.0).await.unwrap();
        let blocked = throttler.acquire(1.0);
        let next = throttler.acquire(1.0);
        tokio::task::yield_now().await;
        blocked.cancel();

        let next = next.await.unwrap();
        assert_eq!(next.sequence, 1);
    }

    #[tokio::test]
    async fn rolling_window_batches() {
        let clock = VirtualClock::shared(0);
        let config = ThrottleConfig::rolling_window(100.0, 1000.0);
        let throttler = Throttler::with_clock(&config, clock.clone()).unwrap();

        let handles: Vec<_> = (0..25).map(|_| throttler.acquire(1.0)).collect();
        let mut times = Vec::new();
        for h in handles {
            times.push(h.await.unwrap().at_ms);
        }

        assert!(times[..10].iter().all(|&t| t == 0.0));
        assert!(times[10..20].iter().all(|&t| t == 1000.0));
        assert!(times[20..].iter().all(|&t| t == 2000.0));
    }

    #[tokio::test]
    async fn invalid_cost_uses_default() {
        let clock = VirtualClock::shared(0);
        let config = ThrottleConfig { cost: 2.0, capacity: 10.0, tokens: 10.0, ..ThrottleConfig::default() };
        let throttler = Throttler::with_clock(&config, clock).unwrap();
        assert_eq!(throttler.acquire(f64::NAN).await.unwrap().cost, 2.0);
        assert_eq!(throttler.acquire(-1.0).await.unwrap().cost, 2.0);
        assert_eq!(throttler.acquire_default().await.unwrap().cost, 2.0);
    }

    #[tokio::test]
    async fn rejects_invalid_config() {
        let config = ThrottleConfig { capacity: 0.0, ..ThrottleConfig::default() };
        let err = Throttler::with_clock(&config, VirtualClock::shared(0)).unwrap_err();
        assert!(matches!(err, K4Error::Config(_)));
    }

    #[test]
    fn runtime_shutdown_leaves_throttler_reusable() {
        let throttler = Throttler::new(&ThrottleConfig::leaky_bucket(200.0)).unwrap();

        let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        let pending = rt.block_on(async {
            throttler.acquire(1.0).await.unwrap();
            let pending = throttler.acquire(1.0);
            tokio::task::yield_now().await;
            assert!(throttler.is_running());
            pending
        });
        drop(rt);
        assert!(!throttler.is_running());
        drop(pending);

        let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        let admitted = rt.block_on(async { tokio::time::timeout(Duration::from_secs(5), throttler.acquire(1.0)).await });
        assert!(matches!(admitted, Ok(Ok(_))));
    }

    #[tokio::test]
    async fn timeout_abandons_request() {
        let throttler = Throttler::new(&ThrottleConfig::leaky_bucket(60_000.0)).unwrap();
        throttler.acquire(1.0).await.unwrap();
        let waited = tokio::time::timeout(Duration::from_millis(20), throttler.acquire(1.0)).await;
        assert!(waited.is_err());
    }
}
