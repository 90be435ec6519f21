//! Rate models: decide whether the head of the admission queue may go now.
//!
//! A model is pure state + arithmetic over a caller-supplied `now`. It never
//! reads a clock or sleeps itself; the scheduler loop does both and feeds the
//! readings back in, which keeps the models unit-testable without a runtime.

use std::collections::VecDeque;
use std::time::Duration;

use crate::config::{Algorithm, ThrottleConfig};

/// Outcome of consulting a model for one request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Decision {
    /// Charge the cost and admit the request.
    Admit,
    /// Not yet; check again after this long.
    Wait(Duration),
}

/// A pluggable rate-limiting algorithm.
pub trait RateModel: Send {
    /// Decide for a request of `cost` at time `now_ms`. On [`Decision::Admit`]
    /// the model has already charged the cost.
    fn decide(&mut self, now_ms: f64, cost: f64) -> Decision;

    /// Short label for logs.
    fn name(&self) -> &'static str;
}

/// Build the model selected by `config`.
pub fn from_config(config: &ThrottleConfig) -> Box<dyn RateModel> {
    match config.algorithm {
        Algorithm::LeakyBucket => Box::new(TokenBucket::new(
            config.tokens,
            config.capacity,
            config.effective_refill_rate(),
            config.delay_duration(),
        )),
        Algorithm::RollingWindow => Box::new(RollingWindow::new(config.window_size, config.max_weight())),
    }
}

fn ms_to_duration(ms: f64) -> Duration {
    Duration::from_micros((ms.max(0.0) * 1000.0).ceil() as u64)
}

// ---------------------------------------------------------------------------
// TokenBucket
// ---------------------------------------------------------------------------

/// Continuously refilled token bucket.
///
/// A request is admitted whenever the balance is non-negative, even if its
/// cost exceeds the balance; the bucket then runs a deficit that has to be
/// refilled before the next admission. The balance therefore never drops
/// below `-cost` of the most expensive request.
#[derive(Debug, Clone)]
pub struct TokenBucket {
    tokens: f64,
    capacity: f64,
    /// Tokens per millisecond.
    refill_rate: f64,
    delay: Duration,
    last_refill_ms: Option<f64>,
}

impl TokenBucket {
    pub fn new(tokens: f64, capacity: f64, refill_rate: f64, delay: Duration) -> Self {
        Self { tokens: tokens.min(capacity), capacity, refill_rate, delay, last_refill_ms: None }
    }

    /// Current balance.
    pub fn tokens(&self) -> f64 {
        self.tokens
    }

    /// Credit tokens for the time elapsed since the last refill, capped at
    /// capacity. A clock that steps backwards credits nothing.
    pub fn refill(&mut self, now_ms: f64) {
        let last = self.last_refill_ms.unwrap_or(now_ms);
        let elapsed = (now_ms - last).max(0.0);
        if elapsed > 0.0 {
            self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity);
        }
        self.last_refill_ms = Some(now_ms);
    }
}

impl RateModel for TokenBucket {
    fn decide(&mut self, now_ms: f64, cost: f64) -> Decision {
        self.refill(now_ms);
        if self.tokens >= 0.0 {
            self.tokens -= cost;
            Decision::Admit
        } else {
            Decision::Wait(self.delay)
        }
    }

    fn name(&self) -> &'static str {
        "leakyBucket"
    }
}

// ---------------------------------------------------------------------------
// RollingWindow
// ---------------------------------------------------------------------------

/// Bounds the total cost accepted within any trailing window.
#[derive(Debug, Clone)]
pub struct RollingWindow {
    /// `(accepted_at_ms, cost)`, oldest first.
    log: VecDeque<(f64, f64)>,
    window_ms: f64,
    max_weight: f64,
}

impl RollingWindow {
    pub fn new(window_ms: f64, max_weight: f64) -> Self {
        Self { log: VecDeque::new(), window_ms, max_weight }
    }

    pub fn max_weight(&self) -> f64 {
        self.max_weight
    }

    /// Drop entries that fell out of `(now - window, now]`.
    fn expire(&mut self, now_ms: f64) {
        let window_start = now_ms - self.window_ms;
        while self.log.front().is_some_and(|&(at, _)| at <= window_start) {
            self.log.pop_front();
        }
    }

    /// Cost accepted within the trailing window ending at `now_ms`.
    pub fn weight_at(&mut self, now_ms: f64) -> f64 {
        self.expire(now_ms);
        self.log.iter().map(|&(_, cost)| cost).sum()
    }
}

impl RateModel for RollingWindow {
    fn decide(&mut self, now_ms: f64, cost: f64) -> Decision {
        let total = self.weight_at(now_ms);

        // An empty window admits even a request heavier than max_weight;
        // otherwise it could never be admitted at all.
        if total + cost <= self.max_weight || self.log.is_empty() {
            self.log.push_back((now_ms, cost));
            return Decision::Admit;
        }

        let wait_ms = match self.log.front() {
            Some(&(earliest, _)) => earliest + self.window_ms - now_ms,
            None => 0.0,
        };
        Decision::Wait(ms_to_duration(wait_ms))
    }

    fn name(&self) -> &'static str {
        "rollingWindow"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_admits_on_non_negative_balance() {
        let mut b = TokenBucket::new(0.0, 1.0, 0.001, Duration::from_millis(1));
        assert_eq!(b.decide(0.0, 1.0), Decision::Admit);
        assert_eq!(b.tokens(), -1.0);
        assert_eq!(b.decide(0.0, 1.0), Decision::Wait(Duration::from_millis(1)));
        assert_eq!(b.decide(500.0, 1.0), Decision::Wait(Duration::from_millis(1)));
        assert_eq!(b.decide(1000.0, 1.0), Decision::Admit);
    }

    #[test]
    fn bucket_refill_is_capped() {
        let mut b = TokenBucket::new(0.0, 5.0, 1.0, Duration::from_millis(1));
        b.refill(0.0);
        b.refill(1_000_000.0);
        assert_eq!(b.tokens(), 5.0);
    }

    #[test]
    fn bucket_ignores_backwards_clock() {
        let mut b = TokenBucket::new(0.0, 5.0, 1.0, Duration::from_millis(1));
        b.refill(100.0);
        b.refill(50.0);
        assert_eq!(b.tokens(), 0.0);
        b.refill(52.0);
        assert_eq!(b.tokens(), 2.0);
    }

    #[test]
    fn bucket_deficit_bounded_by_one_request() {
        let costs = [1.0, 3.0, 0.5, 7.0, 2.0, 7.0, 1.0, 4.5];
        let max_cost = costs.iter().cloned().fold(0.0, f64::max);
        let mut b = TokenBucket::new(2.0, 4.0, 0.01, Duration::from_millis(1));
        let mut now = 0.0;
        for cost in costs {
            loop {
                match b.decide(now, cost) {
                    Decision::Admit => break,
                    Decision::Wait(d) => now += d.as_secs_f64() * 1000.0,
                }
            }
            assert!(b.tokens() >= -max_cost, "tokens {} after cost {cost}", b.tokens());
        }
    }

    #[test]
    fn window_caps_weight() {
        let mut w = RollingWindow::new(1000.0, 3.0);
        assert_eq!(w.decide(0.0, 1.0), Decision::Admit);
        assert_eq!(w.decide(10.0, 1.0), Decision::Admit);
        assert_eq!(w.decide(20.0, 1.0), Decision::Admit);
        assert_eq!(w.decide(30.0, 1.0), Decision::Wait(Duration::from_millis(970)));
        // Entry at t=0 leaves the window at exactly t=1000.
        assert_eq!(w.decide(1000.0, 1.0), Decision::Admit);
        assert_eq!(w.weight_at(1000.0), 3.0);
    }

    #[test]
    fn window_never_exceeds_max_weight() {
        let mut w = RollingWindow::new(500.0, 4.0);
        let mut accepted: Vec<(f64, f64)> = Vec::new();
        let mut now = 0.0;
        for i in 0..40 {
            let cost = [1.0, 2.0, 0.5, 1.5][i % 4];
            loop {
                match w.decide(now, cost) {
                    Decision::Admit => {
                        accepted.push((now, cost));
                        break;
                    }
                    Decision::Wait(d) => now += d.as_secs_f64() * 1000.0,
                }
            }
            let in_window: f64 =
                accepted.iter().filter(|&&(at, _)| at > now - 500.0 && at <= now).map(|&(_, c)| c).sum();
            assert!(in_window <= 4.0, "window weight {in_window} at {now}");
        }
    }

    #[test]
    fn oversized_request_admitted_into_empty_window() {
        let mut w = RollingWindow::new(1000.0, 2.0);
        assert_eq!(w.decide(0.0, 5.0), Decision::Admit);
        assert!(matches!(w.decide(1.0, 1.0), Decision::Wait(_)));
    }

    #[test]
    fn stale_log_never_yields_negative_wait() {
        let mut w = RollingWindow::new(100.0, 1.0);
        assert_eq!(w.decide(0.0, 1.0), Decision::Admit);
        // Far in the future: the entry expires and the request goes straight in.
        assert_eq!(w.decide(10_000.0, 1.0), Decision::Admit);
        assert_eq!(ms_to_duration(-25.0), Duration::ZERO);
    }

    #[test]
    fn factory_selects_algorithm() {
        let cfg = ThrottleConfig::rolling_window(100.0, 1000.0);
        assert_eq!(from_config(&cfg).name(), "rollingWindow");
        assert_eq!(from_config(&ThrottleConfig::default()).name(), "leakyBucket");
    }
}
