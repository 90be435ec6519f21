//! Throttler configuration.
//!
//! Keys follow the option names used across exchange clients (`refillRate`,
//! `rateLimit`, `windowSize`, ...). Everything has a default so an empty JSON
//! object is a valid configuration.

use std::time::Duration;

use k4_core::error::{K4Error, K4Result};
use serde::Deserialize;

/// Rate-limiting algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum Algorithm {
    /// Token bucket refilled continuously (`"leakyBucket"` in config).
    #[default]
    #[serde(rename = "leakyBucket", alias = "tokenBucket")]
    LeakyBucket,
    /// Total cost bounded within a trailing window.
    #[serde(rename = "rollingWindow")]
    RollingWindow,
}

/// Configuration for a [`Throttler`](crate::Throttler).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ThrottleConfig {
    /// Which rate model to run.
    pub algorithm: Algorithm,

    /// Tokens added per millisecond. Derived from `rate_limit` when absent.
    pub refill_rate: Option<f64>,

    /// Sleep between refills while the bucket is in deficit, in **seconds**.
    pub delay: f64,

    /// Bucket capacity (upper bound on accumulated tokens).
    pub capacity: f64,

    /// Cost charged when the caller does not specify one.
    pub cost: f64,

    /// Tokens in the bucket when the throttler is created.
    pub tokens: f64,

    /// Milliseconds per unit of cost.
    pub rate_limit: f64,

    /// Rolling window length in milliseconds.
    pub window_size: f64,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::LeakyBucket,
            refill_rate: None,
            delay: 0.001,
            capacity: 1.0,
            cost: 1.0,
            tokens: 0.0,
            rate_limit: 2000.0,
            window_size: 60_000.0,
        }
    }
}

impl ThrottleConfig {
    /// A token bucket admitting one unit every `rate_limit_ms`.
    pub fn leaky_bucket(rate_limit_ms: f64) -> Self {
        Self { rate_limit: rate_limit_ms, ..Self::default() }
    }

    /// A rolling window of `window_ms` admitting `window_ms / rate_limit_ms` units.
    pub fn rolling_window(rate_limit_ms: f64, window_ms: f64) -> Self {
        Self {
            algorithm: Algorithm::RollingWindow,
            rate_limit: rate_limit_ms,
            window_size: window_ms,
            ..Self::default()
        }
    }

    /// Effective refill rate in tokens per millisecond.
    pub fn effective_refill_rate(&self) -> f64 {
        match self.refill_rate {
            Some(rate) => rate,
            None if self.rate_limit > 0.0 => 1.0 / self.rate_limit,
            None => f64::MAX,
        }
    }

    /// Maximum total cost inside one rolling window.
    pub fn max_weight(&self) -> f64 {
        self.window_size / self.rate_limit
    }

    /// Refill delay as a `Duration`, rounded to the microsecond.
    pub fn delay_duration(&self) -> Duration {
        Duration::from_micros((self.delay * 1_000_000.0).round() as u64)
    }

    /// Reject values that would stall or corrupt the scheduler.
    pub fn validate(&self) -> K4Result<()> {
        let positive = |name: &str, v: f64| {
            if v.is_finite() && v > 0.0 {
                Ok(())
            } else {
                Err(K4Error::Config(format!("{name} must be a positive number, got {v}")))
            }
        };

        positive("cost", self.cost)?;
        if !self.tokens.is_finite() {
            return Err(K4Error::Config(format!("tokens must be finite, got {}", self.tokens)));
        }

        match self.algorithm {
            Algorithm::LeakyBucket => {
                positive("capacity", self.capacity)?;
                positive("delay", self.delay)?;
                if self.rate_limit.is_nan() || self.rate_limit < 0.0 {
                    return Err(K4Error::Config(format!(
                        "rateLimit must be non-negative, got {}",
                        self.rate_limit
                    )));
                }
                let rate = self.effective_refill_rate();
                if rate.is_nan() || rate <= 0.0 {
                    return Err(K4Error::Config(format!("refillRate must be positive, got {rate}")));
                }
            }
            Algorithm::RollingWindow => {
                positive("rateLimit", self.rate_limit)?;
                positive("windowSize", self.window_size)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_from_empty_json() {
        let cfg: ThrottleConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.algorithm, Algorithm::LeakyBucket);
        assert_eq!(cfg.capacity, 1.0);
        assert_eq!(cfg.delay_duration(), Duration::from_millis(1));
        assert_eq!(cfg.effective_refill_rate(), 1.0 / 2000.0);
        cfg.validate().unwrap();
    }

    #[test]
    fn camel_case_keys() {
        let cfg: ThrottleConfig = serde_json::from_str(
            r#"{"algorithm":"rollingWindow","rateLimit":50,"windowSize":1000,"cost":2}"#,
        )
        .unwrap();
        assert_eq!(cfg.algorithm, Algorithm::RollingWindow);
        assert_eq!(cfg.max_weight(), 20.0);
        assert_eq!(cfg.cost, 2.0);
        cfg.validate().unwrap();
    }

    #[test]
    fn explicit_refill_rate_wins() {
        let cfg: ThrottleConfig = serde_json::from_str(r#"{"refillRate":0.25,"rateLimit":10}"#).unwrap();
        assert_eq!(cfg.effective_refill_rate(), 0.25);
    }

    #[test]
    fn zero_rate_limit_means_unthrottled() {
        let cfg = ThrottleConfig::leaky_bucket(0.0);
        assert_eq!(cfg.effective_refill_rate(), f64::MAX);
        cfg.validate().unwrap();
    }

    #[test]
    fn rejects_bad_values() {
        let mut cfg = ThrottleConfig::default();
        cfg.cost = 0.0;
        assert!(matches!(cfg.validate(), Err(K4Error::Config(_))));

        let mut cfg = ThrottleConfig::rolling_window(0.0, 1000.0);
        assert!(cfg.validate().is_err());
        cfg.rate_limit = 10.0;
        cfg.window_size = f64::NAN;
        assert!(cfg.validate().is_err());

        let mut cfg = ThrottleConfig::default();
        cfg.refill_rate = Some(-1.0);
        assert!(cfg.validate().is_err());
    }
}
