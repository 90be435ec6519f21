//! Typed error definitions shared by the throttler and the pagination engine.
//!
//! [`K4Error`] carries enough classification for the pagination drivers to
//! decide between retrying, failing fast, and aborting before any network
//! call. All variants implement `std::error::Error` via `thiserror`, so they
//! integrate with `anyhow::Result` at the binary boundary.

use thiserror::Error;

/// Result alias used by the library crates.
pub type K4Result<T> = Result<T, K4Error>;

/// Domain-specific errors for the admission scheduler and pagination engine.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum K4Error {
    /// Configuration parsing or validation error.
    #[error("config error: {0}")]
    Config(String),

    /// A required argument was not supplied (e.g. forward pagination without `since`).
    #[error("arguments required: {0}")]
    ArgumentsRequired(String),

    /// The request cannot be satisfied as parameterised (e.g. a range needing
    /// more slices than the call budget allows).
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The remote side rejected the call because of rate limiting.
    #[error("rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    /// Transport-level failure (connect, timeout, reset).
    #[error("network error: {0}")]
    Network(String),

    /// The remote side returned an application-level error.
    #[error("exchange error: {0}")]
    Exchange(String),

    /// A response could not be decoded into records.
    #[error("parse error: {0}")]
    Parse(String),

    /// The scheduler dropped an admission without resolving it.
    #[error("throttler closed before admission was granted")]
    ThrottlerClosed,
}

impl K4Error {
    /// `true` for errors that must not be retried because retrying would add
    /// to the backpressure that caused them.
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, Self::RateLimitExceeded(_))
    }

    /// `true` for argument and configuration errors, which are raised before
    /// any network call is issued.
    pub fn is_usage(&self) -> bool {
        matches!(self, Self::Config(_) | Self::ArgumentsRequired(_) | Self::BadRequest(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        assert!(K4Error::RateLimitExceeded("429".into()).is_rate_limit());
        assert!(!K4Error::Network("reset".into()).is_rate_limit());
        assert!(K4Error::BadRequest("too wide".into()).is_usage());
        assert!(!K4Error::Exchange("boom".into()).is_usage());
    }

    #[test]
    fn display_carries_cause() {
        let e = K4Error::ArgumentsRequired("since".into());
        assert_eq!(e.to_string(), "arguments required: since");
    }
}
