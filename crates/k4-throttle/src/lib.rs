//! # k4-throttle
//!
//! Request admission scheduler. Every outbound call of a client asks the
//! [`Throttler`] for admission of `cost` units; the throttler admits requests
//! strictly in the order they were enqueued, as fast as the configured rate
//! model allows.
//!
//! ## Components
//!
//! - [`queue`]: FIFO of pending requests + the caller-side [`Admission`] future
//! - [`rate_model`]: [`TokenBucket`] and [`RollingWindow`] behind [`RateModel`]
//! - [`scheduler`]: the lazily started loop task driving the two
//! - [`config`]: serde-backed [`ThrottleConfig`]
//!
//! ## Example
//!
//! ```no_run
//! # async fn demo() -> k4_core::K4Result<()> {
//! use k4_throttle::{ThrottleConfig, Throttler};
//!
//! let throttler = Throttler::new(&ThrottleConfig::leaky_bucket(50.0))?;
//! let admitted = throttler.acquire(1.0).await?;
//! println!("admitted #{} at {}ms", admitted.sequence, admitted.at_ms);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod queue;
pub mod rate_model;
pub mod scheduler;

pub use config::{Algorithm, ThrottleConfig};
pub use queue::{Admission, Admitted};
pub use rate_model::{Decision, RateModel, RollingWindow, TokenBucket};
pub use scheduler::Throttler;
