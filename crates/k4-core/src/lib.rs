//! # k4-core
//!
//! Core crate shared by the throttler, the pagination engine and the runner:
//!
//! - **Error types** (`error`): domain-specific `K4Error` via thiserror
//! - **Clock** (`clock`): injectable time source (`SystemClock`, `VirtualClock`)
//! - **Time utilities** (`time_util`): wall-clock timestamps, timeframe parsing
//! - **Types** (`types`): the `Record` contract and concrete record types
//! - **Logging** (`logging`): tracing-based structured logging

pub mod clock;
pub mod error;
pub mod logging;
pub mod time_util;
pub mod types;

pub use error::{K4Error, K4Result};
// Re-export types at crate root for convenience.
pub use types::*;
