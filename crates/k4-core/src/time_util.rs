//! Wall-clock timestamps and timeframe parsing.
//!
//! Everything here works on local wall-clock time; nothing attempts to
//! synchronise with a remote server clock.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{K4Error, K4Result};

#[inline]
fn since_epoch() -> std::time::Duration {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default()
}

/// Current time as **microseconds** since Unix epoch.
#[inline]
pub fn now_us() -> u64 {
    since_epoch().as_micros() as u64
}

/// Current time as **milliseconds** since Unix epoch.
#[inline]
pub fn now_ms() -> u64 {
    since_epoch().as_millis() as u64
}

/// Parse a timeframe such as `"1m"`, `"4h"` or `"1M"` into seconds.
///
/// Units: `s` second, `m` minute, `h` hour, `d` day, `w` week, `M` month
/// (30 days), `y` year (365 days). Units are case-sensitive: `m` is minutes,
/// `M` is months.
pub fn parse_timeframe(timeframe: &str) -> K4Result<u64> {
    let timeframe = timeframe.trim();
    let split = timeframe
        .char_indices()
        .last()
        .map(|(idx, _)| idx)
        .ok_or_else(|| K4Error::BadRequest("empty timeframe".into()))?;
    let (amount, unit) = timeframe.split_at(split);

    let amount: u64 = amount
        .parse()
        .map_err(|_| K4Error::BadRequest(format!("timeframe amount is not a number: {timeframe}")))?;

    let scale = match unit {
        "y" => 60 * 60 * 24 * 365,
        "M" => 60 * 60 * 24 * 30,
        "w" => 60 * 60 * 24 * 7,
        "d" => 60 * 60 * 24,
        "h" => 60 * 60,
        "m" => 60,
        "s" => 1,
        other => {
            return Err(K4Error::BadRequest(format!("timeframe unit {other} is not supported")));
        }
    };
    amount
        .checked_mul(scale)
        .ok_or_else(|| K4Error::BadRequest(format!("timeframe {timeframe} is too large")))
}

/// Timeframe duration in milliseconds.
pub fn timeframe_ms(timeframe: &str) -> K4Result<i64> {
    i64::try_from(parse_timeframe(timeframe)?)
        .ok()
        .and_then(|secs| secs.checked_mul(1000))
        .ok_or_else(|| K4Error::BadRequest(format!("timeframe {timeframe} is too large")))
}
