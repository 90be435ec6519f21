//! Pagination options and their per-call resolution.
//!
//! Each option is looked up, in order, in the call's params (and removed from
//! them so the source never sees it), in the per-method table, then in the
//! defaults.

use std::collections::HashMap;

use k4_core::error::{K4Error, K4Result};
use serde::Deserialize;
use serde_json::Value;

use crate::source::Params;

pub const KEY_CALLS: &str = "paginationCalls";
pub const KEY_RETRIES: &str = "maxRetries";
pub const KEY_MAX_ENTRIES: &str = "maxEntriesPerRequest";
pub const KEY_DIRECTION: &str = "paginationDirection";

/// Time direction for the dynamic driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Newest page first, walking `until` back in time.
    #[default]
    Backward,
    /// From `since` forward.
    Forward,
}

impl std::str::FromStr for Direction {
    type Err = K4Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "backward" => Ok(Self::Backward),
            "forward" => Ok(Self::Forward),
            other => Err(K4Error::BadRequest(format!("unknown paginationDirection: {other}"))),
        }
    }
}

/// Partial option set, used for per-method overrides.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionOverrides {
    pub pagination_calls: Option<u64>,
    pub max_retries: Option<u64>,
    pub max_entries_per_request: Option<u64>,
    pub pagination_direction: Option<Direction>,
}

/// Pagination defaults plus per-method overrides.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PaginationOptions {
    /// Upper bound on calls per paginated fetch.
    pub pagination_calls: u64,
    /// Consecutive failures tolerated before the error propagates.
    pub max_retries: u64,
    /// Page size requested from the source.
    pub max_entries_per_request: u64,
    /// Dynamic driver direction.
    pub pagination_direction: Direction,
    /// Overrides keyed by method name (e.g. `"fetchOHLCV"`).
    pub methods: HashMap<String, OptionOverrides>,
}

impl Default for PaginationOptions {
    fn default() -> Self {
        Self {
            pagination_calls: 10,
            max_retries: 3,
            max_entries_per_request: 1000,
            pagination_direction: Direction::Backward,
            methods: HashMap::new(),
        }
    }
}

/// Options in force for one paginated call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedOptions {
    pub max_calls: u64,
    pub max_retries: u64,
    pub max_entries_per_request: u64,
    pub direction: Direction,
}

fn param_u64(params: &mut Params, key: &str) -> K4Result<Option<u64>> {
    match params.remove(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_u64()
            .map(Some)
            .ok_or_else(|| K4Error::BadRequest(format!("{key} must be a non-negative integer, got {n}"))),
        Some(Value::String(s)) => s
            .parse()
            .map(Some)
            .map_err(|_| K4Error::BadRequest(format!("{key} must be a non-negative integer, got {s:?}"))),
        Some(other) => Err(K4Error::BadRequest(format!("{key} must be a non-negative integer, got {other}"))),
    }
}

fn param_direction(params: &mut Params) -> K4Result<Option<Direction>> {
    match params.remove(KEY_DIRECTION) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => s.parse().map(Some),
        Some(other) => Err(K4Error::BadRequest(format!("{KEY_DIRECTION} must be a string, got {other}"))),
    }
}

impl PaginationOptions {
    /// Resolve the options for one call of `method`, stripping option keys
    /// from `params`.
    pub fn resolve(&self, method: &str, params: &mut Params) -> K4Result<ResolvedOptions> {
        let per_method = self.methods.get(method);
        let pick = |from_params: Option<u64>, from_method: Option<u64>, default: u64| {
            from_params.or(from_method).unwrap_or(default)
        };

        let calls = param_u64(params, KEY_CALLS)?;
        let retries = param_u64(params, KEY_RETRIES)?;
        let entries = param_u64(params, KEY_MAX_ENTRIES)?;
        let direction = param_direction(params)?;

        let resolved = ResolvedOptions {
            max_calls: pick(calls, per_method.and_then(|m| m.pagination_calls), self.pagination_calls),
            max_retries: pick(retries, per_method.and_then(|m| m.max_retries), self.max_retries),
            max_entries_per_request: pick(
                entries,
                per_method.and_then(|m| m.max_entries_per_request),
                self.max_entries_per_request,
            ),
            direction: direction
                .or(per_method.and_then(|m| m.pagination_direction))
                .unwrap_or(self.pagination_direction),
        };

        if resolved.max_entries_per_request == 0 {
            return Err(K4Error::BadRequest(format!("{KEY_MAX_ENTRIES} must be at least 1")));
        }
        Ok(resolved)
    }
}

/// Upper time bound from `until` (or its alias `till`), left in params.
pub fn until_from(params: &Params) -> Option<i64> {
    ["until", "till"].iter().find_map(|key| match params.get(*key)? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.parse().ok(),
        _ => None,
    })
}
