//! Runner configuration, loaded from a single JSON file.
//!
//! # Example
//!
//! ```json
//! {
//!   "moduleName": "binance_trades",
//!   "logPath": "/tmp/log",
//!   "throttle": { "rateLimit": 50, "capacity": 1 },
//!   "pagination": { "paginationCalls": 5, "methods": { "fetchOHLCV": { "maxEntriesPerRequest": 1000 } } },
//!   "methodCosts": { "fetchOHLCV": 2 },
//!   "source": {
//!     "baseUrl": "https://api.binance.com",
//!     "endpoints": { "fetchTrades": "/api/v3/aggTrades", "fetchOHLCV": "/api/v3/klines" },
//!     "sinceParam": "startTime",
//!     "untilParam": "endTime"
//!   }
//! }
//! ```

use std::collections::HashMap;
use std::path::Path;

use anyhow::Context;
use k4_core::logging::LogFormat;
use k4_paginate::PaginationOptions;
use k4_throttle::ThrottleConfig;
use serde::Deserialize;

/// Top-level runner config.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunnerConfig {
    /// Log file prefix.
    #[serde(default = "default_module_name")]
    pub module_name: String,

    /// Directory for daily-rotating log files.
    #[serde(default)]
    pub log_path: Option<String>,

    #[serde(default)]
    pub log_format: LogFormat,

    #[serde(default)]
    pub throttle: ThrottleConfig,

    #[serde(default)]
    pub pagination: PaginationOptions,

    /// Admission cost per method; others pay `throttle.cost`.
    #[serde(default)]
    pub method_costs: HashMap<String, f64>,

    pub source: SourceConfig,
}

fn default_module_name() -> String {
    "k4-runner".to_string()
}

/// Where and how the HTTP page source sends its requests.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceConfig {
    /// REST base URL (e.g. `https://api.binance.com`).
    pub base_url: String,

    /// Path per method name.
    pub endpoints: HashMap<String, String>,

    #[serde(default = "default_symbol_param")]
    pub symbol_param: String,

    #[serde(default = "default_timeframe_param")]
    pub timeframe_param: String,

    #[serde(default = "default_since_param")]
    pub since_param: String,

    #[serde(default = "default_limit_param")]
    pub limit_param: String,

    /// Exchange name for the `until` bound; `None` sends it as `until`.
    #[serde(default)]
    pub until_param: Option<String>,

    /// Per-request timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Extra headers sent with every request.
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

fn default_symbol_param() -> String {
    "symbol".to_string()
}

fn default_timeframe_param() -> String {
    "interval".to_string()
}

fn default_since_param() -> String {
    "since".to_string()
}

fn default_limit_param() -> String {
    "limit".to_string()
}

fn default_timeout_ms() -> u64 {
    10_000
}

/// Load and validate a runner config from a JSON file.
pub fn load_config(path: &Path) -> anyhow::Result<RunnerConfig> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("failed to read config {}", path.display()))?;
    let config: RunnerConfig =
        serde_json::from_str(&content).with_context(|| format!("invalid config {}", path.display()))?;
    config.throttle.validate().context("invalid throttle section")?;
    if config.source.endpoints.is_empty() {
        anyhow::bail!("source.endpoints is empty");
    }
    Ok(config)
}
