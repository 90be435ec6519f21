//! # k4-runner
//!
//! Runs one paginated fetch against a REST endpoint and prints the assembled
//! records to stdout, one JSON object per line.
//!
//! Every page call goes through the throttler configured in the JSON config,
//! so a long backfill stays inside the exchange's rate limits.
//!
//! # Usage
//!
//! ```bash
//! k4-runner config.json --method fetchOHLCV --symbol BTCUSDT \
//!     --strategy deterministic --timeframe 1m --since 1700000000000 \
//!     --param paginationCalls=20
//! ```

mod config;
mod http_source;

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use k4_core::logging::LogFormat;
use k4_core::types::Ohlcv;
use k4_paginate::{CursorSpec, Paginator, Query, Strategy, ThrottledSource};
use k4_throttle::Throttler;
use serde_json::Value;
use tracing::{info, warn};

use crate::http_source::HttpSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum StrategyKind {
    Dynamic,
    Deterministic,
    Cursor,
    Incremental,
}

/// Rate-limited paginated fetch runner.
#[derive(Parser)]
#[command(name = "k4-runner", about = "Rate-limited paginated fetch runner")]
struct Cli {
    /// Configuration file path (JSON).
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Log directory for file output; overrides `logPath`.
    #[arg(long)]
    log_dir: Option<String>,

    /// Console log format (pretty, json); overrides `logFormat`.
    #[arg(long)]
    log_format: Option<LogFormat>,

    /// Fetch method, e.g. fetchTrades or fetchOHLCV.
    #[arg(short, long)]
    method: String,

    #[arg(short, long)]
    symbol: Option<String>,

    #[arg(long, value_enum, default_value_t = StrategyKind::Dynamic)]
    strategy: StrategyKind,

    /// Lower time bound, ms since epoch.
    #[arg(long)]
    since: Option<i64>,

    /// Keep only the most recent N records.
    #[arg(long)]
    limit: Option<u64>,

    /// Candle timeframe (1m, 1h, 1d, ...).
    #[arg(long)]
    timeframe: Option<String>,

    /// Record field holding the next cursor (cursor strategy).
    #[arg(long)]
    cursor_received: Option<String>,

    /// Request parameter carrying the cursor (cursor strategy).
    #[arg(long)]
    cursor_sent: Option<String>,

    /// Added to numeric cursors before sending.
    #[arg(long)]
    cursor_increment: Option<i64>,

    /// Page-number parameter (incremental strategy).
    #[arg(long, default_value = "page")]
    page_key: String,

    /// Extra request parameter `key=value`; repeatable. Values that parse as
    /// JSON are sent typed, anything else as a string.
    #[arg(long = "param", value_parser = parse_param)]
    params: Vec<(String, Value)>,

    /// Decode rows as `[timestamp, open, high, low, close, volume]` candles
    /// and print them as objects.
    #[arg(long)]
    candles: bool,
}

impl Cli {
    fn strategy(&self) -> Result<Strategy> {
        Ok(match self.strategy {
            StrategyKind::Dynamic => Strategy::Dynamic,
            StrategyKind::Deterministic => Strategy::Deterministic,
            StrategyKind::Incremental => Strategy::Incremental { page_key: self.page_key.clone() },
            StrategyKind::Cursor => {
                let (Some(received), Some(sent)) = (&self.cursor_received, &self.cursor_sent) else {
                    bail!("--strategy cursor needs --cursor-received and --cursor-sent");
                };
                let mut spec = CursorSpec::new(received.clone(), sent.clone());
                spec.increment = self.cursor_increment;
                Strategy::Cursor(spec)
            }
        })
    }

    fn query(&self) -> Query {
        Query {
            method: self.method.clone(),
            symbol: self.symbol.clone(),
            timeframe: self.timeframe.clone(),
            since: self.since,
            limit: self.limit,
            params: self.params.iter().cloned().collect(),
        }
    }
}

fn parse_param(s: &str) -> Result<(String, Value), String> {
    let (key, raw) = s.split_once('=').ok_or_else(|| format!("expected key=value, got {s:?}"))?;
    if key.is_empty() {
        return Err(format!("empty parameter name in {s:?}"));
    }
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok((key.to_string(), value))
}

/// Write one JSON document per record.
fn write_records(out: &mut impl Write, records: &[Value], candles: bool) -> Result<()> {
    for record in records {
        if candles {
            let candle = Ohlcv::try_from(record)?;
            serde_json::to_writer(&mut *out, &candle)?;
        } else {
            serde_json::to_writer(&mut *out, record)?;
        }
        out.write_all(b"\n")?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 1. Load configuration
    let config = config::load_config(&cli.config)?;

    // 2. Initialize logging
    let log_dir = cli.log_dir.clone().or_else(|| config.log_path.clone());
    let log_format = cli.log_format.unwrap_or(config.log_format);
    k4_core::logging::init_logging(&cli.log_level, log_dir.as_deref(), &config.module_name, log_format);

    info!(
        "k4-runner starting: config={}, method={}, strategy={:?}",
        cli.config.display(),
        cli.method,
        cli.strategy
    );

    // 3. Build the throttled source and the paginator
    let throttler = Throttler::new(&config.throttle).context("failed to build throttler")?;
    let mut source = ThrottledSource::new(HttpSource::new(config.source.clone())?, throttler);
    for (method, cost) in &config.method_costs {
        source = source.with_method_cost(method.clone(), *cost);
    }
    let paginator = Paginator::new(source, config.pagination.clone());

    // 4. Fetch, unless interrupted
    let strategy = cli.strategy()?;
    let records = tokio::select! {
        res = paginator.fetch(&strategy, cli.query()) => res.with_context(|| format!("{} failed", cli.method))?,
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted before the fetch completed");
            return Ok(());
        }
    };

    // 5. Emit
    let mut out = std::io::BufWriter::new(std::io::stdout().lock());
    write_records(&mut out, &records, cli.candles)?;
    out.flush()?;

    info!("{} record(s) written", records.len());
    Ok(())
}
