//! [`Paginator`]: the entry point tying a page source to the four drivers.

use std::sync::Arc;

use k4_core::clock::{Clock, SystemClock};
use k4_core::error::K4Result;
use serde_json::Value;

use crate::cursor::CursorSpec;
use crate::options::{PaginationOptions, ResolvedOptions};
use crate::source::{PageRequest, PageSource, Params};

/// What the caller wants fetched; the driver decides how to page through it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub method: String,
    pub symbol: Option<String>,
    /// Candle timeframe; required by the deterministic driver.
    pub timeframe: Option<String>,
    /// Lower bound applied to the assembled result.
    pub since: Option<i64>,
    /// Number of records to return from the recent end of the result.
    pub limit: Option<u64>,
    /// Exchange params plus per-call option overrides.
    pub params: Params,
}

impl Query {
    pub fn new(method: impl Into<String>) -> Self {
        Self { method: method.into(), ..Self::default() }
    }

    pub fn symbol(mut self, symbol: impl Into<String>) -> Self {
        self.symbol = Some(symbol.into());
        self
    }

    pub fn timeframe(mut self, timeframe: impl Into<String>) -> Self {
        self.timeframe = Some(timeframe.into());
        self
    }

    pub fn since(mut self, since: i64) -> Self {
        self.since = Some(since);
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Split off the options for this call; option keys leave `params`.
    pub(crate) fn resolve(&mut self, options: &PaginationOptions) -> K4Result<ResolvedOptions> {
        options.resolve(&self.method, &mut self.params)
    }

    /// A page request carrying this query's method/symbol/timeframe/params.
    pub(crate) fn page(&self, since: Option<i64>, limit: u64) -> PageRequest {
        PageRequest {
            method: self.method.clone(),
            symbol: self.symbol.clone(),
            timeframe: self.timeframe.clone(),
            since,
            limit: Some(limit),
            params: self.params.clone(),
        }
    }
}

/// Pagination strategy, chosen explicitly by the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum Strategy {
    /// Walk a time window backward (or forward) until exhausted.
    Dynamic,
    /// Slice `[since, until]` into fixed steps and fetch them concurrently.
    Deterministic,
    /// Thread a continuation cursor from page to page.
    Cursor(CursorSpec),
    /// Request pages 1, 2, 3, ... under the given parameter name.
    Incremental { page_key: String },
}

/// Runs paginated fetches against one [`PageSource`].
///
/// Wrap the source in a [`ThrottledSource`](crate::ThrottledSource) to put
/// every page call behind the admission scheduler.
pub struct Paginator<S> {
    pub(crate) source: S,
    pub(crate) options: PaginationOptions,
    pub(crate) clock: Arc<dyn Clock>,
}

impl<S: PageSource> Paginator<S> {
    pub fn new(source: S, options: PaginationOptions) -> Self {
        Self { source, options, clock: SystemClock::shared() }
    }

    /// Read "now" (for deterministic slicing) from `clock`.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn options(&self) -> &PaginationOptions {
        &self.options
    }

    /// Run `query` with the given strategy.
    pub async fn fetch(&self, strategy: &Strategy, query: Query) -> K4Result<Vec<S::Record>> {
        match strategy {
            Strategy::Dynamic => self.fetch_dynamic(query).await,
            Strategy::Deterministic => self.fetch_deterministic(query).await,
            Strategy::Cursor(spec) => self.fetch_cursor(query, spec).await,
            Strategy::Incremental { page_key } => self.fetch_incremental(query, page_key).await,
        }
    }
}
