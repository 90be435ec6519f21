//! The fetch primitive consumed by the pagination drivers.
//!
//! A [`PageSource`] turns one [`PageRequest`] into one page of records. The
//! transport, signing and payload parsing behind it are not this crate's
//! concern. [`ThrottledSource`] gates every call through a [`Throttler`] so
//! that all drivers built on it are rate limited.

use std::collections::HashMap;

use async_trait::async_trait;
use k4_core::error::K4Result;
use k4_core::types::Record;
use k4_throttle::Throttler;
use serde_json::Value;
use tracing::trace;

/// Extra request parameters, passed through to the source verbatim.
pub type Params = serde_json::Map<String, Value>;

/// One page request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageRequest {
    /// Logical fetch method (e.g. `"fetchTrades"`, `"fetchOHLCV"`).
    pub method: String,
    pub symbol: Option<String>,
    /// Candle timeframe for time-sliced methods.
    pub timeframe: Option<String>,
    /// Lower time bound in milliseconds.
    pub since: Option<i64>,
    /// Maximum number of records in the page.
    pub limit: Option<u64>,
    /// Everything else: `until`, cursors, page numbers, exchange extras.
    pub params: Params,
}

/// Fetch primitive: one call, one page.
///
/// Implementations report failures as `K4Error::Network`,
/// `K4Error::RateLimitExceeded` or `K4Error::Exchange`.
#[async_trait]
pub trait PageSource: Send + Sync {
    type Record: Record + Send;

    async fn fetch_page(&self, request: PageRequest) -> K4Result<Vec<Self::Record>>;
}

#[async_trait]
impl<S: PageSource + ?Sized> PageSource for std::sync::Arc<S> {
    type Record = S::Record;

    async fn fetch_page(&self, request: PageRequest) -> K4Result<Vec<Self::Record>> {
        (**self).fetch_page(request).await
    }
}

/// A [`PageSource`] whose every call first waits for admission.
pub struct ThrottledSource<S> {
    inner: S,
    throttler: Throttler,
    method_costs: HashMap<String, f64>,
}

impl<S> ThrottledSource<S> {
    pub fn new(inner: S, throttler: Throttler) -> Self {
        Self { inner, throttler, method_costs: HashMap::new() }
    }

    /// Charge `cost` for calls to `method` instead of the default cost.
    pub fn with_method_cost(mut self, method: impl Into<String>, cost: f64) -> Self {
        self.method_costs.insert(method.into(), cost);
        self
    }

    /// Cost charged for one call of `method`.
    pub fn cost_of(&self, method: &str) -> f64 {
        self.method_costs.get(method).copied().unwrap_or_else(|| self.throttler.default_cost())
    }

    pub fn throttler(&self) -> &Throttler {
        &self.throttler
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

#[async_trait]
impl<S: PageSource> PageSource for ThrottledSource<S> {
    type Record = S::Record;

    async fn fetch_page(&self, request: PageRequest) -> K4Result<Vec<Self::Record>> {
        let admitted = self.throttler.acquire(self.cost_of(&request.method)).await?;
        trace!(
            "[paginate] {} admitted #{} at {:.3}ms",
            request.method, admitted.sequence, admitted.at_ms
        );
        self.inner.fetch_page(request).await
    }
}
