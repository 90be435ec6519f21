//! Cursor pagination: each page names where the next one starts.

use k4_core::error::{K4Error, K4Result};
use k4_core::types::Record;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::assembly::assemble;
use crate::paginator::{Paginator, Query};
use crate::retry::ErrorStreak;
use crate::source::PageSource;

/// Where the cursor is read from and where it is sent.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CursorSpec {
    /// Field of the page's last record holding the next cursor.
    pub received: String,
    /// Request parameter that carries the cursor.
    pub sent: String,
    /// Added to numeric cursors before sending.
    #[serde(default)]
    pub increment: Option<i64>,
}

impl CursorSpec {
    pub fn new(received: impl Into<String>, sent: impl Into<String>) -> Self {
        Self { received: received.into(), sent: sent.into(), increment: None }
    }

    pub fn with_increment(mut self, increment: i64) -> Self {
        self.increment = Some(increment);
        self
    }

    /// The value to send next, given the cursor read off a page.
    pub fn next_value(&self, received: &Value) -> K4Result<Value> {
        let Some(inc) = self.increment else {
            return Ok(received.clone());
        };
        let base = match received {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        };
        base.map(|b| Value::from(b + inc)).ok_or_else(|| {
            K4Error::BadRequest(format!("cursor {} = {received} is not an integer, cannot increment", self.received))
        })
    }
}

impl<S: PageSource> Paginator<S> {
    pub async fn fetch_cursor(&self, mut query: Query, cursor: &CursorSpec) -> K4Result<Vec<S::Record>> {
        let opts = query.resolve(&self.options)?;
        let since = query.since;
        let mut next: Option<Value> = None;
        let mut streak = ErrorStreak::new(opts.max_retries);
        let mut result = Vec::new();
        let mut calls = 0;

        while calls < opts.max_calls {
            calls += 1;
            let mut request = query.page(since, opts.max_entries_per_request);
            if let Some(value) = &next {
                request.params.insert(cursor.sent.clone(), value.clone());
            }

            let page = match self.source.fetch_page(request).await {
                Ok(page) => page,
                Err(err) => {
                    streak.record(err, &format!("{} cursor call {calls}", query.method))?;
                    continue;
                }
            };
            streak.reset();
            debug!("[paginate] {} cursor call {calls}/{}: {} records", query.method, opts.max_calls, page.len());

            let Some(last) = page.last() else {
                break;
            };
            let received = last.field(&cursor.received);
            let last_ts = last.timestamp();
            result.extend(page);

            let Some(received) = received else {
                break;
            };
            let value = cursor.next_value(&received)?;
            if next.as_ref() == Some(&value) {
                warn!("[paginate] {} cursor {} did not advance ({value}), stopping", query.method, cursor.received);
                break;
            }
            next = Some(value);

            if let (Some(ts), Some(since)) = (last_ts, since) {
                if ts < since {
                    break;
                }
            }
        }

        Ok(assemble(result, since, query.limit))
    }
}
