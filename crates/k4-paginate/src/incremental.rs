//! Page-number pagination.

use k4_core::error::K4Result;
use serde_json::Value;
use tracing::debug;

use crate::assembly::assemble;
use crate::paginator::{Paginator, Query};
use crate::retry::ErrorStreak;
use crate::source::PageSource;

impl<S: PageSource> Paginator<S> {
    /// Request pages 1, 2, 3, ... under `page_key` until an empty page.
    ///
    /// A failed call retries the same page number; it still counts towards
    /// `paginationCalls`.
    pub async fn fetch_incremental(&self, mut query: Query, page_key: &str) -> K4Result<Vec<S::Record>> {
        let opts = query.resolve(&self.options)?;
        let mut streak = ErrorStreak::new(opts.max_retries);
        let mut result = Vec::new();
        let mut page_no: u64 = 1;
        let mut calls = 0;

        while calls < opts.max_calls {
            calls += 1;
            let mut request = query.page(query.since, opts.max_entries_per_request);
            request.params.insert(page_key.to_string(), Value::from(page_no));

            let page = match self.source.fetch_page(request).await {
                Ok(page) => page,
                Err(err) => {
                    streak.record(err, &format!("{} page {page_no}", query.method))?;
                    continue;
                }
            };
            streak.reset();
            debug!("[paginate] {} page {page_no}: {} records", query.method, page.len());
            if page.is_empty() {
                break;
            }
            result.extend(page);
            page_no += 1;
        }

        Ok(assemble(result, query.since, query.limit))
    }
}
