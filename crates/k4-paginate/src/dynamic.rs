//! Dynamic (time-walking) pagination.
//!
//! Backward walks `until` down from the newest page; forward walks `since`
//! up from the caller's lower bound. Each page moves the bound past the
//! records just seen, and the walk stops at an empty page, at the far bound,
//! or after `paginationCalls` calls.

use k4_core::error::{K4Error, K4Result};
use k4_core::types::Record;
use serde_json::Value;
use tracing::{debug, warn};

use crate::assembly::assemble;
use crate::options::{Direction, until_from};
use crate::paginator::{Paginator, Query};
use crate::retry::ErrorStreak;
use crate::source::PageSource;

/// Smallest and largest timestamp in a page.
fn bounds<R: Record>(page: &[R]) -> Option<(i64, i64)> {
    page.iter()
        .filter_map(Record::timestamp)
        .fold(None, |acc, ts| match acc {
            None => Some((ts, ts)),
            Some((lo, hi)) => Some((lo.min(ts), hi.max(ts))),
        })
}

impl<S: PageSource> Paginator<S> {
    pub async fn fetch_dynamic(&self, mut query: Query) -> K4Result<Vec<S::Record>> {
        let opts = query.resolve(&self.options)?;
        let since = query.since;
        let until = until_from(&query.params);

        if opts.direction == Direction::Forward && since.is_none() {
            return Err(K4Error::ArgumentsRequired(format!(
                "{} forward pagination requires a since argument",
                query.method
            )));
        }

        // Backward: exclusive upper bound of the next page. Forward: lower bound.
        let mut bound = match opts.direction {
            Direction::Backward => None,
            Direction::Forward => since,
        };
        let mut streak = ErrorStreak::new(opts.max_retries);
        let mut result = Vec::new();
        let mut calls = 0;

        while calls < opts.max_calls {
            calls += 1;
            let request = match opts.direction {
                Direction::Backward => {
                    let mut req = query.page(None, opts.max_entries_per_request);
                    if let Some(ts) = bound {
                        // The walked bound replaces whichever alias the caller used.
                        req.params.remove("till");
                        req.params.insert("until".to_string(), Value::from(ts - 1));
                    }
                    req
                }
                Direction::Forward => query.page(bound, opts.max_entries_per_request),
            };

            let page = match self.source.fetch_page(request).await {
                Ok(page) => page,
                Err(err) => {
                    streak.record(err, &format!("{} dynamic call {calls}", query.method))?;
                    continue;
                }
            };
            streak.reset();
            debug!(
                "[paginate] {} dynamic {:?} call {calls}/{}: {} records",
                query.method,
                opts.direction,
                opts.max_calls,
                page.len()
            );
            if page.is_empty() {
                break;
            }

            let span = bounds(&page);
            result.extend(page);
            let Some((earliest, latest)) = span else {
                warn!("[paginate] {} page carries no timestamps, stopping", query.method);
                break;
            };

            match opts.direction {
                Direction::Backward => {
                    bound = Some(earliest);
                    if since.is_some_and(|s| earliest <= s) {
                        break;
                    }
                }
                Direction::Forward => {
                    let next = latest + 1;
                    bound = Some(next);
                    if until.is_some_and(|u| next >= u) {
                        break;
                    }
                }
            }
        }

        Ok(assemble(result, since, query.limit))
    }
}
