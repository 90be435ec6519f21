//! Deterministic (time-sliced) pagination.
//!
//! The requested range is cut into fixed steps of `timeframe *
//! maxEntriesPerRequest` milliseconds, all slices are requested at once, and
//! the pages are merged. Consecutive slice starts overlap by one
//! millisecond; assembly removes the duplicates that produces.

use futures_util::future::try_join_all;
use k4_core::error::{K4Error, K4Result};
use k4_core::time_util::timeframe_ms;
use tracing::debug;

use crate::assembly::assemble;
use crate::options::until_from;
use crate::paginator::{Paginator, Query};
use crate::retry::ErrorStreak;
use crate::source::{PageRequest, PageSource};

/// Start times of the slices covering `[since, until]`.
///
/// Without `since`, the range starts `max_calls` steps before `now_ms`.
/// Fails with `BadRequest` when `[since, until]` needs more than
/// `max_calls` slices.
pub fn plan_slices(
    now_ms: i64,
    step_ms: i64,
    max_calls: u64,
    since: Option<i64>,
    until: Option<i64>,
) -> K4Result<Vec<i64>> {
    if step_ms <= 0 {
        return Err(K4Error::BadRequest(format!("slice step must be positive, got {step_ms}ms")));
    }
    let calls = i64::try_from(max_calls).unwrap_or(i64::MAX);
    let earliest = now_ms.saturating_sub(calls.saturating_mul(step_ms)).saturating_sub(1);
    let mut current = since.map_or(earliest, |s| s.max(earliest));

    if let Some(until) = until {
        let from = since.unwrap_or(current);
        let span = until
            .checked_sub(from)
            .ok_or_else(|| K4Error::BadRequest(format!("range {from}..{until} is out of bounds")))?;
        let required = (span as f64 / step_ms as f64).ceil();
        if required > max_calls as f64 {
            return Err(K4Error::BadRequest(format!(
                "range needs {required} calls, more than the {max_calls} allowed; \
                 narrow since/until or raise paginationCalls"
            )));
        }
    }

    let mut starts = Vec::new();
    for _ in 0..max_calls {
        if until.is_some_and(|u| current >= u) {
            break;
        }
        starts.push(current);
        // Past i64::MAX there is nothing left to fetch.
        let Some(next) = current.checked_add(step_ms - 1) else {
            break;
        };
        current = next;
    }
    Ok(starts)
}

impl<S: PageSource> Paginator<S> {
    pub async fn fetch_deterministic(&self, mut query: Query) -> K4Result<Vec<S::Record>> {
        let opts = query.resolve(&self.options)?;
        let timeframe = query.timeframe.as_deref().ok_or_else(|| {
            K4Error::ArgumentsRequired(format!("{} deterministic pagination requires a timeframe", query.method))
        })?;
        let frame = timeframe_ms(timeframe)?;
        let step = i64::try_from(opts.max_entries_per_request)
            .ok()
            .and_then(|entries| frame.checked_mul(entries))
            .ok_or_else(|| {
                K4Error::BadRequest(format!(
                    "{timeframe} x {} entries overflows a millisecond range",
                    opts.max_entries_per_request
                ))
            })?;
        let now = self.clock.now_ms() as i64;
        let starts = plan_slices(now, step, opts.max_calls, query.since, until_from(&query.params))?;
        debug!("[paginate] {} deterministic: {} slices of {step}ms from {:?}", query.method, starts.len(), starts.first());

        let calls = starts
            .iter()
            .map(|&start| self.fetch_slice(query.page(Some(start), opts.max_entries_per_request), opts.max_retries));
        let pages = try_join_all(calls).await?;

        let result: Vec<S::Record> = pages.into_iter().flatten().collect();
        Ok(assemble(result, query.since, query.limit))
    }

    /// One slice, retried on ordinary failures. Rate-limit rejections fail
    /// the whole fetch at once.
    async fn fetch_slice(&self, request: PageRequest, max_retries: u64) -> K4Result<Vec<S::Record>> {
        let mut streak = ErrorStreak::new(max_retries);
        loop {
            match self.source.fetch_page(request.clone()).await {
                Ok(page) => {
                    debug!("[paginate] {} slice {:?}: {} records", request.method, request.since, page.len());
                    return Ok(page);
                }
                Err(err) if err.is_rate_limit() => return Err(err),
                Err(err) => streak.record(err, &format!("{} slice {:?}", request.method, request.since))?,
            }
        }
    }
}
