//! Result assembly: dedup, ordering and since/limit windowing.
//!
//! Pages from consecutive calls overlap at their boundaries (the drivers
//! deliberately step by `bound ± 1`), so the same record can arrive twice.
//! The first occurrence wins.

use std::cmp::Ordering;

use ahash::AHashSet;
use k4_core::types::Record;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum DedupKey {
    Id(String),
    Timestamp(i64),
}

/// Drop repeated records, keyed by `id` when present, else by timestamp.
///
/// Records with neither key cannot be compared and are kept as they are.
pub fn dedup<R: Record>(records: Vec<R>) -> Vec<R> {
    let mut seen = AHashSet::with_capacity(records.len());
    records
        .into_iter()
        .filter(|r| {
            let key = match (r.id(), r.timestamp()) {
                (Some(id), _) => DedupKey::Id(id),
                (None, Some(ts)) => DedupKey::Timestamp(ts),
                (None, None) => return true,
            };
            seen.insert(key)
        })
        .collect()
}

/// Compare ids numerically when both parse as integers, else lexically.
fn cmp_ids(a: Option<String>, b: Option<String>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => match (a.parse::<i128>(), b.parse::<i128>()) {
            (Ok(x), Ok(y)) => x.cmp(&y),
            _ => a.cmp(&b),
        },
        (a, b) => a.is_some().cmp(&b.is_some()),
    }
}

/// Stable ascending sort by timestamp, or by id when the first record has no
/// timestamp.
pub fn sort_ascending<R: Record>(records: &mut [R]) {
    let Some(first) = records.first() else {
        return;
    };
    if first.timestamp().is_some() {
        records.sort_by_key(|r| r.timestamp());
    } else if first.id().is_some() {
        records.sort_by(|a, b| cmp_ids(a.id(), b.id()));
    }
}

/// Keep at most `limit` records from the recent end: the tail of an
/// ascending sequence, the head of a descending one.
pub fn filter_by_limit<R: Record>(mut records: Vec<R>, limit: Option<u64>) -> Vec<R> {
    let Some(limit) = limit else {
        return records;
    };
    let limit = usize::try_from(limit).unwrap_or(usize::MAX);
    if records.len() <= limit {
        return records;
    }

    let ascending = match (records.first().and_then(Record::timestamp), records.last().and_then(Record::timestamp)) {
        (Some(first), Some(last)) => first <= last,
        _ => true,
    };
    if ascending {
        records.split_off(records.len() - limit)
    } else {
        records.truncate(limit);
        records
    }
}

/// Keep records at or after `since` (records without a timestamp are
/// dropped when `since` is given), then apply [`filter_by_limit`].
pub fn filter_by_since_limit<R: Record>(records: Vec<R>, since: Option<i64>, limit: Option<u64>) -> Vec<R> {
    let records = match since {
        Some(since) => records.into_iter().filter(|r| r.timestamp().is_some_and(|ts| ts >= since)).collect(),
        None => records,
    };
    filter_by_limit(records, limit)
}

/// Full assembly: dedup, sort ascending, window by `since`/`limit`.
pub fn assemble<R: Record>(records: Vec<R>, since: Option<i64>, limit: Option<u64>) -> Vec<R> {
    let mut unique = dedup(records);
    sort_ascending(&mut unique);
    filter_by_since_limit(unique, since, limit)
}
