//! # k4-paginate
//!
//! Generic pagination over a [`PageSource`]. A [`Paginator`] runs one of
//! four strategies and assembles the pages into a single deduplicated,
//! ascending, since/limit-windowed result:
//!
//! - [`Strategy::Dynamic`]: walk `until` backward (or `since` forward)
//! - [`Strategy::Deterministic`]: fixed time slices fetched concurrently
//! - [`Strategy::Cursor`]: continuation cursor read off each page
//! - [`Strategy::Incremental`]: page numbers 1, 2, 3, ...
//!
//! Options (`paginationCalls`, `maxRetries`, `maxEntriesPerRequest`,
//! `paginationDirection`) come from the call's params, then the per-method
//! table of [`PaginationOptions`], then the defaults.
//!
//! Rate limiting is layered in by wrapping the source in a
//! [`ThrottledSource`].

pub mod assembly;
pub mod cursor;
pub mod deterministic;
mod dynamic;
mod incremental;
pub mod options;
pub mod paginator;
pub mod retry;
pub mod source;

#[cfg(test)]
pub(crate) mod testing;

pub use assembly::{assemble, dedup, filter_by_limit, filter_by_since_limit, sort_ascending};
pub use cursor::CursorSpec;
pub use deterministic::plan_slices;
pub use options::{Direction, OptionOverrides, PaginationOptions, ResolvedOptions};
pub use paginator::{Paginator, Query, Strategy};
pub use retry::ErrorStreak;
pub use source::{PageRequest, PageSource, Params, ThrottledSource};
