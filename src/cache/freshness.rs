//! Freshness evaluation: may a stored entry be served without a round-trip?

use std::time::{Duration, SystemTime};

use serde::Deserialize;

use super::store::CacheEntry;

/// Which timestamp an entry's age is measured from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FreshnessBasis {
    /// The stored response's `Date` header.
    #[default]
    ResponseDate,
    /// The moment the entry was written to the store.
    StoredAt,
}

/// Age of `entry` at `now`, or `None` when the timestamp is missing or
/// unparsable. Timestamps in the future yield a zero age.
pub fn age(entry: &CacheEntry, basis: FreshnessBasis, now: SystemTime) -> Option<Duration> {
    let timestamp = match basis {
        FreshnessBasis::ResponseDate => entry.response().headers().date()?,
        FreshnessBasis::StoredAt => entry.stored_at(),
    };
    Some(now.duration_since(timestamp).unwrap_or(Duration::ZERO))
}

/// Returns `true` iff `now - timestamp < window`.
///
/// A missing or unparsable timestamp is never fresh.
pub fn is_fresh(entry: &CacheEntry, window: Duration, basis: FreshnessBasis, now: SystemTime) -> bool {
    age(entry, basis, now).is_some_and(|age| age < window)
}
