//! Capacity enforcement by insertion order.

use tracing::info;

use super::store::CacheStore;

/// Deletes the oldest-inserted entries of `store` until at most `max_entries`
/// remain. Returns the number of entries removed.
///
/// Order is insertion order, not recency: a read never saves an entry, only a
/// re-put does.
pub fn trim(store: &CacheStore, max_entries: usize) -> usize {
    let removed = store.evict_oldest_beyond(max_entries);
    if !removed.is_empty() {
        info!(
            store = store.name(),
            trimmed = removed.len(),
            limit = max_entries,
            "trimmed cache store"
        );
    }
    removed.len()
}
