//! The process-wide set of named stores.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use tracing::info;

use super::lock::{rw_read, rw_write};
use super::store::CacheStore;

/// All named [`CacheStore`]s of the process.
///
/// Stores are created lazily by [`open`](Self::open) and live until deleted.
/// Deleting a store only unlinks it: tasks still holding its `Arc` finish
/// their work against the detached table.
#[derive(Debug, Default)]
pub struct StoreRegistry {
    stores: RwLock<BTreeMap<String, Arc<CacheStore>>>,
}

impl StoreRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the store called `name`, creating it if it does not exist.
    pub fn open(&self, name: &str) -> Arc<CacheStore> {
        if let Some(store) = rw_read(&self.stores, "registry.open").get(name) {
            return Arc::clone(store);
        }
        let mut stores = rw_write(&self.stores, "registry.open");
        Arc::clone(
            stores
                .entry(name.to_owned())
                .or_insert_with(|| Arc::new(CacheStore::new(name))),
        )
    }

    /// Returns the store called `name` without creating it.
    pub fn get(&self, name: &str) -> Option<Arc<CacheStore>> {
        rw_read(&self.stores, "registry.get").get(name).cloned()
    }

    /// Adds a fully built store, replacing any store with the same name.
    pub fn insert(&self, store: CacheStore) {
        rw_write(&self.stores, "registry.insert").insert(store.name().to_owned(), Arc::new(store));
    }

    /// Deletes the store called `name`. Returns `true` if it existed.
    pub fn delete(&self, name: &str) -> bool {
        let removed = rw_write(&self.stores, "registry.delete")
            .remove(name)
            .is_some();
        if removed {
            info!(store = name, "deleted cache store");
        }
        removed
    }

    /// Names of every existing store, sorted.
    pub fn names(&self) -> Vec<String> {
        rw_read(&self.stores, "registry.names")
            .keys()
            .cloned()
            .collect()
    }

    /// Snapshot of every existing store.
    pub fn stores(&self) -> Vec<Arc<CacheStore>> {
        rw_read(&self.stores, "registry.stores")
            .values()
            .cloned()
            .collect()
    }

    /// Deletes every store. Returns how many were removed.
    pub fn clear(&self) -> usize {
        let mut stores = rw_write(&self.stores, "registry.clear");
        let count = stores.len();
        stores.clear();
        count
    }

    /// Total payload bytes across every entry of every store.
    ///
    /// Walks all entries; meant for occasional diagnostics.
    pub fn total_bytes(&self) -> u64 {
        self.stores().iter().map(|store| store.byte_size()).sum()
    }
}
