//! Caching layer storage: named stores, eviction, freshness, and snapshots.
//!
//! - [`CacheStore`]: one key → response table with insertion-ordered enumeration.
//! - [`StoreRegistry`]: every named store of the process, created lazily.
//! - [`eviction::trim`]: FIFO capacity enforcement.
//! - [`freshness::is_fresh`]: age check against a freshness window.
//! - [`persist`]: JSON snapshots for restarts.
//!
//! Store names carry the caching generation: `{prefix}{version}-{category}`,
//! e.g. `reel-v1-dynamic`. A version rollover deletes every store with the
//! application prefix whose generation is not the current one.

pub(crate) mod lock;

pub mod eviction;
pub mod freshness;
pub mod persist;
pub mod registry;
pub mod store;

pub use freshness::FreshnessBasis;
pub use registry::StoreRegistry;
pub use store::{CacheEntry, CacheStore};

/// Prefix shared by every store of one caching generation, e.g. `reel-v1-`.
pub fn generation_prefix(prefix: &str, version: &str) -> String {
    format!("{prefix}{version}-")
}

/// Full name of a category's store in a given generation.
pub fn store_name(prefix: &str, version: &str, category: &str) -> String {
    format!("{}{category}", generation_prefix(prefix, version))
}

/// Returns `true` if `name` belongs to the application but to a generation
/// other than `version`.
pub fn is_superseded(name: &str, prefix: &str, version: &str) -> bool {
    name.starts_with(prefix) && !name.starts_with(&generation_prefix(prefix, version))
}
