use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::warn;

// A panic while holding a store lock leaves data that is still structurally
// valid, so poisoned locks are recovered rather than propagated.

pub(crate) fn rw_read<'a, T>(lock: &'a RwLock<T>, op: &'static str) -> RwLockReadGuard<'a, T> {
    lock.read().unwrap_or_else(|poisoned| {
        warn!(op, lock_kind = "rwlock.read", "recovered from poisoned cache lock");
        poisoned.into_inner()
    })
}

pub(crate) fn rw_write<'a, T>(lock: &'a RwLock<T>, op: &'static str) -> RwLockWriteGuard<'a, T> {
    lock.write().unwrap_or_else(|poisoned| {
        warn!(op, lock_kind = "rwlock.write", "recovered from poisoned cache lock");
        poisoned.into_inner()
    })
}
