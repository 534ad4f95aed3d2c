//! JSON snapshots of a [`StoreRegistry`], so stores survive restarts and a
//! version rollover can clean up what a previous process left behind.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::http::{Headers, Response, StatusCode};

use super::registry::StoreRegistry;
use super::store::CacheStore;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("snapshot I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("snapshot {path} is malformed: {source}")]
    Format {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("entry `{key}` in store `{store}` has an invalid body: {source}")]
    Body {
        store: String,
        key: String,
        #[source]
        source: base64::DecodeError,
    },
}

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    stores: Vec<StoreSnapshot>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoreSnapshot {
    name: String,
    /// Oldest first.
    entries: Vec<EntrySnapshot>,
}

#[derive(Debug, Serialize, Deserialize)]
struct EntrySnapshot {
    key: String,
    status: u16,
    headers: Vec<(String, String)>,
    body: String,
    stored_at_ms: u64,
}

/// Writes every store of `registry` to `path`. Returns the number of entries
/// written.
///
/// The file is replaced atomically: the snapshot goes to a sibling temp file
/// that is then renamed over `path`.
pub fn save(registry: &StoreRegistry, path: &Path) -> Result<usize, PersistError> {
    let mut written = 0;
    let stores = registry
        .stores()
        .iter()
        .map(|store| {
            let entries: Vec<_> = store
                .entries()
                .into_iter()
                .map(|entry| {
                    let stored_at_ms = entry
                        .stored_at()
                        .duration_since(UNIX_EPOCH)
                        .unwrap_or_default()
                        .as_millis() as u64;
                    let response = entry.response();
                    EntrySnapshot {
                        key: entry.key().to_owned(),
                        status: response.status().as_u16(),
                        headers: response
                            .headers()
                            .iter()
                            .map(|(n, v)| (n.to_owned(), v.to_owned()))
                            .collect(),
                        body: STANDARD.encode(response.body_ref()),
                        stored_at_ms,
                    }
                })
                .collect();
            written += entries.len();
            StoreSnapshot {
                name: store.name().to_owned(),
                entries,
            }
        })
        .collect();

    let json = serde_json::to_vec(&Snapshot { stores }).map_err(|source| PersistError::Format {
        path: path.to_owned(),
        source,
    })?;

    let tmp = tmp_path(path);
    fs::write(&tmp, json).map_err(|source| PersistError::Io {
        path: tmp.clone(),
        source,
    })?;
    fs::rename(&tmp, path).map_err(|source| PersistError::Io {
        path: path.to_owned(),
        source,
    })?;
    Ok(written)
}

/// Rebuilds a registry from a snapshot written by [`save`], preserving each
/// store's insertion order.
pub fn load(path: &Path) -> Result<StoreRegistry, PersistError> {
    let raw = fs::read(path).map_err(|source| PersistError::Io {
        path: path.to_owned(),
        source,
    })?;
    let snapshot: Snapshot = serde_json::from_slice(&raw).map_err(|source| PersistError::Format {
        path: path.to_owned(),
        source,
    })?;

    let registry = StoreRegistry::new();
    for stored in snapshot.stores {
        let store = CacheStore::new(stored.name.clone());
        for entry in stored.entries {
            let body = STANDARD
                .decode(entry.body.as_bytes())
                .map_err(|source| PersistError::Body {
                    store: stored.name.clone(),
                    key: entry.key.clone(),
                    source,
                })?;
            let response = Response::new(StatusCode::from_u16(entry.status))
                .with_headers(entry.headers.into_iter().collect::<Headers>())
                .body_bytes(body);
            let stored_at = UNIX_EPOCH + Duration::from_millis(entry.stored_at_ms);
            store.put_at(entry.key, response, stored_at);
        }
        registry.insert(store);
    }
    Ok(registry)
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch(name: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!("reelcache-{name}-{}-{nanos}.json", std::process::id()))
    }

    #[test]
    fn save_then_load_keeps_order_and_payload() {
        let registry = StoreRegistry::new();
        let store = registry.open("reel-v1-dynamic");
        store.put(
            "GET https://archive.org/metadata/a",
            Response::new(StatusCode::OK)
                .header("Date", "Sun, 06 Nov 1994 08:49:37 GMT")
                .body_bytes(vec![0u8, 159, 146, 150]),
        );
        store.put("GET https://archive.org/metadata/b", Response::new(StatusCode::OK));

        let path = scratch("roundtrip");
        assert_eq!(save(&registry, &path).unwrap(), 2);

        let restored = load(&path).unwrap();
        let store = restored.get("reel-v1-dynamic").unwrap();
        assert_eq!(
            store.keys(),
            vec![
                "GET https://archive.org/metadata/a",
                "GET https://archive.org/metadata/b"
            ]
        );
        let first = store.get("GET https://archive.org/metadata/a").unwrap();
        assert_eq!(first.response().body_ref().as_ref(), &[0u8, 159, 146, 150]);
        assert!(first.response().headers().date().is_some());

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn missing_file_is_io_error() {
        let path = scratch("missing");
        assert!(matches!(load(&path), Err(PersistError::Io { .. })));
    }

    #[test]
    fn malformed_file_is_format_error() {
        let path = scratch("malformed");
        fs::write(&path, b"{not json").unwrap();
        assert!(matches!(load(&path), Err(PersistError::Format { .. })));
        let _ = fs::remove_file(&path);
    }
}
