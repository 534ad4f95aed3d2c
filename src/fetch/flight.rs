//! Single-flight: concurrent requests for the same key share one network call.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;

use tokio::sync::watch;
use tracing::debug;

use super::FetchResult;

type Slot = watch::Receiver<Option<FetchResult>>;

/// In-flight network calls keyed by cache key.
///
/// The first caller for a key becomes the leader and runs the operation;
/// callers arriving while it runs become followers and receive a clone of the
/// leader's result. If the leader is cancelled before finishing, its slot is
/// released and each follower runs the operation itself.
#[derive(Debug, Default)]
pub struct InflightRequests {
    flights: Mutex<HashMap<String, Slot>>,
}

enum Role<'a> {
    Leader(Leader<'a>),
    Follower(Slot),
}

struct Leader<'a> {
    key: String,
    tx: watch::Sender<Option<FetchResult>>,
    flights: &'a InflightRequests,
}

impl Leader<'_> {
    fn finish(self, result: &FetchResult) {
        self.tx.send_replace(Some(result.clone()));
    }
}

impl Drop for Leader<'_> {
    fn drop(&mut self) {
        self.flights.release(&self.key);
    }
}

impl InflightRequests {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys with a call in progress.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Runs `operation` for `key` unless an identical call is already in
    /// flight, in which case that call's result is awaited instead.
    ///
    /// The leader's operation is expected to perform any store write itself
    /// before returning, so followers never write.
    pub async fn run<F, Fut>(&self, key: &str, operation: F) -> FetchResult
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = FetchResult>,
    {
        match self.join(key) {
            Role::Leader(leader) => {
                let result = operation().await;
                leader.finish(&result);
                result
            }
            Role::Follower(mut rx) => {
                debug!(key, "joined in-flight request");
                let shared = match rx.wait_for(Option::is_some).await {
                    Ok(value) => (*value).clone(),
                    Err(_) => None,
                };
                match shared {
                    Some(result) => result,
                    None => {
                        debug!(key, "in-flight leader abandoned; fetching directly");
                        operation().await
                    }
                }
            }
        }
    }

    fn join(&self, key: &str) -> Role<'_> {
        let mut flights = self.lock();
        if let Some(rx) = flights.get(key) {
            return Role::Follower(rx.clone());
        }
        let (tx, rx) = watch::channel(None);
        flights.insert(key.to_owned(), rx);
        Role::Leader(Leader {
            key: key.to_owned(),
            tx,
            flights: self,
        })
    }

    fn release(&self, key: &str) {
        self.lock().remove(key);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Slot>> {
        self.flights
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
