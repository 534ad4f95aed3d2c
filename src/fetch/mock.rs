//! Scripted [`Fetcher`] for unit tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use super::{FetchError, FetchResult, Fetcher};
use crate::http::{RequestDescriptor, Response, StatusCode};

#[derive(Debug, Clone)]
enum Reply {
    Respond(Response),
    Fail(FetchError),
    Hang,
}

/// Answers by URL. Unscripted URLs get a 404.
#[derive(Debug, Default)]
pub(crate) struct MockFetcher {
    routes: Mutex<HashMap<String, Reply>>,
    calls: AtomicUsize,
    delay: Option<Duration>,
}

impl MockFetcher {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Every reply waits `delay` first.
    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub(crate) fn respond(&self, url: &str, response: Response) -> &Self {
        self.script(url, Reply::Respond(response))
    }

    pub(crate) fn ok(&self, url: &str, body: &str) -> &Self {
        self.respond(url, Response::new(StatusCode::OK).body(body.to_owned()))
    }

    pub(crate) fn fail(&self, url: &str, error: FetchError) -> &Self {
        self.script(url, Reply::Fail(error))
    }

    /// The request never completes.
    pub(crate) fn hang(&self, url: &str) -> &Self {
        self.script(url, Reply::Hang)
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn script(&self, url: &str, reply: Reply) -> &Self {
        self.routes
            .lock()
            .unwrap()
            .insert(url.to_owned(), reply);
        self
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, request: &RequestDescriptor) -> FetchResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let reply = self
            .routes
            .lock()
            .unwrap()
            .get(request.url().as_str())
            .cloned();

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match reply {
            Some(Reply::Respond(response)) => Ok(response),
            Some(Reply::Fail(error)) => Err(error),
            Some(Reply::Hang) => std::future::pending().await,
            None => Ok(Response::new(StatusCode::NOT_FOUND)),
        }
    }
}
