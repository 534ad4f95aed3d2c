//! The four serving strategies, run against a category's store and the
//! network collaborator.

use std::sync::Arc;
use std::time::SystemTime;

use bytes::Bytes;
use tracing::{debug, warn};

use super::{CacheStatus, CategoryPolicy, InterceptError, Intercepted, PolicyTable, StrategyKind};
use crate::cache::{self, CacheStore, StoreRegistry, eviction, freshness};
use crate::classify::Category;
use crate::fetch::{FetchError, FetchResult, Fetcher, InflightRequests, with_timeout};
use crate::http::{RequestDescriptor, Response, StatusCode};

/// 1x1 transparent PNG served when no placeholder image is stored.
static TRANSPARENT_PIXEL: [u8; 70] = [
    0x89, 0x50, 0x4e, 0x47, 0x0d, 0x0a, 0x1a, 0x0a, 0x00, 0x00, 0x00, 0x0d, 0x49, 0x48, 0x44, 0x52,
    0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1f, 0x15, 0xc4,
    0x89, 0x00, 0x00, 0x00, 0x0d, 0x49, 0x44, 0x41, 0x54, 0x78, 0xda, 0x63, 0x64, 0x60, 0xf8, 0x5f,
    0x0f, 0x00, 0x02, 0x87, 0x01, 0x80, 0xeb, 0x47, 0xba, 0x92, 0x00, 0x00, 0x00, 0x00, 0x49, 0x45,
    0x4e, 0x44, 0xae, 0x42, 0x60, 0x82,
];

const OFFLINE_TEXT: &str = "Offline - Please check your connection";

/// Serves requests for one caching generation.
///
/// Cheap to clone: clones share the registry, the fetcher, and the in-flight
/// map, which is what lets a background refresh outlive the request that
/// triggered it.
#[derive(Clone)]
pub struct PolicyEngine {
    registry: Arc<StoreRegistry>,
    fetcher: Arc<dyn Fetcher>,
    policies: PolicyTable,
    prefix: String,
    version: String,
    inflight: Arc<InflightRequests>,
    offline_key: Option<String>,
    placeholder_key: Option<String>,
}

impl PolicyEngine {
    pub fn new(
        registry: Arc<StoreRegistry>,
        fetcher: Arc<dyn Fetcher>,
        policies: PolicyTable,
        prefix: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            fetcher,
            policies,
            prefix: prefix.into(),
            version: version.into(),
            inflight: Arc::new(InflightRequests::new()),
            offline_key: None,
            placeholder_key: None,
        }
    }

    /// Cache key of the page served when a static request fails with nothing
    /// stored.
    #[must_use]
    pub fn with_offline_page(mut self, key: Option<String>) -> Self {
        self.offline_key = key;
        self
    }

    /// Cache key of the image served when an image request fails with
    /// nothing stored.
    #[must_use]
    pub fn with_placeholder(mut self, key: Option<String>) -> Self {
        self.placeholder_key = key;
        self
    }

    pub fn fetcher(&self) -> &Arc<dyn Fetcher> {
        &self.fetcher
    }

    pub fn inflight(&self) -> &InflightRequests {
        &self.inflight
    }

    /// The current generation's store for `category`, created on first use.
    pub fn store(&self, category: Category) -> Arc<CacheStore> {
        self.registry
            .open(&cache::store_name(&self.prefix, &self.version, category.as_str()))
    }

    /// Serves `request` with the strategy bound to `category`.
    ///
    /// A ranged request would only ever see part of the resource, so it is
    /// forwarded uncached under the pass-through deadline.
    pub async fn serve(&self, category: Category, request: &RequestDescriptor) -> Intercepted {
        if request.is_ranged() && category.is_cached() {
            debug!(url = %request.url(), category = %category, "ranged request bypasses the store");
            let policy = self.policies.get(Category::PassThrough);
            return self.network_only(category, policy, request).await;
        }

        let policy = self.policies.get(category);
        let served = match StrategyKind::for_category(category) {
            StrategyKind::CacheFirst => self.cache_first(category, policy, request).await,
            StrategyKind::StaleTolerantNetworkFirst => {
                self.network_first(category, policy, request).await
            }
            StrategyKind::CacheFirstAsyncRefresh => {
                self.cache_first_placeholder(category, policy, request).await
            }
            StrategyKind::NetworkOnly => self.network_only(category, policy, request).await,
        };
        debug!(
            url = %request.url(),
            category = %category,
            outcome = %served.status,
            status = %served.response.status(),
            "served request"
        );
        served
    }

    /// Forwards `request` without touching any store, under `category`'s
    /// deadline.
    pub async fn bypass(&self, category: Category, request: &RequestDescriptor) -> Intercepted {
        self.network_only(category, self.policies.get(category), request)
            .await
    }

    async fn cache_first(
        &self,
        category: Category,
        policy: &CategoryPolicy,
        request: &RequestDescriptor,
    ) -> Intercepted {
        let store = self.store(category);
        let key = request.cache_key();

        if let Some(entry) = store.get(&key) {
            if request.is_page_load() {
                self.spawn_refresh(category, request.clone());
            }
            return Intercepted::new(category, CacheStatus::Hit, entry.into_response());
        }

        match self.fetch_through(&store, policy, request, false).await {
            Ok(response) => Intercepted::new(category, CacheStatus::Miss, response),
            Err(err) => self.offline_fallback(category, key, err),
        }
    }

    async fn network_first(
        &self,
        category: Category,
        policy: &CategoryPolicy,
        request: &RequestDescriptor,
    ) -> Intercepted {
        let store = self.store(category);
        let key = request.cache_key();

        if let Some(entry) = store.get(&key) {
            let now = SystemTime::now();
            if freshness::is_fresh(&entry, policy.freshness_window, policy.freshness_basis, now) {
                return Intercepted::new(category, CacheStatus::Hit, entry.into_response());
            }
        }

        let outcome = match self.fetch_through(&store, policy, request, true).await {
            Ok(response) if response.status().is_server_error() => Err(FetchError::Status {
                status: response.status().as_u16(),
            }),
            other => other,
        };

        match outcome {
            Ok(response) => Intercepted::new(category, CacheStatus::Miss, response),
            Err(err) => match store.get(&key) {
                Some(entry) => {
                    warn!(key = %key, error = %err, "network failed, serving stale entry");
                    Intercepted::new(category, CacheStatus::Stale, entry.into_response())
                        .with_error(err.into())
                }
                None => {
                    warn!(key = %key, error = %err, "network failed with nothing cached");
                    let error = InterceptError::NotFound { key, cause: err };
                    Intercepted::new(category, CacheStatus::Error, error.to_response())
                        .with_error(error)
                }
            },
        }
    }

    async fn cache_first_placeholder(
        &self,
        category: Category,
        policy: &CategoryPolicy,
        request: &RequestDescriptor,
    ) -> Intercepted {
        let store = self.store(category);
        let key = request.cache_key();

        if let Some(entry) = store.get(&key) {
            return Intercepted::new(category, CacheStatus::Hit, entry.into_response());
        }

        match self.fetch_through(&store, policy, request, true).await {
            Ok(response) => Intercepted::new(category, CacheStatus::Miss, response),
            Err(err) => {
                warn!(key = %key, error = %err, "image fetch failed, serving placeholder");
                Intercepted::new(category, CacheStatus::Placeholder, self.placeholder())
                    .with_error(err.into())
            }
        }
    }

    async fn network_only(
        &self,
        category: Category,
        policy: &CategoryPolicy,
        request: &RequestDescriptor,
    ) -> Intercepted {
        match with_timeout(self.fetcher.fetch(request), policy.timeout).await {
            Ok(response) => Intercepted::new(category, CacheStatus::Bypass, response),
            Err(err) => {
                warn!(url = %request.url(), error = %err, "pass-through request failed");
                let error = InterceptError::from(err);
                Intercepted::new(category, CacheStatus::Error, error.to_response())
                    .with_error(error)
            }
        }
    }

    /// Fetches `request` under the policy deadline, sharing the call with any
    /// concurrent identical request. The leader writes complete 2xx
    /// responses to `store` and trims it when `trim` is set.
    async fn fetch_through(
        &self,
        store: &CacheStore,
        policy: &CategoryPolicy,
        request: &RequestDescriptor,
        trim: bool,
    ) -> FetchResult {
        let key = request.cache_key();
        self.inflight
            .run(&key, || async {
                let response = with_timeout(self.fetcher.fetch(request), policy.timeout).await?;
                if response.status().is_complete() {
                    store.put(key.clone(), response.clone());
                    if trim {
                        eviction::trim(store, policy.max_entries);
                    }
                }
                Ok(response)
            })
            .await
    }

    /// Refetches and replaces a cached entry without blocking the caller.
    /// Failures are logged and otherwise discarded.
    fn spawn_refresh(&self, category: Category, request: RequestDescriptor) {
        let engine = self.clone();
        tokio::spawn(async move {
            let policy = engine.policies.get(category).clone();
            let store = engine.store(category);
            match engine.fetch_through(&store, &policy, &request, false).await {
                Ok(response) if response.status().is_complete() => {
                    debug!(url = %request.url(), "background refresh stored");
                }
                Ok(response) => {
                    warn!(url = %request.url(), status = %response.status(), "background refresh not stored");
                }
                Err(err) => {
                    warn!(url = %request.url(), error = %err, "background refresh failed");
                }
            }
        });
    }

    fn offline_fallback(&self, category: Category, key: String, err: FetchError) -> Intercepted {
        let offline = self
            .offline_key
            .as_deref()
            .and_then(|page| self.store(Category::Static).get(page));

        match offline {
            Some(page) => {
                warn!(key = %key, error = %err, "static fetch failed, serving offline page");
                Intercepted::new(category, CacheStatus::Offline, page.into_response())
                    .with_error(err.into())
            }
            None => {
                warn!(key = %key, error = %err, "static fetch failed with no offline page");
                let response = Response::new(StatusCode::SERVICE_UNAVAILABLE)
                    .header("Content-Type", "text/plain")
                    .body(OFFLINE_TEXT);
                Intercepted::new(category, CacheStatus::Error, response)
                    .with_error(InterceptError::NotFound { key, cause: err })
            }
        }
    }

    fn placeholder(&self) -> Response {
        let stored = self.placeholder_key.as_deref().and_then(|key| {
            self.store(Category::Images)
                .get(key)
                .or_else(|| self.store(Category::Static).get(key))
        });

        match stored {
            Some(entry) => entry.into_response(),
            None => Response::new(StatusCode::OK)
                .header("Content-Type", "image/png")
                .header("Cache-Control", "no-store")
                .body_bytes(Bytes::from_static(&TRANSPARENT_PIXEL)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::fetch::mock::MockFetcher;
    use crate::http::ResourceType;
    use crate::http::headers::format_http_date;

    const APP: &str = "https://films.example";

    fn engine(fetcher: Arc<MockFetcher>) -> (PolicyEngine, Arc<StoreRegistry>) {
        let registry = Arc::new(StoreRegistry::new());
        let engine = PolicyEngine::new(
            Arc::clone(&registry),
            fetcher,
            PolicyTable::default(),
            "reel-",
            "v1",
        )
        .with_offline_page(Some(format!("GET {APP}/offline.html")))
        .with_placeholder(Some(format!("GET {APP}/images/placeholder.png")));
        (engine, registry)
    }

    fn get(url: &str) -> RequestDescriptor {
        RequestDescriptor::get(url).unwrap()
    }

    fn dated(body: &str, at: SystemTime) -> Response {
        Response::new(StatusCode::OK)
            .header("Date", format_http_date(at))
            .body(body.to_owned())
    }

    #[tokio::test]
    async fn cache_first_stores_then_hits() {
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.ok(&format!("{APP}/app.js"), "console.log(1)");
        let (engine, _) = engine(fetcher.clone());
        let req = get(&format!("{APP}/app.js"));

        let first = engine.serve(Category::Static, &req).await;
        assert_eq!(first.status, CacheStatus::Miss);
        let second = engine.serve(Category::Static, &req).await;
        assert_eq!(second.status, CacheStatus::Hit);
        assert_eq!(second.response.body_ref().as_ref(), b"console.log(1)");
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn cache_first_does_not_store_errors() {
        let fetcher = Arc::new(MockFetcher::new());
        let (engine, _) = engine(fetcher.clone());
        let req = get(&format!("{APP}/missing.js"));

        let served = engine.serve(Category::Static, &req).await;
        assert_eq!(served.response.status(), StatusCode::NOT_FOUND);
        assert!(engine.store(Category::Static).is_empty());
    }

    fn partial(body: &str) -> Response {
        Response::new(StatusCode::PARTIAL_CONTENT)
            .header("Content-Range", format!("bytes 0-{}/1000", body.len() - 1))
            .body(body.to_owned())
    }

    #[tokio::test]
    async fn ranged_request_does_not_poison_plain_request() {
        let fetcher = Arc::new(MockFetcher::new());
        let url = format!("{APP}/intro.mp4");
        fetcher.respond(&url, partial("abcd"));
        let (engine, _) = engine(fetcher.clone());

        let ranged = engine
            .serve(Category::Static, &get(&url).with_header("Range", "bytes=0-3"))
            .await;
        assert_eq!(ranged.status, CacheStatus::Bypass);
        assert_eq!(ranged.response.status(), StatusCode::PARTIAL_CONTENT);
        assert!(engine.store(Category::Static).is_empty());

        fetcher.ok(&url, "whole reel");
        let plain = engine.serve(Category::Static, &get(&url)).await;
        assert_eq!(plain.status, CacheStatus::Miss);
        assert_eq!(plain.response.status(), StatusCode::OK);

        let again = engine.serve(Category::Static, &get(&url)).await;
        assert_eq!(again.status, CacheStatus::Hit);
        assert_eq!(again.response.body_ref().as_ref(), b"whole reel");
        assert_eq!(fetcher.calls(), 2);
    }

    #[tokio::test]
    async fn partial_content_is_never_stored() {
        let fetcher = Arc::new(MockFetcher::new());
        let media = "https://cdn.example/trailer.mp4";
        let thumb = "https://archive.org/services/img/reel";
        fetcher.respond(media, partial("abcd"));
        fetcher.respond(thumb, partial("png"));
        let (engine, registry) = engine(fetcher);

        let dynamic = engine.serve(Category::Dynamic, &get(media)).await;
        assert_eq!(dynamic.response.status(), StatusCode::PARTIAL_CONTENT);
        let image = engine.serve(Category::Images, &get(thumb)).await;
        assert_eq!(image.response.status(), StatusCode::PARTIAL_CONTENT);

        assert_eq!(registry.total_bytes(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn ranged_request_never_shares_a_fetch() {
        let fetcher = Arc::new(MockFetcher::new().with_delay(Duration::from_millis(100)));
        let url = "https://archive.org/metadata/reel";
        fetcher.ok(url, "{}");
        let (engine, _) = engine(fetcher.clone());

        let ranged = get(url).with_header("Range", "bytes=0-1");
        let plain = get(url);
        let (ranged, plain) = tokio::join!(
            engine.serve(Category::Dynamic, &ranged),
            engine.serve(Category::Dynamic, &plain),
        );

        assert_eq!(ranged.status, CacheStatus::Bypass);
        assert_eq!(plain.status, CacheStatus::Miss);
        assert_eq!(fetcher.calls(), 2);
    }

    #[tokio::test]
    async fn page_load_hit_refreshes_in_background() {
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.ok(&format!("{APP}/"), "new shell");
        let (engine, _) = engine(fetcher.clone());
        let req = get(&format!("{APP}/")).with_destination(ResourceType::Document);
        engine
            .store(Category::Static)
            .put(req.cache_key(), Response::new(StatusCode::OK).body("old shell"));

        let served = engine.serve(Category::Static, &req).await;
        assert_eq!(served.status, CacheStatus::Hit);
        assert_eq!(served.response.body_ref().as_ref(), b"old shell");

        for _ in 0..100 {
            if fetcher.calls() == 1 && engine.inflight().is_empty() {
                break;
            }
            tokio::task::yield_now().await;
        }
        let refreshed = engine.store(Category::Static).get(&req.cache_key()).unwrap();
        assert_eq!(refreshed.response().body_ref().as_ref(), b"new shell");
    }

    #[tokio::test]
    async fn static_failure_serves_offline_page() {
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.fail(&format!("{APP}/about.html"), FetchError::Network("offline".into()));
        let (engine, _) = engine(fetcher);
        engine.store(Category::Static).put(
            format!("GET {APP}/offline.html"),
            Response::new(StatusCode::OK).body("you are offline"),
        );

        let served = engine.serve(Category::Static, &get(&format!("{APP}/about.html"))).await;
        assert_eq!(served.status, CacheStatus::Offline);
        assert_eq!(served.response.body_ref().as_ref(), b"you are offline");
    }

    #[tokio::test]
    async fn static_failure_without_offline_page_is_503() {
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.fail(&format!("{APP}/about.html"), FetchError::Network("offline".into()));
        let (engine, _) = engine(fetcher);

        let served = engine.serve(Category::Static, &get(&format!("{APP}/about.html"))).await;
        assert_eq!(served.status, CacheStatus::Error);
        assert_eq!(served.response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(served.response.body_ref().as_ref(), OFFLINE_TEXT.as_bytes());
        assert!(matches!(served.error, Some(InterceptError::NotFound { .. })));
    }

    #[tokio::test]
    async fn fresh_dynamic_entry_skips_network() {
        let fetcher = Arc::new(MockFetcher::new());
        let (engine, _) = engine(fetcher.clone());
        let req = get("https://archive.org/metadata/reel");
        engine
            .store(Category::Dynamic)
            .put(req.cache_key(), dated("{}", SystemTime::now()));

        let served = engine.serve(Category::Dynamic, &req).await;
        assert_eq!(served.status, CacheStatus::Hit);
        assert_eq!(fetcher.calls(), 0);
    }

    #[tokio::test]
    async fn undated_dynamic_entry_is_revalidated() {
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.ok("https://archive.org/metadata/reel", "fresh");
        let (engine, _) = engine(fetcher.clone());
        let req = get("https://archive.org/metadata/reel");
        engine
            .store(Category::Dynamic)
            .put(req.cache_key(), Response::new(StatusCode::OK).body("undated"));

        let served = engine.serve(Category::Dynamic, &req).await;
        assert_eq!(served.status, CacheStatus::Miss);
        assert_eq!(served.response.body_ref().as_ref(), b"fresh");
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn stale_entry_served_on_failure() {
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.fail("https://archive.org/metadata/reel", FetchError::Network("reset".into()));
        let (engine, _) = engine(fetcher);
        let req = get("https://archive.org/metadata/reel");
        let two_hours_ago = SystemTime::now() - Duration::from_secs(2 * 3600);
        engine
            .store(Category::Dynamic)
            .put(req.cache_key(), dated("old", two_hours_ago));

        let served = engine.serve(Category::Dynamic, &req).await;
        assert!(served.is_stale());
        assert_eq!(served.response.body_ref().as_ref(), b"old");
    }

    #[tokio::test]
    async fn server_error_counts_as_failure_for_dynamic() {
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.respond(
            "https://archive.org/advancedsearch.php?q=x",
            Response::new(StatusCode::from_u16(503)),
        );
        let (engine, _) = engine(fetcher);
        let req = get("https://archive.org/advancedsearch.php?q=x");
        engine
            .store(Category::Dynamic)
            .put(req.cache_key(), Response::new(StatusCode::OK).body("cached results"));

        let served = engine.serve(Category::Dynamic, &req).await;
        assert_eq!(served.status, CacheStatus::Stale);
        assert_eq!(served.response.body_ref().as_ref(), b"cached results");
    }

    #[tokio::test]
    async fn dynamic_failure_with_nothing_cached_is_structured() {
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.fail("https://archive.org/metadata/x", FetchError::Network("dns".into()));
        let (engine, _) = engine(fetcher);

        let served = engine.serve(Category::Dynamic, &get("https://archive.org/metadata/x")).await;
        assert_eq!(served.status, CacheStatus::Error);
        assert_eq!(served.response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body: serde_json::Value = serde_json::from_slice(served.response.body_ref()).unwrap();
        assert_eq!(body["error"], "Network error");
    }

    #[tokio::test(start_paused = true)]
    async fn dynamic_timeout_falls_back() {
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.hang("https://archive.org/metadata/slow");
        let (engine, _) = engine(fetcher);
        let req = get("https://archive.org/metadata/slow");
        engine
            .store(Category::Dynamic)
            .put(req.cache_key(), Response::new(StatusCode::OK).body("stale"));

        let served = engine.serve(Category::Dynamic, &req).await;
        assert!(served.is_stale());
        assert!(matches!(served.error, Some(InterceptError::Timeout { .. })));
    }

    #[tokio::test]
    async fn dynamic_writes_are_trimmed() {
        let fetcher = Arc::new(MockFetcher::new());
        let registry = Arc::new(StoreRegistry::new());
        let mut table = PolicyTable::default();
        table.dynamic.max_entries = 2;
        let engine = PolicyEngine::new(registry, fetcher.clone(), table, "reel-", "v1");

        for q in ["a", "b", "c"] {
            let url = format!("https://archive.org/metadata/{q}");
            fetcher.ok(&url, q);
            engine.serve(Category::Dynamic, &get(&url)).await;
        }
        let store = engine.store(Category::Dynamic);
        assert_eq!(
            store.keys(),
            vec![
                "GET https://archive.org/metadata/b".to_owned(),
                "GET https://archive.org/metadata/c".to_owned(),
            ]
        );
    }

    #[tokio::test]
    async fn image_failure_serves_builtin_pixel() {
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.fail("https://archive.org/services/img/reel", FetchError::Network("x".into()));
        let (engine, _) = engine(fetcher);

        let served = engine
            .serve(Category::Images, &get("https://archive.org/services/img/reel"))
            .await;
        assert_eq!(served.status, CacheStatus::Placeholder);
        assert_eq!(served.response.status(), StatusCode::OK);
        assert_eq!(served.response.headers().get("content-type"), Some("image/png"));
        assert_eq!(served.response.body_len(), 70);
    }

    #[tokio::test]
    async fn image_failure_prefers_stored_placeholder() {
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.fail("https://archive.org/services/img/reel", FetchError::Network("x".into()));
        let (engine, _) = engine(fetcher);
        engine.store(Category::Static).put(
            format!("GET {APP}/images/placeholder.png"),
            Response::new(StatusCode::OK).body("placeholder"),
        );

        let served = engine
            .serve(Category::Images, &get("https://archive.org/services/img/reel"))
            .await;
        assert_eq!(served.response.body_ref().as_ref(), b"placeholder");
    }

    #[tokio::test]
    async fn network_only_never_stores() {
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.ok("https://archive.org/download/reel/reel.mp4", "video");
        let (engine, registry) = engine(fetcher);

        let served = engine
            .serve(Category::PassThrough, &get("https://archive.org/download/reel/reel.mp4"))
            .await;
        assert_eq!(served.status, CacheStatus::Bypass);
        assert_eq!(registry.total_bytes(), 0);
        assert!(registry.stores().iter().all(|s| s.is_empty()));
    }

    #[tokio::test]
    async fn network_only_failure_is_bad_gateway() {
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.fail("https://archive.org/download/x", FetchError::Network("refused".into()));
        let (engine, _) = engine(fetcher);

        let served = engine
            .serve(Category::PassThrough, &get("https://archive.org/download/x"))
            .await;
        assert_eq!(served.response.status(), StatusCode::BAD_GATEWAY);
        assert!(matches!(served.error, Some(InterceptError::NetworkFailure { .. })));
    }
}
