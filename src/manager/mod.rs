//! The caching subsystem as one explicit object.
//!
//! A [`CacheManager`] is constructed once per process and owns the lifecycle
//! (install → activate), the interception path, and the control plane. There
//! is no ambient global state: the registry and the fetcher are handed in.

use std::sync::{Arc, RwLock};

use tracing::{info, warn};
use url::Url;

use crate::cache::lock::{rw_read, rw_write};
use crate::cache::{self, StoreRegistry, eviction};
use crate::classify::{Category, Classifier};
use crate::config::CacheConfig;
use crate::control::{ControlCommand, ControlError, ControlReply, Lifecycle, SyncTag};
use crate::fetch::{FetchError, Fetcher, retry_with_backoff, with_timeout};
use crate::http::{Method, RequestDescriptor, Response};
use crate::policy::{Intercepted, PolicyEngine};

pub struct CacheManager {
    config: CacheConfig,
    registry: Arc<StoreRegistry>,
    classifier: Classifier,
    engine: PolicyEngine,
    state: RwLock<Lifecycle>,
}

impl CacheManager {
    pub fn new(config: CacheConfig, registry: Arc<StoreRegistry>, fetcher: Arc<dyn Fetcher>) -> Self {
        let offline_key = fallback_key(&config, config.offline_page.as_deref());
        let placeholder_key = fallback_key(&config, config.placeholder_image.as_deref());
        let engine = PolicyEngine::new(
            Arc::clone(&registry),
            fetcher,
            config.policies.clone(),
            config.store_prefix.clone(),
            config.version.clone(),
        )
        .with_offline_page(offline_key)
        .with_placeholder(placeholder_key);

        let state = RwLock::new(Lifecycle::Installing {
            version: config.version.clone(),
        });

        Self {
            classifier: config.classifier(),
            config,
            registry,
            engine,
            state,
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<StoreRegistry> {
        &self.registry
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    pub fn state(&self) -> Lifecycle {
        rw_read(&self.state, "manager.state").clone()
    }

    fn transition(&self, next: Lifecycle) {
        let mut state = rw_write(&self.state, "manager.transition");
        info!(from = %*state, to = %next, "lifecycle transition");
        *state = next;
    }

    /// Pre-populates the static store with the asset manifest.
    ///
    /// Every asset is fetched with the bootstrap retry; a non-2xx status
    /// counts as a failed attempt. Nothing is written unless every asset
    /// succeeds. Returns the number of assets stored.
    pub async fn install(&self) -> Result<usize, ControlError> {
        let state = self.state();
        if state.is_active() {
            return Err(ControlError::InvalidTransition {
                action: "install",
                state: state.to_string(),
            });
        }
        self.transition(Lifecycle::Installing {
            version: self.config.version.clone(),
        });

        let fetcher = self.engine.fetcher();
        let deadline = self.config.policies.get(Category::Static).timeout;
        let mut staged = Vec::with_capacity(self.config.asset_manifest.len());

        for asset in &self.config.asset_manifest {
            let url = self
                .config
                .resolve(asset)
                .map_err(|source| ControlError::InvalidUrl {
                    url: asset.clone(),
                    source,
                })?;
            let request = RequestDescriptor::new(Method::Get, url);

            let response = retry_with_backoff(self.config.bootstrap, || async {
                let response = with_timeout(fetcher.fetch(&request), deadline).await?;
                if !response.status().is_complete() {
                    return Err(FetchError::Status {
                        status: response.status().as_u16(),
                    });
                }
                Ok(response)
            })
            .await
            .map_err(|source| {
                warn!(url = %request.url(), error = %source, "install aborted");
                ControlError::Install {
                    url: request.url().to_string(),
                    source,
                }
            })?;

            staged.push((request.cache_key(), response));
        }

        let store = self.engine.store(Category::Static);
        let count = staged.len();
        for (key, response) in staged {
            store.put(key, response);
        }

        self.transition(Lifecycle::Waiting {
            version: self.config.version.clone(),
        });
        info!(store = store.name(), assets = count, "installed asset manifest");
        Ok(count)
    }

    /// Deletes every store of a superseded generation and starts serving.
    /// Returns the number of stores deleted. A no-op when already active.
    pub fn activate(&self) -> usize {
        if self.state().is_active() {
            return 0;
        }
        let version = self.config.version.clone();
        self.transition(Lifecycle::Activating {
            version: version.clone(),
        });

        let mut deleted = 0;
        for name in self.registry.names() {
            if cache::is_superseded(&name, &self.config.store_prefix, &version)
                && self.registry.delete(&name)
            {
                deleted += 1;
            }
        }

        self.transition(Lifecycle::Active { version });
        info!(deleted, "activated caching generation");
        deleted
    }

    /// Classifies `request` and serves it with its category's strategy.
    ///
    /// Before activation every request is forwarded uncached.
    pub async fn intercept(&self, request: &RequestDescriptor) -> Intercepted {
        let category = self.classifier.classify(request);
        if self.state().is_active() {
            self.engine.serve(category, request).await
        } else {
            self.engine.bypass(category, request).await
        }
    }

    /// Parses and executes a JSON control message.
    pub async fn dispatch(&self, message: &[u8]) -> Result<ControlReply, ControlError> {
        let command = ControlCommand::parse(message).inspect_err(|err| {
            warn!(error = %err, "rejected control message");
        })?;
        self.handle(command).await
    }

    pub async fn handle(&self, command: ControlCommand) -> Result<ControlReply, ControlError> {
        let action = command.action();
        let reply = match command {
            ControlCommand::SkipWaiting => {
                self.activate();
                Ok(ControlReply::ok())
            }
            ControlCommand::ClearCache => {
                self.clear_all();
                Ok(ControlReply::ok())
            }
            ControlCommand::CacheVideo { url } => {
                self.precache(&url).await.map(|()| ControlReply::ok())
            }
            ControlCommand::GetCacheSize => Ok(ControlReply::size(self.cache_size())),
        };
        match &reply {
            Ok(_) => info!(action, "control command handled"),
            Err(err) => warn!(action, error = %err, "control command failed"),
        }
        reply
    }

    /// Deletes every store regardless of generation. Returns how many existed.
    pub fn clear_all(&self) -> usize {
        let cleared = self.registry.clear();
        info!(cleared, "cleared all cache stores");
        cleared
    }

    /// Fetches `url` and inserts it into the dynamic store, bypassing the
    /// classifier. The response must be 2xx.
    pub async fn precache(&self, url: &str) -> Result<(), ControlError> {
        let target = self
            .config
            .resolve(url)
            .map_err(|source| ControlError::InvalidUrl {
                url: url.to_owned(),
                source,
            })?;
        let request = RequestDescriptor::new(Method::Get, target);
        let deadline = self.config.policies.get(Category::PassThrough).timeout;

        let fetched = with_timeout(self.engine.fetcher().fetch(&request), deadline)
            .await
            .and_then(|response| {
                if response.status().is_complete() {
                    Ok(response)
                } else {
                    Err(FetchError::Status {
                        status: response.status().as_u16(),
                    })
                }
            });
        let response = fetched.map_err(|source| ControlError::Fetch {
            url: request.url().to_string(),
            source,
        })?;

        let store = self.engine.store(Category::Dynamic);
        let bytes = response.body_len();
        store.put(request.cache_key(), response);
        eviction::trim(&store, self.config.policies.get(Category::Dynamic).max_entries);
        info!(url = %request.url(), bytes, "pre-cached resource");
        Ok(())
    }

    /// Byte total of every stored payload across every store.
    pub fn cache_size(&self) -> u64 {
        self.registry.total_bytes()
    }

    /// Finds a stored GET response for `url` in the current generation,
    /// without touching the network.
    pub fn lookup(&self, url: &str) -> Option<Response> {
        let target = self.config.resolve(url).ok()?;
        let key = RequestDescriptor::new(Method::Get, target).cache_key();
        Category::CACHED
            .iter()
            .filter_map(|category| {
                let name = cache::store_name(
                    &self.config.store_prefix,
                    &self.config.version,
                    category.as_str(),
                );
                self.registry.get(&name)
            })
            .find_map(|store| store.get(&key))
            .map(|entry| entry.into_response())
    }

    /// Fires a background-sync hook. Both known hooks are reserved and do
    /// nothing yet.
    pub fn sync(&self, tag: &str) -> Result<ControlReply, ControlError> {
        let tag: SyncTag = tag.parse()?;
        info!(tag = %tag, "background sync requested; no work registered");
        Ok(ControlReply::ok())
    }
}

fn fallback_key(config: &CacheConfig, path: Option<&str>) -> Option<String> {
    let url: Url = config.resolve(path?).ok()?;
    Some(RequestDescriptor::new(Method::Get, url).cache_key())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::fetch::mock::MockFetcher;
    use crate::http::StatusCode;
    use crate::policy::CacheStatus;

    const APP: &str = "https://films.example";

    fn config(version: &str) -> CacheConfig {
        let mut config = CacheConfig::new(Url::parse(APP).unwrap()).with_version(version);
        config.asset_manifest = vec!["/".into(), "/app.js".into()];
        config
    }

    fn manager(version: &str, fetcher: Arc<MockFetcher>) -> CacheManager {
        CacheManager::new(config(version), Arc::new(StoreRegistry::new()), fetcher)
    }

    fn shell(fetcher: &MockFetcher) {
        fetcher.ok(&format!("{APP}/"), "<html>");
        fetcher.ok(&format!("{APP}/app.js"), "app()");
    }

    #[tokio::test]
    async fn install_stages_manifest_then_waits() {
        let fetcher = Arc::new(MockFetcher::new());
        shell(&fetcher);
        let manager = manager("v1", fetcher);

        assert_eq!(manager.install().await.unwrap(), 2);
        assert_eq!(manager.state(), Lifecycle::Waiting { version: "v1".into() });
        let store = manager.registry().get("reel-v1-static").unwrap();
        assert_eq!(store.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn install_is_all_or_nothing() {
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.ok(&format!("{APP}/"), "<html>");
        fetcher.fail(&format!("{APP}/app.js"), FetchError::Network("refused".into()));
        let manager = manager("v1", fetcher.clone());

        let err = manager.install().await.unwrap_err();
        assert!(matches!(err, ControlError::Install { .. }));
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
        // One call for "/", three attempts for "/app.js".
        assert_eq!(fetcher.calls(), 4);
        assert!(manager.registry().get("reel-v1-static").is_none_or(|s| s.is_empty()));
        assert!(matches!(manager.state(), Lifecycle::Installing { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn install_treats_404_as_failure() {
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.ok(&format!("{APP}/"), "<html>");
        let manager = manager("v1", fetcher);

        let err = manager.install().await.unwrap_err();
        assert!(matches!(
            err,
            ControlError::Install {
                source: FetchError::Status { status: 404 },
                ..
            }
        ));
    }

    #[tokio::test]
    async fn activate_deletes_only_superseded_generations() {
        let fetcher = Arc::new(MockFetcher::new());
        shell(&fetcher);
        let manager = manager("v2", fetcher);
        let registry = manager.registry();
        registry.open("reel-v1-static");
        registry.open("reel-v1-dynamic");
        registry.open("unrelated-cache");

        manager.install().await.unwrap();
        assert_eq!(manager.activate(), 2);
        assert!(manager.state().is_active());
        assert_eq!(
            registry.names(),
            vec!["reel-v2-static".to_owned(), "unrelated-cache".to_owned()]
        );
        assert_eq!(registry.get("reel-v2-static").unwrap().len(), 2);
        assert_eq!(manager.activate(), 0);
    }

    #[tokio::test]
    async fn install_after_activation_is_rejected() {
        let fetcher = Arc::new(MockFetcher::new());
        let manager = manager("v1", fetcher);
        manager.activate();
        let err = manager.install().await.unwrap_err();
        assert_eq!(err.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn intercept_before_activation_bypasses_stores() {
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.ok(&format!("{APP}/styles.css"), "body{}");
        let manager = manager("v1", fetcher);

        let req = RequestDescriptor::get(&format!("{APP}/styles.css")).unwrap();
        let served = manager.intercept(&req).await;
        assert_eq!(served.category, Category::Static);
        assert_eq!(served.status, CacheStatus::Bypass);
        assert_eq!(manager.cache_size(), 0);
    }

    #[tokio::test]
    async fn intercept_after_activation_caches() {
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.ok(&format!("{APP}/styles.css"), "body{}");
        let manager = manager("v1", fetcher.clone());
        manager.activate();

        let req = RequestDescriptor::get(&format!("{APP}/styles.css")).unwrap();
        assert_eq!(manager.intercept(&req).await.status, CacheStatus::Miss);
        assert_eq!(manager.intercept(&req).await.status, CacheStatus::Hit);
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn dispatch_runs_control_commands() {
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.ok("https://archive.org/download/reel/reel.mp4", "0123456789");
        let manager = manager("v1", fetcher);

        let reply = manager
            .dispatch(br#"{"action":"CACHE_VIDEO","data":{"url":"https://archive.org/download/reel/reel.mp4"}}"#)
            .await
            .unwrap();
        assert!(reply.success);

        let size = manager
            .dispatch(br#"{"action":"GET_CACHE_SIZE"}"#)
            .await
            .unwrap();
        assert_eq!(size.size, Some(10));

        let cached = manager
            .lookup("https://archive.org/download/reel/reel.mp4")
            .unwrap();
        assert_eq!(cached.body_ref().as_ref(), b"0123456789");

        manager.dispatch(br#"{"action":"CLEAR_CACHE"}"#).await.unwrap();
        assert_eq!(manager.cache_size(), 0);
        assert!(manager.lookup("https://archive.org/download/reel/reel.mp4").is_none());
        assert!(manager.registry().names().is_empty());
    }

    #[tokio::test]
    async fn skip_waiting_activates() {
        let manager = manager("v1", Arc::new(MockFetcher::new()));
        manager.handle(ControlCommand::SkipWaiting).await.unwrap();
        assert!(manager.state().is_active());
    }

    #[tokio::test]
    async fn cache_video_requires_success_status() {
        let manager = manager("v1", Arc::new(MockFetcher::new()));
        let err = manager
            .handle(ControlCommand::CacheVideo {
                url: "https://archive.org/download/missing.mp4".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ControlError::Fetch {
                source: FetchError::Status { status: 404 },
                ..
            }
        ));
        assert_eq!(manager.cache_size(), 0);
    }

    #[tokio::test]
    async fn cache_video_trims_dynamic_store() {
        let fetcher = Arc::new(MockFetcher::new());
        let mut config = config("v1");
        config.policies.dynamic.max_entries = 1;
        let manager = CacheManager::new(config, Arc::new(StoreRegistry::new()), fetcher.clone());

        for name in ["a", "b"] {
            let url = format!("https://archive.org/download/{name}.mp4");
            fetcher.ok(&url, name);
            manager.precache(&url).await.unwrap();
        }
        let store = manager.registry().get("reel-v1-dynamic").unwrap();
        assert_eq!(store.keys(), vec!["GET https://archive.org/download/b.mp4".to_owned()]);
    }

    #[tokio::test(start_paused = true)]
    async fn cache_video_has_no_deadline_by_default() {
        let fetcher = Arc::new(MockFetcher::new().with_delay(Duration::from_secs(120)));
        fetcher.ok("https://archive.org/download/long.mp4", "frames");
        let manager = manager("v1", fetcher);
        assert!(manager.precache("https://archive.org/download/long.mp4").await.is_ok());
    }

    #[tokio::test]
    async fn malformed_control_message_is_bad_request() {
        let manager = manager("v1", Arc::new(MockFetcher::new()));
        let err = manager.dispatch(b"not json").await.unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn sync_hooks_are_explicit_stubs() {
        let manager = manager("v1", Arc::new(MockFetcher::new()));
        assert!(manager.sync("sync-bookmarks").unwrap().success);
        assert!(manager.sync("sync-progress").unwrap().success);
        assert!(matches!(
            manager.sync("sync-everything"),
            Err(ControlError::UnknownSyncTag(_))
        ));
    }
}
