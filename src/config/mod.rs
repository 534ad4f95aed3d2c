//! Configuration: the caching layer's own [`CacheConfig`], and the process
//! [`Settings`] resolved with layered precedence (defaults → file → env → CLI).

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

use crate::cache::FreshnessBasis;
use crate::classify::{Category, Classifier};
use crate::fetch::RetryPolicy;
use crate::policy::{CategoryPolicy, PolicyTable, StrategyKind};

const LOCAL_CONFIG_BASENAME: &str = "reelcache";
const ENV_PREFIX: &str = "REELCACHE";
const DEFAULT_LISTEN: &str = "127.0.0.1:8080";
const DEFAULT_APP_ORIGIN: &str = "http://localhost:8000";
const DEFAULT_VERSION: &str = "v1";
const DEFAULT_STORE_PREFIX: &str = "reel-";
const DEFAULT_ARCHIVE_HOST: &str = "archive.org";
const DEFAULT_OFFLINE_PAGE: &str = "/offline.html";
const DEFAULT_PLACEHOLDER_IMAGE: &str = "/images/placeholder.png";
const DEFAULT_ASSET_MANIFEST: [&str; 5] =
    ["/", "/index.html", "/styles.css", "/app.js", "/manifest.json"];

/// Everything the caching layer needs to know about the application it fronts.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Caching generation; stores are named `{store_prefix}{version}-{category}`.
    pub version: String,
    pub store_prefix: String,
    pub app_origin: Url,
    pub archive_host: String,
    pub dynamic_paths: Vec<String>,
    pub thumbnail_paths: Vec<String>,
    /// Assets pre-populated into the static store on install, resolved
    /// against `app_origin`.
    pub asset_manifest: Vec<String>,
    pub offline_page: Option<String>,
    pub placeholder_image: Option<String>,
    /// Activate immediately after a successful install.
    pub skip_waiting: bool,
    /// Retry applied to each manifest asset during install.
    pub bootstrap: RetryPolicy,
    pub policies: PolicyTable,
}

impl CacheConfig {
    pub fn new(app_origin: Url) -> Self {
        Self {
            version: DEFAULT_VERSION.to_owned(),
            store_prefix: DEFAULT_STORE_PREFIX.to_owned(),
            app_origin,
            archive_host: DEFAULT_ARCHIVE_HOST.to_owned(),
            dynamic_paths: vec!["/advancedsearch.php".into(), "/metadata/".into()],
            thumbnail_paths: vec!["/img/".into()],
            asset_manifest: DEFAULT_ASSET_MANIFEST.iter().map(|s| (*s).to_owned()).collect(),
            offline_page: Some(DEFAULT_OFFLINE_PAGE.to_owned()),
            placeholder_image: Some(DEFAULT_PLACEHOLDER_IMAGE.to_owned()),
            skip_waiting: true,
            bootstrap: RetryPolicy::default(),
            policies: PolicyTable::default(),
        }
    }

    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Resolves an application path (or an absolute URL) against the origin.
    pub fn resolve(&self, path: &str) -> Result<Url, url::ParseError> {
        self.app_origin.join(path)
    }

    pub fn classifier(&self) -> Classifier {
        Classifier::new(self.app_origin.clone(), self.archive_host.clone())
            .with_dynamic_paths(self.dynamic_paths.clone())
            .with_thumbnail_paths(self.thumbnail_paths.clone())
    }
}

/// Command-line arguments for the reelcache binary.
#[derive(Debug, Default, Parser)]
#[command(name = "reelcache", version, about = "Offline-first caching proxy")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "REELCACHE_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    /// Override the proxy listen address.
    #[arg(long, value_name = "ADDR")]
    pub listen: Option<String>,

    /// Override the caching generation.
    #[arg(long = "version-tag", value_name = "TAG")]
    pub version_tag: Option<String>,

    /// Override the application origin.
    #[arg(long = "app-origin", value_name = "URL")]
    pub app_origin: Option<String>,

    /// Override the snapshot file restored at startup and written at shutdown.
    #[arg(long, value_name = "PATH")]
    pub snapshot: Option<PathBuf>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,
}

/// Fully-resolved process settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub listen: SocketAddr,
    pub logging: LoggingSettings,
    pub cache: CacheConfig,
    pub snapshot: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Loads settings using the configured precedence.
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder =
        Config::builder().add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_cli_overrides(cli);
    Settings::from_raw(raw)
}

/// Parses the command line, then loads settings with it.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    cache: RawCacheSettings,
    policies: RawPolicies,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    listen: Option<String>,
    snapshot: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    format: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    version: Option<String>,
    store_prefix: Option<String>,
    app_origin: Option<String>,
    archive_host: Option<String>,
    dynamic_paths: Option<Vec<String>>,
    thumbnail_paths: Option<Vec<String>>,
    asset_manifest: Option<Vec<String>>,
    offline_page: Option<String>,
    placeholder_image: Option<String>,
    skip_waiting: Option<bool>,
    bootstrap: Option<RetryPolicy>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawPolicies {
    #[serde(rename = "static")]
    static_assets: RawPolicy,
    dynamic: RawPolicy,
    images: RawPolicy,
    passthrough: RawPolicy,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawPolicy {
    strategy: Option<StrategyKind>,
    max_entries: Option<usize>,
    freshness_window_ms: Option<u64>,
    /// Zero disables the deadline.
    timeout_ms: Option<u64>,
    freshness_basis: Option<FreshnessBasis>,
}

impl RawSettings {
    fn apply_cli_overrides(&mut self, cli: &CliArgs) {
        if let Some(listen) = cli.listen.as_ref() {
            self.server.listen = Some(listen.clone());
        }
        if let Some(snapshot) = cli.snapshot.as_ref() {
            self.server.snapshot = Some(snapshot.clone());
        }
        if let Some(level) = cli.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(version) = cli.version_tag.as_ref() {
            self.cache.version = Some(version.clone());
        }
        if let Some(origin) = cli.app_origin.as_ref() {
            self.cache.app_origin = Some(origin.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            cache,
            policies,
        } = raw;

        let listen_value = server.listen.unwrap_or_else(|| DEFAULT_LISTEN.to_owned());
        let listen = listen_value.parse().map_err(|err| {
            LoadError::invalid("server.listen", format!("invalid address `{listen_value}`: {err}"))
        })?;

        let logging = build_logging_settings(logging)?;
        let mut cache = build_cache_config(cache)?;
        cache.policies = build_policy_table(policies)?;

        Ok(Self {
            listen,
            logging,
            cache,
            snapshot: server.snapshot,
        })
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = match logging.format.as_deref() {
        None | Some("compact") => LogFormat::Compact,
        Some("json") => LogFormat::Json,
        Some(other) => {
            return Err(LoadError::invalid(
                "logging.format",
                format!("expected `compact` or `json`, got `{other}`"),
            ));
        }
    };

    Ok(LoggingSettings { level, format })
}

fn build_cache_config(cache: RawCacheSettings) -> Result<CacheConfig, LoadError> {
    let origin_value = cache
        .app_origin
        .unwrap_or_else(|| DEFAULT_APP_ORIGIN.to_owned());
    let app_origin = Url::parse(&origin_value)
        .map_err(|err| LoadError::invalid("cache.app_origin", err.to_string()))?;
    if !matches!(app_origin.scheme(), "http" | "https") || app_origin.host_str().is_none() {
        return Err(LoadError::invalid(
            "cache.app_origin",
            "must be an http(s) URL with a host",
        ));
    }

    let mut config = CacheConfig::new(app_origin);

    if let Some(version) = cache.version {
        let version = version.trim().to_owned();
        if version.is_empty() {
            return Err(LoadError::invalid("cache.version", "must not be empty"));
        }
        config.version = version;
    }
    if let Some(prefix) = cache.store_prefix {
        if prefix.is_empty() {
            return Err(LoadError::invalid("cache.store_prefix", "must not be empty"));
        }
        config.store_prefix = prefix;
    }
    if let Some(host) = cache.archive_host {
        config.archive_host = host;
    }
    if let Some(paths) = cache.dynamic_paths {
        config.dynamic_paths = paths;
    }
    if let Some(paths) = cache.thumbnail_paths {
        config.thumbnail_paths = paths;
    }
    if let Some(manifest) = cache.asset_manifest {
        config.asset_manifest = manifest;
    }
    for asset in &config.asset_manifest {
        config
            .resolve(asset)
            .map_err(|err| LoadError::invalid("cache.asset_manifest", format!("`{asset}`: {err}")))?;
    }
    if let Some(page) = cache.offline_page {
        config.offline_page = non_blank(page);
    }
    if let Some(image) = cache.placeholder_image {
        config.placeholder_image = non_blank(image);
    }
    if let Some(skip) = cache.skip_waiting {
        config.skip_waiting = skip;
    }
    if let Some(bootstrap) = cache.bootstrap {
        if bootstrap.attempts == 0 {
            return Err(LoadError::invalid(
                "cache.bootstrap.attempts",
                "must be greater than zero",
            ));
        }
        config.bootstrap = bootstrap;
    }

    Ok(config)
}

fn build_policy_table(raw: RawPolicies) -> Result<PolicyTable, LoadError> {
    let mut table = PolicyTable::default();
    let sections = [
        (Category::Static, raw.static_assets, POLICY_KEYS[0]),
        (Category::Dynamic, raw.dynamic, POLICY_KEYS[1]),
        (Category::Images, raw.images, POLICY_KEYS[2]),
        (Category::PassThrough, raw.passthrough, POLICY_KEYS[3]),
    ];
    for (category, policy, keys) in sections {
        apply_policy(category, table.get_mut(category), policy, keys)?;
    }
    Ok(table)
}

/// `(strategy, max_entries)` keys per policy section, in table order.
const POLICY_KEYS: [(&str, &str); 4] = [
    ("policies.static.strategy", "policies.static.max_entries"),
    ("policies.dynamic.strategy", "policies.dynamic.max_entries"),
    ("policies.images.strategy", "policies.images.max_entries"),
    ("policies.passthrough.strategy", "policies.passthrough.max_entries"),
];

fn apply_policy(
    category: Category,
    policy: &mut CategoryPolicy,
    raw: RawPolicy,
    (strategy_key, max_entries_key): (&'static str, &'static str),
) -> Result<(), LoadError> {
    // Accepted only when it restates the category's own strategy.
    if let Some(strategy) = raw.strategy {
        let fixed = StrategyKind::for_category(category);
        if strategy != fixed {
            return Err(LoadError::invalid(
                strategy_key,
                format!("`{category}` is always served with `{fixed}`"),
            ));
        }
    }
    if let Some(max) = raw.max_entries {
        if max == 0 && category.is_cached() {
            return Err(LoadError::invalid(max_entries_key, "must be greater than zero"));
        }
        policy.max_entries = max;
    }
    if let Some(ms) = raw.freshness_window_ms {
        policy.freshness_window = Duration::from_millis(ms);
    }
    if let Some(ms) = raw.timeout_ms {
        policy.timeout = (ms > 0).then(|| Duration::from_millis(ms));
    }
    if let Some(basis) = raw.freshness_basis {
        policy.freshness_basis = basis;
    }
    Ok(())
}

fn non_blank(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");
        assert_eq!(settings.listen.port(), 8080);
        assert_eq!(settings.logging.level, LevelFilter::INFO);
        assert_eq!(settings.logging.format, LogFormat::Compact);
        assert_eq!(settings.cache.version, "v1");
        assert_eq!(settings.cache.store_prefix, "reel-");
        assert_eq!(settings.cache.asset_manifest.len(), 5);
        assert_eq!(settings.cache.policies, PolicyTable::default());
        assert!(settings.snapshot.is_none());
    }

    #[test]
    fn cli_overrides_take_highest_precedence() {
        let mut raw = RawSettings::default();
        raw.cache.version = Some("v1".into());
        raw.logging.level = Some("info".into());

        let cli = CliArgs {
            version_tag: Some("v2".into()),
            log_level: Some("debug".into()),
            listen: Some("0.0.0.0:9000".into()),
            ..Default::default()
        };
        raw.apply_cli_overrides(&cli);
        let settings = Settings::from_raw(raw).expect("valid settings");

        assert_eq!(settings.cache.version, "v2");
        assert_eq!(settings.logging.level, LevelFilter::DEBUG);
        assert_eq!(settings.listen.port(), 9000);
    }

    #[test]
    fn policy_overrides_merge_onto_defaults() {
        let mut raw = RawSettings::default();
        raw.policies.dynamic.max_entries = Some(20);
        raw.policies.dynamic.freshness_basis = Some(FreshnessBasis::StoredAt);
        raw.policies.images.timeout_ms = Some(0);

        let settings = Settings::from_raw(raw).expect("valid settings");
        let dynamic = settings.cache.policies.get(Category::Dynamic);
        assert_eq!(dynamic.max_entries, 20);
        assert_eq!(dynamic.freshness_basis, FreshnessBasis::StoredAt);
        assert_eq!(dynamic.freshness_window, Duration::from_secs(3600));
        assert_eq!(settings.cache.policies.get(Category::Images).timeout, None);
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let mut raw = RawSettings::default();
        raw.policies.images.max_entries = Some(0);
        let err = Settings::from_raw(raw).unwrap_err();
        assert!(matches!(
            err,
            LoadError::Invalid {
                key: "policies.images.max_entries",
                ..
            }
        ));
    }

    #[test]
    fn pass_through_cannot_be_given_a_caching_strategy() {
        let mut raw = RawSettings::default();
        raw.policies.passthrough.strategy = Some(StrategyKind::CacheFirst);
        let err = Settings::from_raw(raw).unwrap_err();
        assert!(matches!(
            err,
            LoadError::Invalid {
                key: "policies.passthrough.strategy",
                ..
            }
        ));
    }

    #[test]
    fn cached_category_strategy_is_fixed() {
        let mut raw = RawSettings::default();
        raw.policies.dynamic.strategy = Some(StrategyKind::NetworkOnly);
        assert!(matches!(
            Settings::from_raw(raw).unwrap_err(),
            LoadError::Invalid {
                key: "policies.dynamic.strategy",
                ..
            }
        ));

        let mut raw = RawSettings::default();
        raw.policies.images.strategy = Some(StrategyKind::CacheFirstAsyncRefresh);
        raw.policies.passthrough.max_entries = Some(0);
        let settings = Settings::from_raw(raw).expect("restating a strategy is allowed");
        assert_eq!(settings.cache.policies, PolicyTable::default());
    }

    #[test]
    fn non_http_origin_is_rejected() {
        let mut raw = RawSettings::default();
        raw.cache.app_origin = Some("file:///srv/app".into());
        assert!(Settings::from_raw(raw).is_err());
    }

    #[test]
    fn bad_log_format_is_rejected() {
        let mut raw = RawSettings::default();
        raw.logging.format = Some("xml".into());
        assert!(Settings::from_raw(raw).is_err());
    }

    #[test]
    fn blank_offline_page_disables_fallback() {
        let mut raw = RawSettings::default();
        raw.cache.offline_page = Some("  ".into());
        let settings = Settings::from_raw(raw).expect("valid settings");
        assert!(settings.cache.offline_page.is_none());
    }

    #[test]
    fn manifest_resolves_against_origin() {
        let config = CacheConfig::new(Url::parse("https://films.example").unwrap());
        assert_eq!(
            config.resolve("/app.js").unwrap().as_str(),
            "https://films.example/app.js"
        );
        assert_eq!(
            config.resolve("https://fonts.example/a.css").unwrap().as_str(),
            "https://fonts.example/a.css"
        );
    }
}
