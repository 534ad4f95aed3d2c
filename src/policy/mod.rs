//! Per-category caching policies and the outcome of serving a request.
//!
//! Every [`Category`] is bound to one [`StrategyKind`]; the [`PolicyTable`]
//! only tunes limits and timings. The [`PolicyEngine`] runs the category's
//! strategy against its store and the network.

use std::fmt;
use std::time::Duration;

use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

use crate::cache::FreshnessBasis;
use crate::classify::Category;
use crate::fetch::FetchError;
use crate::http::{Response, StatusCode};

pub mod strategy;

pub use strategy::PolicyEngine;

/// Header naming the serving outcome on every intercepted response.
pub const CACHE_STATUS_HEADER: &str = "X-Cache";

/// The algorithm a category is served with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Stored entry if present, else network and store.
    CacheFirst,
    /// Fresh entry if present, else network; any stored entry on failure.
    StaleTolerantNetworkFirst,
    /// Cache-first without a blocking refetch; placeholder on failure.
    CacheFirstAsyncRefresh,
    /// No store interaction.
    NetworkOnly,
}

impl StrategyKind {
    /// The strategy `category` is always served with.
    pub const fn for_category(category: Category) -> Self {
        match category {
            Category::Static => Self::CacheFirst,
            Category::Dynamic => Self::StaleTolerantNetworkFirst,
            Category::Images => Self::CacheFirstAsyncRefresh,
            Category::PassThrough => Self::NetworkOnly,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::CacheFirst => "cache_first",
            Self::StaleTolerantNetworkFirst => "stale_tolerant_network_first",
            Self::CacheFirstAsyncRefresh => "cache_first_async_refresh",
            Self::NetworkOnly => "network_only",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Limits and timings for one category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryPolicy {
    pub max_entries: usize,
    pub freshness_window: Duration,
    /// Deadline for each network attempt. `None` waits indefinitely.
    pub timeout: Option<Duration>,
    pub freshness_basis: FreshnessBasis,
}

impl CategoryPolicy {
    pub fn new(max_entries: usize) -> Self {
        Self {
            max_entries,
            freshness_window: Duration::ZERO,
            timeout: None,
            freshness_basis: FreshnessBasis::default(),
        }
    }

    #[must_use]
    pub fn freshness_window(mut self, window: Duration) -> Self {
        self.freshness_window = window;
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn freshness_basis(mut self, basis: FreshnessBasis) -> Self {
        self.freshness_basis = basis;
        self
    }
}

const HOUR: Duration = Duration::from_secs(60 * 60);
const DAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Immutable `category → policy` table.
///
/// Only `dynamic` consults its freshness window. The `static` and `images`
/// windows are informational: those strategies serve any stored entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyTable {
    pub static_assets: CategoryPolicy,
    pub dynamic: CategoryPolicy,
    pub images: CategoryPolicy,
    pub passthrough: CategoryPolicy,
}

impl Default for PolicyTable {
    fn default() -> Self {
        Self {
            static_assets: CategoryPolicy::new(50)
                .freshness_window(7 * DAY)
                .timeout(Some(Duration::from_secs(10))),
            dynamic: CategoryPolicy::new(100)
                .freshness_window(HOUR)
                .timeout(Some(Duration::from_secs(10))),
            images: CategoryPolicy::new(200)
                .freshness_window(30 * DAY)
                .timeout(Some(Duration::from_secs(5))),
            passthrough: CategoryPolicy::new(0),
        }
    }
}

impl PolicyTable {
    pub fn get(&self, category: Category) -> &CategoryPolicy {
        match category {
            Category::Static => &self.static_assets,
            Category::Dynamic => &self.dynamic,
            Category::Images => &self.images,
            Category::PassThrough => &self.passthrough,
        }
    }

    pub fn get_mut(&mut self, category: Category) -> &mut CategoryPolicy {
        match category {
            Category::Static => &mut self.static_assets,
            Category::Dynamic => &mut self.dynamic,
            Category::Images => &mut self.images,
            Category::PassThrough => &mut self.passthrough,
        }
    }
}

/// How an intercepted request was served.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    /// Served from a store without a network call.
    Hit,
    /// Served from the network.
    Miss,
    /// Network failed; served an entry past its freshness window.
    Stale,
    /// Forwarded without touching any store.
    Bypass,
    /// Network failed; served placeholder image content.
    Placeholder,
    /// Network failed; served the stored offline page.
    Offline,
    /// Nothing usable; the response is a structured error.
    Error,
}

impl CacheStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hit => "HIT",
            Self::Miss => "MISS",
            Self::Stale => "STALE",
            Self::Bypass => "BYPASS",
            Self::Placeholder => "PLACEHOLDER",
            Self::Offline => "OFFLINE",
            Self::Error => "ERROR",
        }
    }
}

impl fmt::Display for CacheStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure surfaced by the interception path.
///
/// Never raised across the caller boundary: each variant is rendered into a
/// structured response, and kept alongside it for telemetry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InterceptError {
    #[error("network failure: {reason}")]
    NetworkFailure { reason: String },

    #[error("upstream timed out after {after:?}")]
    Timeout { after: Duration },

    #[error("nothing cached for {key} and the network failed: {cause}")]
    NotFound {
        key: String,
        #[source]
        cause: FetchError,
    },
}

impl InterceptError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::NetworkFailure { .. } => StatusCode::BAD_GATEWAY,
            Self::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            Self::NotFound { .. } => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::NetworkFailure { .. } => "network_failure",
            Self::Timeout { .. } => "timeout",
            Self::NotFound { .. } => "not_found",
        }
    }

    /// Renders the failure as a JSON error response.
    pub fn to_response(&self) -> Response {
        Response::json(
            self.status(),
            &json!({
                "error": "Network error",
                "kind": self.kind(),
                "detail": self.to_string(),
            }),
        )
        .header("Cache-Control", "no-store")
    }
}

impl From<FetchError> for InterceptError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::Timeout(after) => Self::Timeout { after },
            other => Self::NetworkFailure {
                reason: other.to_string(),
            },
        }
    }
}

/// The response for one intercepted request plus how it was produced.
#[derive(Debug, Clone)]
pub struct Intercepted {
    pub category: Category,
    pub status: CacheStatus,
    pub response: Response,
    /// The failure that was absorbed or surfaced, if any.
    pub error: Option<InterceptError>,
}

impl Intercepted {
    pub fn new(category: Category, status: CacheStatus, response: Response) -> Self {
        Self {
            category,
            status,
            response,
            error: None,
        }
    }

    #[must_use]
    pub fn with_error(mut self, error: InterceptError) -> Self {
        self.error = Some(error);
        self
    }

    pub fn is_stale(&self) -> bool {
        self.status == CacheStatus::Stale
    }

    /// The response with its [`CACHE_STATUS_HEADER`] set.
    pub fn into_response(self) -> Response {
        let mut response = self.response;
        response.set_header(CACHE_STATUS_HEADER, self.status.as_str());
        response
    }
}
