//! The control plane: lifecycle states, out-of-band commands, and their replies.
//!
//! Commands arrive as JSON messages of the form
//! `{"action": "CACHE_VIDEO", "data": {"url": "..."}}` and are answered with a
//! [`ControlReply`]. Failures are always reported back through the reply,
//! never dropped.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::fetch::FetchError;
use crate::http::{Response, StatusCode};

/// Where the caching subsystem is in its install/activate cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lifecycle {
    /// Pre-populating the static store; traffic is forwarded uncached.
    Installing { version: String },
    /// Installed, waiting to take over.
    Waiting { version: String },
    /// Deleting superseded generations.
    Activating { version: String },
    /// Serving traffic from this generation's stores.
    Active { version: String },
}

impl Lifecycle {
    pub fn version(&self) -> &str {
        match self {
            Self::Installing { version }
            | Self::Waiting { version }
            | Self::Activating { version }
            | Self::Active { version } => version,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active { .. })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Installing { .. } => "installing",
            Self::Waiting { .. } => "waiting",
            Self::Activating { .. } => "activating",
            Self::Active { .. } => "active",
        }
    }
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name(), self.version())
    }
}

/// A control-plane command.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "action", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlCommand {
    /// Activate the installed generation now.
    SkipWaiting,
    /// Delete every store regardless of version.
    ClearCache,
    /// Force-insert a resource into the dynamic store.
    CacheVideo { url: String },
    /// Report the byte total of every stored payload.
    GetCacheSize,
}

impl ControlCommand {
    /// Parses a JSON control message.
    pub fn parse(message: &[u8]) -> Result<Self, ControlError> {
        serde_json::from_slice(message).map_err(ControlError::InvalidPayload)
    }

    pub fn action(&self) -> &'static str {
        match self {
            Self::SkipWaiting => "SKIP_WAITING",
            Self::ClearCache => "CLEAR_CACHE",
            Self::CacheVideo { .. } => "CACHE_VIDEO",
            Self::GetCacheSize => "GET_CACHE_SIZE",
        }
    }
}

/// Answer to a [`ControlCommand`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ControlReply {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

impl ControlReply {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
            size: None,
        }
    }

    pub fn size(bytes: u64) -> Self {
        Self {
            size: Some(bytes),
            ..Self::ok()
        }
    }

    pub fn failed(error: &ControlError) -> Self {
        Self {
            success: false,
            error: Some(error.to_string()),
            size: None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

/// Failures reported through the control channel.
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("invalid control message: {0}")]
    InvalidPayload(#[source] serde_json::Error),

    #[error("invalid url {url:?}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("failed to cache {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: FetchError,
    },

    #[error("install failed on {url}: {source}")]
    Install {
        url: String,
        #[source]
        source: FetchError,
    },

    #[error("unknown sync tag {0:?}")]
    UnknownSyncTag(String),

    #[error("cannot {action} while {state}")]
    InvalidTransition { action: &'static str, state: String },
}

impl ControlError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidPayload(_) | Self::InvalidUrl { .. } | Self::UnknownSyncTag(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::Fetch { .. } | Self::Install { .. } => StatusCode::BAD_GATEWAY,
            Self::InvalidTransition { .. } => StatusCode::CONFLICT,
        }
    }

    /// Renders the failure as a reply carrying the matching status.
    pub fn to_response(&self) -> Response {
        Response::json(self.status(), &ControlReply::failed(self).to_json())
    }
}

/// Background-sync hooks the application may fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncTag {
    Bookmarks,
    Progress,
}

impl SyncTag {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bookmarks => "sync-bookmarks",
            Self::Progress => "sync-progress",
        }
    }
}

impl FromStr for SyncTag {
    type Err = ControlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sync-bookmarks" => Ok(Self::Bookmarks),
            "sync-progress" => Ok(Self::Progress),
            other => Err(ControlError::UnknownSyncTag(other.to_owned())),
        }
    }
}

impl fmt::Display for SyncTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
