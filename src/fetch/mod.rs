//! The network collaborator and the guards around it.
//!
//! - [`Fetcher`]: the one seam through which the caching layer reaches the
//!   network. [`HttpFetcher`] is the production implementation.
//! - [`guard`]: deadlines for every attempt, and the bounded retry used only
//!   by the install path.
//! - [`flight`]: single-flight de-duplication of concurrent identical misses.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::http::{RequestDescriptor, Response};

pub mod client;
pub mod flight;
pub mod guard;

#[cfg(test)]
pub(crate) mod mock;

pub use client::HttpFetcher;
pub use flight::InflightRequests;
pub use guard::{RetryPolicy, retry_with_backoff, with_timeout};

/// Why a network attempt produced no usable response.
///
/// `Clone` so one failure can be handed to every single-flight follower.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// Connection, DNS, TLS, or body transfer failure.
    #[error("network failure: {0}")]
    Network(String),

    /// The attempt exceeded its deadline and was cancelled.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// Upstream answered, but with a status the caller treats as failure.
    #[error("upstream responded with status {status}")]
    Status { status: u16 },
}

pub type FetchResult = Result<Response, FetchError>;

/// Issues a request and returns upstream's answer.
///
/// Any HTTP status is an `Ok` response; strategies decide which statuses
/// count as success. Implementations must be cancel-safe: the timeout guard
/// drops the returned future when the deadline passes, and that drop is what
/// aborts the transport-level operation.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: &RequestDescriptor) -> FetchResult;
}
