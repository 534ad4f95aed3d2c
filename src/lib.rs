//! # reelcache
//!
//! An offline-first caching proxy. Every request passing through it is
//! classified into a category and served by that category's policy:
//! cache-first for the application shell, network-first with stale fallback
//! for archive search and metadata, cache-first with a placeholder for
//! images, and straight pass-through for media downloads.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use reelcache::cache::StoreRegistry;
//! use reelcache::config::CacheConfig;
//! use reelcache::fetch::HttpFetcher;
//! use reelcache::manager::CacheManager;
//! use reelcache::server::{Gateway, Server};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = CacheConfig::new("http://localhost:8000".parse()?);
//!     let manager = CacheManager::new(
//!         config,
//!         Arc::new(StoreRegistry::new()),
//!         Arc::new(HttpFetcher::new()?),
//!     );
//!     manager.install().await?;
//!     manager.activate();
//!
//!     let gateway = Gateway::new(Arc::new(manager));
//!     let server = Server::bind("127.0.0.1:8080").await?;
//!     server.run(move |req| {
//!         let gateway = gateway.clone();
//!         async move { gateway.handle(req).await }
//!     }).await?;
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod classify;
pub mod config;
pub mod control;
pub mod fetch;
pub mod http;
pub mod manager;
pub mod policy;
pub mod server;
pub mod telemetry;

// ── Convenience re-exports ────────────────────────────────────────────────────
pub use cache::{CacheStore, StoreRegistry};
pub use classify::{Category, Classifier};
pub use control::{ControlCommand, ControlError, ControlReply, Lifecycle};
pub use fetch::{FetchError, Fetcher, HttpFetcher};
pub use http::{Headers, Method, Request, RequestDescriptor, Response, StatusCode};
pub use manager::CacheManager;
pub use policy::{CacheStatus, Intercepted, InterceptError, PolicyTable};
pub use server::{Gateway, Server, ServerError};
