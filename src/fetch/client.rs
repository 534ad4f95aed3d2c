//! Production network collaborator backed by `reqwest`.

use async_trait::async_trait;
use reqwest::{Client, Method};
use tracing::debug;

use super::{FetchError, FetchResult, Fetcher};
use crate::http::headers::is_hop_by_hop;
use crate::http::{Headers, RequestDescriptor, Response, StatusCode};

/// Issues requests upstream with a shared connection pool.
///
/// Redirects are followed. Dropping the future returned by [`Fetcher::fetch`]
/// aborts the request and closes its connection.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(Self::user_agent())
            .build()
            .map_err(|e| FetchError::Network(e.to_string()))?;
        Ok(Self { client })
    }

    pub fn user_agent() -> &'static str {
        concat!("reelcache/", env!("CARGO_PKG_VERSION"))
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &RequestDescriptor) -> FetchResult {
        let method = Method::from_bytes(request.method().as_str().as_bytes())
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let mut builder = self.client.request(method, request.url().clone());
        for (name, value) in request.headers().iter() {
            if is_hop_by_hop(name) || name.eq_ignore_ascii_case("host") {
                continue;
            }
            builder = builder.header(name, value);
        }
        if !request.body().is_empty() {
            builder = builder.body(request.body().clone());
        }

        let upstream = builder.send().await.map_err(network)?;
        let status = StatusCode::from_u16(upstream.status().as_u16());
        let headers: Headers = upstream
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_owned(), v.to_owned()))
            })
            .collect();
        let body = upstream.bytes().await.map_err(network)?;

        debug!(url = %request.url(), status = %status, bytes = body.len(), "upstream responded");
        Ok(Response::new(status).with_headers(headers).body_bytes(body))
    }
}

fn network(err: reqwest::Error) -> FetchError {
    FetchError::Network(err.to_string())
}
