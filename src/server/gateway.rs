//! Maps wire requests onto the [`CacheManager`]: reserved control paths
//! first, everything else through interception.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::http::{Method, Request, Response, StatusCode};
use crate::manager::CacheManager;

/// Path prefix reserved for the control plane. Never forwarded upstream.
pub const CONTROL_PREFIX: &str = "/__reelcache/";
const CONTROL_PATH: &str = "/__reelcache/control";
const SYNC_PREFIX: &str = "/__reelcache/sync/";

/// The proxy's request handler.
#[derive(Clone)]
pub struct Gateway {
    manager: Arc<CacheManager>,
}

impl Gateway {
    pub fn new(manager: Arc<CacheManager>) -> Self {
        Self { manager }
    }

    pub fn manager(&self) -> &Arc<CacheManager> {
        &self.manager
    }

    pub async fn handle(&self, request: Request) -> Response {
        if !request.is_absolute_form() && request.path().starts_with(CONTROL_PREFIX) {
            return self.control(&request).await;
        }

        if *request.method() == Method::Connect {
            return Response::new(StatusCode::METHOD_NOT_ALLOWED)
                .body("CONNECT tunnelling is not supported");
        }

        let descriptor = match request.into_descriptor(&self.manager.config().app_origin) {
            Ok(descriptor) => descriptor,
            Err(e) => {
                warn!(error = %e, "rejecting request with invalid target");
                return Response::new(StatusCode::BAD_REQUEST).body(format!("Bad Request: {e}"));
            }
        };

        self.manager.intercept(&descriptor).await.into_response()
    }

    async fn control(&self, request: &Request) -> Response {
        let path = request.path();
        if *request.method() != Method::Post {
            return Response::new(StatusCode::METHOD_NOT_ALLOWED)
                .header("Allow", "POST")
                .body("control endpoints accept POST only");
        }

        let reply = if path == CONTROL_PATH {
            self.manager.dispatch(request.body()).await
        } else if let Some(tag) = path.strip_prefix(SYNC_PREFIX) {
            self.manager.sync(tag)
        } else {
            debug!(path, "unknown control path");
            return Response::new(StatusCode::NOT_FOUND).body("Not Found");
        };

        match reply {
            Ok(reply) => Response::json(StatusCode::OK, &reply.to_json()),
            Err(err) => err.to_response(),
        }
    }
}
