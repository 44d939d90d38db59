// src/proxy/proxy.rs
use super::backend::ForwardError;
use super::pool::{BackendPool, NoBackendAvailable};
use hyper::{Body, Request, Response, StatusCode};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, error, warn};
use uuid::Uuid;

/// Per-request entry point: pick the next live backend and relay.
pub struct Proxy {
    pool: Arc<BackendPool>,
}

#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error(transparent)]
    PoolExhausted(#[from] NoBackendAvailable),

    #[error(transparent)]
    Forward(#[from] ForwardError),
}

// Convert ProxyError to a client-facing response.
impl From<ProxyError> for Response<Body> {
    fn from(err: ProxyError) -> Self {
        let (status, message) = match err {
            ProxyError::PoolExhausted(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "No live backends available")
            }
            ProxyError::Forward(ForwardError::Timeout) => {
                (StatusCode::GATEWAY_TIMEOUT, "Gateway timeout")
            }
            ProxyError::Forward(_) => (StatusCode::BAD_GATEWAY, "Bad gateway"),
        };

        Response::builder()
            .status(status)
            .body(Body::from(message))
            .unwrap()
    }
}

impl Proxy {
    pub fn new(pool: Arc<BackendPool>) -> Self {
        Self { pool }
    }

    /// Relay one inbound request. No retry on another backend: a forwarding
    /// failure is surfaced to the client as 502/504.
    pub async fn handle(
        &self,
        req: Request<Body>,
        peer_addr: SocketAddr,
    ) -> Result<Response<Body>, ProxyError> {
        let request_id = Uuid::new_v4();
        let method = req.method().clone();
        let path = req.uri().path().to_owned();

        let backend = match self.pool.select_next() {
            Ok(backend) => backend,
            Err(e) => {
                warn!(%request_id, %method, %path, "pool exhausted, rejecting request");
                return Err(e.into());
            }
        };

        debug!(
            %request_id,
            backend = %backend.address(),
            %method,
            %path,
            "forwarding request"
        );

        match backend.forward(req, peer_addr).await {
            Ok(response) => {
                debug!(
                    %request_id,
                    backend = %backend.address(),
                    status = %response.status(),
                    "request completed"
                );
                Ok(response)
            }
            Err(e) => {
                error!(
                    %request_id,
                    backend = %backend.address(),
                    error = %e,
                    "forwarding failed"
                );
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_exhausted_maps_to_503() {
        let response: Response<Body> = ProxyError::PoolExhausted(NoBackendAvailable).into();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn timeout_maps_to_504() {
        let response: Response<Body> = ProxyError::Forward(ForwardError::Timeout).into();
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[test]
    fn unreachable_and_bad_response_map_to_502() {
        let unreachable: Response<Body> =
            ProxyError::Forward(ForwardError::Unreachable("refused".into())).into();
        assert_eq!(unreachable.status(), StatusCode::BAD_GATEWAY);

        let bad: Response<Body> =
            ProxyError::Forward(ForwardError::BadResponse("garbage".into())).into();
        assert_eq!(bad.status(), StatusCode::BAD_GATEWAY);
    }
}
