// ────────────────────────────────
// src/server/builder.rs
// ────────────────────────────────
use crate::server::listener::bind_tcp;
use anyhow::Result;
use hyper::{server::conn::Http, Body, Request, Response};
use std::future::Future;
use std::net::SocketAddr;
use tower::Service;

/// Builder pattern so `main.rs` can inject its handler factory. The factory
/// runs once per accepted connection with the peer address, so the handler
/// can stamp `X-Forwarded-For`.
pub struct ServerBuilder<F> {
    addr: SocketAddr,
    make_handler: Option<F>,
}

impl<F, H> ServerBuilder<F>
where
    F: FnMut(SocketAddr) -> H,
    H: Service<Request<Body>, Response = Response<Body>> + Send + 'static,
    H::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    H::Future: Send + 'static,
{
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            make_handler: None,
        }
    }

    /// Inject your per-connection handler factory (usually wraps `proxy::Proxy`).
    pub fn with_handler(mut self, make_handler: F) -> Self {
        self.make_handler = Some(make_handler);
        self
    }

    /// Consume the builder, boot the TCP listener, spawn Hyper tasks. Runs
    /// until `shutdown` resolves, then stops accepting connections.
    pub async fn serve(self, shutdown: impl Future<Output = ()>) -> Result<()> {
        let mut make_handler = self
            .make_handler
            .expect("handler must be set via with_handler()");

        let listener = bind_tcp(self.addr).await?;
        tracing::info!("HTTP server listening on {}", self.addr);

        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, peer) = accepted?;
                    let svc = make_handler(peer);

                    // One Tokio task per connection.
                    tokio::spawn(async move {
                        let http = Http::new();
                        if let Err(err) = http.serve_connection(stream, svc).await {
                            tracing::warn!(%peer, %err, "connection error");
                        }
                    });
                }
                _ = &mut shutdown => {
                    tracing::info!("no longer accepting connections");
                    break;
                }
            }
        }

        Ok(())
    }
}
