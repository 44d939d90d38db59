// src/server/handler.rs
use hyper::{Body, Request, Response};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::Service;

use crate::proxy::Proxy;

/// One handler per accepted connection; carries the peer address so the
/// forwarding path can append it to `X-Forwarded-For`.
#[derive(Clone)]
pub struct RequestHandler {
    proxy: Arc<Proxy>,
    peer_addr: SocketAddr,
}

impl RequestHandler {
    pub fn new(proxy: Arc<Proxy>, peer_addr: SocketAddr) -> Self {
        Self { proxy, peer_addr }
    }
}

impl Service<Request<Body>> for RequestHandler {
    type Response = Response<Body>;
    type Error = Infallible;
    type Future = futures::future::BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let proxy = self.proxy.clone();
        let peer_addr = self.peer_addr;
        Box::pin(async move {
            // Proxy errors are already logged and map to 502/503/504.
            let response = proxy
                .handle(req, peer_addr)
                .await
                .unwrap_or_else(Response::from);
            Ok(response)
        })
    }
}
