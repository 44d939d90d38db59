// src/proxy/backend.rs
use crate::config::ConfigError;
use async_trait::async_trait;
use hyper::client::HttpConnector;
use hyper::header::{self, HeaderMap, HeaderName, HeaderValue, CONNECTION, HOST};
use hyper::{Body, Request, Response, Uri};
use hyper_tls::HttpsConnector;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::time::timeout;
use url::Url;

type ForwardClient = hyper::Client<HttpsConnector<HttpConnector>>;

#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    #[error("backend unreachable: {0}")]
    Unreachable(String),

    #[error("backend timed out")]
    Timeout,

    #[error("bad response from backend: {0}")]
    BadResponse(String),
}

/// A thing requests can be proxied to. The pool depends only on this
/// contract, so wrapped backend kinds can slot in without touching
/// selection logic.
#[async_trait]
pub trait Backend: Send + Sync {
    /// The immutable configured address of this backend.
    fn address(&self) -> &Url;

    /// Last known liveness. Lock-free; true before the first probe.
    fn is_alive(&self) -> bool;

    /// Flip the liveness flag. Invoked by the health checker only.
    fn set_alive(&self, alive: bool);

    /// Relay `req` to this backend and stream its response back.
    async fn forward(
        &self,
        req: Request<Body>,
        peer_addr: SocketAddr,
    ) -> Result<Response<Body>, ForwardError>;
}

/// Plain HTTP(S) backend with its own pooled hyper client.
pub struct HttpBackend {
    url: Url,
    // scheme://host[:port], precomputed for URI rewriting
    origin: String,
    host_header: HeaderValue,
    alive: AtomicBool,
    forward_timeout: Duration,
    client: ForwardClient,
}

impl HttpBackend {
    pub fn new(url: Url, forward_timeout: Duration) -> Result<Self, ConfigError> {
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidValue(format!(
                "backend url must be http or https: {url}"
            )));
        }
        let host = url.host_str().ok_or_else(|| {
            ConfigError::InvalidValue(format!("backend url has no host: {url}"))
        })?;

        let authority = match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };
        let host_header = HeaderValue::from_str(&authority).map_err(|_| {
            ConfigError::InvalidValue(format!("backend host is not a valid header value: {url}"))
        })?;
        let origin = format!("{}://{}", url.scheme(), authority);

        let client = hyper::Client::builder().build(HttpsConnector::new());

        Ok(Self {
            url,
            origin,
            host_header,
            alive: AtomicBool::new(true),
            forward_timeout,
            client,
        })
    }
}

#[async_trait]
impl Backend for HttpBackend {
    fn address(&self) -> &Url {
        &self.url
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Relaxed)
    }

    fn set_alive(&self, alive: bool) {
        self.alive.store(alive, Ordering::Relaxed);
    }

    async fn forward(
        &self,
        req: Request<Body>,
        peer_addr: SocketAddr,
    ) -> Result<Response<Body>, ForwardError> {
        let (mut parts, body) = req.into_parts();

        let path_and_query = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str().to_owned())
            .unwrap_or_else(|| "/".to_owned());
        parts.uri = format!("{}{}", self.origin, path_and_query)
            .parse::<Uri>()
            .map_err(|e| ForwardError::Unreachable(e.to_string()))?;

        strip_hop_by_hop_headers(&mut parts.headers);
        parts.headers.insert(HOST, self.host_header.clone());
        append_forwarded_for(&mut parts.headers, peer_addr);

        let outbound = Request::from_parts(parts, body);

        // The deadline covers connecting and receiving response headers;
        // the response body streams without it.
        let response = match timeout(self.forward_timeout, self.client.request(outbound)).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Err(classify(e)),
            Err(_) => return Err(ForwardError::Timeout),
        };

        let (mut parts, body) = response.into_parts();
        strip_hop_by_hop_headers(&mut parts.headers);
        Ok(Response::from_parts(parts, body))
    }
}

fn classify(err: hyper::Error) -> ForwardError {
    if err.is_connect() {
        ForwardError::Unreachable(err.to_string())
    } else if err.is_timeout() {
        ForwardError::Timeout
    } else {
        ForwardError::BadResponse(err.to_string())
    }
}

/// Remove connection-scoped headers before relaying, in both directions.
fn strip_hop_by_hop_headers(headers: &mut HeaderMap) {
    // Headers named in Connection are hop-by-hop too.
    let named: Vec<HeaderName> = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| name.trim().parse::<HeaderName>().ok())
        .collect();
    for name in named {
        headers.remove(name);
    }

    headers.remove(CONNECTION);
    headers.remove(HeaderName::from_static("keep-alive"));
    headers.remove(header::PROXY_AUTHENTICATE);
    headers.remove(header::PROXY_AUTHORIZATION);
    headers.remove(header::TE);
    headers.remove(header::TRAILER);
    headers.remove(header::TRANSFER_ENCODING);
    headers.remove(header::UPGRADE);
}

fn append_forwarded_for(headers: &mut HeaderMap, peer_addr: SocketAddr) {
    let forwarded_for = HeaderName::from_static("x-forwarded-for");
    let peer_ip = peer_addr.ip().to_string();

    let value = match headers.get(&forwarded_for).and_then(|v| v.to_str().ok()) {
        Some(existing) => format!("{existing}, {peer_ip}"),
        None => peer_ip,
    };
    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.insert(forwarded_for, value);
    }
}
