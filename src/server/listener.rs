// ────────────────────────────────
// src/server/listener.rs
// Encapsulates low-level TCP bind/accept so we can swap TLS later.
// ────────────────────────────────
use anyhow::{Context, Result};
use std::net::SocketAddr;
use tokio::net::TcpListener;

pub async fn bind_tcp(addr: SocketAddr) -> Result<TcpListener> {
    TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind listen address {addr}"))
}
