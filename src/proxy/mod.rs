//
// src/proxy/mod.rs
//
mod backend;
mod pool;
mod proxy;

pub use backend::{Backend, ForwardError, HttpBackend};
pub use pool::{BackendPool, NoBackendAvailable};
pub use proxy::{Proxy, ProxyError};
