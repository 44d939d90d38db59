//! demos/test_backend.rs
//! Run: cargo run --example test_backend -- <port> [name]
//!
//! Minimal backend for exercising the balancer by hand: answers `/health`,
//! echoes a JSON body everywhere else, and can simulate latency or failures
//! via TB_DELAY_MS / TB_JITTER_MS / TB_FAIL_PCT. POST /admin/toggle flips
//! the health endpoint so liveness skipping can be watched live.

use hyper::{
    service::{make_service_fn, service_fn},
    Body, Method, Request, Response, Server, StatusCode,
};
use rand::Rng;
use std::{
    convert::Infallible,
    net::SocketAddr,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::time::sleep;

#[derive(Clone)]
struct BackendState {
    port:         u16,
    name:         String,
    req_counter:  Arc<AtomicU64>,
    healthy_flag: Arc<AtomicBool>,
    base_delay:   u64,
    jitter_ms:    u64,
    fail_pct:     f64,
}

// ——————————————————————————————————————————
// Request handler
async fn handle(
    req: Request<Body>,
    state: BackendState,
) -> Result<Response<Body>, Infallible> {
    let path = req.uri().path().to_owned();

    // /health is always fast
    if path == "/health" {
        if state.healthy_flag.load(Ordering::SeqCst) {
            return Ok(Response::new(Body::from("OK")));
        } else {
            return Ok(Response::builder()
                .status(StatusCode::SERVICE_UNAVAILABLE)
                .body(Body::from("Unhealthy"))
                .unwrap());
        }
    }

    if req.method() == Method::POST && path == "/admin/toggle" {
        let now = !state.healthy_flag.load(Ordering::SeqCst);
        state.healthy_flag.store(now, Ordering::SeqCst);
        return Ok(Response::new(Body::from(format!("healthy={now}"))));
    }

    let n = state.req_counter.fetch_add(1, Ordering::SeqCst) + 1;

    // Simulate latency
    let delay =
        state.base_delay + rand::thread_rng().gen_range(0..=state.jitter_ms);
    if delay > 0 {
        sleep(Duration::from_millis(delay)).await;
    }

    // Simulate failure
    if state.fail_pct > 0.0
        && rand::thread_rng().gen_bool(state.fail_pct / 100.0)
    {
        return Ok(Response::builder()
            .status(StatusCode::INTERNAL_SERVER_ERROR)
            .body(Body::from("Injected failure"))
            .unwrap());
    }

    let body = format!(
        r#"{{"message":"Hello from {}","port":{},"req":{},"path":"{}"}}"#,
        state.name, state.port, n, path
    );

    Ok(Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "application/json")
        .body(Body::from(body))
        .unwrap())
}

fn env_u64(key: &str) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(0)
}

#[tokio::main]
async fn main() {
    let mut args = std::env::args().skip(1);
    let port: u16 = args
        .next()
        .and_then(|p| p.parse().ok())
        .expect("usage: test_backend <port> [name]");
    let name = args.next().unwrap_or_else(|| format!("backend-{port}"));

    let state = BackendState {
        port,
        name: name.clone(),
        req_counter: Arc::new(AtomicU64::new(0)),
        healthy_flag: Arc::new(AtomicBool::new(true)),
        base_delay: env_u64("TB_DELAY_MS"),
        jitter_ms: env_u64("TB_JITTER_MS"),
        fail_pct: std::env::var("TB_FAIL_PCT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(0.0),
    };

    let make_svc = make_service_fn(move |_| {
        let state = state.clone();
        async move {
            Ok::<_, Infallible>(service_fn(move |req| handle(req, state.clone())))
        }
    });

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    println!("test backend '{name}' serving requests at {addr}");

    if let Err(e) = Server::bind(&addr).serve(make_svc).await {
        eprintln!("server error: {e}");
    }
}
