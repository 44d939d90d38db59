// src/main.rs
use anyhow::{Context, Result};
use spindle::{
    config,
    health::HealthChecker,
    proxy::{Backend, BackendPool, HttpBackend, Proxy},
    server::{RequestHandler, ServerBuilder},
};
use std::sync::Arc;
use tokio::signal;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("spindle=debug".parse()?)
                .add_directive("hyper=info".parse()?),
        )
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.yaml".to_string());

    info!("Loading configuration from: {}", config_path);
    let config = config::load_config(&config_path)
        .await
        .context("invalid configuration, refusing to start")?;

    // Create backend pool
    let mut backends: Vec<Arc<dyn Backend>> = Vec::with_capacity(config.backends.len());
    for backend_config in &config.backends {
        let backend = HttpBackend::new(backend_config.url.clone(), config.forward_timeout())?;
        backends.push(Arc::new(backend));
    }
    let pool = Arc::new(BackendPool::new(backends)?);

    // Create proxy
    let proxy = Arc::new(Proxy::new(pool.clone()));

    // Start health checker
    let checker = Arc::new(HealthChecker::new(config.health_check.clone(), pool));
    tokio::spawn(checker.clone().start());

    // Start main server
    info!("Starting load balancer on {}", config.listen_addr);
    ServerBuilder::new(config.listen_addr)
        .with_handler(move |peer| RequestHandler::new(proxy.clone(), peer))
        .serve(shutdown_signal())
        .await?;

    checker.shutdown();
    info!("Load balancer stopped");
    Ok(())
}

// Graceful shutdown handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
