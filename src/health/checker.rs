// src/health/checker.rs
use crate::config::HealthCheckConfig;
use crate::proxy::{Backend, BackendPool};
use chrono::{DateTime, Utc};
use reqwest::Client;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::time::{interval, timeout};
use tracing::{debug, error, info, warn};

/// Probes every backend on a fixed interval and flips its liveness flag.
///
/// Runs independently of request traffic; a slow or failing probe on one
/// backend never delays probing of the others, and persistent failure just
/// leaves that backend marked dead until it recovers.
pub struct HealthChecker {
    config: HealthCheckConfig,
    pool: Arc<BackendPool>,
    client: Client,
    // consecutive probe failures, indexed like the pool
    fail_streaks: Vec<AtomicUsize>,
    shutdown_tx: tokio::sync::watch::Sender<bool>,
    shutdown_rx: tokio::sync::watch::Receiver<bool>,
}

#[derive(Debug)]
pub struct HealthCheckResult {
    pub backend_addr: String,
    pub healthy: bool,
    pub response_time_ms: u64,
    pub checked_at: DateTime<Utc>,
    pub error: Option<String>,
}

impl HealthChecker {
    pub fn new(config: HealthCheckConfig, pool: Arc<BackendPool>) -> Self {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .expect("Failed to create HTTP client");

        let fail_streaks = (0..pool.len()).map(|_| AtomicUsize::new(0)).collect();
        let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

        Self {
            config,
            pool,
            client,
            fail_streaks,
            shutdown_tx,
            shutdown_rx,
        }
    }

    pub async fn start(self: Arc<Self>) {
        let mut interval = interval(self.config.interval());
        let mut shutdown_rx = self.shutdown_rx.clone();

        info!(
            "Starting health checker with interval: {:?}",
            self.config.interval()
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.run_once().await;
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Health checker shutting down");
                        break;
                    }
                }
            }
        }
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Probe all backends concurrently and wait for the round to finish.
    pub async fn run_once(self: &Arc<Self>) {
        let mut tasks = Vec::new();

        for (index, backend) in self.pool.backends().iter().enumerate() {
            let checker = self.clone();
            let backend = backend.clone();
            tasks.push(tokio::spawn(async move {
                checker.probe(index, backend).await
            }));
        }

        let results = futures::future::join_all(tasks).await;

        let mut healthy_count = 0;
        let mut unhealthy_count = 0;
        for result in results {
            match result {
                Ok(check) if check.healthy => healthy_count += 1,
                Ok(_) => unhealthy_count += 1,
                Err(e) => {
                    error!("Health probe task failed: {}", e);
                    unhealthy_count += 1;
                }
            }
        }

        debug!(
            "Health check round complete: {} healthy, {} unhealthy",
            healthy_count, unhealthy_count
        );
    }

    async fn probe(&self, index: usize, backend: Arc<dyn Backend>) -> HealthCheckResult {
        let start = std::time::Instant::now();
        let was_alive = backend.is_alive();

        let (healthy, error) = match backend.address().join(&self.config.path) {
            Ok(url) => {
                let result = timeout(
                    self.config.timeout(),
                    self.client.get(url.as_str()).send(),
                )
                .await;

                match result {
                    Ok(Ok(response)) => {
                        let status = response.status();
                        if status.is_success() {
                            (true, None)
                        } else {
                            (false, Some(format!("HTTP {}", status)))
                        }
                    }
                    Ok(Err(e)) => (false, Some(e.to_string())),
                    Err(_) => (false, Some("probe timed out".to_string())),
                }
            }
            Err(e) => (false, Some(format!("invalid probe url: {e}"))),
        };

        backend.set_alive(healthy);

        let streak = &self.fail_streaks[index];
        if healthy {
            let failed = streak.swap(0, Ordering::Relaxed);
            if !was_alive {
                info!(
                    backend = %backend.address(),
                    "backend recovered after {} failed probes", failed
                );
            }
        } else {
            let failures = streak.fetch_add(1, Ordering::Relaxed) + 1;
            if was_alive {
                warn!(
                    backend = %backend.address(),
                    error = ?error,
                    "marking backend unhealthy"
                );
            } else {
                debug!(
                    backend = %backend.address(),
                    consecutive_failures = failures,
                    "backend still unhealthy"
                );
            }
        }

        HealthCheckResult {
            backend_addr: backend.address().to_string(),
            healthy,
            response_time_ms: start.elapsed().as_millis() as u64,
            checked_at: Utc::now(),
            error,
        }
    }
}
