// src/proxy/pool.rs
use super::backend::Backend;
use crate::config::ConfigError;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
#[error("no live backend available")]
pub struct NoBackendAvailable;

/// Ordered, fixed set of backends plus the shared round-robin cursor.
///
/// The backend sequence is read-only after construction; the cursor and the
/// per-backend liveness flags are the only mutable shared state.
pub struct BackendPool {
    backends: Vec<Arc<dyn Backend>>,
    cursor: AtomicUsize,
}

impl BackendPool {
    /// Construction fails on an empty backend list.
    pub fn new(backends: Vec<Arc<dyn Backend>>) -> Result<Self, ConfigError> {
        if backends.is_empty() {
            return Err(ConfigError::NoBackends);
        }
        Ok(Self {
            backends,
            cursor: AtomicUsize::new(0),
        })
    }

    /// Round-robin with liveness skipping.
    ///
    /// Each probed slot consumes exactly one cursor tick via an atomic
    /// fetch-add, so concurrent callers each observe a distinct cursor value
    /// and a successful selection advances the cursor past the chosen
    /// backend. One full dead scan of the pool fails.
    pub fn select_next(&self) -> Result<Arc<dyn Backend>, NoBackendAvailable> {
        let len = self.backends.len();

        for _ in 0..len {
            let index = self.cursor.fetch_add(1, Ordering::Relaxed) % len;
            let backend = &self.backends[index];
            if backend.is_alive() {
                debug!(backend = %backend.address(), "selected backend");
                return Ok(backend.clone());
            }
            debug!(backend = %backend.address(), "skipping dead backend");
        }

        Err(NoBackendAvailable)
    }

    /// Flip one backend's liveness flag. Health-checker entry point; safe
    /// against concurrent `select_next` readers.
    pub fn set_alive(&self, index: usize, alive: bool) {
        if let Some(backend) = self.backends.get(index) {
            backend.set_alive(alive);
        }
    }

    pub fn backends(&self) -> &[Arc<dyn Backend>] {
        &self.backends
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::backend::ForwardError;
    use async_trait::async_trait;
    use hyper::{Body, Request, Response};
    use proptest::prelude::*;
    use std::net::SocketAddr;
    use std::sync::atomic::AtomicBool;
    use url::Url;

    struct StaticBackend {
        url: Url,
        alive: AtomicBool,
    }

    impl StaticBackend {
        fn new(index: usize) -> Self {
            Self {
                url: Url::parse(&format!("http://127.0.0.1:{}", 4000 + index)).unwrap(),
                alive: AtomicBool::new(true),
            }
        }
    }

    #[async_trait]
    impl Backend for StaticBackend {
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
            _req: Request<Body>,
            _peer_addr: SocketAddr,
        ) -> Result<Response<Body>, ForwardError> {
            unimplemented!("selection tests never forward")
        }
    }

    fn pool_of(n: usize) -> BackendPool {
        let backends: Vec<Arc<dyn Backend>> = (0..n)
            .map(|i| Arc::new(StaticBackend::new(i)) as Arc<dyn Backend>)
            .collect();
        BackendPool::new(backends).unwrap()
    }

    fn index_of(pool: &BackendPool, backend: &Arc<dyn Backend>) -> usize {
        pool.backends()
            .iter()
            .position(|b| b.address() == backend.address())
            .unwrap()
    }

    #[test]
    fn empty_pool_is_rejected() {
        assert!(matches!(
            BackendPool::new(Vec::new()),
            Err(ConfigError::NoBackends)
        ));
    }

    #[test]
    fn cycles_through_backends_in_configuration_order() {
        let pool = pool_of(3);
        let picks: Vec<usize> = (0..6)
            .map(|_| index_of(&pool, &pool.select_next().unwrap()))
            .collect();
        assert_eq!(picks, vec![0, 1, 2, 0, 1, 2]);
    }

    #[test]
    fn skips_dead_backend_in_order() {
        // [A alive, B dead, C alive] -> A, C, A
        let pool = pool_of(3);
        pool.set_alive(1, false);

        let picks: Vec<usize> = (0..3)
            .map(|_| index_of(&pool, &pool.select_next().unwrap()))
            .collect();
        assert_eq!(picks, vec![0, 2, 0]);
    }

    #[test]
    fn dead_backend_rejoins_rotation_when_revived() {
        let pool = pool_of(2);
        pool.set_alive(0, false);

        assert_eq!(index_of(&pool, &pool.select_next().unwrap()), 1);
        assert_eq!(index_of(&pool, &pool.select_next().unwrap()), 1);

        pool.set_alive(0, true);
        let picks: Vec<usize> = (0..4)
            .map(|_| index_of(&pool, &pool.select_next().unwrap()))
            .collect();
        assert_eq!(picks.iter().filter(|&&i| i == 0).count(), 2);
        assert_eq!(picks.iter().filter(|&&i| i == 1).count(), 2);
    }

    #[test]
    fn all_dead_fails_within_one_scan() {
        let pool = pool_of(3);
        for i in 0..3 {
            pool.set_alive(i, false);
        }
        assert!(pool.select_next().is_err());
        // Still terminates on repeat calls, no infinite loop.
        assert!(pool.select_next().is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_selection_neither_drops_nor_duplicates_slots() {
        const TASKS: usize = 8;
        const PER_TASK: usize = 100;
        const BACKENDS: usize = 4;

        let pool = Arc::new(pool_of(BACKENDS));
        let mut handles = Vec::new();
        for _ in 0..TASKS {
            let pool = pool.clone();
            handles.push(tokio::spawn(async move {
                let mut counts = vec![0usize; BACKENDS];
                for _ in 0..PER_TASK {
                    let backend = pool.select_next().unwrap();
                    counts[index_of(&pool, &backend)] += 1;
                }
                counts
            }));
        }

        let mut totals = vec![0usize; BACKENDS];
        for handle in handles {
            for (i, n) in handle.await.unwrap().into_iter().enumerate() {
                totals[i] += n;
            }
        }

        // With all backends alive each selection consumes exactly one cursor
        // tick, so TASKS * PER_TASK ticks split exactly evenly.
        assert_eq!(totals, vec![TASKS * PER_TASK / BACKENDS; BACKENDS]);
    }

    proptest! {
        #[test]
        fn fairness_bound_over_live_backends(n in 1usize..8, m in 1usize..512) {
            prop_assume!(m >= n);

            let pool = pool_of(n);
            let mut counts = vec![0usize; n];
            for _ in 0..m {
                counts[index_of(&pool, &pool.select_next().unwrap())] += 1;
            }

            let floor = m / n;
            let ceil = floor + usize::from(m % n != 0);
            for count in counts {
                prop_assert!(count == floor || count == ceil);
            }
        }
    }
}
