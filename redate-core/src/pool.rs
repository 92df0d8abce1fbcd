//! Fixed-size pool of share connections.
//!
//! Each transaction checks out exactly one client for its whole duration.
//! The checkout is an RAII guard, so the connection comes back on every
//! exit path (commit, rollback, panic or cancellation).

use crate::config::Config;
use crate::error::{RedateError, Result};
use crate::share::ShareClient;
use serde::Serialize;
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

/// Connection health counters, mirrored into the final summary
#[derive(Debug, Default)]
pub struct PoolHealth {
    checkouts: AtomicU64,
    checkout_timeouts: AtomicU64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PoolHealthSnapshot {
    pub checkouts: u64,
    pub checkout_timeouts: u64,
    pub in_use: usize,
    pub size: usize,
}

pub struct SharePool {
    clients: Mutex<Vec<Arc<dyn ShareClient>>>,
    permits: Arc<Semaphore>,
    checkout_timeout: Duration,
    size: usize,
    health: PoolHealth,
}

impl SharePool {
    pub fn new(clients: Vec<Arc<dyn ShareClient>>, checkout_timeout: Duration) -> Arc<Self> {
        let size = clients.len();
        Arc::new(Self {
            clients: Mutex::new(clients),
            permits: Arc::new(Semaphore::new(size)),
            checkout_timeout,
            size,
            health: PoolHealth::default(),
        })
    }

    /// Build a pool of `config.pool.size` clients from a factory closure
    pub fn from_config<F>(config: &Config, mut factory: F) -> Arc<Self>
    where
        F: FnMut() -> Arc<dyn ShareClient>,
    {
        let clients = (0..config.pool.size).map(|_| factory()).collect();
        Self::new(clients, config.checkout_timeout())
    }

    /// Check out a connection, waiting at most the configured checkout
    /// timeout. An elapsed wait is a transient failure so the caller's
    /// retry policy applies.
    pub async fn acquire(self: &Arc<Self>) -> Result<PooledShare> {
        let permit = match tokio::time::timeout(
            self.checkout_timeout,
            Arc::clone(&self.permits).acquire_owned(),
        )
        .await
        {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => {
                return Err(RedateError::Connectivity("connection pool closed".into()));
            }
            Err(_) => {
                self.health.checkout_timeouts.fetch_add(1, Ordering::Relaxed);
                return Err(RedateError::Connectivity(format!(
                    "no available connection in pool after {:?}",
                    self.checkout_timeout
                )));
            }
        };

        let client = {
            let mut clients = self.clients.lock().unwrap();
            clients.pop()
        };
        let Some(client) = client else {
            // A permit guarantees a client unless a guard was leaked
            return Err(RedateError::Connectivity(
                "connection pool exhausted".into(),
            ));
        };

        self.health.checkouts.fetch_add(1, Ordering::Relaxed);
        debug!("Checked out share connection ({} free)", self.available());

        Ok(PooledShare {
            client,
            pool: Arc::clone(self),
            _permit: permit,
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    pub fn health(&self) -> PoolHealthSnapshot {
        PoolHealthSnapshot {
            checkouts: self.health.checkouts.load(Ordering::Relaxed),
            checkout_timeouts: self.health.checkout_timeouts.load(Ordering::Relaxed),
            in_use: self.size - self.available(),
            size: self.size,
        }
    }
}

/// Scoped checkout of one pooled connection
pub struct PooledShare {
    client: Arc<dyn ShareClient>,
    pool: Arc<SharePool>,
    _permit: OwnedSemaphorePermit,
}

impl std::fmt::Debug for PooledShare {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledShare").finish_non_exhaustive()
    }
}

impl PooledShare {
    pub fn client(&self) -> &dyn ShareClient {
        &*self.client
    }
}

impl Deref for PooledShare {
    type Target = dyn ShareClient;

    fn deref(&self) -> &Self::Target {
        &*self.client
    }
}

impl Drop for PooledShare {
    fn drop(&mut self) {
        if let Ok(mut clients) = self.pool.clients.lock() {
            clients.push(Arc::clone(&self.client));
        }
        // The permit drop frees the slot after the client is back
    }
}
