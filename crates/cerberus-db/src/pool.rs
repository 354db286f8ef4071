//! Connection pool sizing and creation.
//!
//! The worker holds one connection per in-flight artifact plus a few for the
//! poll query, claims, and the usage ledger, so the pool is sized from the
//! worker's concurrency unless `DB_MAX_CONNECTIONS` says otherwise.

use std::time::{Duration, Instant};

use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{debug, info, warn};

use cerberus_core::defaults::WORKER_MAX_CONCURRENT;
use cerberus_core::Result;

/// Connections reserved beyond the per-artifact ones.
pub const POOL_HEADROOM: u32 = 4;

/// Seconds to wait for a free connection before failing the query.
pub const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 30;

/// Seconds an idle connection is kept open.
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 600;

/// Seconds before a connection is recycled.
pub const DEFAULT_MAX_LIFETIME_SECS: u64 = 1800;

/// Environment variable overriding the computed pool size.
pub const DB_MAX_CONNECTIONS_ENV: &str = "DB_MAX_CONNECTIONS";

/// Environment variable overriding [`DEFAULT_ACQUIRE_TIMEOUT_SECS`].
pub const DB_ACQUIRE_TIMEOUT_ENV: &str = "DB_ACQUIRE_TIMEOUT_SECS";

#[derive(Debug, Clone, PartialEq)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
    /// `None` keeps connections until they fail.
    pub max_lifetime: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::for_worker(WORKER_MAX_CONCURRENT)
    }
}

impl PoolConfig {
    /// Pool sized for a worker processing `max_concurrent` artifacts at once.
    pub fn for_worker(max_concurrent: usize) -> Self {
        let per_artifact = u32::try_from(max_concurrent.max(1)).unwrap_or(u32::MAX);
        Self {
            max_connections: per_artifact.saturating_add(POOL_HEADROOM),
            min_connections: 1,
            acquire_timeout: Duration::from_secs(DEFAULT_ACQUIRE_TIMEOUT_SECS),
            idle_timeout: Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECS),
            max_lifetime: Some(Duration::from_secs(DEFAULT_MAX_LIFETIME_SECS)),
        }
    }

    /// Sizing from environment variables.
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `WORKER_MAX_CONCURRENT` | `4` | Pool is this plus [`POOL_HEADROOM`] |
    /// | `DB_MAX_CONNECTIONS` | computed | Hard override of the pool size |
    /// | `DB_ACQUIRE_TIMEOUT_SECS` | `30` | Wait for a free connection |
    pub fn from_env() -> Self {
        let concurrency = env_positive("WORKER_MAX_CONCURRENT")
            .map(|n| n as usize)
            .unwrap_or(WORKER_MAX_CONCURRENT);
        let mut config = Self::for_worker(concurrency);

        if let Some(n) = env_positive(DB_MAX_CONNECTIONS_ENV) {
            config = config.with_max_connections(n);
        }
        if let Some(secs) = env_positive(DB_ACQUIRE_TIMEOUT_ENV) {
            config = config.with_acquire_timeout(Duration::from_secs(secs.into()));
        }
        config
    }

    pub fn with_max_connections(mut self, n: u32) -> Self {
        self.max_connections = n.max(1);
        self.min_connections = self.min_connections.min(self.max_connections);
        self
    }

    pub fn with_min_connections(mut self, n: u32) -> Self {
        self.min_connections = n.min(self.max_connections);
        self
    }

    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn with_max_lifetime(mut self, lifetime: Option<Duration>) -> Self {
        self.max_lifetime = lifetime;
        self
    }

    fn options(&self) -> PgPoolOptions {
        PgPoolOptions::new()
            .max_connections(self.max_connections)
            .min_connections(self.min_connections)
            .acquire_timeout(self.acquire_timeout)
            .idle_timeout(self.idle_timeout)
            .max_lifetime(self.max_lifetime)
    }
}

fn env_positive(name: &str) -> Option<u32> {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<u32>().ok())
        .filter(|n| *n > 0)
}

/// Connect with [`PoolConfig::default`].
pub async fn create_pool(database_url: &str) -> Result<PgPool> {
    create_pool_with_config(database_url, PoolConfig::default()).await
}

pub async fn create_pool_with_config(database_url: &str, config: PoolConfig) -> Result<PgPool> {
    let start = Instant::now();
    debug!(
        subsystem = "database",
        component = "pool",
        op = "connect",
        max_connections = config.max_connections,
        acquire_timeout_secs = config.acquire_timeout.as_secs(),
        "Connecting to PostgreSQL"
    );

    let pool = config.options().connect(database_url).await?;

    info!(
        subsystem = "database",
        component = "pool",
        op = "connect",
        max_connections = config.max_connections,
        open = pool.size(),
        duration_ms = start.elapsed().as_millis() as u64,
        "PostgreSQL pool ready"
    );
    Ok(pool)
}

/// Log pool occupancy; warns when every connection is checked out.
pub fn log_pool_metrics(pool: &PgPool) {
    let open = pool.size();
    let idle = pool.num_idle();

    debug!(
        subsystem = "database",
        component = "pool",
        op = "metrics",
        open,
        idle,
        "Pool occupancy"
    );

    if open > 0 && idle == 0 {
        warn!(
            subsystem = "database",
            component = "pool",
            open,
            "All pooled connections busy, artifact processing may wait on acquire"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sized_from_worker_concurrency() {
        assert_eq!(PoolConfig::for_worker(4).max_connections, 4 + POOL_HEADROOM);
        assert_eq!(PoolConfig::for_worker(0).max_connections, 1 + POOL_HEADROOM);
        assert_eq!(
            PoolConfig::default().max_connections,
            WORKER_MAX_CONCURRENT as u32 + POOL_HEADROOM
        );
    }

    #[test]
    fn test_min_never_exceeds_max() {
        let config = PoolConfig::for_worker(2)
            .with_min_connections(50)
            .with_max_connections(3);
        assert_eq!(config.max_connections, 3);
        assert_eq!(config.min_connections, 3);

        let config = PoolConfig::default().with_max_connections(0);
        assert_eq!(config.max_connections, 1);
        assert_eq!(config.min_connections, 1);
    }

    #[test]
    fn test_builder_timeouts() {
        let config = PoolConfig::default()
            .with_acquire_timeout(Duration::from_secs(5))
            .with_idle_timeout(Duration::from_secs(60))
            .with_max_lifetime(None);
        assert_eq!(config.acquire_timeout, Duration::from_secs(5));
        assert_eq!(config.idle_timeout, Duration::from_secs(60));
        assert!(config.max_lifetime.is_none());
    }
}
