//! Redis connection handling.

use std::time::Duration;

use redis::aio::MultiplexedConnection;
use tracing::{debug, info, warn};

use crate::error::{CacheError, CacheResult};

/// Cache configuration.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Redis URL
    pub redis_url: String,
    /// Connection attempts before giving up
    pub connect_attempts: u32,
    /// Delay between connection attempts
    pub connect_delay: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            connect_attempts: 5,
            connect_delay: Duration::from_secs(5),
        }
    }
}

impl CacheConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            connect_attempts: std::env::var("CACHE_CONNECT_ATTEMPTS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5),
            connect_delay: Duration::from_secs(
                std::env::var("CACHE_CONNECT_DELAY_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(5),
            ),
        }
    }
}

/// Handle to the cache, holding one multiplexed connection.
///
/// Cloning is cheap; clones share the underlying connection. The handle is
/// created once at startup and injected into everything that touches the
/// cache, so tests can swap in their own instance.
#[derive(Clone)]
pub struct CacheClient {
    conn: MultiplexedConnection,
}

impl CacheClient {
    /// Connect to Redis, retrying a bounded number of times.
    pub async fn connect(config: &CacheConfig) -> CacheResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;

        let attempts = config.connect_attempts.max(1);
        for attempt in 1..=attempts {
            match client.get_multiplexed_async_connection().await {
                Ok(conn) => {
                    if attempt > 1 {
                        info!("Cache connected after {} attempts", attempt);
                    } else {
                        debug!("Cache connected");
                    }
                    return Ok(Self { conn });
                }
                Err(e) if attempt < attempts => {
                    warn!(
                        "Cache connection attempt {}/{} failed: {}",
                        attempt, attempts, e
                    );
                    tokio::time::sleep(config.connect_delay).await;
                }
                Err(e) => {
                    return Err(CacheError::connection_failed(format!(
                        "gave up after {} attempts: {}",
                        attempts, e
                    )));
                }
            }
        }

        Err(CacheError::connection_failed("no connection attempts made"))
    }

    /// Connect using environment configuration.
    pub async fn connect_from_env() -> CacheResult<Self> {
        Self::connect(&CacheConfig::from_env()).await
    }

    /// Check the connection with a PING.
    pub async fn is_healthy(&self) -> bool {
        let mut conn = self.conn.clone();
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .is_ok()
    }

    /// Release the connection.
    pub async fn close(self) {
        drop(self.conn);
        debug!("Cache connection closed");
    }

    /// Fresh handle on the shared connection for one operation.
    pub(crate) fn connection(&self) -> MultiplexedConnection {
        self.conn.clone()
    }
}
