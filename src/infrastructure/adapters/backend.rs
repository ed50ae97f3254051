//! Distributed counter/cache backend client
//!
//! Thin wrapper over the shared redis instance used by the cache layer
//! and the rate limiter. Connection failures downgrade the client to
//! "unavailable": callers are expected to fall back to their in-process
//! tier rather than propagate backend errors.

use redis::{aio::ConnectionManager, AsyncCommands, Client, RedisResult};
use tracing::{info, warn};

use crate::config::app_config::BackendConfig;

#[derive(Clone)]
pub struct BackendClient {
    manager: Option<ConnectionManager>,
}

impl BackendClient {
    /// Connect to the configured backend. Never fails: an unreachable
    /// backend yields a disabled client and a warning, matching the
    /// degradation policy of the layers built on top.
    pub async fn connect(config: &BackendConfig) -> Self {
        if !config.enabled {
            info!("Distributed backend is disabled in configuration");
            return Self::disabled();
        }

        match Self::create_manager(&config.redis_url).await {
            Ok(manager) => {
                info!("Distributed backend connection established");
                Self { manager: Some(manager) }
            }
            Err(e) => {
                warn!(
                    "Failed to connect to distributed backend: {}. Cache and rate limiter will use in-process tiers only.",
                    e
                );
                Self::disabled()
            }
        }
    }

    /// A client with no backend; every operation reports unavailable
    pub fn disabled() -> Self {
        Self { manager: None }
    }

    async fn create_manager(redis_url: &str) -> RedisResult<ConnectionManager> {
        let client = Client::open(redis_url)?;
        ConnectionManager::new(client).await
    }

    pub fn is_available(&self) -> bool {
        self.manager.is_some()
    }

    fn conn(&self) -> RedisResult<ConnectionManager> {
        self.manager
            .clone()
            .ok_or_else(|| redis::RedisError::from((redis::ErrorKind::IoError, "backend unavailable")))
    }

    pub async fn get_bytes(&self, key: &str) -> RedisResult<Option<Vec<u8>>> {
        let mut conn = self.conn()?;
        conn.get(key).await
    }

    pub async fn set_ex_bytes(&self, key: &str, value: &[u8], ttl_secs: u64) -> RedisResult<()> {
        let mut conn = self.conn()?;
        conn.set_ex(key, value, ttl_secs).await
    }

    pub async fn incr(&self, key: &str) -> RedisResult<i64> {
        let mut conn = self.conn()?;
        conn.incr(key, 1i64).await
    }

    pub async fn expire(&self, key: &str, ttl_secs: i64) -> RedisResult<()> {
        let mut conn = self.conn()?;
        let _: bool = conn.expire(key, ttl_secs).await?;
        Ok(())
    }

    pub async fn ttl(&self, key: &str) -> RedisResult<i64> {
        let mut conn = self.conn()?;
        conn.ttl(key).await
    }

    pub async fn keys(&self, pattern: &str) -> RedisResult<Vec<String>> {
        let mut conn = self.conn()?;
        conn.keys(pattern).await
    }

    pub async fn del(&self, keys: Vec<String>) -> RedisResult<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn()?;
        conn.del(keys).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_err;

    #[tokio::test]
    async fn test_disabled_client_reports_unavailable() {
        let client = BackendClient::disabled();
        assert!(!client.is_available());
        assert_err!(client.get_bytes("any").await);
        assert_err!(client.incr("any").await);
    }

    #[tokio::test]
    async fn test_disabled_config_yields_disabled_client() {
        let config = BackendConfig {
            enabled: false,
            redis_url: "redis://127.0.0.1:6379".to_string(),
        };
        let client = BackendClient::connect(&config).await;
        assert!(!client.is_available());
    }
}
