//! Read-through cache layer
//!
//! Two tiers: the distributed backend when available, then an
//! in-process map. Reads check the backend first, then the local tier,
//! then run the fetcher; fetched values are written back to both tiers.
//! Backend failures are logged and treated as misses, never surfaced to
//! callers. Correctness does not depend on the backend being up.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::app_config::CacheConfig;
use crate::shared::error::AppResult;

use super::backend::BackendClient;

/// Named TTL classes; callers pick a class rather than a raw duration
/// so cache lifetimes stay consistent across the codebase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtlClass {
    /// 60s, for volatile data such as balances
    Short,
    /// 300s, the default for user-scoped reads
    Medium,
    /// 3600s, for slow-changing catalog data
    Long,
    /// 86400s, for effectively static data
    VeryLong,
}

impl TtlClass {
    pub fn as_secs(&self) -> u64 {
        match self {
            TtlClass::Short => 60,
            TtlClass::Medium => 300,
            TtlClass::Long => 3_600,
            TtlClass::VeryLong => 86_400,
        }
    }
}

struct LocalEntry {
    data: Vec<u8>,
    expires_at: u64,
}

pub struct CacheLayer {
    backend: BackendClient,
    enabled: bool,
    local: Arc<RwLock<HashMap<String, LocalEntry>>>,
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

impl CacheLayer {
    pub fn new(backend: BackendClient, config: &CacheConfig) -> Self {
        Self {
            backend,
            enabled: config.enabled,
            local: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Read-through get: cached value if fresh, otherwise run the
    /// fetcher and cache its result under the given TTL class.
    pub async fn get_or_fetch<T, F, Fut>(&self, key: &str, ttl: TtlClass, fetcher: F) -> AppResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = AppResult<T>>,
    {
        self.get_or_fetch_with_ttl(key, ttl.as_secs(), fetcher).await
    }

    pub(crate) async fn get_or_fetch_with_ttl<T, F, Fut>(
        &self,
        key: &str,
        ttl_secs: u64,
        fetcher: F,
    ) -> AppResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = AppResult<T>>,
    {
        if !self.enabled {
            return fetcher().await;
        }

        if self.backend.is_available() {
            match self.backend.get_bytes(key).await {
                Ok(Some(bytes)) => match serde_json::from_slice(&bytes) {
                    Ok(value) => {
                        debug!("Cache hit (backend): {}", key);
                        return Ok(value);
                    }
                    Err(e) => warn!("Discarding undecodable cache entry {}: {}", key, e),
                },
                Ok(None) => {}
                Err(e) => warn!("Backend cache read failed for {}: {}", key, e),
            }
        }

        {
            let local = self.local.read().await;
            if let Some(entry) = local.get(key) {
                if entry.expires_at > now_secs() {
                    if let Ok(value) = serde_json::from_slice(&entry.data) {
                        debug!("Cache hit (local): {}", key);
                        return Ok(value);
                    }
                }
            }
        }

        let value = fetcher().await?;
        let bytes = serde_json::to_vec(&value)?;

        if self.backend.is_available() {
            if let Err(e) = self.backend.set_ex_bytes(key, &bytes, ttl_secs).await {
                warn!("Backend cache write failed for {}: {}", key, e);
            }
        }
        let mut local = self.local.write().await;
        local.insert(
            key.to_string(),
            LocalEntry { data: bytes, expires_at: now_secs() + ttl_secs },
        );

        Ok(value)
    }

    /// Drop every entry matching a glob-style pattern, e.g.
    /// `user:42:*`. Applied to both tiers; backend errors are logged
    /// and ignored.
    pub async fn invalidate(&self, pattern: &str) {
        if !self.enabled {
            return;
        }

        if self.backend.is_available() {
            match self.backend.keys(pattern).await {
                Ok(keys) => {
                    if let Err(e) = self.backend.del(keys).await {
                        warn!("Backend cache invalidation failed for {}: {}", pattern, e);
                    }
                }
                Err(e) => warn!("Backend key scan failed for {}: {}", pattern, e),
            }
        }

        let needle = pattern.replace('*', "");
        let mut local = self.local.write().await;
        local.retain(|key, _| !key.contains(&needle));
    }

    /// Number of live entries in the local tier
    pub async fn local_len(&self) -> usize {
        let now = now_secs();
        let local = self.local.read().await;
        local.values().filter(|e| e.expires_at > now).count()
    }

    /// Periodically evict expired local entries. The handle is held by
    /// the server and aborted on shutdown.
    pub fn spawn_sweeper(&self, interval: Duration) -> JoinHandle<()> {
        let local = Arc::clone(&self.local);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let now = now_secs();
                let mut map = local.write().await;
                let before = map.len();
                map.retain(|_, entry| entry.expires_at > now);
                let evicted = before - map.len();
                if evicted > 0 {
                    debug!("Cache sweeper evicted {} expired entries", evicted);
                }
            }
        })
    }
}
