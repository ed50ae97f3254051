//! Fixed-window rate limiter
//!
//! Counters live in the distributed backend (INCR + EXPIRE on the
//! first hit of a window) so limits hold across instances. When the
//! backend is down the limiter falls back to an in-process window per
//! key; the limit then applies per instance rather than globally, which
//! is the accepted degradation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::app_config::{RateLimitConfig, RateLimitPolicyConfig};

use super::backend::BackendClient;

/// A named limit: at most `max_requests` per `window`
#[derive(Debug, Clone, Copy)]
pub struct RateLimitPolicy {
    pub max_requests: u32,
    pub window: Duration,
}

impl RateLimitPolicy {
    /// General API traffic: 100 requests per minute
    pub fn api() -> Self {
        Self { max_requests: 100, window: Duration::from_secs(60) }
    }

    /// Sensitive endpoints: 5 requests per 15 minutes
    pub fn auth() -> Self {
        Self { max_requests: 5, window: Duration::from_secs(900) }
    }

    pub fn from_config(config: &RateLimitPolicyConfig) -> Self {
        Self {
            max_requests: config.max_requests,
            window: Duration::from_secs(config.window_seconds),
        }
    }
}

/// Outcome of a single counted request
#[derive(Debug, Clone, Copy)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub remaining: u32,
    /// Seconds until the window resets; set when the request is denied
    pub retry_after_secs: Option<u64>,
}

impl RateLimitDecision {
    fn allowed(remaining: u32) -> Self {
        Self { allowed: true, remaining, retry_after_secs: None }
    }

    fn denied(retry_after_secs: u64) -> Self {
        Self { allowed: false, remaining: 0, retry_after_secs: Some(retry_after_secs) }
    }
}

struct LocalWindow {
    count: u32,
    reset_at_ms: u64,
}

pub struct RateLimiter {
    backend: BackendClient,
    enabled: bool,
    local: Arc<RwLock<HashMap<String, LocalWindow>>>,
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Identity key for a request: first hop of x-forwarded-for, then
/// x-real-ip, then "unknown", suffixed with the user agent so distinct
/// clients behind one NAT are less likely to share a bucket.
pub fn client_key(
    forwarded_for: Option<&str>,
    real_ip: Option<&str>,
    user_agent: Option<&str>,
) -> String {
    let ip = forwarded_for
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .or(real_ip)
        .unwrap_or("unknown");
    format!("{}:{}", ip, user_agent.unwrap_or(""))
}

impl RateLimiter {
    pub fn new(backend: BackendClient, config: &RateLimitConfig) -> Self {
        Self {
            backend,
            enabled: config.enabled,
            local: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Count this request against the key's window and decide.
    /// Never returns an error: backend trouble falls back to the
    /// in-process window.
    pub async fn check_and_increment(&self, key: &str, policy: RateLimitPolicy) -> RateLimitDecision {
        if !self.enabled {
            return RateLimitDecision::allowed(policy.max_requests);
        }

        if self.backend.is_available() {
            match self.check_backend(key, policy).await {
                Ok(decision) => return decision,
                Err(e) => warn!("Backend rate limit check failed for {}: {}", key, e),
            }
        }

        self.check_local(key, policy).await
    }

    async fn check_backend(
        &self,
        key: &str,
        policy: RateLimitPolicy,
    ) -> redis::RedisResult<RateLimitDecision> {
        let counter_key = format!("ratelimit:{}", key);
        let count = self.backend.incr(&counter_key).await?;
        if count == 1 {
            self.backend
                .expire(&counter_key, policy.window.as_secs() as i64)
                .await?;
        }

        if count > policy.max_requests as i64 {
            let ttl = self.backend.ttl(&counter_key).await.unwrap_or(-1);
            let retry_after = if ttl > 0 { ttl as u64 } else { policy.window.as_secs() };
            debug!("Rate limit exceeded for {} ({} > {})", key, count, policy.max_requests);
            return Ok(RateLimitDecision::denied(retry_after));
        }

        let remaining = policy.max_requests.saturating_sub(count as u32);
        Ok(RateLimitDecision::allowed(remaining))
    }

    async fn check_local(&self, key: &str, policy: RateLimitPolicy) -> RateLimitDecision {
        let now = now_ms();
        let window_ms = policy.window.as_millis() as u64;
        let mut local = self.local.write().await;

        let window = local.entry(key.to_string()).or_insert(LocalWindow {
            count: 0,
            reset_at_ms: now + window_ms,
        });
        if window.reset_at_ms <= now {
            window.count = 0;
            window.reset_at_ms = now + window_ms;
        }
        window.count += 1;

        if window.count > policy.max_requests {
            let retry_after = (window.reset_at_ms - now).div_ceil(1000);
            return RateLimitDecision::denied(retry_after);
        }
        RateLimitDecision::allowed(policy.max_requests - window.count)
    }

    /// Periodically drop expired in-process windows
    pub fn spawn_sweeper(&self, interval: Duration) -> JoinHandle<()> {
        let local = Arc::clone(&self.local);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let now = now_ms();
                let mut map = local.write().await;
                map.retain(|_, window| window.reset_at_ms > now);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_limiter() -> RateLimiter {
        let config = RateLimitConfig {
            enabled: true,
            api: RateLimitPolicyConfig { max_requests: 100, window_seconds: 60 },
            auth: RateLimitPolicyConfig { max_requests: 5, window_seconds: 900 },
        };
        RateLimiter::new(BackendClient::disabled(), &config)
    }

    #[tokio::test]
    async fn test_allows_up_to_limit_then_denies() {
        let limiter = test_limiter();
        let policy = RateLimitPolicy { max_requests: 3, window: Duration::from_secs(60) };

        for i in 0..3 {
            let decision = limiter.check_and_increment("1.2.3.4:ua", policy).await;
            assert!(decision.allowed, "request {} should pass", i);
        }
        let decision = limiter.check_and_increment("1.2.3.4:ua", policy).await;
        assert!(!decision.allowed);
        assert!(decision.retry_after_secs.unwrap() <= 60);
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let limiter = test_limiter();
        let policy = RateLimitPolicy { max_requests: 1, window: Duration::from_secs(60) };

        assert!(limiter.check_and_increment("a", policy).await.allowed);
        assert!(!limiter.check_and_increment("a", policy).await.allowed);
        assert!(limiter.check_and_increment("b", policy).await.allowed);
    }

    #[tokio::test]
    async fn test_window_resets() {
        let limiter = test_limiter();
        let policy = RateLimitPolicy { max_requests: 1, window: Duration::from_millis(100) };

        assert!(limiter.check_and_increment("k", policy).await.allowed);
        assert!(!limiter.check_and_increment("k", policy).await.allowed);
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(limiter.check_and_increment("k", policy).await.allowed);
    }

    #[tokio::test]
    async fn test_disabled_limiter_always_allows() {
        let config = RateLimitConfig {
            enabled: false,
            api: RateLimitPolicyConfig { max_requests: 100, window_seconds: 60 },
            auth: RateLimitPolicyConfig { max_requests: 5, window_seconds: 900 },
        };
        let limiter = RateLimiter::new(BackendClient::disabled(), &config);
        let policy = RateLimitPolicy { max_requests: 1, window: Duration::from_secs(60) };

        for _ in 0..10 {
            assert!(limiter.check_and_increment("k", policy).await.allowed);
        }
    }

    #[test]
    fn test_client_key_precedence() {
        assert_eq!(
            client_key(Some("9.9.9.9, 10.0.0.1"), Some("1.1.1.1"), Some("curl")),
            "9.9.9.9:curl"
        );
        assert_eq!(client_key(None, Some("1.1.1.1"), None), "1.1.1.1:");
        assert_eq!(client_key(None, None, Some("curl")), "unknown:curl");
        assert_eq!(client_key(Some("  "), None, None), "unknown:");
    }

    #[test]
    fn test_default_policies() {
        assert_eq!(RateLimitPolicy::api().max_requests, 100);
        assert_eq!(RateLimitPolicy::api().window, Duration::from_secs(60));
        assert_eq!(RateLimitPolicy::auth().max_requests, 5);
        assert_eq!(RateLimitPolicy::auth().window, Duration::from_secs(900));
    }
}
