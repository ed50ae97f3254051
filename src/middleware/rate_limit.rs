//! Rate limiting filter
//!
//! Counts each request against the caller's client key and rejects
//! with a retry hint once the policy's window is exhausted.

use std::sync::Arc;

use warp::{Filter, Rejection};

use crate::infrastructure::adapters::rate_limiter::{client_key, RateLimitPolicy, RateLimiter};
use crate::shared::error::AppError;
use crate::shared::logging::LoggingUtils;

/// Filter enforcing `policy` for every request passing through it
pub fn enforce(
    limiter: Arc<RateLimiter>,
    policy: RateLimitPolicy,
) -> impl Filter<Extract = (), Error = Rejection> + Clone {
    warp::header::optional::<String>("x-forwarded-for")
        .and(warp::header::optional::<String>("x-real-ip"))
        .and(warp::header::optional::<String>("user-agent"))
        .and(warp::path::full())
        .and_then(
            move |forwarded: Option<String>,
                  real_ip: Option<String>,
                  user_agent: Option<String>,
                  path: warp::path::FullPath| {
                let limiter = Arc::clone(&limiter);
                async move {
                    let key = client_key(
                        forwarded.as_deref(),
                        real_ip.as_deref(),
                        user_agent.as_deref(),
                    );
                    let decision = limiter.check_and_increment(&key, policy).await;
                    if decision.allowed {
                        Ok(())
                    } else {
                        LoggingUtils::log_rate_limit(
                            &key,
                            path.as_str(),
                            user_agent.as_deref().unwrap_or(""),
                        );
                        Err(warp::reject::custom(AppError::RateLimitExceeded {
                            retry_after_secs: decision.retry_after_secs.unwrap_or(policy.window.as_secs()),
                        }))
                    }
                }
            },
        )
        .untuple_one()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::app_config::{RateLimitConfig, RateLimitPolicyConfig};
    use crate::infrastructure::adapters::backend::BackendClient;
    use std::time::Duration;

    fn limiter() -> Arc<RateLimiter> {
        Arc::new(RateLimiter::new(
            BackendClient::disabled(),
            &RateLimitConfig {
                enabled: true,
                api: RateLimitPolicyConfig { max_requests: 100, window_seconds: 60 },
                auth: RateLimitPolicyConfig { max_requests: 5, window_seconds: 900 },
            },
        ))
    }

    #[tokio::test]
    async fn test_filter_denies_after_limit() {
        let policy = RateLimitPolicy { max_requests: 2, window: Duration::from_secs(60) };
        let route = enforce(limiter(), policy).map(|| "ok");

        for _ in 0..2 {
            let response = warp::test::request()
                .path("/api/v1/deposits")
                .header("x-real-ip", "1.2.3.4")
                .reply(&route)
                .await;
            assert_eq!(response.status(), warp::http::StatusCode::OK);
        }
        let response = warp::test::request()
            .path("/api/v1/deposits")
            .header("x-real-ip", "1.2.3.4")
            .reply(&route)
            .await;
        assert_ne!(response.status(), warp::http::StatusCode::OK);
    }

    #[tokio::test]
    async fn test_distinct_clients_have_distinct_budgets() {
        let policy = RateLimitPolicy { max_requests: 1, window: Duration::from_secs(60) };
        let route = enforce(limiter(), policy).map(|| "ok");

        for ip in ["1.1.1.1", "2.2.2.2", "3.3.3.3"] {
            let response = warp::test::request()
                .path("/api/v1/deposits")
                .header("x-real-ip", ip)
                .reply(&route)
                .await;
            assert_eq!(response.status(), warp::http::StatusCode::OK);
        }
    }
}
