//! Security layer composition
//!
//! Bundles the request guards in their enforcement order: rate limit
//! first (cheapest rejection), then the body size cap, then CSRF.
//! CORS preflights never reach these guards; they are answered by the
//! dedicated preflight route, and response headers are attached once
//! at the outer layer of the route tree via `CorsPolicy::apply`.

use std::sync::Arc;

use warp::{Filter, Rejection};

use crate::config::app_config::AppConfig;
use crate::infrastructure::adapters::rate_limiter::{RateLimitPolicy, RateLimiter};

use super::cors::CorsPolicy;
use super::{csrf, rate_limit};

#[derive(Clone)]
pub struct SecurityLayer {
    limiter: Arc<RateLimiter>,
    pub cors: Arc<CorsPolicy>,
    api_policy: RateLimitPolicy,
    auth_policy: RateLimitPolicy,
    csrf_enabled: bool,
    pub csrf_secure_cookies: bool,
    max_body_bytes: u64,
    max_body_bytes_auth: u64,
}

impl SecurityLayer {
    pub fn new(config: &AppConfig, limiter: Arc<RateLimiter>) -> Self {
        Self {
            limiter,
            cors: Arc::new(CorsPolicy::new(config.security.cors_origins.clone())),
            api_policy: RateLimitPolicy::from_config(&config.rate_limit.api),
            auth_policy: RateLimitPolicy::from_config(&config.rate_limit.auth),
            csrf_enabled: config.security.csrf_enabled,
            csrf_secure_cookies: config.security.csrf_secure_cookies,
            max_body_bytes: config.security.max_body_bytes,
            max_body_bytes_auth: config.security.max_body_bytes_auth,
        }
    }

    /// Guards for general API routes
    pub fn protect_api(&self) -> impl Filter<Extract = (), Error = Rejection> + Clone {
        rate_limit::enforce(Arc::clone(&self.limiter), self.api_policy)
            .and(warp::body::content_length_limit(self.max_body_bytes))
            .and(csrf::require(self.csrf_enabled))
    }

    /// Guards for authentication-class routes: the strict rate policy
    /// and a much smaller body cap.
    pub fn protect_auth(&self) -> impl Filter<Extract = (), Error = Rejection> + Clone {
        rate_limit::enforce(Arc::clone(&self.limiter), self.auth_policy)
            .and(warp::body::content_length_limit(self.max_body_bytes_auth))
            .and(csrf::require(self.csrf_enabled))
    }

    /// Rate limiting only, for safe read endpoints
    pub fn protect_read(&self) -> impl Filter<Extract = (), Error = Rejection> + Clone {
        rate_limit::enforce(Arc::clone(&self.limiter), self.api_policy)
    }
}
