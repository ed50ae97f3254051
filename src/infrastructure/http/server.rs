//! HTTP server wiring
//!
//! Builds the dependency graph from configuration: ledger store,
//! backend client, cache, rate limiter, provider client, services,
//! then the route tree. Background sweepers are owned here and aborted
//! on drop.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{info, warn};
use warp::Filter;

use crate::application::services::{DepositService, StatusService};
use crate::config::AppConfig;
use crate::infrastructure::adapters::backend::BackendClient;
use crate::infrastructure::adapters::cache::CacheLayer;
use crate::infrastructure::adapters::ledger_store::{LedgerStore, MemoryLedgerStore, PgLedgerStore};
use crate::infrastructure::adapters::payment_provider::PaymentProviderClient;
use crate::infrastructure::adapters::rate_limiter::RateLimiter;
use crate::infrastructure::http::routes::build_routes;
use crate::middleware::SecurityLayer;
use crate::shared::error::{AppError, AppResult};

pub struct HttpServer {
    config: AppConfig,
    security: SecurityLayer,
    deposit_service: Arc<DepositService>,
    status_service: Arc<StatusService>,
    sweepers: Vec<JoinHandle<()>>,
}

impl HttpServer {
    pub async fn new(config: AppConfig) -> AppResult<Self> {
        let ledger: Arc<dyn LedgerStore> = if config.database.in_memory {
            warn!("Using the in-memory ledger store; state will not survive a restart");
            Arc::new(MemoryLedgerStore::new())
        } else {
            Arc::new(PgLedgerStore::connect(&config.database).await?)
        };

        let backend = BackendClient::connect(&config.backend).await;
        let cache = Arc::new(CacheLayer::new(backend.clone(), &config.cache));
        let limiter = Arc::new(RateLimiter::new(backend, &config.rate_limit));
        let provider = Arc::new(PaymentProviderClient::new(&config.provider)?);

        let sweep_interval = Duration::from_secs(config.cache.sweep_interval_seconds);
        let sweepers = vec![
            cache.spawn_sweeper(sweep_interval),
            limiter.spawn_sweeper(sweep_interval),
        ];

        let deposit_service = Arc::new(DepositService::new(Arc::clone(&ledger), Arc::clone(&provider)));
        let status_service = Arc::new(StatusService::new(ledger, provider, cache));
        let security = SecurityLayer::new(&config, limiter);

        Ok(Self { config, security, deposit_service, status_service, sweepers })
    }

    /// The complete route tree, also used directly by tests
    pub fn create_routes(
        &self,
    ) -> impl Filter<Extract = (impl warp::Reply,), Error = std::convert::Infallible> + Clone {
        build_routes(
            &self.security,
            Arc::clone(&self.deposit_service),
            Arc::clone(&self.status_service),
        )
    }

    /// Bind and serve until the process is stopped
    pub async fn run(self) -> AppResult<()> {
        let address: SocketAddr = self
            .config
            .server_address()
            .parse()
            .map_err(|e| AppError::Config(format!("Invalid server address: {}", e)))?;

        info!("Starting server on {}", address);
        warp::serve(self.create_routes()).run(address).await;
        Ok(())
    }
}

impl Drop for HttpServer {
    fn drop(&mut self) {
        for sweeper in &self.sweepers {
            sweeper.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.database.in_memory = true;
        config.backend.enabled = false;
        config.security.csrf_enabled = false;
        config
    }

    #[tokio::test]
    async fn test_server_construction_and_health() {
        let server = HttpServer::new(test_config()).await.unwrap();
        let routes = server.create_routes();

        let response = warp::test::request().method("GET").path("/health").reply(&routes).await;
        assert_eq!(response.status(), warp::http::StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unknown_route_gets_json_envelope() {
        let server = HttpServer::new(test_config()).await.unwrap();
        let routes = server.create_routes();

        let response = warp::test::request().method("GET").path("/nope").reply(&routes).await;
        assert_eq!(response.status(), warp::http::StatusCode::NOT_FOUND);
        let body: serde_json::Value = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_error_responses_carry_cors_headers() {
        let server = HttpServer::new(test_config()).await.unwrap();
        let routes = server.create_routes();

        // below the minimum deposit, so the handler rejects
        let response = warp::test::request()
            .method("POST")
            .path("/api/v1/deposits")
            .header("origin", "http://localhost:3000")
            .header("x-user-id", uuid::Uuid::new_v4().to_string())
            .json(&serde_json::json!({ "amount": 10, "paymentMethod": "qr-transfer" }))
            .reply(&routes)
            .await;
        assert_eq!(response.status(), warp::http::StatusCode::BAD_REQUEST);
        assert_eq!(
            response.headers().get("access-control-allow-origin").unwrap(),
            "http://localhost:3000"
        );
        let body: serde_json::Value = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_csrf_cookie_attached_when_request_has_none() {
        let server = HttpServer::new(test_config()).await.unwrap();
        let routes = server.create_routes();

        let response = warp::test::request().method("GET").path("/health").reply(&routes).await;
        let cookie = response
            .headers()
            .get("set-cookie")
            .and_then(|v| v.to_str().ok())
            .unwrap();
        assert!(cookie.starts_with("csrf-token="));

        let response = warp::test::request()
            .method("GET")
            .path("/health")
            .header("cookie", "csrf-token=abc")
            .reply(&routes)
            .await;
        assert!(response.headers().get("set-cookie").is_none());
    }

    #[tokio::test]
    async fn test_preflight_answered_at_any_path() {
        let server = HttpServer::new(test_config()).await.unwrap();
        let routes = server.create_routes();

        let response = warp::test::request()
            .method("OPTIONS")
            .path("/api/v1/deposits")
            .header("origin", "http://localhost:3000")
            .reply(&routes)
            .await;
        assert_eq!(response.status(), warp::http::StatusCode::NO_CONTENT);
        assert_eq!(
            response.headers().get("access-control-allow-origin").unwrap(),
            "http://localhost:3000"
        );
    }
}
