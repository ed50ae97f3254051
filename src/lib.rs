//! Transactional core of a digital-goods storefront
//!
//! Maintains user balances as an append-only ledger, reconciles
//! deposits against an external payment gateway, and serves a small
//! HTTP API protected by rate limiting, a CSRF guard, and an
//! origin-whitelist CORS policy. A redis backend accelerates the cache
//! and makes rate limits global, but every correctness guarantee holds
//! with the backend down.

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod middleware;
pub mod shared;

pub use config::AppConfig;
pub use infrastructure::http::HttpServer;
pub use shared::{AppError, AppResult};
