//! HTTP middleware: request guards and cross-origin policy

pub mod cors;
pub mod csrf;
pub mod rate_limit;
pub mod security;

pub use cors::CorsPolicy;
pub use security::SecurityLayer;
