//! Infrastructure layer: adapters and HTTP server

pub mod adapters;
pub mod http;
