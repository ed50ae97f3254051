//! HTTP request handlers

pub mod csrf;
pub mod deposits;
pub mod health;
