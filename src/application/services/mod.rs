//! Application services
//!
//! Use-case orchestration over the domain and the adapters.

pub mod deposit_service;
pub mod status_service;

pub use deposit_service::DepositService;
pub use status_service::{DepositPoller, StatusOutcome, StatusService};
