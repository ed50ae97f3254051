//! Infrastructure adapters
//!
//! Concrete integrations with external systems: the ledger database,
//! the distributed cache/counter backend, and the payment provider.

pub mod backend;
pub mod cache;
pub mod ledger_store;
pub mod payment_provider;
pub mod rate_limiter;

pub use backend::BackendClient;
pub use cache::{CacheLayer, TtlClass};
pub use ledger_store::{LedgerStore, MemoryLedgerStore, PgLedgerStore};
pub use payment_provider::{PaymentProviderClient, PaymentResult, ProviderStatus};
pub use rate_limiter::{client_key, RateLimitDecision, RateLimitPolicy, RateLimiter};
