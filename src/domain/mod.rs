//! Domain models and invariants

pub mod deposit;
pub mod ledger;
