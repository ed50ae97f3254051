//! Request payloads for the HTTP API

use rust_decimal::Decimal;
use serde::Deserialize;

/// Body of `POST /api/v1/deposits`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDepositRequest {
    pub amount: Decimal,
    pub payment_method: String,
    /// Wallet voucher gift link; required for wallet-voucher deposits
    #[serde(default)]
    pub gift_link: Option<String>,
}

/// Body of `POST /api/v1/deposits/check`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckDepositRequest {
    pub transaction_id: String,
}
