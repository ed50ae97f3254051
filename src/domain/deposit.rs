//! Deposit domain models and validation

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::shared::error::{AppError, AppResult};

/// Minimum accepted deposit amount
pub fn min_deposit() -> Decimal {
    Decimal::from(50u32)
}

/// Maximum accepted deposit amount
pub fn max_deposit() -> Decimal {
    Decimal::from(50_000u32)
}

/// Supported deposit payment methods
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DepositMethod {
    #[serde(rename = "qr-transfer")]
    QrTransfer,
    #[serde(rename = "wallet-voucher")]
    WalletVoucher,
}

impl DepositMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            DepositMethod::QrTransfer => "qr-transfer",
            DepositMethod::WalletVoucher => "wallet-voucher",
        }
    }
}

impl std::str::FromStr for DepositMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "qr-transfer" => Ok(DepositMethod::QrTransfer),
            "wallet-voucher" => Ok(DepositMethod::WalletVoucher),
            other => Err(format!("unsupported payment method: {}", other)),
        }
    }
}

/// Validate a deposit amount against the accepted range
pub fn validate_amount(amount: Decimal) -> AppResult<()> {
    if amount < min_deposit() {
        return Err(AppError::Validation(format!("minimum deposit amount is {}", min_deposit())));
    }
    if amount > max_deposit() {
        return Err(AppError::Validation(format!("maximum deposit amount is {}", max_deposit())));
    }
    Ok(())
}

/// Validate a wallet-voucher gift link: non-empty http(s) URL
pub fn validate_voucher_link(link: Option<&str>) -> AppResult<String> {
    let link = link.map(str::trim).unwrap_or("");
    if link.is_empty() {
        return Err(AppError::Validation("voucher link is required for wallet-voucher deposits".into()));
    }
    let is_http = link.starts_with("http://") || link.starts_with("https://");
    if !is_http || link.contains(char::is_whitespace) {
        return Err(AppError::Validation("voucher link must be an http(s) URL".into()));
    }
    Ok(link.to_string())
}

/// A deposit accepted by the gateway adapter, awaiting settlement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingDeposit {
    /// Provider-side transaction reference used for status polling
    pub provider_ref: String,
    /// Our provisional transaction row id
    pub internal_id: Uuid,
    pub amount: Decimal,
    pub method: DepositMethod,
    /// Unix timestamp after which the provider considers the deposit dead
    pub expires_at: Option<i64>,
    pub qr_url: Option<String>,
    pub qr_payload: Option<String>,
    pub voucher_url: Option<String>,
    /// Set on the degraded voucher path: the link was accepted as
    /// unverified proof-of-payment and must be settled out of band
    pub requires_manual_review: bool,
}

/// Client-driven polling state machine for a deposit
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PollState {
    Idle,
    Pending,
    Success,
    Failed,
    Expired,
}

impl PollState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PollState::Idle => "idle",
            PollState::Pending => "pending",
            PollState::Success => "success",
            PollState::Failed => "failed",
            PollState::Expired => "expired",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PollState::Success | PollState::Failed | PollState::Expired)
    }
}
