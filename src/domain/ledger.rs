//! Ledger domain models
//!
//! The ledger is an append-only transaction log plus the balance it
//! derives. Rows are never mutated after reaching a terminal status;
//! while pending, only `status` and `gateway_metadata` may change.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Supported transaction types
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Purchase,
    Topup,
    Refund,
    Adjustment,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Purchase => "purchase",
            TransactionType::Topup => "topup",
            TransactionType::Refund => "refund",
            TransactionType::Adjustment => "adjustment",
        }
    }

    /// Signed balance delta for a positive amount: purchases debit,
    /// everything else credits.
    pub fn signed_delta(&self, amount: Decimal) -> Decimal {
        match self {
            TransactionType::Purchase => -amount,
            TransactionType::Topup | TransactionType::Refund | TransactionType::Adjustment => amount,
        }
    }
}

impl std::str::FromStr for TransactionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "purchase" => Ok(TransactionType::Purchase),
            "topup" => Ok(TransactionType::Topup),
            "refund" => Ok(TransactionType::Refund),
            "adjustment" => Ok(TransactionType::Adjustment),
            other => Err(format!("unknown transaction type: {}", other)),
        }
    }
}

/// Transaction row status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Success,
    Failed,
    Expired,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Success => "success",
            TransactionStatus::Failed => "failed",
            TransactionStatus::Expired => "expired",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }
}

impl std::str::FromStr for TransactionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TransactionStatus::Pending),
            "success" => Ok(TransactionStatus::Success),
            "failed" => Ok(TransactionStatus::Failed),
            "expired" => Ok(TransactionStatus::Expired),
            other => Err(format!("unknown transaction status: {}", other)),
        }
    }
}

/// User account with its current balance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    /// Invariant: never negative; enforced only by the ledger store
    pub balance: Decimal,
}

/// One row of the append-only transaction log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub user_id: Uuid,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    /// Always positive; the sign comes from `kind`
    pub amount: Decimal,
    pub balance_before: Decimal,
    pub balance_after: Decimal,
    pub status: TransactionStatus,
    /// Opaque provider blob: reference, raw response, error detail
    pub gateway_metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    /// Provider transaction reference, when one has been recorded
    pub fn provider_ref(&self) -> Option<&str> {
        self.gateway_metadata.get("transactionId").and_then(|v| v.as_str())
    }

    /// Whether this row was flagged for manual settlement (degraded
    /// voucher path); such rows are excluded from automatic credit.
    pub fn requires_manual_review(&self) -> bool {
        self.gateway_metadata
            .get("requiresManualReview")
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    /// Deposit expiry recorded by the provider, as a unix timestamp
    pub fn provider_expires_at(&self) -> Option<i64> {
        self.gateway_metadata.get("expiresAt").and_then(|v| v.as_i64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signed_delta() {
        let amount = Decimal::from(100u32);
        assert_eq!(TransactionType::Purchase.signed_delta(amount), -amount);
        assert_eq!(TransactionType::Topup.signed_delta(amount), amount);
        assert_eq!(TransactionType::Refund.signed_delta(amount), amount);
        assert_eq!(TransactionType::Adjustment.signed_delta(amount), amount);
    }

    #[test]
    fn test_type_round_trip() {
        for s in ["purchase", "topup", "refund", "adjustment"] {
            let parsed: TransactionType = s.parse().unwrap();
            assert_eq!(parsed.as_str(), s);
        }
        assert!("gift".parse::<TransactionType>().is_err());
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!TransactionStatus::Pending.is_terminal());
        assert!(TransactionStatus::Success.is_terminal());
        assert!(TransactionStatus::Failed.is_terminal());
        assert!(TransactionStatus::Expired.is_terminal());
    }

    #[test]
    fn test_metadata_accessors() {
        let tx = Transaction {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            kind: TransactionType::Topup,
            amount: Decimal::from(50u32),
            balance_before: Decimal::ZERO,
            balance_after: Decimal::ZERO,
            status: TransactionStatus::Pending,
            gateway_metadata: serde_json::json!({
                "transactionId": "qr_abc",
                "requiresManualReview": true,
                "expiresAt": 1700000000,
            }),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert_eq!(tx.provider_ref(), Some("qr_abc"));
        assert!(tx.requires_manual_review());
        assert_eq!(tx.provider_expires_at(), Some(1700000000));
    }
}
