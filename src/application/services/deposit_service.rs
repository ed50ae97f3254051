//! Deposit creation service
//!
//! Orchestrates the top-up flow: validate the request, append a
//! provisional ledger row, call the payment provider, then attach the
//! provider reference to the row. The balance is never touched here;
//! credit happens only at settlement.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::deposit::{
    validate_amount, validate_voucher_link, DepositMethod, PendingDeposit,
};
use crate::domain::ledger::TransactionStatus;
use crate::infrastructure::adapters::ledger_store::LedgerStore;
use crate::infrastructure::adapters::payment_provider::{PaymentProviderClient, PaymentResult};
use crate::shared::error::{AppError, AppResult};
use crate::shared::logging::LoggingUtils;

/// Grace window granted to manually-settled voucher deposits
const MANUAL_REVIEW_WINDOW_SECS: i64 = 600;

pub struct DepositService {
    ledger: Arc<dyn LedgerStore>,
    provider: Arc<PaymentProviderClient>,
}

impl DepositService {
    pub fn new(ledger: Arc<dyn LedgerStore>, provider: Arc<PaymentProviderClient>) -> Self {
        Self { ledger, provider }
    }

    /// Create a deposit. Validation failures leave the ledger
    /// untouched; once validation passes, exactly one provisional row
    /// is appended before any outbound call so a crashed request can be
    /// reconciled later.
    pub async fn create_deposit(
        &self,
        user_id: Uuid,
        amount: Decimal,
        method_raw: &str,
        gift_link: Option<&str>,
    ) -> AppResult<PendingDeposit> {
        validate_amount(amount)?;
        let method: DepositMethod = method_raw.parse().map_err(AppError::Validation)?;
        let voucher_link = match method {
            DepositMethod::WalletVoucher => Some(validate_voucher_link(gift_link)?),
            DepositMethod::QrTransfer => None,
        };

        let provisional = self
            .ledger
            .create_provisional(
                user_id,
                amount,
                json!({
                    "paymentMethod": method.as_str(),
                    "requestedAmount": amount,
                }),
            )
            .await?;

        if let Err(e) = self.provider.ensure_configured() {
            self.mark_failed(provisional.id, &e).await;
            return Err(e);
        }

        match method {
            DepositMethod::QrTransfer => self.create_qr_deposit(provisional.id, amount).await,
            DepositMethod::WalletVoucher => {
                // validated above, always Some here
                let link = voucher_link.unwrap_or_default();
                self.create_voucher_deposit(user_id, provisional.id, amount, link).await
            }
        }
    }

    async fn create_qr_deposit(
        &self,
        provisional_id: Uuid,
        amount: Decimal,
    ) -> AppResult<PendingDeposit> {
        let result = match self.provider.generate_qr(amount).await {
            Ok(result) => result,
            Err(e) => {
                self.mark_failed(provisional_id, &e).await;
                return Err(e);
            }
        };

        self.ledger
            .update_pending(
                provisional_id,
                None,
                Some(json!({
                    "paymentMethod": DepositMethod::QrTransfer.as_str(),
                    "requestedAmount": amount,
                    "transactionId": result.transaction_id,
                    "expiresAt": result.expires_at,
                    "qrUrl": result.qr_url,
                })),
            )
            .await?;

        info!("QR deposit {} created for provisional {}", result.transaction_id, provisional_id);
        Ok(pending_from_result(provisional_id, amount, DepositMethod::QrTransfer, result))
    }

    async fn create_voucher_deposit(
        &self,
        user_id: Uuid,
        provisional_id: Uuid,
        amount: Decimal,
        link: String,
    ) -> AppResult<PendingDeposit> {
        match self.provider.validate_voucher(&link, amount).await {
            Ok(result) => {
                self.ledger
                    .update_pending(
                        provisional_id,
                        None,
                        Some(json!({
                            "paymentMethod": DepositMethod::WalletVoucher.as_str(),
                            "requestedAmount": amount,
                            "transactionId": result.transaction_id,
                            "expiresAt": result.expires_at,
                            "voucherUrl": result.voucher_url.clone().unwrap_or_else(|| link.clone()),
                            "verified": true,
                        })),
                    )
                    .await?;
                let mut pending =
                    pending_from_result(provisional_id, amount, DepositMethod::WalletVoucher, result);
                if pending.voucher_url.is_none() {
                    pending.voucher_url = Some(link);
                }
                Ok(pending)
            }
            // The provider answered: bad credentials or an explicit
            // rejection of this voucher. The row fails; nothing to
            // settle manually.
            Err(e @ (AppError::UpstreamMisconfigured(_) | AppError::UpstreamRejected(_))) => {
                self.mark_failed(provisional_id, &e).await;
                Err(e)
            }
            // Validation endpoint down or absent: accept the link as
            // unverified proof-of-payment. The row stays pending,
            // flagged for manual settlement, and is never auto-credited.
            Err(e) => {
                warn!("Voucher validation unavailable, degrading to manual settlement: {}", e);
                let provider_ref = format!("voucher_{}", Uuid::new_v4().simple());
                let expires_at = Utc::now().timestamp() + MANUAL_REVIEW_WINDOW_SECS;
                self.ledger
                    .update_pending(
                        provisional_id,
                        None,
                        Some(json!({
                            "paymentMethod": DepositMethod::WalletVoucher.as_str(),
                            "requestedAmount": amount,
                            "transactionId": provider_ref,
                            "expiresAt": expires_at,
                            "voucherUrl": link,
                            "verified": false,
                            "settlement": "manual",
                            "requiresManualReview": true,
                            "degradedReason": e.to_string(),
                        })),
                    )
                    .await?;
                LoggingUtils::log_unverified_voucher(&user_id.to_string(), &provider_ref);
                Ok(PendingDeposit {
                    provider_ref,
                    internal_id: provisional_id,
                    amount,
                    method: DepositMethod::WalletVoucher,
                    expires_at: Some(expires_at),
                    qr_url: None,
                    qr_payload: None,
                    voucher_url: Some(link),
                    requires_manual_review: true,
                })
            }
        }
    }

    async fn mark_failed(&self, provisional_id: Uuid, error: &AppError) {
        let result = self
            .ledger
            .update_pending(
                provisional_id,
                Some(TransactionStatus::Failed),
                Some(json!({ "error": error.to_string() })),
            )
            .await;
        if let Err(e) = result {
            warn!("Failed to mark provisional {} as failed: {}", provisional_id, e);
        }
    }
}

fn pending_from_result(
    provisional_id: Uuid,
    requested_amount: Decimal,
    method: DepositMethod,
    result: PaymentResult,
) -> PendingDeposit {
    PendingDeposit {
        provider_ref: result.transaction_id,
        internal_id: provisional_id,
        amount: result.amount.unwrap_or(requested_amount),
        method,
        expires_at: result.expires_at,
        qr_url: result.qr_url,
        qr_payload: result.qr_payload,
        voucher_url: result.voucher_url,
        requires_manual_review: false,
    }
}
