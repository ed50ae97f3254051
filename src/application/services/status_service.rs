//! Deposit settlement service
//!
//! Reconciles a pending deposit against the provider and, on
//! confirmation, credits the user's balance exactly once. The credit is
//! guarded by a compare-and-set on the provisional row, so any number
//! of concurrent or repeated polls produce a single topup.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::json;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::deposit::PollState;
use crate::domain::ledger::{Transaction, TransactionStatus, TransactionType};
use crate::infrastructure::adapters::cache::CacheLayer;
use crate::infrastructure::adapters::ledger_store::LedgerStore;
use crate::infrastructure::adapters::payment_provider::{PaymentProviderClient, ProviderStatus};
use crate::shared::error::{AppError, AppResult};

/// Result of one settlement check
#[derive(Debug, Clone)]
pub struct StatusOutcome {
    pub state: PollState,
    /// Confirmed amount when the deposit settled
    pub amount: Option<Decimal>,
    /// True only for the call that actually applied the credit
    pub credited: bool,
}

impl StatusOutcome {
    fn of(state: PollState) -> Self {
        Self { state, amount: None, credited: false }
    }
}

pub struct StatusService {
    ledger: Arc<dyn LedgerStore>,
    provider: Arc<PaymentProviderClient>,
    cache: Arc<CacheLayer>,
}

impl StatusService {
    pub fn new(
        ledger: Arc<dyn LedgerStore>,
        provider: Arc<PaymentProviderClient>,
        cache: Arc<CacheLayer>,
    ) -> Self {
        Self { ledger, provider, cache }
    }

    /// Check a deposit by its provider reference and settle it if the
    /// provider confirms. Safe to call repeatedly and concurrently.
    pub async fn check_status(&self, user_id: Uuid, provider_ref: &str) -> AppResult<StatusOutcome> {
        let row = self
            .ledger
            .find_by_provider_ref(user_id, provider_ref)
            .await?
            .ok_or_else(|| AppError::Validation("unknown transaction reference".to_string()))?;

        match row.status {
            TransactionStatus::Success => {
                return Ok(StatusOutcome {
                    state: PollState::Success,
                    amount: Some(row.amount),
                    credited: false,
                })
            }
            TransactionStatus::Failed => return Ok(StatusOutcome::of(PollState::Failed)),
            TransactionStatus::Expired => return Ok(StatusOutcome::of(PollState::Expired)),
            TransactionStatus::Pending => {}
        }

        // Manual-settlement rows are reconciled by an operator, never
        // by the poller; report pending without calling the provider.
        if row.requires_manual_review() {
            debug!("Deposit {} awaits manual settlement", provider_ref);
            return Ok(StatusOutcome::of(PollState::Pending));
        }

        match self.provider.check_status(provider_ref).await? {
            ProviderStatus::Success { amount, .. } => {
                self.settle(&row, provider_ref, amount).await
            }
            ProviderStatus::Pending { expires_at } => {
                let deadline = expires_at.or_else(|| row.provider_expires_at());
                if deadline.is_some_and(|t| Utc::now().timestamp() > t) {
                    self.ledger
                        .update_pending(row.id, Some(TransactionStatus::Expired), None)
                        .await?;
                    info!("Deposit {} expired before settlement", provider_ref);
                    return Ok(StatusOutcome::of(PollState::Expired));
                }
                Ok(StatusOutcome::of(PollState::Pending))
            }
            ProviderStatus::Failed { message } => {
                self.ledger
                    .update_pending(
                        row.id,
                        Some(TransactionStatus::Failed),
                        Some(merged_metadata(&row, json!({ "providerMessage": message }))),
                    )
                    .await?;
                Ok(StatusOutcome::of(PollState::Failed))
            }
        }
    }

    async fn settle(
        &self,
        row: &Transaction,
        provider_ref: &str,
        confirmed_amount: Option<Decimal>,
    ) -> AppResult<StatusOutcome> {
        let amount = confirmed_amount.unwrap_or(row.amount);
        if amount != row.amount {
            warn!(
                "Provider confirmed {} for deposit {} but {} was requested; crediting confirmed amount",
                amount, provider_ref, row.amount
            );
        }

        let won = self.ledger.transition_pending_to_success(row.id).await?;
        if !won {
            // Another poll settled it first
            return Ok(StatusOutcome {
                state: PollState::Success,
                amount: Some(amount),
                credited: false,
            });
        }

        let credit = self
            .ledger
            .record_transaction(
                row.user_id,
                TransactionType::Topup,
                amount,
                json!({
                    "source": "deposit",
                    "transactionId": provider_ref,
                    "provisionalId": row.id,
                }),
            )
            .await?;
        self.cache.invalidate(&format!("user:{}:*", row.user_id)).await;
        info!(
            "Deposit {} settled: credited {} to user {} (balance {})",
            provider_ref, amount, row.user_id, credit.balance_after
        );

        Ok(StatusOutcome { state: PollState::Success, amount: Some(amount), credited: true })
    }
}

/// Overlay new fields onto a row's existing gateway metadata
fn merged_metadata(row: &Transaction, extra: serde_json::Value) -> serde_json::Value {
    let mut merged = row.gateway_metadata.clone();
    if let (Some(base), Some(add)) = (merged.as_object_mut(), extra.as_object()) {
        for (k, v) in add {
            base.insert(k.clone(), v.clone());
        }
        return merged;
    }
    extra
}

/// Client-driven polling loop for one deposit. Runs a settlement check
/// per tick until a terminal state or cancellation; a check already in
/// flight when cancellation arrives completes and its result is kept.
pub struct DepositPoller {
    service: Arc<StatusService>,
    user_id: Uuid,
    provider_ref: String,
    state: PollState,
}

impl DepositPoller {
    pub fn new(service: Arc<StatusService>, user_id: Uuid, provider_ref: String) -> Self {
        Self { service, user_id, provider_ref, state: PollState::Idle }
    }

    pub fn state(&self) -> PollState {
        self.state
    }

    /// Poll until the deposit reaches a terminal state or the cancel
    /// channel flips to true. Provider errors are transient here: the
    /// poller logs them and keeps going.
    pub async fn poll_until_terminal(
        &mut self,
        interval: Duration,
        mut cancel: watch::Receiver<bool>,
    ) -> PollState {
        self.state = PollState::Pending;
        loop {
            if *cancel.borrow() {
                debug!("Polling cancelled for {}", self.provider_ref);
                break;
            }
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = cancel.changed() => continue,
            }

            match self.service.check_status(self.user_id, &self.provider_ref).await {
                Ok(outcome) => {
                    self.state = outcome.state;
                    if self.state.is_terminal() {
                        break;
                    }
                }
                Err(e) => {
                    debug!("Transient poll failure for {}: {}", self.provider_ref, e);
                }
            }
        }
        self.state
    }
}
