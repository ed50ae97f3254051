//! Ledger persistence
//!
//! `LedgerStore` is the single write path for balances: every balance
//! change happens inside a store transaction that locks the user row,
//! so concurrent mutations serialize and the non-negative balance
//! invariant holds under contention. Settlement uses a compare-and-set
//! on the provisional row's status so a deposit is credited at most
//! once no matter how many pollers race.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::app_config::DatabaseConfig;
use crate::domain::ledger::{Transaction, TransactionStatus, TransactionType};
use crate::shared::error::{AppError, AppResult};

#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Atomically apply a balance change and append the finalized
    /// transaction row recording it. Fails without side effects when
    /// the user is unknown or a debit would drive the balance negative.
    async fn record_transaction(
        &self,
        user_id: Uuid,
        kind: TransactionType,
        amount: Decimal,
        metadata: Value,
    ) -> AppResult<Transaction>;

    /// Append a pending topup row without touching the balance
    async fn create_provisional(
        &self,
        user_id: Uuid,
        amount: Decimal,
        metadata: Value,
    ) -> AppResult<Transaction>;

    /// Update a row's status and/or metadata while it is still
    /// pending; a no-op once the row is terminal.
    async fn update_pending(
        &self,
        transaction_id: Uuid,
        status: Option<TransactionStatus>,
        metadata: Option<Value>,
    ) -> AppResult<()>;

    /// Compare-and-set pending -> success. Returns true for exactly
    /// one caller; losers see false and must not credit.
    async fn transition_pending_to_success(&self, transaction_id: Uuid) -> AppResult<bool>;

    /// Most recent transaction carrying the given provider reference
    async fn find_by_provider_ref(
        &self,
        user_id: Uuid,
        provider_ref: &str,
    ) -> AppResult<Option<Transaction>>;

    async fn get_balance(&self, user_id: Uuid) -> AppResult<Decimal>;
}

fn validate_positive(amount: Decimal) -> AppResult<()> {
    if amount <= Decimal::ZERO {
        return Err(AppError::Validation("amount must be positive".to_string()));
    }
    Ok(())
}

// -- Postgres ---------------------------------------------------------------

pub struct PgLedgerStore {
    pool: PgPool,
}

type TransactionRow = (
    Uuid,
    Uuid,
    String,
    Decimal,
    Decimal,
    Decimal,
    String,
    Value,
    chrono::DateTime<Utc>,
    chrono::DateTime<Utc>,
);

fn row_to_transaction(row: TransactionRow) -> AppResult<Transaction> {
    let (id, user_id, kind, amount, balance_before, balance_after, status, gateway_metadata, created_at, updated_at) =
        row;
    Ok(Transaction {
        id,
        user_id,
        kind: kind.parse().map_err(|_: String| AppError::InvalidTransactionType(kind.clone()))?,
        amount,
        balance_before,
        balance_after,
        status: status
            .parse()
            .map_err(|e: String| AppError::Internal(format!("corrupt transaction row {}: {}", id, e)))?,
        gateway_metadata,
        created_at,
        updated_at,
    })
}

const SELECT_TRANSACTION: &str = "SELECT id, user_id, type, amount, balance_before, balance_after, \
     status, gateway_metadata, created_at, updated_at FROM transactions";

impl PgLedgerStore {
    pub async fn connect(config: &DatabaseConfig) -> AppResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.url)
            .await?;
        info!("Ledger database connection pool established");
        Ok(Self { pool })
    }

    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn record_transaction(
        &self,
        user_id: Uuid,
        kind: TransactionType,
        amount: Decimal,
        metadata: Value,
    ) -> AppResult<Transaction> {
        validate_positive(amount)?;

        let mut tx = self.pool.begin().await?;

        // Row lock serializes concurrent balance mutations per user
        let row: Option<(Decimal,)> =
            sqlx::query_as("SELECT balance FROM users WHERE id = $1 FOR UPDATE")
                .bind(user_id)
                .fetch_optional(&mut *tx)
                .await?;
        let balance_before = row.ok_or(AppError::UserNotFound)?.0;
        let balance_after = balance_before + kind.signed_delta(amount);
        if balance_after < Decimal::ZERO {
            return Err(AppError::InsufficientBalance);
        }

        sqlx::query("UPDATE users SET balance = $1 WHERE id = $2")
            .bind(balance_after)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        let id = Uuid::new_v4();
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO transactions \
             (id, user_id, type, amount, balance_before, balance_after, status, gateway_metadata, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(id)
        .bind(user_id)
        .bind(kind.as_str())
        .bind(amount)
        .bind(balance_before)
        .bind(balance_after)
        .bind(TransactionStatus::Success.as_str())
        .bind(&metadata)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        debug!("Recorded {} of {} for user {}", kind.as_str(), amount, user_id);

        Ok(Transaction {
            id,
            user_id,
            kind,
            amount,
            balance_before,
            balance_after,
            status: TransactionStatus::Success,
            gateway_metadata: metadata,
            created_at: now,
            updated_at: now,
        })
    }

    async fn create_provisional(
        &self,
        user_id: Uuid,
        amount: Decimal,
        metadata: Value,
    ) -> AppResult<Transaction> {
        validate_positive(amount)?;

        let row: Option<(Decimal,)> = sqlx::query_as("SELECT balance FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        let balance = row.ok_or(AppError::UserNotFound)?.0;

        let id = Uuid::new_v4();
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO transactions \
             (id, user_id, type, amount, balance_before, balance_after, status, gateway_metadata, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(id)
        .bind(user_id)
        .bind(TransactionType::Topup.as_str())
        .bind(amount)
        .bind(balance)
        .bind(balance)
        .bind(TransactionStatus::Pending.as_str())
        .bind(&metadata)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(Transaction {
            id,
            user_id,
            kind: TransactionType::Topup,
            amount,
            balance_before: balance,
            balance_after: balance,
            status: TransactionStatus::Pending,
            gateway_metadata: metadata,
            created_at: now,
            updated_at: now,
        })
    }

    async fn update_pending(
        &self,
        transaction_id: Uuid,
        status: Option<TransactionStatus>,
        metadata: Option<Value>,
    ) -> AppResult<()> {
        sqlx::query(
            "UPDATE transactions SET \
             status = COALESCE($2, status), \
             gateway_metadata = COALESCE($3, gateway_metadata), \
             updated_at = $4 \
             WHERE id = $1 AND status = 'pending'",
        )
        .bind(transaction_id)
        .bind(status.map(|s| s.as_str()))
        .bind(metadata)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn transition_pending_to_success(&self, transaction_id: Uuid) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE transactions SET status = 'success', updated_at = $2 \
             WHERE id = $1 AND status = 'pending'",
        )
        .bind(transaction_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn find_by_provider_ref(
        &self,
        user_id: Uuid,
        provider_ref: &str,
    ) -> AppResult<Option<Transaction>> {
        let row: Option<TransactionRow> = sqlx::query_as(&format!(
            "{} WHERE user_id = $1 AND gateway_metadata->>'transactionId' = $2 \
             ORDER BY created_at DESC LIMIT 1",
            SELECT_TRANSACTION
        ))
        .bind(user_id)
        .bind(provider_ref)
        .fetch_optional(&self.pool)
        .await?;

        row.map(row_to_transaction).transpose()
    }

    async fn get_balance(&self, user_id: Uuid) -> AppResult<Decimal> {
        let row: Option<(Decimal,)> = sqlx::query_as("SELECT balance FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| r.0).ok_or(AppError::UserNotFound)
    }
}

// -- In-memory --------------------------------------------------------------

/// Ledger backed by process memory, for development and tests.
/// A single mutex over the whole state serializes every operation,
/// giving the same isolation the row locks give in Postgres.
pub struct MemoryLedgerStore {
    state: Mutex<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    users: HashMap<Uuid, Decimal>,
    transactions: Vec<Transaction>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self { state: Mutex::new(MemoryState::default()) }
    }

    pub async fn insert_user(&self, user_id: Uuid, balance: Decimal) {
        let mut state = self.state.lock().await;
        state.users.insert(user_id, balance);
    }

    pub async fn transaction_count(&self) -> usize {
        self.state.lock().await.transactions.len()
    }

    pub async fn transactions_for(&self, user_id: Uuid) -> Vec<Transaction> {
        let state = self.state.lock().await;
        state
            .transactions
            .iter()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect()
    }

    pub async fn get_transaction(&self, transaction_id: Uuid) -> Option<Transaction> {
        let state = self.state.lock().await;
        state.transactions.iter().find(|t| t.id == transaction_id).cloned()
    }
}

impl Default for MemoryLedgerStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn record_transaction(
        &self,
        user_id: Uuid,
        kind: TransactionType,
        amount: Decimal,
        metadata: Value,
    ) -> AppResult<Transaction> {
        validate_positive(amount)?;

        let mut state = self.state.lock().await;
        let balance_before = *state.users.get(&user_id).ok_or(AppError::UserNotFound)?;
        let balance_after = balance_before + kind.signed_delta(amount);
        if balance_after < Decimal::ZERO {
            return Err(AppError::InsufficientBalance);
        }

        state.users.insert(user_id, balance_after);
        let now = Utc::now();
        let transaction = Transaction {
            id: Uuid::new_v4(),
            user_id,
            kind,
            amount,
            balance_before,
            balance_after,
            status: TransactionStatus::Success,
            gateway_metadata: metadata,
            created_at: now,
            updated_at: now,
        };
        state.transactions.push(transaction.clone());
        Ok(transaction)
    }

    async fn create_provisional(
        &self,
        user_id: Uuid,
        amount: Decimal,
        metadata: Value,
    ) -> AppResult<Transaction> {
        validate_positive(amount)?;

        let mut state = self.state.lock().await;
        let balance = *state.users.get(&user_id).ok_or(AppError::UserNotFound)?;
        let now = Utc::now();
        let transaction = Transaction {
            id: Uuid::new_v4(),
            user_id,
            kind: TransactionType::Topup,
            amount,
            balance_before: balance,
            balance_after: balance,
            status: TransactionStatus::Pending,
            gateway_metadata: metadata,
            created_at: now,
            updated_at: now,
        };
        state.transactions.push(transaction.clone());
        Ok(transaction)
    }

    async fn update_pending(
        &self,
        transaction_id: Uuid,
        status: Option<TransactionStatus>,
        metadata: Option<Value>,
    ) -> AppResult<()> {
        let mut state = self.state.lock().await;
        if let Some(row) = state
            .transactions
            .iter_mut()
            .find(|t| t.id == transaction_id && t.status == TransactionStatus::Pending)
        {
            if let Some(status) = status {
                row.status = status;
            }
            if let Some(metadata) = metadata {
                row.gateway_metadata = metadata;
            }
            row.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn transition_pending_to_success(&self, transaction_id: Uuid) -> AppResult<bool> {
        let mut state = self.state.lock().await;
        match state
            .transactions
            .iter_mut()
            .find(|t| t.id == transaction_id && t.status == TransactionStatus::Pending)
        {
            Some(row) => {
                row.status = TransactionStatus::Success;
                row.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn find_by_provider_ref(
        &self,
        user_id: Uuid,
        provider_ref: &str,
    ) -> AppResult<Option<Transaction>> {
        let state = self.state.lock().await;
        Ok(state
            .transactions
            .iter()
            .filter(|t| t.user_id == user_id && t.provider_ref() == Some(provider_ref))
            .max_by_key(|t| t.created_at)
            .cloned())
    }

    async fn get_balance(&self, user_id: Uuid) -> AppResult<Decimal> {
        let state = self.state.lock().await;
        state.users.get(&user_id).copied().ok_or(AppError::UserNotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    async fn store_with_user(balance: u32) -> (MemoryLedgerStore, Uuid) {
        let store = MemoryLedgerStore::new();
        let user_id = Uuid::new_v4();
        store.insert_user(user_id, Decimal::from(balance)).await;
        (store, user_id)
    }

    #[tokio::test]
    async fn test_topup_credits_balance() {
        let (store, user_id) = store_with_user(1000).await;

        let tx = store
            .record_transaction(user_id, TransactionType::Topup, Decimal::from(50u32), json!({}))
            .await
            .unwrap();
        assert_eq!(tx.balance_before, Decimal::from(1000u32));
        assert_eq!(tx.balance_after, Decimal::from(1050u32));
        assert_eq!(store.get_balance(user_id).await.unwrap(), Decimal::from(1050u32));
    }

    #[tokio::test]
    async fn test_purchase_debits_and_rejects_overdraft() {
        let (store, user_id) = store_with_user(100).await;

        store
            .record_transaction(user_id, TransactionType::Purchase, Decimal::from(60u32), json!({}))
            .await
            .unwrap();
        let err = store
            .record_transaction(user_id, TransactionType::Purchase, Decimal::from(60u32), json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InsufficientBalance));
        // failed debit leaves no row and no balance change
        assert_eq!(store.get_balance(user_id).await.unwrap(), Decimal::from(40u32));
        assert_eq!(store.transaction_count().await, 1);
    }

    #[tokio::test]
    async fn test_concurrent_debits_allow_exactly_one() {
        let store = Arc::new(MemoryLedgerStore::new());
        let user_id = Uuid::new_v4();
        store.insert_user(user_id, Decimal::from(1000u32)).await;

        let mut handles = Vec::new();
        for _ in 0..2 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store
                    .record_transaction(user_id, TransactionType::Purchase, Decimal::from(600u32), json!({}))
                    .await
            }));
        }
        let mut ok = 0;
        let mut insufficient = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => ok += 1,
                Err(AppError::InsufficientBalance) => insufficient += 1,
                Err(e) => panic!("unexpected error: {}", e),
            }
        }
        assert_eq!((ok, insufficient), (1, 1));
        assert_eq!(store.get_balance(user_id).await.unwrap(), Decimal::from(400u32));
    }

    #[tokio::test]
    async fn test_provisional_row_does_not_touch_balance() {
        let (store, user_id) = store_with_user(1000).await;

        let tx = store
            .create_provisional(user_id, Decimal::from(50u32), json!({"transactionId": "qr_1"}))
            .await
            .unwrap();
        assert_eq!(tx.status, TransactionStatus::Pending);
        assert_eq!(store.get_balance(user_id).await.unwrap(), Decimal::from(1000u32));
    }

    #[tokio::test]
    async fn test_transition_wins_exactly_once() {
        let (store, user_id) = store_with_user(1000).await;
        let store = Arc::new(store);
        let tx = store
            .create_provisional(user_id, Decimal::from(50u32), json!({"transactionId": "qr_1"}))
            .await
            .unwrap();

        let a = {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.transition_pending_to_success(tx.id).await })
        };
        let b = {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.transition_pending_to_success(tx.id).await })
        };
        let (a, b) = (a.await.unwrap().unwrap(), b.await.unwrap().unwrap());
        assert!(a ^ b, "exactly one caller must win the transition");
    }

    #[tokio::test]
    async fn test_update_pending_ignores_terminal_rows() {
        let (store, user_id) = store_with_user(1000).await;
        let tx = store
            .create_provisional(user_id, Decimal::from(50u32), json!({"transactionId": "qr_1"}))
            .await
            .unwrap();
        assert!(store.transition_pending_to_success(tx.id).await.unwrap());

        store
            .update_pending(tx.id, Some(TransactionStatus::Failed), None)
            .await
            .unwrap();
        let row = store.get_transaction(tx.id).await.unwrap();
        assert_eq!(row.status, TransactionStatus::Success);
    }

    #[tokio::test]
    async fn test_find_by_provider_ref_returns_latest() {
        let (store, user_id) = store_with_user(1000).await;
        store
            .create_provisional(user_id, Decimal::from(50u32), json!({"transactionId": "qr_1"}))
            .await
            .unwrap();
        let second = store
            .create_provisional(user_id, Decimal::from(70u32), json!({"transactionId": "qr_1"}))
            .await
            .unwrap();

        let found = store.find_by_provider_ref(user_id, "qr_1").await.unwrap().unwrap();
        assert_eq!(found.id, second.id);
        assert!(store.find_by_provider_ref(user_id, "qr_404").await.unwrap().is_none());
        // scoped to the owning user
        assert!(store
            .find_by_provider_ref(Uuid::new_v4(), "qr_1")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_unknown_user_and_invalid_amounts() {
        let store = MemoryLedgerStore::new();
        let err = store
            .record_transaction(Uuid::new_v4(), TransactionType::Topup, Decimal::from(50u32), json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::UserNotFound));

        let (store, user_id) = store_with_user(100).await;
        for amount in [Decimal::ZERO, Decimal::from(-5i32)] {
            let err = store
                .record_transaction(user_id, TransactionType::Topup, amount, json!({}))
                .await
                .unwrap_err();
            assert!(matches!(err, AppError::Validation(_)));
        }
    }

    #[tokio::test]
    async fn test_ledger_chain_is_consistent() {
        let (store, user_id) = store_with_user(500).await;

        store
            .record_transaction(user_id, TransactionType::Topup, Decimal::from(100u32), json!({}))
            .await
            .unwrap();
        store
            .record_transaction(user_id, TransactionType::Purchase, Decimal::from(250u32), json!({}))
            .await
            .unwrap();
        store
            .record_transaction(user_id, TransactionType::Refund, Decimal::from(250u32), json!({}))
            .await
            .unwrap();

        let rows = store.transactions_for(user_id).await;
        let mut previous = Decimal::from(500u32);
        for row in &rows {
            assert_eq!(row.balance_before, previous);
            assert_eq!(row.balance_after, previous + row.kind.signed_delta(row.amount));
            previous = row.balance_after;
        }
        assert_eq!(store.get_balance(user_id).await.unwrap(), previous);
    }
}
