//! Deposit endpoint handlers

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;
use warp::Reply;

use crate::application::services::{DepositService, StatusService};
use crate::domain::deposit::PendingDeposit;
use crate::infrastructure::http::models::{CheckDepositRequest, CreateDepositRequest};
use crate::infrastructure::http::responses;
use crate::shared::error::AppError;

fn parse_user_id(raw: &str) -> Result<Uuid, warp::Rejection> {
    raw.parse().map_err(|_| {
        warp::reject::custom(AppError::Validation("x-user-id must be a UUID".to_string()))
    })
}

fn deposit_payload(deposit: &PendingDeposit) -> Value {
    let mut fields = serde_json::Map::new();
    fields.insert("transactionId".to_string(), json!(deposit.provider_ref));
    fields.insert("internalTransactionId".to_string(), json!(deposit.internal_id));
    fields.insert("amount".to_string(), json!(deposit.amount));
    fields.insert("paymentMethod".to_string(), json!(deposit.method.as_str()));
    if let Some(expires_at) = deposit.expires_at {
        fields.insert("expiresAt".to_string(), json!(expires_at));
    }
    if let Some(qr_url) = &deposit.qr_url {
        fields.insert("qrUrl".to_string(), json!(qr_url));
    }
    if let Some(payload_str) = &deposit.qr_payload {
        fields.insert("payload".to_string(), json!(payload_str));
    }
    if let Some(voucher_url) = &deposit.voucher_url {
        fields.insert("voucherUrl".to_string(), json!(voucher_url));
    }
    if deposit.requires_manual_review {
        fields.insert("requiresManualReview".to_string(), json!(true));
    }
    Value::Object(fields)
}

/// `POST /api/v1/deposits`
pub async fn handle_create_deposit(
    user_id: String,
    request: CreateDepositRequest,
    service: Arc<DepositService>,
) -> Result<warp::reply::Response, warp::Rejection> {
    let user_id = parse_user_id(&user_id)?;
    debug!("Create deposit request from user {}", user_id);

    let deposit = service
        .create_deposit(
            user_id,
            request.amount,
            &request.payment_method,
            request.gift_link.as_deref(),
        )
        .await
        .map_err(warp::reject::custom)?;

    Ok(responses::success(deposit_payload(&deposit)).into_response())
}

/// `POST /api/v1/deposits/check`
pub async fn handle_check_deposit(
    user_id: String,
    request: CheckDepositRequest,
    service: Arc<StatusService>,
) -> Result<warp::reply::Response, warp::Rejection> {
    let user_id = parse_user_id(&user_id)?;

    let outcome = service
        .check_status(user_id, &request.transaction_id)
        .await
        .map_err(warp::reject::custom)?;

    let mut data = json!({ "transactionId": request.transaction_id });
    if let Some(amount) = outcome.amount {
        if let Some(fields) = data.as_object_mut() {
            fields.insert("amount".to_string(), json!(amount));
        }
    }
    Ok(responses::success_with_state(outcome.state.as_str(), data).into_response())
}
