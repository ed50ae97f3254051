//! Payment gateway HTTP adapter
//!
//! Talks to the upstream payment provider and normalizes its response
//! envelopes into typed results. Provider responses that do not match a
//! recognized shape are rejected outright rather than guessed at.

use rust_decimal::Decimal;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::config::app_config::ProviderConfig;
use crate::shared::error::{AppError, AppResult};

/// Values that indicate the API key was never actually configured
const PLACEHOLDER_API_KEYS: &[&str] = &["", "change-me", "your-api-key-here"];

/// Maximum provider response body bytes echoed into error details
const ERROR_DETAIL_LIMIT: usize = 512;

/// A deposit the provider has accepted and is waiting to settle
#[derive(Debug, Clone)]
pub struct PaymentResult {
    pub transaction_id: String,
    /// Amount the provider confirmed; absent when it echoes nothing
    pub amount: Option<Decimal>,
    pub expires_at: Option<i64>,
    pub qr_url: Option<String>,
    pub qr_payload: Option<String>,
    pub voucher_url: Option<String>,
}

/// Normalized settlement status of a previously created deposit
#[derive(Debug, Clone)]
pub enum ProviderStatus {
    Success {
        transaction_id: Option<String>,
        amount: Option<Decimal>,
    },
    Pending {
        expires_at: Option<i64>,
    },
    Failed {
        message: String,
    },
}

pub struct PaymentProviderClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl PaymentProviderClient {
    pub fn new(config: &ProviderConfig) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| AppError::Internal(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    /// Reject calls early when the deployment still carries a
    /// placeholder API key; a real key is required for any charge.
    pub fn ensure_configured(&self) -> AppResult<()> {
        if PLACEHOLDER_API_KEYS.contains(&self.api_key.as_str()) {
            return Err(AppError::UpstreamMisconfigured(
                "payment provider API key is not configured".to_string(),
            ));
        }
        Ok(())
    }

    /// Create a QR payment intent for the given amount
    pub async fn generate_qr(&self, amount: Decimal) -> AppResult<PaymentResult> {
        let body = json!({ "amount": amount });
        let response = self.post_json("/v1/qr/generate", &body).await?;
        normalize_payment_envelope(&response)
    }

    /// Ask the provider to verify a wallet voucher link for the amount
    pub async fn validate_voucher(&self, link: &str, amount: Decimal) -> AppResult<PaymentResult> {
        let body = json!({ "voucherUrl": link, "amount": amount });
        let response = self.post_json("/v1/voucher/validate", &body).await?;
        normalize_payment_envelope(&response)
    }

    /// Poll settlement status for a provider transaction reference
    pub async fn check_status(&self, provider_ref: &str) -> AppResult<ProviderStatus> {
        let body = json!({ "transactionId": provider_ref });
        let response = self.post_json("/v1/qr/check", &body).await?;
        normalize_status_envelope(&response)
    }

    async fn post_json(&self, path: &str, body: &Value) -> AppResult<Value> {
        let url = format!("{}{}", self.base_url, path);
        debug!("Provider request: POST {}", path);

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| AppError::UpstreamError(format!("provider request failed: {}", e)))?;

        let status = response.status();
        if status.is_success() {
            return response
                .json()
                .await
                .map_err(|e| AppError::UpstreamError(format!("unparseable provider response: {}", e)));
        }

        let detail = response.text().await.unwrap_or_default();
        let detail = detail.chars().take(ERROR_DETAIL_LIMIT).collect::<String>();
        warn!("Provider returned {} for {}: {}", status, path, detail);
        Err(map_provider_status(status, detail))
    }
}

fn map_provider_status(status: reqwest::StatusCode, detail: String) -> AppError {
    match status.as_u16() {
        401 | 403 => AppError::UpstreamMisconfigured(format!(
            "provider rejected credentials ({}): {}",
            status, detail
        )),
        404 => AppError::UpstreamNotFound(detail),
        _ => AppError::UpstreamError(format!("provider error ({}): {}", status, detail)),
    }
}

fn decimal_field(value: &Value) -> Option<Decimal> {
    if let Some(s) = value.as_str() {
        return s.parse().ok();
    }
    value.as_f64().and_then(|f| Decimal::try_from(f).ok())
}

/// Normalize a payment creation envelope:
/// `{"status": "success", "data": {"transactionId": ..., ...}}`.
/// Anything else is an upstream error.
pub fn normalize_payment_envelope(response: &Value) -> AppResult<PaymentResult> {
    let status = response
        .get("status")
        .and_then(|v| v.as_str())
        .ok_or_else(|| AppError::UpstreamError("provider response missing status".to_string()))?;

    if status != "success" {
        // a well-formed rejection envelope, not an outage
        let message = response
            .get("message")
            .and_then(|v| v.as_str())
            .unwrap_or("provider rejected the request");
        return Err(AppError::UpstreamRejected(message.to_string()));
    }

    let data = response
        .get("data")
        .filter(|v| v.is_object())
        .ok_or_else(|| AppError::UpstreamError("provider response missing data".to_string()))?;

    let transaction_id = data
        .get("transactionId")
        .and_then(|v| v.as_str())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| {
            AppError::UpstreamError("provider response missing transactionId".to_string())
        })?
        .to_string();

    let get_str = |keys: &[&str]| {
        keys.iter()
            .find_map(|k| data.get(*k).and_then(|v| v.as_str()))
            .map(str::to_string)
    };

    Ok(PaymentResult {
        transaction_id,
        amount: data.get("amount").and_then(decimal_field),
        expires_at: data.get("expiresAt").and_then(|v| v.as_i64()),
        qr_url: get_str(&["qrUrl", "qr_image_url"]),
        qr_payload: get_str(&["payload", "qr_payload"]),
        voucher_url: get_str(&["voucherUrl", "url", "link"]),
    })
}

/// Normalize a settlement status envelope:
/// `{"status": "success"|"pending"|"error", ...}`
pub fn normalize_status_envelope(response: &Value) -> AppResult<ProviderStatus> {
    let status = response
        .get("status")
        .and_then(|v| v.as_str())
        .ok_or_else(|| AppError::UpstreamError("provider response missing status".to_string()))?;

    match status {
        "success" => Ok(ProviderStatus::Success {
            transaction_id: response
                .get("transactionId")
                .and_then(|v| v.as_str())
                .map(str::to_string),
            amount: response.get("amount").and_then(decimal_field),
        }),
        "pending" => Ok(ProviderStatus::Pending {
            expires_at: response.get("expiresAt").and_then(|v| v.as_i64()),
        }),
        "error" | "failed" => Ok(ProviderStatus::Failed {
            message: response
                .get("message")
                .and_then(|v| v.as_str())
                .unwrap_or("payment failed")
                .to_string(),
        }),
        other => Err(AppError::UpstreamError(format!(
            "unrecognized provider status: {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client_with_key(key: &str) -> PaymentProviderClient {
        let config = ProviderConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            api_key: key.to_string(),
            timeout_seconds: 5,
        };
        PaymentProviderClient::new(&config).unwrap()
    }

    #[test]
    fn test_placeholder_key_detection() {
        assert!(client_with_key("").ensure_configured().is_err());
        assert!(client_with_key("change-me").ensure_configured().is_err());
        assert!(client_with_key("sk_live_abc123").ensure_configured().is_ok());
    }

    #[test]
    fn test_payment_envelope_success() {
        let response = json!({
            "status": "success",
            "data": {
                "transactionId": "qr_42",
                "amount": 150.0,
                "expiresAt": 1700000600,
                "qrUrl": "https://pay.example/qr/42.png",
                "payload": "00020101021229370016",
            }
        });
        let result = normalize_payment_envelope(&response).unwrap();
        assert_eq!(result.transaction_id, "qr_42");
        assert_eq!(result.amount, Some(Decimal::from(150u32)));
        assert_eq!(result.expires_at, Some(1700000600));
        assert_eq!(result.qr_url.as_deref(), Some("https://pay.example/qr/42.png"));
        assert!(result.voucher_url.is_none());
    }

    #[test]
    fn test_payment_envelope_voucher_url_aliases() {
        for key in ["voucherUrl", "url", "link"] {
            let response = json!({
                "status": "success",
                "data": { "transactionId": "v_1", key: "https://gift.example/v/1" }
            });
            let result = normalize_payment_envelope(&response).unwrap();
            assert_eq!(result.voucher_url.as_deref(), Some("https://gift.example/v/1"));
        }
    }

    #[test]
    fn test_payment_envelope_rejects_unrecognized_shapes() {
        assert!(normalize_payment_envelope(&json!({})).is_err());
        assert!(normalize_payment_envelope(&json!({"status": "success"})).is_err());
        assert!(normalize_payment_envelope(&json!({"status": "success", "data": {}})).is_err());
        assert!(
            normalize_payment_envelope(&json!({"status": "success", "data": {"transactionId": ""}}))
                .is_err()
        );
    }

    #[test]
    fn test_payment_envelope_maps_rejection_distinctly() {
        let response = json!({"status": "error", "message": "amount too large"});
        let err = normalize_payment_envelope(&response).unwrap_err();
        assert!(matches!(err, AppError::UpstreamRejected(_)));
        assert!(err.to_string().contains("amount too large"));

        // a missing envelope is an outage, not a rejection
        assert!(matches!(
            normalize_payment_envelope(&json!({})).unwrap_err(),
            AppError::UpstreamError(_)
        ));
    }

    #[test]
    fn test_status_envelope_variants() {
        let success = normalize_status_envelope(&json!({
            "status": "success", "transactionId": "qr_42", "amount": "50"
        }))
        .unwrap();
        match success {
            ProviderStatus::Success { transaction_id, amount } => {
                assert_eq!(transaction_id.as_deref(), Some("qr_42"));
                assert_eq!(amount, Some(Decimal::from(50u32)));
            }
            other => panic!("expected success, got {:?}", other),
        }

        assert!(matches!(
            normalize_status_envelope(&json!({"status": "pending", "expiresAt": 1700000600})),
            Ok(ProviderStatus::Pending { expires_at: Some(1700000600) })
        ));
        assert!(matches!(
            normalize_status_envelope(&json!({"status": "error", "message": "declined"})),
            Ok(ProviderStatus::Failed { .. })
        ));
        assert!(normalize_status_envelope(&json!({"status": "maybe"})).is_err());
    }

    #[test]
    fn test_provider_error_mapping() {
        use reqwest::StatusCode;
        assert!(matches!(
            map_provider_status(StatusCode::UNAUTHORIZED, String::new()),
            AppError::UpstreamMisconfigured(_)
        ));
        assert!(matches!(
            map_provider_status(StatusCode::FORBIDDEN, String::new()),
            AppError::UpstreamMisconfigured(_)
        ));
        assert!(matches!(
            map_provider_status(StatusCode::NOT_FOUND, String::new()),
            AppError::UpstreamNotFound(_)
        ));
        assert!(matches!(
            map_provider_status(StatusCode::INTERNAL_SERVER_ERROR, String::new()),
            AppError::UpstreamError(_)
        ));
    }
}
