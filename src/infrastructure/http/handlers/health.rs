//! Health check handler

use chrono::Utc;
use serde_json::json;

use crate::infrastructure::http::responses;

/// `GET /health`
pub async fn handle_health() -> Result<impl warp::Reply, warp::Rejection> {
    Ok(responses::success(json!({
        "status": "healthy",
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": Utc::now().to_rfc3339(),
    })))
}
