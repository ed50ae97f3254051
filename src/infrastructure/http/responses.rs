//! Response envelopes and rejection recovery
//!
//! Every JSON response uses the same `{"success": bool, ...}` envelope.
//! The recovery handler converts rejections into that envelope so
//! clients never see a bare framework error page.

use std::convert::Infallible;

use serde::Serialize;
use serde_json::json;
use tracing::error;
use warp::http::header::HeaderValue;
use warp::http::StatusCode;
use warp::{Rejection, Reply};

use crate::shared::error::AppError;

/// `{"success": true, "data": ...}`
pub fn success(data: impl Serialize) -> warp::reply::Json {
    warp::reply::json(&json!({ "success": true, "data": data }))
}

/// `{"success": true, "status": ..., "data": ...}` for polled resources
pub fn success_with_state(state: &str, data: impl Serialize) -> warp::reply::Json {
    warp::reply::json(&json!({ "success": true, "status": state, "data": data }))
}

/// `{"success": false, "message": ...}`
pub fn failure(message: &str) -> warp::reply::Json {
    warp::reply::json(&json!({ "success": false, "message": message }))
}

/// Envelope + status for an application error
pub fn app_error_response(err: &AppError) -> warp::reply::Response {
    let status = err.http_status_code();
    let mut response = warp::reply::with_status(failure(&err.public_message()), status).into_response();

    if let AppError::RateLimitExceeded { retry_after_secs } = err {
        if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
            response.headers_mut().insert("retry-after", value);
        }
        response
            .headers_mut()
            .insert("x-ratelimit-remaining", HeaderValue::from_static("0"));
    }
    response
}

/// Map every rejection to the JSON envelope
pub async fn handle_rejection(err: Rejection) -> Result<warp::reply::Response, Infallible> {
    if let Some(app_err) = err.find::<AppError>() {
        return Ok(app_error_response(app_err));
    }

    let (status, message) = if err.is_not_found() {
        (StatusCode::NOT_FOUND, "Not found".to_string())
    } else if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        (StatusCode::PAYLOAD_TOO_LARGE, "Request body too large".to_string())
    } else if let Some(e) = err.find::<warp::filters::body::BodyDeserializeError>() {
        (StatusCode::BAD_REQUEST, format!("Invalid request body: {}", e))
    } else if let Some(e) = err.find::<warp::reject::MissingHeader>() {
        (StatusCode::BAD_REQUEST, format!("Missing required header: {}", e.name()))
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed".to_string())
    } else {
        error!("Unhandled rejection: {:?}", err);
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
    };

    Ok(warp::reply::with_status(failure(&message), status).into_response())
}
