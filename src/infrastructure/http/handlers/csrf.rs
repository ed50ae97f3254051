//! CSRF token endpoint handler

use serde_json::json;
use warp::http::header::{HeaderValue, SET_COOKIE};
use warp::Reply;

use crate::infrastructure::http::responses;
use crate::middleware::csrf::{generate_token, token_cookie};

/// `GET /api/v1/csrf-token`. Echoes the caller's existing token when
/// the cookie is already set, otherwise mints a fresh one; either way
/// the cookie is (re)issued with a full lifetime.
pub async fn handle_csrf_token(
    existing: Option<String>,
    secure_cookies: bool,
) -> Result<warp::reply::Response, warp::Rejection> {
    let token = existing.unwrap_or_else(generate_token);
    let mut response = responses::success(json!({ "csrfToken": token })).into_response();
    if let Ok(value) = HeaderValue::from_str(&token_cookie(&token, secure_cookies)) {
        response.headers_mut().insert(SET_COOKIE, value);
    }
    Ok(response)
}
