//! CSRF double-submit-cookie guard
//!
//! The token is random, lives in a cookie the frontend can read, and
//! must be echoed back in a request header on every mutating request.
//! The cookie and header are compared in constant time. Safe methods
//! pass through untouched.

use rand::RngCore;
use warp::http::Method;
use warp::{Filter, Rejection};

use crate::shared::error::AppError;
use crate::shared::logging::LoggingUtils;

pub const CSRF_COOKIE: &str = "csrf-token";
pub const CSRF_HEADER: &str = "x-csrf-token";

/// Cookie lifetime in seconds (24h)
const CSRF_COOKIE_MAX_AGE: u64 = 86_400;
/// Token entropy in bytes; hex-encoded to 64 chars
const CSRF_TOKEN_BYTES: usize = 32;

/// Generate a fresh CSRF token
pub fn generate_token() -> String {
    let mut bytes = [0u8; CSRF_TOKEN_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Set-Cookie value for a CSRF token. Deliberately not HttpOnly: the
/// frontend must read it to mirror it into the request header.
pub fn token_cookie(token: &str, secure: bool) -> String {
    let mut cookie = format!(
        "{}={}; Max-Age={}; Path=/; SameSite=Lax",
        CSRF_COOKIE, token, CSRF_COOKIE_MAX_AGE
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// Attach a fresh token cookie to a response when the request carried
/// none. Responses that already set their own cookie (the token
/// endpoint) are left alone, so a minted token is never overwritten.
pub fn ensure_cookie(response: &mut warp::reply::Response, request_had_cookie: bool, secure: bool) {
    use warp::http::header::{HeaderValue, SET_COOKIE};

    if request_had_cookie || response.headers().contains_key(SET_COOKIE) {
        return;
    }
    if let Ok(value) = HeaderValue::from_str(&token_cookie(&generate_token(), secure)) {
        response.headers_mut().insert(SET_COOKIE, value);
    }
}

/// Constant-time string comparison; never short-circuits on length
/// or content so timing reveals nothing about the expected token.
fn constant_time_eq(a: &str, b: &str) -> bool {
    let a = a.as_bytes();
    let b = b.as_bytes();
    let mut diff = (a.len() ^ b.len()) as u8;
    for i in 0..a.len().max(b.len()) {
        let x = a.get(i).copied().unwrap_or(0);
        let y = b.get(i).copied().unwrap_or(0);
        diff |= x ^ y;
    }
    diff == 0
}

fn verify(method: &Method, header: Option<&str>, cookie: Option<&str>) -> Result<(), AppError> {
    if matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS) {
        return Ok(());
    }
    match (header, cookie) {
        (Some(header), Some(cookie)) if constant_time_eq(header, cookie) => Ok(()),
        _ => Err(AppError::CsrfValidationFailed),
    }
}

/// Filter rejecting mutating requests whose CSRF header and cookie do
/// not match. A disabled guard passes everything through.
pub fn require(enabled: bool) -> impl Filter<Extract = (), Error = Rejection> + Clone {
    warp::method()
        .and(warp::path::full())
        .and(warp::header::optional::<String>(CSRF_HEADER))
        .and(warp::cookie::optional(CSRF_COOKIE))
        .and_then(
            move |method: Method,
                  path: warp::path::FullPath,
                  header: Option<String>,
                  cookie: Option<String>| async move {
                if !enabled {
                    return Ok(());
                }
                verify(&method, header.as_deref(), cookie.as_deref()).map_err(|e| {
                    LoggingUtils::log_csrf_failure("-", path.as_str());
                    warp::reject::custom(e)
                })
            },
        )
        .untuple_one()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_shape() {
        let token = generate_token();
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(generate_token(), generate_token());
    }

    #[test]
    fn test_cookie_attributes() {
        let cookie = token_cookie("abc", false);
        assert!(cookie.starts_with("csrf-token=abc"));
        assert!(cookie.contains("Max-Age=86400"));
        assert!(cookie.contains("SameSite=Lax"));
        assert!(!cookie.contains("HttpOnly"));
        assert!(!cookie.contains("Secure"));
        assert!(token_cookie("abc", true).contains("Secure"));
    }

    #[test]
    fn test_ensure_cookie_fills_bare_responses_only() {
        use warp::http::header::{HeaderValue, SET_COOKIE};
        use warp::Reply;

        let mut response = warp::reply().into_response();
        ensure_cookie(&mut response, false, false);
        let cookie = response.headers().get(SET_COOKIE).unwrap().to_str().unwrap();
        assert!(cookie.starts_with("csrf-token="));

        let mut response = warp::reply().into_response();
        ensure_cookie(&mut response, true, false);
        assert!(response.headers().get(SET_COOKIE).is_none());

        let mut response = warp::reply().into_response();
        response
            .headers_mut()
            .insert(SET_COOKIE, HeaderValue::from_static("csrf-token=minted; Path=/"));
        ensure_cookie(&mut response, false, false);
        assert_eq!(
            response.headers().get(SET_COOKIE).unwrap(),
            "csrf-token=minted; Path=/"
        );
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq("abc", "abc"));
        assert!(!constant_time_eq("abc", "abd"));
        assert!(!constant_time_eq("abc", "abcd"));
        assert!(!constant_time_eq("", "a"));
        assert!(constant_time_eq("", ""));
    }

    #[test]
    fn test_safe_methods_bypass() {
        assert!(verify(&Method::GET, None, None).is_ok());
        assert!(verify(&Method::HEAD, None, None).is_ok());
        assert!(verify(&Method::OPTIONS, None, None).is_ok());
        assert!(verify(&Method::POST, None, None).is_err());
    }

    #[test]
    fn test_mutating_methods_require_matching_pair() {
        assert!(verify(&Method::POST, Some("t"), Some("t")).is_ok());
        assert!(verify(&Method::POST, Some("t"), Some("other")).is_err());
        assert!(verify(&Method::POST, Some("t"), None).is_err());
        assert!(verify(&Method::POST, None, Some("t")).is_err());
        assert!(verify(&Method::DELETE, Some("t"), Some("other")).is_err());
    }

    #[tokio::test]
    async fn test_filter_rejects_mismatch() {
        let route = require(true).map(|| "ok");

        let response = warp::test::request()
            .method("POST")
            .path("/api/v1/deposits")
            .header(CSRF_HEADER, "aaa")
            .header("cookie", "csrf-token=bbb")
            .reply(&route)
            .await;
        // rejection surfaces as not-found without a recover layer
        assert_ne!(response.status(), warp::http::StatusCode::OK);

        let response = warp::test::request()
            .method("POST")
            .path("/api/v1/deposits")
            .header(CSRF_HEADER, "aaa")
            .header("cookie", "csrf-token=aaa")
            .reply(&route)
            .await;
        assert_eq!(response.status(), warp::http::StatusCode::OK);
    }

    #[tokio::test]
    async fn test_disabled_guard_passes_everything() {
        let route = require(false).map(|| "ok");
        let response = warp::test::request()
            .method("POST")
            .path("/api/v1/deposits")
            .reply(&route)
            .await;
        assert_eq!(response.status(), warp::http::StatusCode::OK);
    }
}
