//! CORS policy
//!
//! Origin-whitelist CORS. Responses to a whitelisted origin echo it
//! back with credentials allowed; any other origin gets no CORS
//! headers at all, which makes the browser block the cross-origin
//! read. Preflights are answered directly without touching handlers.

use std::sync::Arc;

use warp::http::header::{HeaderValue, VARY};
use warp::http::StatusCode;
use warp::{Filter, Rejection, Reply};

const ALLOWED_METHODS: &str = "GET, POST, OPTIONS";
const ALLOWED_HEADERS: &str = "content-type, x-csrf-token, x-user-id";
const PREFLIGHT_MAX_AGE: &str = "3600";

#[derive(Debug, Clone)]
pub struct CorsPolicy {
    origins: Vec<String>,
}

impl CorsPolicy {
    pub fn new(origins: Vec<String>) -> Self {
        Self { origins }
    }

    pub fn is_allowed(&self, origin: &str) -> bool {
        self.origins.iter().any(|o| o == origin)
    }

    /// Attach CORS headers for a whitelisted origin to a response
    pub fn apply(&self, reply: impl Reply, origin: Option<&str>) -> warp::reply::Response {
        let mut response = reply.into_response();
        if let Some(origin) = origin.filter(|o| self.is_allowed(o)) {
            if let Ok(value) = HeaderValue::from_str(origin) {
                let headers = response.headers_mut();
                headers.insert("access-control-allow-origin", value);
                headers.insert("access-control-allow-credentials", HeaderValue::from_static("true"));
                headers.insert(VARY, HeaderValue::from_static("Origin"));
            }
        }
        response
    }

    fn preflight_response(&self, origin: Option<&str>) -> warp::reply::Response {
        let mut response = warp::reply::with_status(warp::reply(), StatusCode::NO_CONTENT).into_response();
        if let Some(origin) = origin.filter(|o| self.is_allowed(o)) {
            if let Ok(value) = HeaderValue::from_str(origin) {
                let headers = response.headers_mut();
                headers.insert("access-control-allow-origin", value);
                headers.insert("access-control-allow-credentials", HeaderValue::from_static("true"));
                headers.insert("access-control-allow-methods", HeaderValue::from_static(ALLOWED_METHODS));
                headers.insert("access-control-allow-headers", HeaderValue::from_static(ALLOWED_HEADERS));
                headers.insert("access-control-max-age", HeaderValue::from_static(PREFLIGHT_MAX_AGE));
                headers.insert(VARY, HeaderValue::from_static("Origin"));
            }
        }
        response
    }
}

/// Route answering OPTIONS preflights for every path
pub fn preflight_route(
    policy: Arc<CorsPolicy>,
) -> impl Filter<Extract = (warp::reply::Response,), Error = Rejection> + Clone {
    warp::options()
        .and(warp::path::tail())
        .and(warp::header::optional::<String>("origin"))
        .map(move |_tail, origin: Option<String>| policy.preflight_response(origin.as_deref()))
}
