//! Route composition

use std::sync::Arc;

use warp::http::header::{COOKIE, ORIGIN};
use warp::http::HeaderMap;
use warp::{Filter, Reply};

use crate::application::services::{DepositService, StatusService};
use crate::infrastructure::http::responses::handle_rejection;
use crate::middleware::cors::preflight_route;
use crate::middleware::csrf::{ensure_cookie, CSRF_COOKIE};
use crate::middleware::SecurityLayer;

pub mod csrf;
pub mod deposits;
pub mod health;

/// Inject a shared service into a filter chain
pub(crate) fn with<T: Send + Sync + ?Sized>(
    value: Arc<T>,
) -> impl Filter<Extract = (Arc<T>,), Error = std::convert::Infallible> + Clone {
    warp::any().map(move || Arc::clone(&value))
}

/// True when the request already carries a CSRF token cookie
fn has_csrf_cookie(headers: &HeaderMap) -> bool {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .any(|pair| {
            pair.trim_start()
                .strip_prefix(CSRF_COOKIE)
                .is_some_and(|rest| rest.starts_with('='))
        })
}

/// Assemble the full route tree. Preflights short-circuit first;
/// `deposits/check` is matched before the bare `deposits` path; the
/// recovery layer converts every rejection to the JSON envelope. The
/// outer map runs on every response, success or error envelope alike:
/// it echoes CORS headers for whitelisted origins and hands a CSRF
/// cookie to any client that arrived without one.
pub fn build_routes(
    security: &SecurityLayer,
    deposit_service: Arc<DepositService>,
    status_service: Arc<StatusService>,
) -> impl Filter<Extract = (impl Reply,), Error = std::convert::Infallible> + Clone {
    let cors = Arc::clone(&security.cors);
    let secure_cookies = security.csrf_secure_cookies;

    let routed = preflight_route(Arc::clone(&security.cors))
        .or(deposits::check_route(status_service, security))
        .or(deposits::create_route(deposit_service, security))
        .or(csrf::token_route(security))
        .or(health::health_route())
        .recover(handle_rejection);

    warp::header::headers_cloned()
        .and(routed)
        .map(move |headers: HeaderMap, reply| {
            let origin = headers.get(ORIGIN).and_then(|v| v.to_str().ok());
            let mut response = cors.apply(reply, origin);
            ensure_cookie(&mut response, has_csrf_cookie(&headers), secure_cookies);
            response
        })
}
