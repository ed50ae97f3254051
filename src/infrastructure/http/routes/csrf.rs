//! CSRF token route

use warp::{Filter, Rejection};

use crate::infrastructure::http::handlers::csrf::handle_csrf_token;
use crate::middleware::csrf::CSRF_COOKIE;
use crate::middleware::SecurityLayer;

/// `GET /api/v1/csrf-token`
pub fn token_route(
    security: &SecurityLayer,
) -> impl Filter<Extract = (warp::reply::Response,), Error = Rejection> + Clone {
    let secure_cookies = security.csrf_secure_cookies;
    warp::path!("api" / "v1" / "csrf-token")
        .and(warp::get())
        .and(security.protect_read())
        .and(warp::cookie::optional(CSRF_COOKIE))
        .and(warp::any().map(move || secure_cookies))
        .and_then(handle_csrf_token)
}
