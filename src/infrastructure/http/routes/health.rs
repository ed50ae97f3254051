//! Health check route

use warp::{Filter, Rejection, Reply};

use crate::infrastructure::http::handlers::health::handle_health;

/// `GET /health`
pub fn health_route() -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    warp::path!("health").and(warp::get()).and_then(handle_health)
}
