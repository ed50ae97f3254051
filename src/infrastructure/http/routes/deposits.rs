//! Deposit routes

use std::sync::Arc;

use warp::{Filter, Rejection};

use crate::application::services::{DepositService, StatusService};
use crate::infrastructure::http::handlers::deposits;
use crate::infrastructure::http::models::{CheckDepositRequest, CreateDepositRequest};
use crate::middleware::SecurityLayer;

use super::with;

/// `POST /api/v1/deposits`
pub fn create_route(
    service: Arc<DepositService>,
    security: &SecurityLayer,
) -> impl Filter<Extract = (warp::reply::Response,), Error = Rejection> + Clone {
    warp::path!("api" / "v1" / "deposits")
        .and(warp::post())
        .and(security.protect_auth())
        .and(warp::header::<String>("x-user-id"))
        .and(warp::body::json::<CreateDepositRequest>())
        .and(with(service))
        .and_then(deposits::handle_create_deposit)
}

/// `POST /api/v1/deposits/check`
pub fn check_route(
    service: Arc<StatusService>,
    security: &SecurityLayer,
) -> impl Filter<Extract = (warp::reply::Response,), Error = Rejection> + Clone {
    warp::path!("api" / "v1" / "deposits" / "check")
        .and(warp::post())
        .and(security.protect_api())
        .and(warp::header::<String>("x-user-id"))
        .and(warp::body::json::<CheckDepositRequest>())
        .and(with(service))
        .and_then(deposits::handle_check_deposit)
}
