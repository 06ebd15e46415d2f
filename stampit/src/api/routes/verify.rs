//! Route definitions for the verify endpoint.

use warp::Filter;

use super::handlers;
use super::MAX_BODY_SIZE;
use crate::context::ApiContext;

/// Verify routes.
pub fn routes(
    context: ApiContext,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    verify_receipt(context)
}

/// Verify receipt endpoint.
fn verify_receipt(
    context: ApiContext,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::any()
        .map(move || context.clone())
        .and(warp::path!("api" / "verify"))
        .and(warp::post())
        .and(warp::body::content_length_limit(MAX_BODY_SIZE))
        .and(warp::body::json())
        .then(handlers::verify::verify_receipt)
}
