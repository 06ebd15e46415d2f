//! Route definitions for the ledger endpoints.

use warp::Filter;

use super::handlers;
use super::MAX_BODY_SIZE;
use crate::context::ApiContext;

/// Ledger routes.
pub fn routes(
    context: ApiContext,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    update_ledger(context).or(track_verification())
}

/// Update ledger endpoint, reachable with GET for manual triggers.
fn update_ledger(
    context: ApiContext,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::any()
        .map(move || context.clone())
        .and(warp::path!("api" / "ledger" / "update"))
        .and(warp::get().or(warp::post()).unify())
        .then(handlers::ledger::update_ledger)
}

/// Track verification endpoint.
fn track_verification() -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone
{
    warp::path!("api" / "ledger" / "verify")
        .and(warp::post())
        .and(warp::body::content_length_limit(MAX_BODY_SIZE))
        .and(warp::body::json())
        .then(handlers::ledger::track_verification)
}
