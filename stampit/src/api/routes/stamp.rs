//! Route definitions for the stamp endpoints.

use warp::Filter;

use super::handlers;
use super::MAX_BODY_SIZE;
use crate::context::ApiContext;

/// Stamp routes.
pub fn routes(
    context: ApiContext,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    create_stamp(context.clone()).or(get_receipt(context))
}

/// Create stamp endpoint.
fn create_stamp(
    context: ApiContext,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::any()
        .map(move || context.clone())
        .and(warp::path!("api" / "stamp"))
        .and(warp::post())
        .and(warp::header::optional::<String>("x-forwarded-for"))
        .and(warp::body::content_length_limit(MAX_BODY_SIZE))
        .and(warp::body::json())
        .then(handlers::stamp::create_stamp)
}

/// Download receipt endpoint, `/api/stamp/<hash>.ots`.
fn get_receipt(
    context: ApiContext,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::any()
        .map(move || context.clone())
        .and(warp::path!("api" / "stamp" / String))
        .and(warp::get())
        .and(warp::header::optional::<String>("x-forwarded-for"))
        .then(handlers::stamp::get_receipt)
}
