//! Handlers for Health endpoint endpoints.

use warp::http::StatusCode;
use warp::reply::json;
use warp::reply::with_status;
use warp::reply::Reply;

use crate::api::models::health::HealthData;

/// Get health handler.
pub async fn get_health() -> impl Reply {
    let data = HealthData {
        redis: "disabled".to_string(),
        memory_limiter: "ok".to_string(),
    };
    with_status(json(&data), StatusCode::OK)
}
