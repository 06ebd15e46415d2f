//! Route definitions for the stampit API.

use warp::Filter;

use super::handlers;
use crate::config::CorsConfig;
use crate::context::ApiContext;

/// Health routes.
mod health;
/// Ledger routes.
mod ledger;
/// Stamp routes.
mod stamp;
/// Verify routes.
mod verify;

/// Largest JSON body accepted, in bytes. Receipts travel base64 encoded.
const MAX_BODY_SIZE: u64 = 64 * 1024;

/// This function sets up the Warp filters for handling all requests.
pub fn routes(
    context: ApiContext,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    health::routes()
        .or(stamp::routes(context.clone()))
        .or(verify::routes(context.clone()))
        .or(ledger::routes(context))
        // Convert reply to tuple to that more routes can be added to the returned filter.
        .map(|reply| (reply,))
}

/// Cross-origin access for the allowed widget origins. With no origins
/// configured, cross-origin requests are refused.
pub fn cors(config: &CorsConfig) -> warp::cors::Builder {
    warp::cors()
        .allow_origins(config.allowed_origins.iter().map(String::as_str))
        .allow_methods(vec!["GET", "POST", "OPTIONS"])
        .allow_headers(vec!["content-type"])
        .max_age(86400)
}

/// Every route with rejection recovery, CORS and request logging.
pub fn service(
    context: ApiContext,
) -> impl Filter<Extract = (impl warp::Reply,), Error = std::convert::Infallible> + Clone {
    let cors = cors(&context.settings.cors);
    routes(context)
        .with(cors)
        .recover(handlers::handle_rejection)
        .with(warp::log("stampit::api"))
}

#[cfg(test)]
mod tests {
    use warp::http::StatusCode;
    use warp::test::request;

    use super::*;
    use crate::testing::TestContext;

    #[tokio::test]
    async fn only_allowed_origins_get_cors_headers() {
        let test = TestContext::new().await;
        let mut context = test.context.clone();
        context.settings.cors.allowed_origins = vec!["https://widget.example.org".to_string()];
        let api = service(context);

        let res = request()
            .method("GET")
            .path("/api/healthz")
            .header("origin", "https://widget.example.org")
            .reply(&api)
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(
            res.headers()["access-control-allow-origin"],
            "https://widget.example.org"
        );

        let res = request()
            .method("GET")
            .path("/api/healthz")
            .header("origin", "https://evil.example.org")
            .reply(&api)
            .await;
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn unknown_paths_are_json_not_found() {
        let test = TestContext::new().await;

        let res = request().method("GET").path("/api/nope").reply(&service(test.context.clone())).await;

        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        let body: serde_json::Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body["error"], "not_found");
    }
}
