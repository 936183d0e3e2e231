use std::error::Error;
use std::time::Duration;

use axum::{Router, error_handling::HandleErrorLayer, http::Method, routing::get};
use tower::{ServiceBuilder, timeout::TimeoutLayer};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::error::{ApiError, handle_middleware_error};
use crate::handler::{AppState, get_book_club, healthcheck, list_book_clubs, list_integrations, search_book_clubs};

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod handler;
pub mod model;
pub mod query;
pub mod seed;

/// Identifier that `/bookclub/:key/` can never serve: the static `/bookclub/search/`
/// route is matched first. The seed importer rejects it.
pub const RESERVED_BOOK_CLUB_ID: &str = "search";

/// Builds the HTTP surface. `/bookclub/search/` is static, so it is matched before the
/// `/bookclub/:key/` capture; see [`RESERVED_BOOK_CLUB_ID`]. Unknown paths answer with
/// the JSON not-found body.
pub fn routes(state: AppState, request_timeout: Duration) -> Router {
    let router = Router::new()
        .route("/", get(healthcheck))
        .route("/bookclub/", get(list_book_clubs))
        .route("/bookclub/search/", get(search_book_clubs))
        .route("/bookclub/:key/", get(get_book_club))
        .route("/integrations/", get(list_integrations))
        .fallback(|| async { ApiError::NotFound })
        .with_state(state);

    middleware(router, request_timeout)
}

/// Tracing, request timeout (answered as a JSON 408) and CORS.
fn middleware(router: Router, request_timeout: Duration) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET])
        .allow_headers(Any);

    router.layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(HandleErrorLayer::new(handle_middleware_error))
            .layer(TimeoutLayer::new(request_timeout))
            .layer(cors),
    )
}

pub fn unpack_error(err: &dyn Error) -> String {
    let mut parts = Vec::new();
    parts.push(err.to_string());
    let mut current = err.source();
    while let Some(source) = current {
        parts.push(source.to_string());
        current = source.source();
    }
    parts.join(": ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DbError;
    use axum::{
        body::{Body, to_bytes},
        http::{Request, StatusCode},
    };
    use serde_json::Value;
    use tower::ServiceExt;

    async fn get(app: Router, uri: &str) -> (StatusCode, Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[test]
    fn test_unpack_error_single() {
        let err = DbError::Decode("bad date".to_string());
        assert_eq!(unpack_error(&err), "DecodeError: bad date");
    }

    #[tokio::test]
    async fn test_slow_request_times_out_with_json_body() {
        let slow = Router::new().route(
            "/slow",
            axum::routing::get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                "late"
            }),
        );
        let app = middleware(slow, Duration::from_millis(20));

        let (status, body) = get(app, "/slow").await;
        assert_eq!(status, StatusCode::REQUEST_TIMEOUT);
        assert_eq!(body, serde_json::json!({ "detail": "Request timed out." }));
    }

    #[tokio::test]
    async fn test_fast_request_passes_through_middleware() {
        let fast = Router::new().route("/fast", axum::routing::get(|| async { axum::Json(serde_json::json!({ "ok": true })) }));
        let app = middleware(fast, Duration::from_secs(5));

        let (status, body) = get(app, "/fast").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], true);
    }
}
