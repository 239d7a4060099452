//! REST API layer: route handlers, DTOs, authentication and router
//! composition.
//!
//! Resource endpoints are mounted under `/api/v1`; system endpoints live at
//! the root.

pub mod auth;
pub mod dto;
pub mod handlers;
pub mod openapi;

use axum::Router;

use crate::app_state::AppState;

/// Builds the complete API router with all REST and streaming endpoints.
pub fn build_router() -> Router<AppState> {
    let router = Router::new()
        .nest("/api/v1", handlers::routes())
        .merge(handlers::system::routes());
    with_docs(router)
}

#[cfg(feature = "swagger-ui")]
fn with_docs(router: Router<AppState>) -> Router<AppState> {
    use utoipa::OpenApi;
    use utoipa_swagger_ui::SwaggerUi;

    router.merge(
        SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", openapi::ApiDoc::openapi()),
    )
}

#[cfg(not(feature = "swagger-ui"))]
fn with_docs(router: Router<AppState>) -> Router<AppState> {
    use axum::Json;
    use axum::routing::get;
    use utoipa::OpenApi;

    router.route(
        "/api-docs/openapi.json",
        get(|| async { Json(openapi::ApiDoc::openapi()) }),
    )
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use axum::response::Response;
    use serde_json::Value;
    use tokio_util::sync::CancellationToken;
    use tower::ServiceExt;

    use super::*;
    use crate::config::NotifyConfig;

    async fn call(request: Request<Body>) -> Response {
        let state = AppState::start(NotifyConfig::default(), CancellationToken::new());
        let router = build_router().with_state(state);
        tokio_test::assert_ok!(router.oneshot(request).await)
    }

    fn json_post(uri: &str, body: &'static str) -> Request<Body> {
        let Ok(request) = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body))
        else {
            panic!("valid request");
        };
        request
    }

    async fn body_json(response: Response) -> Value {
        let Ok(bytes) = axum::body::to_bytes(response.into_body(), usize::MAX).await else {
            panic!("readable body");
        };
        let Ok(value) = serde_json::from_slice(&bytes) else {
            panic!("json body");
        };
        value
    }

    #[tokio::test]
    async fn anonymous_sign_in_returns_bearer() {
        let response = call(json_post("/api/v1/sessions", "{}")).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = body_json(response).await;
        assert_eq!(body["session_id"], 1);
        assert!(body["bearer"].as_str().is_some_and(|t| !t.is_empty()));
        assert!(body.get("user_id").is_none());
    }

    #[tokio::test]
    async fn sign_in_rejects_both_user_fields() {
        let response = call(json_post(
            "/api/v1/sessions",
            r#"{"user_id": 1, "user": {"given_name": "Ada"}}"#,
        ))
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn query_without_token_is_unauthorized() {
        let response = call(json_post("/api/v1/listings/query", "{}")).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], 4001);
    }

    #[tokio::test]
    async fn openapi_document_is_served() {
        let Ok(request) = Request::builder()
            .uri("/api-docs/openapi.json")
            .body(Body::empty())
        else {
            panic!("valid request");
        };
        let response = call(request).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert!(body["paths"].get("/api/v1/stream").is_some());
    }
}
