//! REST endpoint handlers organized by resource.

pub mod listings;
pub mod messages;
pub mod parties;
pub mod session;
pub mod subscription;
pub mod system;
pub mod transactions;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};

use crate::api::auth::CurrentSession;
use crate::app_state::AppState;
use crate::domain::{CollectionKind, QueryRequest};

/// Composes all resource routes under `/api/v1`.
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(session::routes())
        .merge(parties::routes())
        .merge(listings::routes())
        .merge(transactions::routes())
        .merge(messages::routes())
        .merge(subscription::routes())
}

/// Runs the `kind` query for the caller through the notification hub.
///
/// Caller-level errors carried in the response map to 403 for
/// `AccessDenied` and 400 otherwise.
pub(crate) async fn run_query(
    state: &AppState,
    CurrentSession(session): CurrentSession,
    kind: CollectionKind,
    request: QueryRequest,
) -> Response {
    let handler = state.market.query(kind);
    let response = state.hub.dispatch_query(&session, handler, request).await;
    let status = match response.error_code.as_deref() {
        None => StatusCode::OK,
        Some("AccessDenied") => StatusCode::FORBIDDEN,
        Some(_) => StatusCode::BAD_REQUEST,
    };
    (status, Json(response)).into_response()
}
