//! Event handlers: query, upsert and read receipts.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};

use super::run_query;
use crate::api::auth::CurrentSession;
use crate::api::dto::{IdResponse, QueryResultDto};
use crate::app_state::AppState;
use crate::domain::records::Event;
use crate::domain::{CollectionKind, QueryRequest};
use crate::error::{ErrorResponse, GatewayError};

/// `POST /events/query`: Query events.
#[utoipa::path(
    post,
    path = "/api/v1/events/query",
    tag = "Events",
    summary = "Query events",
    description = "Returns events by `event_id`, `deal_id` or `listing_id`, or every event sent by or to the caller. `event_kinds` and `unread` narrow the result.",
    request_body = QueryRequest,
    responses(
        (status = 200, description = "Query result", body = QueryResultDto),
        (status = 401, description = "No session", body = ErrorResponse),
    ),
    security(("bearer" = []))
)]
pub async fn query_events(
    State(state): State<AppState>,
    session: CurrentSession,
    Json(req): Json<QueryRequest>,
) -> Response {
    run_query(&state, session, CollectionKind::Event, req).await
}

/// `POST /events`: Send or update an event.
///
/// # Errors
///
/// Returns [`GatewayError::AccessDenied`] when the caller is neither sender
/// nor owner of an existing event.
#[utoipa::path(
    post,
    path = "/api/v1/events",
    tag = "Events",
    summary = "Send or update an event",
    description = "Sends a message, payment, review or notification when `id` is 0. The recipient (`user_id`) starts out with the event unread.",
    request_body = Event,
    responses(
        (status = 200, description = "Stored", body = IdResponse),
        (status = 403, description = "Not allowed", body = ErrorResponse),
        (status = 404, description = "Unknown event", body = ErrorResponse),
    ),
    security(("bearer" = []))
)]
pub async fn set_event(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
    Json(event): Json<Event>,
) -> Result<impl IntoResponse, GatewayError> {
    let id = state.market.set_event(session.identity(), event).await?;
    Ok(Json(IdResponse { id }))
}

/// `POST /events/{id}/read`: Mark an event read.
///
/// # Errors
///
/// Returns [`GatewayError::RecordNotFound`] or [`GatewayError::AccessDenied`].
#[utoipa::path(
    post,
    path = "/api/v1/events/{id}/read",
    tag = "Events",
    summary = "Mark an event read",
    description = "Removes the caller from the event's `unread_by` list.",
    params(("id" = i64, Path, description = "Event id")),
    responses(
        (status = 204, description = "Marked read"),
        (status = 403, description = "Not addressed to the caller", body = ErrorResponse),
        (status = 404, description = "Unknown event", body = ErrorResponse),
    ),
    security(("bearer" = []))
)]
pub async fn read_event(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, GatewayError> {
    state.market.read_event(session.identity(), id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Event routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/events", post(set_event))
        .route("/events/query", post(query_events))
        .route("/events/{id}/read", post(read_event))
}
