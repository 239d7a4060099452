//! Subscription handlers: unsubscribe and the event stream route.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{delete, get};
use axum::Router;

use crate::api::auth::CurrentSession;
use crate::app_state::AppState;
use crate::domain::SubscriptionId;
use crate::error::{ErrorResponse, GatewayError};
use crate::stream::handler::stream_handler;

/// `DELETE /subscriptions/{id}`: Stop a subscription.
///
/// # Errors
///
/// Returns [`GatewayError::SubscriptionNotFound`] if the caller's session
/// has no such subscription.
#[utoipa::path(
    delete,
    path = "/api/v1/subscriptions/{id}",
    tag = "Subscriptions",
    summary = "Unsubscribe",
    description = "Stops streaming changes for one subscription of the caller's session.",
    params(("id" = u64, Path, description = "Subscription id")),
    responses(
        (status = 204, description = "Unsubscribed"),
        (status = 404, description = "Unknown subscription", body = ErrorResponse),
    ),
    security(("bearer" = []))
)]
pub async fn unsubscribe(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
    Path(id): Path<u64>,
) -> Result<impl IntoResponse, GatewayError> {
    state
        .hub
        .unsubscribe(&session, SubscriptionId::new(id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Subscription routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/subscriptions/{id}", delete(unsubscribe))
        .route("/stream", get(stream_handler))
}
