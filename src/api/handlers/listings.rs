//! Listing handlers: query, upsert and removal.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, post};
use axum::{Json, Router};

use super::run_query;
use crate::api::auth::CurrentSession;
use crate::api::dto::{IdResponse, QueryResultDto};
use crate::app_state::AppState;
use crate::domain::records::Listing;
use crate::domain::{CollectionKind, QueryRequest};
use crate::error::{ErrorResponse, GatewayError};

/// `POST /listings/query`: Query listings.
#[utoipa::path(
    post,
    path = "/api/v1/listings/query",
    tag = "Listings",
    summary = "Query listings",
    description = "Returns the listing named by `listing_id`, the listings of `org_id`, or the caller's own listings plus their favorites. Asking for another user's listings yields `error_code: AccessDenied`.",
    request_body = QueryRequest,
    responses(
        (status = 200, description = "Query result", body = QueryResultDto),
        (status = 401, description = "No session", body = ErrorResponse),
        (status = 403, description = "Another user's listings", body = QueryResultDto),
    ),
    security(("bearer" = []))
)]
pub async fn query_listings(
    State(state): State<AppState>,
    session: CurrentSession,
    Json(req): Json<QueryRequest>,
) -> Response {
    run_query(&state, session, CollectionKind::Listing, req).await
}

/// `POST /listings`: Create or update a listing.
///
/// # Errors
///
/// Returns [`GatewayError::AccessDenied`] when the caller may not edit the
/// listing.
#[utoipa::path(
    post,
    path = "/api/v1/listings",
    tag = "Listings",
    summary = "Create or update a listing",
    description = "Creates a listing owned by the caller when `id` is 0; otherwise updates it. Only the owner or members of the owner org may update.",
    request_body = Listing,
    responses(
        (status = 200, description = "Stored", body = IdResponse),
        (status = 403, description = "Not allowed", body = ErrorResponse),
        (status = 404, description = "Unknown listing", body = ErrorResponse),
    ),
    security(("bearer" = []))
)]
pub async fn set_listing(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
    Json(listing): Json<Listing>,
) -> Result<impl IntoResponse, GatewayError> {
    let id = state.market.set_listing(session.identity(), listing).await?;
    Ok(Json(IdResponse { id }))
}

/// `DELETE /listings/{id}`: Remove a listing.
///
/// # Errors
///
/// Returns [`GatewayError::RecordNotFound`] or [`GatewayError::AccessDenied`].
#[utoipa::path(
    delete,
    path = "/api/v1/listings/{id}",
    tag = "Listings",
    summary = "Remove a listing",
    description = "Removes a listing owned by the caller or the caller's org.",
    params(("id" = i64, Path, description = "Listing id")),
    responses(
        (status = 204, description = "Removed"),
        (status = 403, description = "Not allowed", body = ErrorResponse),
        (status = 404, description = "Unknown listing", body = ErrorResponse),
    ),
    security(("bearer" = []))
)]
pub async fn remove_listing(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, GatewayError> {
    state.market.remove_listing(session.identity(), id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Listing routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/listings", post(set_listing))
        .route("/listings/query", post(query_listings))
        .route("/listings/{id}", delete(remove_listing))
}
