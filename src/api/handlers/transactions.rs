//! Deal handlers: query and upsert.

use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};

use super::run_query;
use crate::api::auth::CurrentSession;
use crate::api::dto::{IdResponse, QueryResultDto};
use crate::app_state::AppState;
use crate::domain::records::Deal;
use crate::domain::{CollectionKind, QueryRequest};
use crate::error::{ErrorResponse, GatewayError};

/// `POST /deals/query`: Query deals.
#[utoipa::path(
    post,
    path = "/api/v1/deals/query",
    tag = "Deals",
    summary = "Query deals",
    description = "Returns the deal named by `deal_id`, the deals on `listing_id`, or every deal the caller is a party to.",
    request_body = QueryRequest,
    responses(
        (status = 200, description = "Query result", body = QueryResultDto),
        (status = 401, description = "No session", body = ErrorResponse),
    ),
    security(("bearer" = []))
)]
pub async fn query_deals(
    State(state): State<AppState>,
    session: CurrentSession,
    Json(req): Json<QueryRequest>,
) -> Response {
    run_query(&state, session, CollectionKind::Deal, req).await
}

/// `POST /deals`: Create or update a deal.
///
/// # Errors
///
/// Returns [`GatewayError::AccessDenied`] when the caller is not a party,
/// or [`GatewayError::RecordNotFound`] for an unknown deal or listing.
#[utoipa::path(
    post,
    path = "/api/v1/deals",
    tag = "Deals",
    summary = "Create or update a deal",
    description = "Creates a deal with the caller as customer when `id` is 0; otherwise updates it. Either party may update a deal.",
    request_body = Deal,
    responses(
        (status = 200, description = "Stored", body = IdResponse),
        (status = 403, description = "Not a party", body = ErrorResponse),
        (status = 404, description = "Unknown deal or listing", body = ErrorResponse),
    ),
    security(("bearer" = []))
)]
pub async fn set_deal(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
    Json(deal): Json<Deal>,
) -> Result<impl IntoResponse, GatewayError> {
    let id = state.market.set_deal(session.identity(), deal).await?;
    Ok(Json(IdResponse { id }))
}

/// Deal routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/deals", post(set_deal))
        .route("/deals/query", post(query_deals))
}
