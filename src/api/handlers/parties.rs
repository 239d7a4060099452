//! Org and user handlers: query and upsert.

use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};

use super::run_query;
use crate::api::auth::CurrentSession;
use crate::api::dto::{IdResponse, QueryResultDto};
use crate::app_state::AppState;
use crate::domain::records::{Org, User};
use crate::domain::{CollectionKind, QueryRequest};
use crate::error::{ErrorResponse, GatewayError};

/// `POST /orgs/query`: Query orgs.
#[utoipa::path(
    post,
    path = "/api/v1/orgs/query",
    tag = "Parties",
    summary = "Query orgs",
    description = "Returns the org named by `org_id`, or the caller's org. Set `subscribe` to keep receiving changes over the event stream.",
    request_body = QueryRequest,
    responses(
        (status = 200, description = "Query result", body = QueryResultDto),
        (status = 401, description = "No session", body = ErrorResponse),
    ),
    security(("bearer" = []))
)]
pub async fn query_orgs(
    State(state): State<AppState>,
    session: CurrentSession,
    Json(req): Json<QueryRequest>,
) -> Response {
    run_query(&state, session, CollectionKind::Org, req).await
}

/// `POST /orgs`: Create or update an org.
///
/// # Errors
///
/// Returns [`GatewayError::AccessDenied`] for anonymous callers and
/// non-members.
#[utoipa::path(
    post,
    path = "/api/v1/orgs",
    tag = "Parties",
    summary = "Create or update an org",
    description = "Creates an org when `id` is 0; otherwise updates it. Only members may update an org.",
    request_body = Org,
    responses(
        (status = 200, description = "Stored", body = IdResponse),
        (status = 403, description = "Not allowed", body = ErrorResponse),
        (status = 404, description = "Unknown org", body = ErrorResponse),
    ),
    security(("bearer" = []))
)]
pub async fn set_org(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
    Json(org): Json<Org>,
) -> Result<impl IntoResponse, GatewayError> {
    let id = state.market.set_org(session.identity(), org).await?;
    Ok(Json(IdResponse { id }))
}

/// `POST /users/query`: Query users.
#[utoipa::path(
    post,
    path = "/api/v1/users/query",
    tag = "Parties",
    summary = "Query users",
    description = "Returns the user named by `user_id`, the members of `org_id`, or the caller.",
    request_body = QueryRequest,
    responses(
        (status = 200, description = "Query result", body = QueryResultDto),
        (status = 401, description = "No session", body = ErrorResponse),
    ),
    security(("bearer" = []))
)]
pub async fn query_users(
    State(state): State<AppState>,
    session: CurrentSession,
    Json(req): Json<QueryRequest>,
) -> Response {
    run_query(&state, session, CollectionKind::User, req).await
}

/// `POST /users`: Update the caller's user record.
///
/// # Errors
///
/// Returns [`GatewayError::AccessDenied`] unless the record is the caller's.
#[utoipa::path(
    post,
    path = "/api/v1/users",
    tag = "Parties",
    summary = "Update own user",
    description = "Replaces the caller's user record. New users are registered through sign-in.",
    request_body = User,
    responses(
        (status = 200, description = "Stored", body = IdResponse),
        (status = 403, description = "Not allowed", body = ErrorResponse),
    ),
    security(("bearer" = []))
)]
pub async fn set_user(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
    Json(user): Json<User>,
) -> Result<impl IntoResponse, GatewayError> {
    let id = state.market.set_user(session.identity(), user).await?;
    Ok(Json(IdResponse { id }))
}

/// Org and user routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/orgs", post(set_org))
        .route("/orgs/query", post(query_orgs))
        .route("/users", post(set_user))
        .route("/users/query", post(query_users))
}
