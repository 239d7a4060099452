//! Sign-in and sign-out.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};

use crate::api::auth::bearer_token;
use crate::api::dto::{SignInRequest, SignInResponse};
use crate::app_state::AppState;
use crate::domain::Identity;
use crate::error::{ErrorResponse, GatewayError};

/// `POST /sessions`: Sign in.
///
/// # Errors
///
/// Returns [`GatewayError::RecordNotFound`] if `user_id` names no user, or
/// [`GatewayError::InvalidRequest`] if both `user_id` and `user` are given
/// or the new `user` names an org.
#[utoipa::path(
    post,
    path = "/api/v1/sessions",
    tag = "Sessions",
    summary = "Sign in",
    description = "Creates a session as an existing user, as a newly registered user, or anonymously. The returned bearer token authenticates every later request.",
    request_body = SignInRequest,
    responses(
        (status = 201, description = "Session created", body = SignInResponse),
        (status = 400, description = "Conflicting sign-in fields, or a new user naming an org", body = ErrorResponse),
        (status = 404, description = "Unknown user", body = ErrorResponse),
    )
)]
pub async fn sign_in(
    State(state): State<AppState>,
    body: Option<Json<SignInRequest>>,
) -> Result<impl IntoResponse, GatewayError> {
    let req = body.map(|Json(req)| req).unwrap_or_default();
    let identity = match (req.user_id, req.user) {
        (Some(_), Some(_)) => {
            return Err(GatewayError::InvalidRequest(
                "give either user_id or user, not both".into(),
            ));
        }
        (Some(user_id), None) => {
            let user = state.market.user(user_id).await?;
            Identity::user(user.id, user.org_id)
        }
        (None, Some(user)) => {
            let user = state.market.register_user(user).await?;
            Identity::user(user.id, user.org_id)
        }
        (None, None) => Identity::anonymous(),
    };

    let session = state.hub.sign_in(identity).await;
    let response = SignInResponse {
        session_id: session.id(),
        bearer: session.token().to_string(),
        user_id: identity.user_id,
    };
    Ok((StatusCode::CREATED, Json(response)))
}

/// `DELETE /sessions`: Sign out.
///
/// # Errors
///
/// Returns [`GatewayError::SessionRequired`] without a bearer token, or
/// [`GatewayError::SessionNotFound`] for an unknown one.
#[utoipa::path(
    delete,
    path = "/api/v1/sessions",
    tag = "Sessions",
    summary = "Sign out",
    description = "Drops the session, its subscriptions and its event stream registration.",
    responses(
        (status = 204, description = "Signed out"),
        (status = 401, description = "No session", body = ErrorResponse),
    ),
    security(("bearer" = []))
)]
pub async fn sign_out(
    State(state): State<AppState>,
    headers: HeaderMap,
    uri: Uri,
) -> Result<impl IntoResponse, GatewayError> {
    let token = bearer_token(&headers, &uri).ok_or(GatewayError::SessionRequired)?;
    state.hub.sign_out(&token).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Session routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/sessions", post(sign_in).delete(sign_out))
}
