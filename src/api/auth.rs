//! Session extraction from bearer tokens.
//!
//! The token is read from `Authorization: Bearer <token>`, or from the
//! `auth` query parameter for browser `EventSource` clients, which cannot
//! set headers.

use std::sync::Arc;

use axum::extract::{FromRequestParts, Query};
use axum::http::request::Parts;
use axum::http::{HeaderMap, Uri, header};
use serde::Deserialize;

use crate::app_state::AppState;
use crate::domain::Session;
use crate::error::GatewayError;

/// The session named by the request's bearer token.
#[derive(Debug, Clone)]
pub struct CurrentSession(pub Arc<Session>);

#[derive(Debug, Deserialize)]
struct AuthQuery {
    auth: Option<String>,
}

/// Returns the bearer token presented with the request, if any.
#[must_use]
pub fn bearer_token(headers: &HeaderMap, uri: &Uri) -> Option<String> {
    let from_header = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string());
    from_header
        .or_else(|| {
            Query::<AuthQuery>::try_from_uri(uri)
                .ok()
                .and_then(|Query(q)| q.auth)
        })
        .filter(|t| !t.is_empty())
}

impl FromRequestParts<AppState> for CurrentSession {
    type Rejection = GatewayError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token =
            bearer_token(&parts.headers, &parts.uri).ok_or(GatewayError::SessionRequired)?;
        let session = state.hub.session(&token).await?;
        Ok(Self(session))
    }
}
