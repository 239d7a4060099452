//! System endpoints: health check and collection catalog.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::Serialize;
use utoipa::ToSchema;

use crate::app_state::AppState;
use crate::domain::CollectionKind;
use crate::domain::records::{DealKind, DealStatus, EventKind, OrgKind};

/// Health check response.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// `healthy` while the publication bus runs, `degraded` otherwise.
    pub status: String,
    /// Server time, RFC 3339.
    pub timestamp: String,
    /// Crate version.
    pub version: String,
    /// Number of live sessions.
    pub sessions: usize,
}

/// `GET /health`: Service health status.
#[utoipa::path(
    get,
    path = "/health",
    tag = "System",
    summary = "Health check",
    description = "Returns service health status, version, live session count and current timestamp.",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
        (status = 503, description = "Publication bus stopped", body = HealthResponse),
    )
)]
pub async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let running = state.hub.bus().is_running();
    let status = if running {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(HealthResponse {
            status: if running { "healthy" } else { "degraded" }.to_string(),
            timestamp: Utc::now().to_rfc3339(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            sessions: state.hub.sessions().len().await,
        }),
    )
}

/// One queryable collection.
#[derive(Debug, Serialize, ToSchema)]
pub struct CollectionInfo {
    /// Wire name, also the key in query results.
    pub name: &'static str,
    /// Fixed processing order.
    pub ordinal: u8,
    /// Query endpoint.
    pub query_path: String,
}

/// `GET /config/collections`: List queryable collections.
#[utoipa::path(
    get,
    path = "/config/collections",
    tag = "System",
    summary = "List collections",
    description = "Returns every record collection with its ordinal and query endpoint.",
    responses(
        (status = 200, description = "Collection catalog", body = Vec<CollectionInfo>),
    )
)]
pub async fn collections_handler() -> impl IntoResponse {
    let collections: Vec<CollectionInfo> = CollectionKind::ALL
        .iter()
        .map(|kind| CollectionInfo {
            name: kind.as_str(),
            ordinal: kind.ordinal(),
            query_path: format!("/api/v1/{kind}/query"),
        })
        .collect();
    (StatusCode::OK, Json(collections))
}

/// Enumerated values clients offer in pickers.
#[derive(Debug, Serialize, ToSchema)]
pub struct OptionsResponse {
    /// Org roles.
    pub org_kinds: Vec<OrgKind>,
    /// Deal kinds.
    pub deal_kinds: Vec<DealKind>,
    /// Deal statuses in lifecycle order.
    pub deal_statuses: Vec<DealStatus>,
    /// Event kinds, usable as `event_kinds` query filters.
    pub event_kinds: Vec<EventKind>,
}

/// `GET /config/options`: List enumerated field values.
#[utoipa::path(
    get,
    path = "/config/options",
    tag = "System",
    summary = "List field options",
    description = "Returns every accepted value of the enumerated record fields.",
    responses(
        (status = 200, description = "Option lists", body = OptionsResponse),
    )
)]
pub async fn options_handler() -> impl IntoResponse {
    let options = OptionsResponse {
        org_kinds: OrgKind::ALL.to_vec(),
        deal_kinds: DealKind::ALL.to_vec(),
        deal_statuses: DealStatus::ALL.to_vec(),
        event_kinds: EventKind::ALL.to_vec(),
    };
    (StatusCode::OK, Json(options))
}

/// System routes mounted at the root level (not under /api/v1).
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_handler))
        .route("/config/collections", get(collections_handler))
        .route("/config/options", get(options_handler))
}
