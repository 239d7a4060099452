//! Axum handler that turns a request into a live event stream.

use std::convert::Infallible;

use axum::extract::State;
use axum::http::{HeaderMap, header};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use futures_util::stream;
use tokio::sync::mpsc;

use super::frames::StreamFrame;
use crate::api::auth::CurrentSession;
use crate::app_state::AppState;
use crate::error::{ErrorResponse, GatewayError};

const EVENT_STREAM: &str = "text/event-stream";

/// `GET /api/v1/stream`: Open the session's event stream.
///
/// # Errors
///
/// Returns [`GatewayError::StreamingUnsupported`] when the client does not
/// accept `text/event-stream`, and [`GatewayError::StreamConflict`] when the
/// session already has a live stream.
#[utoipa::path(
    get,
    path = "/api/v1/stream",
    tag = "Subscriptions",
    summary = "Open event stream",
    description = "Server-Sent Events stream delivering one frame per changed subscription result. The first frame is an empty object. Each later frame has a per-subscription sequence id and a JSON body holding the patch and its `subscription_id`.",
    params(("auth" = Option<String>, Query, description = "Bearer token, for clients that cannot set headers")),
    responses(
        (status = 200, description = "Event stream", content_type = "text/event-stream", body = String),
        (status = 401, description = "No session", body = ErrorResponse),
        (status = 409, description = "Session already streaming", body = ErrorResponse),
        (status = 415, description = "Client does not accept event streams", body = ErrorResponse),
    ),
    security(("bearer" = []))
)]
pub async fn stream_handler(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
    headers: HeaderMap,
) -> Result<Response, GatewayError> {
    if !accepts_event_stream(&headers) {
        return Err(GatewayError::StreamingUnsupported);
    }

    let (frames_tx, frames_rx) = mpsc::channel::<StreamFrame>(1);
    let connection = state.hub.open_connection(session, frames_tx).await?;
    tokio::spawn(connection.run());

    let events = stream::unfold(frames_rx, |mut rx| async move {
        let frame = rx.recv().await?;
        Some((Ok::<Event, Infallible>(frame.into_event()), rx))
    });
    let sse = Sse::new(events);
    if state.hub.config().keep_alive {
        Ok(sse.keep_alive(KeepAlive::default()).into_response())
    } else {
        Ok(sse.into_response())
    }
}

/// A missing `Accept` header admits anything.
fn accepts_event_stream(headers: &HeaderMap) -> bool {
    let mut values = headers.get_all(header::ACCEPT).iter().peekable();
    if values.peek().is_none() {
        return true;
    }
    values
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|range| range.split(';').next().unwrap_or_default().trim())
        .any(|range| range.eq_ignore_ascii_case(EVENT_STREAM) || range == "*/*" || range == "text/*")
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    fn with_accept(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT, HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn missing_accept_is_allowed() {
        assert!(accepts_event_stream(&HeaderMap::new()));
    }

    #[test]
    fn event_stream_and_wildcards_are_allowed() {
        assert!(accepts_event_stream(&with_accept("text/event-stream")));
        assert!(accepts_event_stream(&with_accept("application/json, */*;q=0.1")));
        assert!(accepts_event_stream(&with_accept("text/*")));
    }

    #[test]
    fn json_only_client_is_rejected() {
        assert!(!accepts_event_stream(&with_accept("application/json")));
    }
}
