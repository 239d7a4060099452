//! Query contract between the notification core and business handlers.
//!
//! A [`QueryHandler`] is an opaque async function
//! `(identity, request, publication) -> response`. The core stores it with
//! each subscription and re-invokes it on every invalidation; it never looks
//! inside the request or interprets the response beyond its snapshot.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::records::EventKind;
use super::session::Identity;
use super::snapshot::Snapshot;
use super::{Publication, SubscriptionId};

/// Filter parameters shared by every query endpoint.
///
/// Each handler reads the fields that apply to its collection and ignores
/// the rest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct QueryRequest {
    /// Keep receiving patches for this query over the event stream.
    #[serde(default)]
    pub subscribe: bool,
    /// Restrict to one org, or to records owned by it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_id: Option<i64>,
    /// Restrict to one user, or to records owned by them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
    /// Restrict to one listing, or to records about it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listing_id: Option<i64>,
    /// Restrict to one deal, or to records about it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deal_id: Option<i64>,
    /// Restrict to one event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<i64>,
    /// Only events of these kinds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_kinds: Option<Vec<EventKind>>,
    /// Only events the caller has not read.
    #[serde(default)]
    pub unread: bool,
}

/// Result of a query handler, and the body of every stream patch frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryResponse {
    /// Set by the handler when the endpoint supports subscriptions; replaced
    /// by a real id (or 0) before the response leaves the server.
    #[serde(skip)]
    pub subscribable: bool,
    /// Subscription id; 0 when the caller did not subscribe.
    #[serde(skip_serializing_if = "SubscriptionId::is_none")]
    pub subscription_id: SubscriptionId,
    /// Query results (or, in a stream frame, the patch).
    #[serde(flatten)]
    pub snapshot: Snapshot,
    /// Caller-level error, e.g. `"AccessDenied"`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    /// Extra error context.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_details: Option<BTreeMap<String, String>>,
}

impl QueryResponse {
    /// A subscribable response carrying `snapshot`.
    #[must_use]
    pub fn subscribable(snapshot: Snapshot) -> Self {
        Self {
            subscribable: true,
            snapshot,
            ..Self::default()
        }
    }

    /// A response carrying only an error code.
    #[must_use]
    pub fn error(code: impl Into<String>) -> Self {
        Self {
            error_code: Some(code.into()),
            ..Self::default()
        }
    }

    /// Adds one error detail.
    #[must_use]
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.error_details
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value.into());
        self
    }

    /// Builds a stream frame body: `patch` stamped with `subscription_id`.
    #[must_use]
    pub fn patch(subscription_id: SubscriptionId, patch: Snapshot) -> Self {
        Self {
            subscription_id,
            snapshot: patch,
            ..Self::default()
        }
    }

    /// Returns `true` if the handler reported a caller-level error.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.error_code.is_some()
    }
}

/// Arguments passed to a [`QueryHandler`].
#[derive(Debug, Clone)]
pub struct Invocation {
    /// Who is asking.
    pub identity: Identity,
    /// Original request parameters.
    pub request: QueryRequest,
    /// The publication that triggered a re-run; `None` on the initial call.
    pub publication: Option<Publication>,
}

type QueryFn = dyn Fn(Invocation) -> BoxFuture<'static, QueryResponse> + Send + Sync;

/// Named, shareable async query function.
#[derive(Clone)]
pub struct QueryHandler {
    name: &'static str,
    func: Arc<QueryFn>,
}

impl QueryHandler {
    /// Wraps `func` as a query handler called `name` (used in logs).
    pub fn new<F, Fut>(name: &'static str, func: F) -> Self
    where
        F: Fn(Invocation) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = QueryResponse> + Send + 'static,
    {
        Self {
            name,
            func: Arc::new(move |invocation| func(invocation).boxed()),
        }
    }

    /// Returns the handler name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Runs the query.
    pub async fn call(&self, invocation: Invocation) -> QueryResponse {
        (self.func)(invocation).await
    }
}

impl fmt::Debug for QueryHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryHandler")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::CollectionKind;
    use serde_json::json;

    #[test]
    fn unsubscribed_response_omits_id() {
        let mut snapshot = Snapshot::new();
        snapshot.insert_value(CollectionKind::Org, 1, Some(json!({"name": "A"})));
        let response = QueryResponse::subscribable(snapshot);
        let value = serde_json::to_value(&response).unwrap_or_default();
        assert_eq!(value, json!({"orgs": {"1": {"name": "A"}}}));
    }

    #[test]
    fn patch_carries_subscription_id() {
        let mut patch = Snapshot::new();
        patch.insert_value(CollectionKind::Listing, 2, None);
        let response = QueryResponse::patch(SubscriptionId::new(3), patch);
        let value = serde_json::to_value(&response).unwrap_or_default();
        assert_eq!(value, json!({"subscription_id": 3, "listings": {"2": null}}));
    }

    #[test]
    fn error_response_serializes_details() {
        let response = QueryResponse::error("AccessDenied").with_detail("user_id", "4");
        assert!(response.is_error());
        assert!(!response.subscribable);
        let value = serde_json::to_value(&response).unwrap_or_default();
        assert_eq!(
            value,
            json!({"error_code": "AccessDenied", "error_details": {"user_id": "4"}})
        );
    }

    #[tokio::test]
    async fn handler_receives_invocation() {
        let handler = QueryHandler::new("echo", |invocation: Invocation| async move {
            let mut snapshot = Snapshot::new();
            let id = invocation.request.listing_id.unwrap_or_default();
            snapshot.insert_value(CollectionKind::Listing, id, Some(json!({"ping": invocation.publication.is_some()})));
            QueryResponse::subscribable(snapshot)
        });
        assert_eq!(handler.name(), "echo");
        let response = handler
            .call(Invocation {
                identity: Identity::anonymous(),
                request: QueryRequest {
                    listing_id: Some(5),
                    ..QueryRequest::default()
                },
                publication: None,
            })
            .await;
        let Some(records) = response.snapshot.records(CollectionKind::Listing) else {
            panic!("listings populated");
        };
        assert_eq!(records.get(&5), Some(&Some(json!({"ping": false}))));
    }
}
