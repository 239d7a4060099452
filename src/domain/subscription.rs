//! Per-session table of standing queries.
//!
//! The table lock guards only membership. Each [`Subscription`] carries its
//! own [`tokio::sync::Mutex`] around the diff baseline and sequence counter,
//! so re-query work never runs with the table locked.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};

use super::SubscriptionId;
use super::query::{QueryHandler, QueryRequest};
use super::session::Identity;
use super::snapshot::Snapshot;
use crate::error::GatewayError;

/// Mutable delivery state of one subscription.
#[derive(Debug)]
pub struct SubscriptionState {
    /// Last snapshot the handler produced; the next diff is taken against it.
    pub baseline: Snapshot,
    /// Error code of the last result, so a change in the caller-level error
    /// is delivered even when no record changed.
    pub error_code: Option<String>,
    /// Sequence number of the last frame sent; 0 before the first.
    pub last_event_id: u64,
}

/// A client's standing interest in one query's results.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    request: QueryRequest,
    identity: Identity,
    handler: QueryHandler,
    started_at: DateTime<Utc>,
    state: Mutex<SubscriptionState>,
}

impl Subscription {
    /// Subscription id.
    #[must_use]
    pub const fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Request the subscription re-runs.
    #[must_use]
    pub const fn request(&self) -> &QueryRequest {
        &self.request
    }

    /// Identity the query runs as.
    #[must_use]
    pub const fn identity(&self) -> Identity {
        self.identity
    }

    /// Stored query handler.
    #[must_use]
    pub const fn handler(&self) -> &QueryHandler {
        &self.handler
    }

    /// Creation time.
    #[must_use]
    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Delivery state. Held across the frame send so sequence numbers stay
    /// gapless when two dispatches overlap.
    #[must_use]
    pub const fn state(&self) -> &Mutex<SubscriptionState> {
        &self.state
    }
}

#[derive(Debug, Default)]
struct Inner {
    last_id: u64,
    entries: BTreeMap<SubscriptionId, Arc<Subscription>>,
}

/// Lock-protected registry of a session's subscriptions.
#[derive(Debug, Default)]
pub struct SubscriptionTable {
    inner: RwLock<Inner>,
}

impl SubscriptionTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a subscription with `initial` as its diff baseline and returns
    /// its id. Ids start at 1 and are never reused.
    pub async fn create(
        &self,
        request: QueryRequest,
        identity: Identity,
        handler: QueryHandler,
        initial: Snapshot,
    ) -> SubscriptionId {
        let mut inner = self.inner.write().await;
        inner.last_id += 1;
        let id = SubscriptionId::new(inner.last_id);
        let subscription = Subscription {
            id,
            request,
            identity,
            handler,
            started_at: Utc::now(),
            state: Mutex::new(SubscriptionState {
                baseline: initial,
                error_code: None,
                last_event_id: 0,
            }),
        };
        inner.entries.insert(id, Arc::new(subscription));
        id
    }

    /// Removes a subscription.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::SubscriptionNotFound`] if `id` is not in the
    /// table.
    pub async fn remove(&self, id: SubscriptionId) -> Result<(), GatewayError> {
        self.inner
            .write()
            .await
            .entries
            .remove(&id)
            .map(|_| ())
            .ok_or(GatewayError::SubscriptionNotFound(id))
    }

    /// Point-in-time copy of the subscription list, in id order.
    pub async fn snapshot(&self) -> Vec<Arc<Subscription>> {
        self.inner.read().await.entries.values().cloned().collect()
    }

    /// Number of live subscriptions.
    pub async fn len(&self) -> usize {
        self.inner.read().await.entries.len()
    }

    /// Returns `true` if the table holds no subscription.
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.entries.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::query::QueryResponse;

    fn handler() -> QueryHandler {
        QueryHandler::new("empty", |_| async { QueryResponse::default() })
    }

    async fn subscribe(table: &SubscriptionTable) -> SubscriptionId {
        table
            .create(
                QueryRequest::default(),
                Identity::anonymous(),
                handler(),
                Snapshot::new(),
            )
            .await
    }

    #[tokio::test]
    async fn ids_start_at_one_and_increase() {
        let table = SubscriptionTable::new();
        assert_eq!(subscribe(&table).await, SubscriptionId::new(1));
        assert_eq!(subscribe(&table).await, SubscriptionId::new(2));
        assert_eq!(table.len().await, 2);
    }

    #[tokio::test]
    async fn second_remove_is_not_found() {
        let table = SubscriptionTable::new();
        let first = subscribe(&table).await;
        let _second = subscribe(&table).await;
        assert!(table.remove(first).await.is_ok());
        let again = table.remove(first).await;
        assert!(matches!(again, Err(GatewayError::SubscriptionNotFound(id)) if id == first));
    }

    #[tokio::test]
    async fn ids_are_not_reused_after_removal() {
        let table = SubscriptionTable::new();
        let first = subscribe(&table).await;
        assert!(table.remove(first).await.is_ok());
        assert!(table.is_empty().await);
        assert_eq!(subscribe(&table).await, SubscriptionId::new(2));
    }

    #[tokio::test]
    async fn snapshot_is_detached_from_table() {
        let table = SubscriptionTable::new();
        let first = subscribe(&table).await;
        let copy = table.snapshot().await;
        assert!(table.remove(first).await.is_ok());
        assert_eq!(copy.len(), 1);
        assert!(copy.iter().any(|s| s.id() == first));
        assert!(table.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn new_subscription_starts_at_sequence_zero() {
        let table = SubscriptionTable::new();
        let _ = subscribe(&table).await;
        let copy = table.snapshot().await;
        let Some(subscription) = copy.first() else {
            panic!("one subscription expected");
        };
        let state = subscription.state().lock().await;
        assert_eq!(state.last_event_id, 0);
        assert!(state.baseline.is_empty());
    }
}
