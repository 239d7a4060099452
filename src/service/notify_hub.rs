//! Notification hub: the single owner of sessions and the publication bus.
//!
//! Request handlers reach every piece of the notification core through one
//! [`NotifyHub`] held in the application state. It runs the subscription
//! handshake for query endpoints, opens streaming connections and forwards
//! publications from the business layer.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::NotifyConfig;
use crate::domain::{
    Identity, Invocation, Publication, PublicationBus, PublishOutcome, QueryHandler, QueryRequest,
    QueryResponse, Session, SessionRegistry, Snapshot, SubscriptionId, spawn_heartbeat,
};
use crate::error::GatewayError;
use crate::stream::{ConnectionHandler, FrameSender};

/// Owner of the notification core.
#[derive(Debug)]
pub struct NotifyHub {
    sessions: SessionRegistry,
    bus: PublicationBus,
    config: NotifyConfig,
    shutdown: CancellationToken,
    heartbeat: JoinHandle<()>,
}

impl NotifyHub {
    /// Spawns the bus actor and the heartbeat, both stopping on `shutdown`.
    #[must_use]
    pub fn start(config: NotifyConfig, shutdown: CancellationToken) -> Self {
        let bus = PublicationBus::spawn(&config, shutdown.clone());
        let heartbeat = spawn_heartbeat(bus.clone(), config.heartbeat_interval, shutdown.clone());
        Self {
            sessions: SessionRegistry::new(),
            bus,
            config,
            shutdown,
            heartbeat,
        }
    }

    /// Live sessions.
    #[must_use]
    pub const fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    /// Handle to the publication bus.
    #[must_use]
    pub const fn bus(&self) -> &PublicationBus {
        &self.bus
    }

    /// Core settings.
    #[must_use]
    pub const fn config(&self) -> &NotifyConfig {
        &self.config
    }

    /// Returns `true` while the heartbeat task runs.
    #[must_use]
    pub fn heartbeat_running(&self) -> bool {
        !self.heartbeat.is_finished()
    }

    /// Creates a session for `identity`.
    pub async fn sign_in(&self, identity: Identity) -> Arc<Session> {
        let session = self.sessions.create(identity).await;
        info!(session_id = %session.id(), user_id = ?identity.user_id, "signed in");
        session
    }

    /// Looks a session up by bearer token.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::SessionNotFound`] if the token is unknown.
    pub async fn session(&self, token: &str) -> Result<Arc<Session>, GatewayError> {
        self.sessions.get(token).await
    }

    /// Drops the session and unregisters its streaming connection, if any.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::SessionNotFound`] if the token is unknown.
    pub async fn sign_out(&self, token: &str) -> Result<(), GatewayError> {
        let session = self.sessions.remove(token).await?;
        self.bus.close(session.id(), None).await;
        info!(session_id = %session.id(), "signed out");
        Ok(())
    }

    /// Runs a query for `session` and completes the subscription handshake.
    ///
    /// A subscribable response gets the id of a new subscription when the
    /// request asked for one, or no id otherwise. Responses that are not
    /// subscribable pass through untouched.
    pub async fn dispatch_query(
        &self,
        session: &Session,
        handler: &QueryHandler,
        request: QueryRequest,
    ) -> QueryResponse {
        let mut response = handler
            .call(Invocation {
                identity: session.identity(),
                request: request.clone(),
                publication: None,
            })
            .await;

        if response.subscribable {
            response.subscribable = false;
            response.subscription_id = if request.subscribe {
                self.subscribe(session, request, handler.clone(), response.snapshot.clone())
                    .await
            } else {
                SubscriptionId::NONE
            };
        }
        response
    }

    /// Stores a subscription with `initial` as its baseline.
    pub async fn subscribe(
        &self,
        session: &Session,
        request: QueryRequest,
        handler: QueryHandler,
        initial: Snapshot,
    ) -> SubscriptionId {
        let query = handler.name();
        let id = session
            .subscriptions()
            .create(request, session.identity(), handler, initial)
            .await;
        info!(session_id = %session.id(), subscription_id = %id, query, "subscribed");
        id
    }

    /// Removes a subscription of `session`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::SubscriptionNotFound`] if the session has no
    /// such subscription.
    pub async fn unsubscribe(
        &self,
        session: &Session,
        id: SubscriptionId,
    ) -> Result<(), GatewayError> {
        session.subscriptions().remove(id).await?;
        info!(session_id = %session.id(), subscription_id = %id, "unsubscribed");
        Ok(())
    }

    /// Opens a streaming connection for `session` writing into `frames`.
    ///
    /// The returned handler is already streaming; the caller drives it with
    /// [`ConnectionHandler::run`].
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::StreamConflict`] if the session already has a
    /// live stream.
    pub async fn open_connection(
        &self,
        session: Arc<Session>,
        frames: FrameSender,
    ) -> Result<ConnectionHandler, GatewayError> {
        let mut handler =
            ConnectionHandler::new(session, self.bus.clone(), frames, self.shutdown.clone());
        handler.start().await?;
        Ok(handler)
    }

    /// Broadcasts an invalidation without waiting on listeners.
    pub fn publish(&self, publication: impl Into<Publication>) -> PublishOutcome {
        self.bus.publish(publication.into())
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use tokio::sync::mpsc;

    use super::*;
    use crate::domain::CollectionKind;
    use crate::stream::StreamFrame;

    fn hub() -> NotifyHub {
        NotifyHub::start(NotifyConfig::default(), CancellationToken::new())
    }

    fn handler() -> QueryHandler {
        QueryHandler::new("orgs", |_| async {
            let mut snapshot = Snapshot::new();
            snapshot.insert_value(CollectionKind::Org, 1, Some(json!({"name": "Harbor"})));
            QueryResponse::subscribable(snapshot)
        })
    }

    #[tokio::test]
    async fn subscribing_query_gets_an_id() {
        let hub = hub();
        let session = hub.sign_in(Identity::anonymous()).await;
        let request = QueryRequest {
            subscribe: true,
            ..QueryRequest::default()
        };
        let first = hub.dispatch_query(&session, &handler(), request.clone()).await;
        let second = hub.dispatch_query(&session, &handler(), request).await;
        assert_eq!(first.subscription_id, SubscriptionId::new(1));
        assert_eq!(second.subscription_id, SubscriptionId::new(2));
        assert!(!first.subscribable);
        assert_eq!(session.subscriptions().len().await, 2);
    }

    #[tokio::test]
    async fn plain_query_gets_no_id() {
        let hub = hub();
        let session = hub.sign_in(Identity::anonymous()).await;
        let response = hub
            .dispatch_query(&session, &handler(), QueryRequest::default())
            .await;
        assert!(response.subscription_id.is_none());
        assert!(session.subscriptions().is_empty().await);
    }

    #[tokio::test]
    async fn non_subscribable_response_is_untouched() {
        let hub = hub();
        let session = hub.sign_in(Identity::anonymous()).await;
        let denied = QueryHandler::new("denied", |_| async { QueryResponse::error("AccessDenied") });
        let request = QueryRequest {
            subscribe: true,
            ..QueryRequest::default()
        };
        let response = hub.dispatch_query(&session, &denied, request).await;
        assert!(response.is_error());
        assert!(response.subscription_id.is_none());
        assert!(session.subscriptions().is_empty().await);
    }

    #[tokio::test]
    async fn unsubscribe_twice_reports_not_found() {
        let hub = hub();
        let session = hub.sign_in(Identity::anonymous()).await;
        let request = QueryRequest {
            subscribe: true,
            ..QueryRequest::default()
        };
        let id = hub.dispatch_query(&session, &handler(), request).await.subscription_id;
        assert!(hub.unsubscribe(&session, id).await.is_ok());
        assert!(matches!(
            hub.unsubscribe(&session, id).await,
            Err(GatewayError::SubscriptionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn sign_out_unregisters_stream() {
        let hub = hub();
        let session = hub.sign_in(Identity::anonymous()).await;
        let (tx, mut rx) = mpsc::channel::<StreamFrame>(1);
        let Ok(connection) = hub.open_connection(Arc::clone(&session), tx).await else {
            panic!("stream should open");
        };
        tokio::spawn(connection.run());
        assert_eq!(rx.recv().await, Some(StreamFrame::initial()));

        assert!(hub.sign_out(session.token()).await.is_ok());
        let Ok(listeners) = hub.bus().listener_count().await else {
            panic!("bus should be running");
        };
        assert_eq!(listeners, 0);
        assert!(hub.session(session.token()).await.is_err());
        assert!(hub.sign_out(session.token()).await.is_err());
    }

    #[tokio::test]
    async fn shutdown_stops_background_tasks() {
        let token = CancellationToken::new();
        let hub = NotifyHub::start(NotifyConfig::default(), token.clone());
        assert!(hub.heartbeat_running());
        token.cancel();
        let stopped = tokio::time::timeout(Duration::from_secs(1), async {
            while hub.heartbeat_running() || hub.bus().is_running() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;
        assert!(stopped.is_ok());
        assert_eq!(hub.publish(CollectionKind::Org), PublishOutcome::Dropped);
    }
}
