//! Streaming connection state machine.
//!
//! A [`ConnectionHandler`] serves one client event stream for one session:
//!
//! 1. **Init**: [`ConnectionHandler::start`] claims the session's stream slot,
//!    registers with the bus and writes the empty liveness frame.
//! 2. **Streaming**: [`ConnectionHandler::run`] waits for publications and,
//!    for each non-ping one, re-runs every subscription of the session,
//!    diffs the result against the subscription's baseline and writes one
//!    frame per non-empty patch.
//! 3. **Closed**: on client disconnect or shutdown the handler unregisters
//!    from the bus and releases the stream slot.
//!
//! If the bus drops the publication channel (eviction, or a newer
//! registration for the session) the handler is *detached*: it stops
//! dispatching but leaves the client stream open.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::frames::StreamFrame;
use crate::domain::subscription::Subscription;
use crate::domain::{
    ConnectionId, Invocation, Publication, PublicationBus, PublicationReceiver, QueryResponse,
    Session, diff_snapshots,
};
use crate::error::GatewayError;

/// Lifecycle state of a [`ConnectionHandler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Created, not yet registered.
    Init,
    /// Registered and delivering.
    Streaming,
    /// Unregistered.
    Closed,
}

/// Sender half of the client frame channel.
pub type FrameSender = mpsc::Sender<StreamFrame>;

#[derive(Debug)]
enum Step {
    Publication(Publication),
    Detached,
    Cancelled,
}

/// Per-connection delivery loop.
#[derive(Debug)]
pub struct ConnectionHandler {
    session: Arc<Session>,
    connection: ConnectionId,
    bus: PublicationBus,
    frames: FrameSender,
    shutdown: CancellationToken,
    publications: Option<PublicationReceiver>,
    state: ConnectionState,
}

impl ConnectionHandler {
    /// Creates a handler in the [`ConnectionState::Init`] state.
    #[must_use]
    pub fn new(
        session: Arc<Session>,
        bus: PublicationBus,
        frames: FrameSender,
        shutdown: CancellationToken,
    ) -> Self {
        let connection = bus.next_connection_id();
        Self {
            session,
            connection,
            bus,
            frames,
            shutdown,
            publications: None,
            state: ConnectionState::Init,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> ConnectionState {
        self.state
    }

    /// Bus-allocated id of this connection.
    #[must_use]
    pub const fn connection_id(&self) -> ConnectionId {
        self.connection
    }

    /// Registers the connection and writes the liveness frame.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::StreamConflict`] if the session already has a
    /// live stream, or [`GatewayError::Internal`] if the bus has stopped or
    /// the client went away before the first frame.
    pub async fn start(&mut self) -> Result<(), GatewayError> {
        if self.state != ConnectionState::Init {
            return Err(GatewayError::Internal(format!(
                "connection {} already started",
                self.connection
            )));
        }
        self.session.claim_stream(self.connection).await?;

        let publications = match self.bus.open(self.connection, Arc::clone(&self.session)).await {
            Ok(rx) => rx,
            Err(err) => {
                self.session.release_stream(Some(self.connection)).await;
                self.state = ConnectionState::Closed;
                return Err(err);
            }
        };
        self.publications = Some(publications);
        self.state = ConnectionState::Streaming;

        if self.frames.send(StreamFrame::initial()).await.is_err() {
            self.close().await;
            return Err(GatewayError::Internal("client left before the stream opened".into()));
        }

        info!(
            session_id = %self.session.id(),
            connection_id = %self.connection,
            "event stream opened"
        );
        Ok(())
    }

    /// Runs the delivery loop until the client disconnects or shutdown is
    /// requested, then closes the connection.
    pub async fn run(mut self) {
        while self.state == ConnectionState::Streaming {
            match self.next_step().await {
                Step::Cancelled => break,
                Step::Detached => {
                    self.publications = None;
                    warn!(
                        session_id = %self.session.id(),
                        connection_id = %self.connection,
                        "event stream detached from bus"
                    );
                }
                Step::Publication(publication) if publication.is_ping() => {}
                Step::Publication(publication) => self.dispatch(publication).await,
            }
        }
        self.close().await;
    }

    async fn next_step(&mut self) -> Step {
        let detached = self.publications.is_none();
        tokio::select! {
            biased;
            () = self.shutdown.cancelled() => Step::Cancelled,
            () = self.frames.closed() => Step::Cancelled,
            publication = recv(&mut self.publications), if !detached => {
                publication.map_or(Step::Detached, Step::Publication)
            }
        }
    }

    /// Re-runs every subscription of the session for `publication` and
    /// writes one frame per changed result.
    async fn dispatch(&self, publication: Publication) {
        let subscriptions = self.session.subscriptions().snapshot().await;
        debug!(
            session_id = %self.session.id(),
            ?publication,
            subscriptions = subscriptions.len(),
            "dispatching publication"
        );
        for subscription in subscriptions {
            if !self.refresh(&subscription, publication).await {
                return;
            }
        }
    }

    /// Refreshes one subscription. Returns `false` once the client is gone.
    async fn refresh(&self, subscription: &Subscription, publication: Publication) -> bool {
        let fresh = subscription
            .handler()
            .call(Invocation {
                identity: subscription.identity(),
                request: subscription.request().clone(),
                publication: Some(publication),
            })
            .await;

        let mut state = subscription.state().lock().await;
        let patch = diff_snapshots(&fresh.snapshot, &state.baseline);
        let error_changed = fresh.error_code != state.error_code;
        state.baseline = fresh.snapshot;
        state.error_code.clone_from(&fresh.error_code);

        if patch.is_none() && !error_changed {
            return true;
        }
        let body = QueryResponse {
            error_code: fresh.error_code,
            error_details: fresh.error_details,
            ..QueryResponse::patch(subscription.id(), patch.unwrap_or_default())
        };
        let next_id = state.last_event_id + 1;
        let frame = match StreamFrame::patch(next_id, &body) {
            Ok(frame) => frame,
            Err(err) => {
                warn!(subscription_id = %subscription.id(), error = %err, "patch not serializable");
                return true;
            }
        };
        if !self.send(frame).await {
            return false;
        }
        state.last_event_id = next_id;
        debug!(
            session_id = %self.session.id(),
            subscription_id = %subscription.id(),
            event_id = next_id,
            "patch delivered"
        );
        true
    }

    async fn send(&self, frame: StreamFrame) -> bool {
        tokio::select! {
            biased;
            () = self.shutdown.cancelled() => false,
            sent = self.frames.send(frame) => sent.is_ok(),
        }
    }

    async fn close(&mut self) {
        if self.state == ConnectionState::Closed {
            return;
        }
        self.state = ConnectionState::Closed;
        self.publications = None;
        self.bus
            .close(self.session.id(), Some(self.connection))
            .await;
        self.session.release_stream(Some(self.connection)).await;
        info!(
            session_id = %self.session.id(),
            connection_id = %self.connection,
            "event stream closed"
        );
    }
}

async fn recv(publications: &mut Option<PublicationReceiver>) -> Option<Publication> {
    match publications {
        Some(rx) => rx.recv().await,
        None => None,
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use serde_json::json;
    use tokio::sync::Semaphore;

    use super::*;
    use crate::config::NotifyConfig;
    use crate::domain::{
        CollectionKind, Identity, QueryHandler, QueryRequest, SessionId, Snapshot,
    };

    fn session() -> Arc<Session> {
        Arc::new(Session::new(SessionId::new(1), "t".to_string(), Identity::anonymous()))
    }

    fn bus() -> PublicationBus {
        PublicationBus::spawn(&NotifyConfig::default(), CancellationToken::new())
    }

    async fn next_frame(rx: &mut mpsc::Receiver<StreamFrame>) -> Option<StreamFrame> {
        tokio::time::timeout(Duration::from_secs(1), rx.recv()).await.ok().flatten()
    }

    async fn listener_count(bus: &PublicationBus) -> usize {
        let Ok(n) = bus.listener_count().await else {
            panic!("bus should be running");
        };
        n
    }

    /// Handler whose listing `1` carries the current `make`, counting calls.
    fn counting_handler(
        make: Arc<std::sync::Mutex<String>>,
        calls: Arc<AtomicUsize>,
    ) -> QueryHandler {
        QueryHandler::new("listing", move |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            let make = make.lock().map(|m| m.clone()).unwrap_or_default();
            async move {
                let mut snapshot = Snapshot::new();
                snapshot.insert_value(CollectionKind::Listing, 1, Some(json!({"make": make})));
                QueryResponse::subscribable(snapshot)
            }
        })
    }

    async fn subscribed_session(handler: QueryHandler, make: &str) -> Arc<Session> {
        let session = session();
        let mut initial = Snapshot::new();
        initial.insert_value(CollectionKind::Listing, 1, Some(json!({"make": make})));
        session
            .subscriptions()
            .create(QueryRequest::default(), Identity::anonymous(), handler, initial)
            .await;
        session
    }

    #[tokio::test]
    async fn start_writes_liveness_frame() {
        let bus = bus();
        let (tx, mut rx) = mpsc::channel(1);
        let mut handler = ConnectionHandler::new(session(), bus.clone(), tx, CancellationToken::new());
        assert_eq!(handler.state(), ConnectionState::Init);
        assert!(handler.start().await.is_ok());
        assert_eq!(handler.state(), ConnectionState::Streaming);
        assert_eq!(next_frame(&mut rx).await, Some(StreamFrame::initial()));
        assert_eq!(listener_count(&bus).await, 1);
    }

    #[tokio::test]
    async fn second_stream_for_session_conflicts() {
        let bus = bus();
        let session = session();
        let (tx1, _rx1) = mpsc::channel(1);
        let (tx2, _rx2) = mpsc::channel(1);
        let mut first = ConnectionHandler::new(Arc::clone(&session), bus.clone(), tx1, CancellationToken::new());
        let mut second = ConnectionHandler::new(session, bus.clone(), tx2, CancellationToken::new());
        assert!(first.start().await.is_ok());
        assert!(matches!(second.start().await, Err(GatewayError::StreamConflict(_))));
        assert_eq!(listener_count(&bus).await, 1);
    }

    #[tokio::test]
    async fn changed_result_is_streamed_as_patch() {
        let bus = bus();
        let make = Arc::new(std::sync::Mutex::new("A".to_string()));
        let calls = Arc::new(AtomicUsize::new(0));
        let session = subscribed_session(counting_handler(Arc::clone(&make), calls), "A").await;

        let (tx, mut rx) = mpsc::channel(1);
        let mut handler = ConnectionHandler::new(session, bus.clone(), tx, CancellationToken::new());
        assert!(handler.start().await.is_ok());
        tokio::spawn(handler.run());
        assert_eq!(next_frame(&mut rx).await, Some(StreamFrame::initial()));

        if let Ok(mut m) = make.lock() {
            *m = "B".to_string();
        }
        bus.publish(Publication::Invalidate(CollectionKind::Listing));
        let Some(frame) = next_frame(&mut rx).await else {
            panic!("patch frame expected");
        };
        assert_eq!(frame.id, Some(1));
        let Ok(body) = serde_json::from_str::<serde_json::Value>(&frame.data) else {
            panic!("frame should be JSON");
        };
        assert_eq!(body, json!({"subscription_id": 1, "listings": {"1": {"make": "B"}}}));

        if let Ok(mut m) = make.lock() {
            *m = "C".to_string();
        }
        bus.publish(Publication::Invalidate(CollectionKind::Listing));
        let Some(frame) = next_frame(&mut rx).await else {
            panic!("second patch frame expected");
        };
        assert_eq!(frame.id, Some(2));
    }

    #[tokio::test]
    async fn unchanged_result_sends_nothing() {
        let bus = bus();
        let make = Arc::new(std::sync::Mutex::new("A".to_string()));
        let calls = Arc::new(AtomicUsize::new(0));
        let session = subscribed_session(counting_handler(make, Arc::clone(&calls)), "A").await;

        let (tx, mut rx) = mpsc::channel(1);
        let mut handler = ConnectionHandler::new(session, bus.clone(), tx, CancellationToken::new());
        assert!(handler.start().await.is_ok());
        tokio::spawn(handler.run());
        assert_eq!(next_frame(&mut rx).await, Some(StreamFrame::initial()));

        bus.publish(Publication::Invalidate(CollectionKind::Listing));
        let waited = tokio::time::timeout(Duration::from_millis(100), rx.recv()).await;
        assert!(waited.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn ping_triggers_no_query() {
        let bus = bus();
        let make = Arc::new(std::sync::Mutex::new("A".to_string()));
        let calls = Arc::new(AtomicUsize::new(0));
        let session = subscribed_session(counting_handler(make, Arc::clone(&calls)), "A").await;

        let (tx, mut rx) = mpsc::channel(1);
        let mut handler = ConnectionHandler::new(session, bus.clone(), tx, CancellationToken::new());
        assert!(handler.start().await.is_ok());
        tokio::spawn(handler.run());
        assert_eq!(next_frame(&mut rx).await, Some(StreamFrame::initial()));

        bus.publish(Publication::Ping);
        let waited = tokio::time::timeout(Duration::from_millis(100), rx.recv()).await;
        assert!(waited.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn client_disconnect_unregisters() {
        let bus = bus();
        let session = session();
        let (tx, rx) = mpsc::channel(1);
        let mut handler = ConnectionHandler::new(Arc::clone(&session), bus.clone(), tx, CancellationToken::new());
        assert!(handler.start().await.is_ok());
        let task = tokio::spawn(handler.run());
        drop(rx);

        assert!(tokio::time::timeout(Duration::from_secs(1), task).await.is_ok());
        assert_eq!(listener_count(&bus).await, 0);
        assert_eq!(session.live_stream().await, None);
    }

    #[tokio::test]
    async fn shutdown_closes_connection() {
        let bus = bus();
        let token = CancellationToken::new();
        let session = session();
        let (tx, mut rx) = mpsc::channel(1);
        let mut handler = ConnectionHandler::new(Arc::clone(&session), bus.clone(), tx, token.clone());
        assert!(handler.start().await.is_ok());
        let task = tokio::spawn(handler.run());
        assert_eq!(next_frame(&mut rx).await, Some(StreamFrame::initial()));

        token.cancel();
        assert!(tokio::time::timeout(Duration::from_secs(1), task).await.is_ok());
        assert_eq!(rx.recv().await, None);
        assert_eq!(session.live_stream().await, None);
    }

    #[tokio::test]
    async fn evicted_connection_stays_open_but_detached() {
        let bus = bus();
        let session = session();
        let (tx, mut rx) = mpsc::channel(1);
        let mut handler = ConnectionHandler::new(Arc::clone(&session), bus.clone(), tx, CancellationToken::new());
        assert!(handler.start().await.is_ok());
        let connection = handler.connection_id();
        let task = tokio::spawn(handler.run());
        assert_eq!(next_frame(&mut rx).await, Some(StreamFrame::initial()));

        // Sign-out style close drops the publication channel.
        bus.close(session.id(), None).await;
        assert_eq!(listener_count(&bus).await, 0);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!task.is_finished());

        drop(rx);
        assert!(tokio::time::timeout(Duration::from_secs(1), task).await.is_ok());
        assert_ne!(session.live_stream().await, Some(connection));
    }

    fn listing_snapshot(make: &str) -> Snapshot {
        let mut snapshot = Snapshot::new();
        snapshot.insert_value(CollectionKind::Listing, 1, Some(json!({"make": make})));
        snapshot
    }

    fn frame_body(frame: &StreamFrame) -> serde_json::Value {
        let Ok(body) = serde_json::from_str::<serde_json::Value>(&frame.data) else {
            panic!("frame should be JSON");
        };
        body
    }

    #[tokio::test]
    async fn error_code_change_alone_produces_frame() {
        let bus = bus();
        let error = Arc::new(std::sync::Mutex::new(None::<String>));
        let handler = {
            let error = Arc::clone(&error);
            QueryHandler::new("listing", move |_| {
                let code = error.lock().map(|e| e.clone()).unwrap_or_default();
                async move {
                    let mut response = QueryResponse::subscribable(listing_snapshot("A"));
                    response.error_code = code;
                    response
                }
            })
        };
        let session = subscribed_session(handler, "A").await;

        let (tx, mut rx) = mpsc::channel(1);
        let mut connection =
            ConnectionHandler::new(session, bus.clone(), tx, CancellationToken::new());
        assert!(connection.start().await.is_ok());
        tokio::spawn(connection.run());
        assert_eq!(next_frame(&mut rx).await, Some(StreamFrame::initial()));

        if let Ok(mut e) = error.lock() {
            *e = Some("AccessDenied".to_string());
        }
        bus.publish(Publication::Invalidate(CollectionKind::Listing));
        let Some(frame) = next_frame(&mut rx).await else {
            panic!("error frame expected");
        };
        assert_eq!(frame.id, Some(1));
        let body = frame_body(&frame);
        assert_eq!(body["error_code"], "AccessDenied");
        assert!(body.get("listings").is_none());

        if let Ok(mut e) = error.lock() {
            *e = None;
        }
        bus.publish(Publication::Invalidate(CollectionKind::Listing));
        let Some(frame) = next_frame(&mut rx).await else {
            panic!("recovery frame expected");
        };
        assert_eq!(frame.id, Some(2));
        let body = frame_body(&frame);
        assert!(body.get("error_code").is_none());
        assert_eq!(body["subscription_id"], 1);

        bus.publish(Publication::Invalidate(CollectionKind::Listing));
        let waited = tokio::time::timeout(Duration::from_millis(100), rx.recv()).await;
        assert!(waited.is_err());
    }

    #[tokio::test]
    async fn failed_send_does_not_consume_sequence_number() {
        let bus = bus();
        let make = Arc::new(std::sync::Mutex::new("A".to_string()));
        let calls = Arc::new(AtomicUsize::new(0));
        let gate = Arc::new(Semaphore::new(0));
        let handler = {
            let (make, calls, gate) = (Arc::clone(&make), Arc::clone(&calls), Arc::clone(&gate));
            QueryHandler::new("listing", move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                let make = make.lock().map(|m| m.clone()).unwrap_or_default();
                let gate = Arc::clone(&gate);
                async move {
                    if let Ok(permit) = gate.acquire().await {
                        permit.forget();
                    }
                    QueryResponse::subscribable(listing_snapshot(&make))
                }
            })
        };
        let session = subscribed_session(handler, "A").await;
        let set_make = |value: &str| {
            if let Ok(mut m) = make.lock() {
                *m = value.to_string();
            }
        };

        let (tx, mut rx) = mpsc::channel(1);
        let mut first =
            ConnectionHandler::new(Arc::clone(&session), bus.clone(), tx, CancellationToken::new());
        assert!(first.start().await.is_ok());
        let task = tokio::spawn(first.run());
        assert_eq!(next_frame(&mut rx).await, Some(StreamFrame::initial()));

        set_make("B");
        gate.add_permits(1);
        bus.publish(Publication::Invalidate(CollectionKind::Listing));
        let Some(frame) = next_frame(&mut rx).await else {
            panic!("patch frame expected");
        };
        assert_eq!(frame.id, Some(1));

        // The client leaves while the query is still running.
        set_make("C");
        bus.publish(Publication::Invalidate(CollectionKind::Listing));
        while calls.load(Ordering::SeqCst) < 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        drop(rx);
        gate.add_permits(1);
        assert!(tokio::time::timeout(Duration::from_secs(1), task).await.is_ok());

        let subscriptions = session.subscriptions().snapshot().await;
        let Some(subscription) = subscriptions.first() else {
            panic!("subscription kept");
        };
        assert_eq!(subscription.state().lock().await.last_event_id, 1);

        let (tx, mut rx) = mpsc::channel(1);
        let mut second =
            ConnectionHandler::new(Arc::clone(&session), bus.clone(), tx, CancellationToken::new());
        assert!(second.start().await.is_ok());
        tokio::spawn(second.run());
        assert_eq!(next_frame(&mut rx).await, Some(StreamFrame::initial()));

        set_make("D");
        gate.add_permits(1);
        bus.publish(Publication::Invalidate(CollectionKind::Listing));
        let Some(frame) = next_frame(&mut rx).await else {
            panic!("patch frame expected on the new connection");
        };
        assert_eq!(frame.id, Some(2));
        assert_eq!(frame_body(&frame)["listings"]["1"]["make"], "D");
    }
}
