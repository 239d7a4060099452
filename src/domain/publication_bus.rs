//! Serializing actor that owns the table of listening connections.
//!
//! [`PublicationBus`] is a cheap, cloneable handle. Every registration,
//! removal and broadcast travels one bounded queue to a single task, which
//! is the only code that ever touches the listener table. Messages are
//! therefore handled in arrival order:
//!
//! - a broadcast queued after an open always considers that connection;
//! - a close queued before a broadcast always excludes it.
//!
//! Writers never wait on the queue. When it is full, [`PublicationBus::publish`]
//! coalesces the publication by kind into a pending set that the actor
//! drains as soon as the queue runs empty. Publications only say "something
//! in this collection changed", so merging duplicates loses nothing.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::time::Duration;

use futures_util::future::join_all;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Notify, mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::session::Session;
use super::{CollectionKind, ConnectionId, Publication, SessionId};
use crate::config::NotifyConfig;
use crate::error::GatewayError;

/// Result of [`PublicationBus::publish`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Placed on the bus queue.
    Queued,
    /// Queue was full; merged into the pending set.
    Coalesced,
    /// The bus has stopped.
    Dropped,
}

/// Receiving half of a connection's registration.
pub type PublicationReceiver = mpsc::Receiver<Publication>;

const PING_BIT: u8 = 1 << 5;

/// Publications waiting for a free queue slot, one bit per kind plus ping.
#[derive(Debug, Default)]
struct PendingKinds(AtomicU8);

impl PendingKinds {
    fn mark(&self, publication: Publication) {
        let bit = match publication {
            Publication::Invalidate(kind) => 1 << (kind.ordinal() - 1),
            Publication::Ping => PING_BIT,
        };
        self.0.fetch_or(bit, Ordering::AcqRel);
    }

    /// Empties the set, returning its publications in ordinal order.
    fn take(&self) -> Vec<Publication> {
        let bits = self.0.swap(0, Ordering::AcqRel);
        let mut out: Vec<Publication> = CollectionKind::ALL
            .into_iter()
            .filter(|kind| bits & (1 << (kind.ordinal() - 1)) != 0)
            .map(Publication::Invalidate)
            .collect();
        if bits & PING_BIT != 0 {
            out.push(Publication::Ping);
        }
        out
    }
}

#[derive(Debug)]
enum BusMessage {
    Open {
        connection: ConnectionId,
        session: Arc<Session>,
        sender: mpsc::Sender<Publication>,
    },
    Close {
        session_id: SessionId,
        connection: Option<ConnectionId>,
    },
    Broadcast(Publication),
    Inspect(oneshot::Sender<usize>),
}

/// Handle to the publication bus actor.
#[derive(Debug, Clone)]
pub struct PublicationBus {
    tx: mpsc::Sender<BusMessage>,
    pending: Arc<PendingKinds>,
    wakeup: Arc<Notify>,
    next_connection: Arc<AtomicU64>,
}

impl PublicationBus {
    /// Spawns the bus actor and returns a handle to it.
    ///
    /// The actor stops when `shutdown` is cancelled or every handle is
    /// dropped.
    #[must_use]
    pub fn spawn(config: &NotifyConfig, shutdown: CancellationToken) -> Self {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let pending = Arc::new(PendingKinds::default());
        let wakeup = Arc::new(Notify::new());

        let actor = BusActor {
            listeners: HashMap::new(),
            delivery_timeout: config.delivery_timeout,
            pending: Arc::clone(&pending),
            wakeup: Arc::clone(&wakeup),
            shutdown,
        };
        tokio::spawn(actor.run(rx));

        Self {
            tx,
            pending,
            wakeup,
            next_connection: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Allocates an id for a new streaming connection.
    #[must_use]
    pub fn next_connection_id(&self) -> ConnectionId {
        ConnectionId::new(self.next_connection.fetch_add(1, Ordering::Relaxed) + 1)
    }

    /// Registers `connection` as the listener of `session`, replacing any
    /// earlier registration for the same session.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Internal`] if the bus has stopped.
    pub async fn open(
        &self,
        connection: ConnectionId,
        session: Arc<Session>,
    ) -> Result<PublicationReceiver, GatewayError> {
        let (sender, receiver) = mpsc::channel(1);
        self.tx
            .send(BusMessage::Open {
                connection,
                session,
                sender,
            })
            .await
            .map_err(|_| GatewayError::Internal("publication bus stopped".to_string()))?;
        Ok(receiver)
    }

    /// Removes the listener of `session_id` and clears its stream slot.
    ///
    /// With `Some(connection)` only that connection is removed; a newer
    /// registration for the same session is left alone. With `None` any
    /// registration is removed.
    pub async fn close(&self, session_id: SessionId, connection: Option<ConnectionId>) {
        let message = BusMessage::Close {
            session_id,
            connection,
        };
        if self.tx.send(message).await.is_err() {
            debug!(%session_id, "close after publication bus stopped");
        }
    }

    /// Broadcasts `publication` to every listener without waiting.
    pub fn publish(&self, publication: Publication) -> PublishOutcome {
        match self.tx.try_send(BusMessage::Broadcast(publication)) {
            Ok(()) => PublishOutcome::Queued,
            Err(TrySendError::Full(_)) => {
                self.pending.mark(publication);
                self.wakeup.notify_one();
                debug!(?publication, "bus queue full, publication coalesced");
                PublishOutcome::Coalesced
            }
            Err(TrySendError::Closed(_)) => PublishOutcome::Dropped,
        }
    }

    /// Number of registered listeners, as seen by the actor.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Internal`] if the bus has stopped.
    pub async fn listener_count(&self) -> Result<usize, GatewayError> {
        let stopped = || GatewayError::Internal("publication bus stopped".to_string());
        let (reply, answer) = oneshot::channel();
        self.tx
            .send(BusMessage::Inspect(reply))
            .await
            .map_err(|_| stopped())?;
        answer.await.map_err(|_| stopped())
    }

    /// Returns `true` while the actor is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.tx.is_closed()
    }
}

#[derive(Debug)]
struct Listener {
    connection: ConnectionId,
    session: Arc<Session>,
    sender: mpsc::Sender<Publication>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delivery {
    Sent,
    TimedOut,
    Gone,
}

#[derive(Debug)]
struct BusActor {
    listeners: HashMap<SessionId, Listener>,
    delivery_timeout: Duration,
    pending: Arc<PendingKinds>,
    wakeup: Arc<Notify>,
    shutdown: CancellationToken,
}

impl BusActor {
    async fn run(mut self, mut rx: mpsc::Receiver<BusMessage>) {
        loop {
            tokio::select! {
                biased;
                () = self.shutdown.cancelled() => break,
                message = rx.recv() => match message {
                    Some(message) => self.handle(message).await,
                    None => break,
                },
                // Reached only once the queue is empty.
                () = self.wakeup.notified() => {
                    for publication in self.pending.take() {
                        self.broadcast(publication).await;
                    }
                }
            }
        }
        debug!(listeners = self.listeners.len(), "publication bus stopped");
    }

    async fn handle(&mut self, message: BusMessage) {
        match message {
            BusMessage::Open {
                connection,
                session,
                sender,
            } => {
                let session_id = session.id();
                let listener = Listener {
                    connection,
                    session,
                    sender,
                };
                if let Some(previous) = self.listeners.insert(session_id, listener) {
                    info!(
                        %session_id,
                        superseded = %previous.connection,
                        %connection,
                        "listener replaced"
                    );
                } else {
                    debug!(%session_id, %connection, "listener registered");
                }
            }
            BusMessage::Close {
                session_id,
                connection,
            } => {
                if self.unregister(session_id, connection).await {
                    debug!(%session_id, "listener removed");
                }
            }
            BusMessage::Broadcast(publication) => self.broadcast(publication).await,
            BusMessage::Inspect(reply) => {
                let _ = reply.send(self.listeners.len());
            }
        }
    }

    /// Delivers `publication` to every listener concurrently, each bounded by
    /// the delivery timeout, then evicts the ones that failed.
    async fn broadcast(&mut self, publication: Publication) {
        if self.listeners.is_empty() {
            return;
        }
        let timeout = self.delivery_timeout;
        let targets: Vec<_> = self
            .listeners
            .iter()
            .map(|(session_id, l)| (*session_id, l.connection, l.sender.clone()))
            .collect();
        let deliveries = targets.into_iter().map(|(session_id, connection, sender)| {
            async move {
                let delivery = match tokio::time::timeout(timeout, sender.send(publication)).await
                {
                    Ok(Ok(())) => Delivery::Sent,
                    Ok(Err(_)) => Delivery::Gone,
                    Err(_) => Delivery::TimedOut,
                };
                (session_id, connection, delivery)
            }
        });

        for (session_id, connection, delivery) in join_all(deliveries).await {
            match delivery {
                Delivery::Sent => {}
                Delivery::TimedOut => {
                    warn!(%session_id, %connection, ?timeout, "listener timed out, evicting");
                    self.unregister(session_id, Some(connection)).await;
                }
                Delivery::Gone => {
                    debug!(%session_id, %connection, "listener gone, evicting");
                    self.unregister(session_id, Some(connection)).await;
                }
            }
        }
    }

    /// Removes a listener and clears its session's stream slot. Returns
    /// `true` if a listener was removed.
    async fn unregister(&mut self, session_id: SessionId, connection: Option<ConnectionId>) -> bool {
        let matches = self
            .listeners
            .get(&session_id)
            .is_some_and(|l| connection.is_none_or(|c| c == l.connection));
        if !matches {
            return false;
        }
        let Some(listener) = self.listeners.remove(&session_id) else {
            return false;
        };
        listener
            .session
            .release_stream(Some(listener.connection))
            .await;
        true
    }
}
