//! Sessions and the registry that owns them.
//!
//! A [`Session`] is created at sign-in and destroyed at sign-out. It owns its
//! [`SubscriptionTable`] and a single *stream slot* recording which streaming
//! connection, if any, is currently live for it. The slot is the only state
//! shared between request handlers and the publication bus.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};

use super::subscription::SubscriptionTable;
use super::{ConnectionId, SessionId};
use crate::error::GatewayError;

/// Who a session acts as. Opaque to the notification core.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Signed-in user; `None` for an anonymous session.
    pub user_id: Option<i64>,
    /// Org of the signed-in user.
    pub org_id: Option<i64>,
}

impl Identity {
    /// An identity with no user.
    #[must_use]
    pub const fn anonymous() -> Self {
        Self {
            user_id: None,
            org_id: None,
        }
    }

    /// Identity of a signed-in user.
    #[must_use]
    pub const fn user(user_id: i64, org_id: Option<i64>) -> Self {
        Self {
            user_id: Some(user_id),
            org_id,
        }
    }

    /// Returns `true` if no user is signed in.
    #[must_use]
    pub const fn is_anonymous(&self) -> bool {
        self.user_id.is_none()
    }
}

/// A signed-in client.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    token: String,
    identity: Identity,
    started_at: DateTime<Utc>,
    subscriptions: SubscriptionTable,
    stream_slot: Mutex<Option<ConnectionId>>,
}

impl Session {
    /// Creates a session with an empty subscription table and no stream.
    #[must_use]
    pub fn new(id: SessionId, token: String, identity: Identity) -> Self {
        Self {
            id,
            token,
            identity,
            started_at: Utc::now(),
            subscriptions: SubscriptionTable::new(),
            stream_slot: Mutex::new(None),
        }
    }

    /// Session id.
    #[must_use]
    pub const fn id(&self) -> SessionId {
        self.id
    }

    /// Bearer token presented by the client.
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Identity the session acts as.
    #[must_use]
    pub const fn identity(&self) -> Identity {
        self.identity
    }

    /// Sign-in time.
    #[must_use]
    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// The session's subscriptions.
    #[must_use]
    pub const fn subscriptions(&self) -> &SubscriptionTable {
        &self.subscriptions
    }

    /// Claims the stream slot for `connection`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::StreamConflict`] if another connection is
    /// still live for this session.
    pub async fn claim_stream(&self, connection: ConnectionId) -> Result<(), GatewayError> {
        let mut slot = self.stream_slot.lock().await;
        if slot.is_some() {
            return Err(GatewayError::StreamConflict(self.id));
        }
        *slot = Some(connection);
        Ok(())
    }

    /// Clears the stream slot.
    ///
    /// With `Some(connection)` the slot is cleared only if it still belongs
    /// to that connection; with `None` it is cleared unconditionally.
    /// Returns `true` if the slot was cleared.
    pub async fn release_stream(&self, connection: Option<ConnectionId>) -> bool {
        let mut slot = self.stream_slot.lock().await;
        match (*slot, connection) {
            (Some(current), Some(expected)) if current != expected => false,
            (None, _) => false,
            _ => {
                *slot = None;
                true
            }
        }
    }

    /// Returns the live connection, if any.
    pub async fn live_stream(&self) -> Option<ConnectionId> {
        *self.stream_slot.lock().await
    }
}

/// Owner of every live session, looked up by bearer token.
#[derive(Debug)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    last_id: AtomicU64,
}

impl SessionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            last_id: AtomicU64::new(0),
        }
    }

    /// Signs in: creates and stores a new session for `identity`.
    pub async fn create(&self, identity: Identity) -> Arc<Session> {
        let id = SessionId::new(self.last_id.fetch_add(1, Ordering::Relaxed) + 1);
        let token = uuid::Uuid::new_v4().simple().to_string();
        let session = Arc::new(Session::new(id, token.clone(), identity));
        self.sessions
            .write()
            .await
            .insert(token, Arc::clone(&session));
        session
    }

    /// Looks a session up by bearer token.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::SessionNotFound`] if the token is unknown.
    pub async fn get(&self, token: &str) -> Result<Arc<Session>, GatewayError> {
        self.sessions
            .read()
            .await
            .get(token)
            .cloned()
            .ok_or(GatewayError::SessionNotFound)
    }

    /// Signs out: removes the session, returning it.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::SessionNotFound`] if the token is unknown.
    pub async fn remove(&self, token: &str) -> Result<Arc<Session>, GatewayError> {
        self.sessions
            .write()
            .await
            .remove(token)
            .ok_or(GatewayError::SessionNotFound)
    }

    /// Number of live sessions.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Returns `true` if no session is live.
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
