//! Session lifecycle management.
//!
//! A session is created exactly once, by the engine, in response to the
//! first `initialize` request on a connection, and is immutable after
//! creation — there is no client-info update path, only end-and-recreate.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

/// Opaque tag a transport assigns to one physical connection.
pub type TransportId = Uuid;

/// A session identifier. Unique for the lifetime of the process.
pub type SessionId = Uuid;

/// A logical client attachment.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: SessionId,
    pub connected_at: DateTime<Utc>,
    pub client_info: Value,
    pub protocol_version: String,
}

/// Published when a session is created or ended, for the engine's
/// disconnect-driven operation cleanup and any external observability hook.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Connected(SessionId),
    Disconnected(SessionId),
}

/// Tracks active sessions and the transport connections bound to them.
pub struct SessionManager {
    sessions: RwLock<HashMap<SessionId, Arc<Session>>>,
    transport_bindings: RwLock<HashMap<TransportId, SessionId>>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionManager {
    #[must_use]
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            sessions: RwLock::new(HashMap::new()),
            transport_bindings: RwLock::new(HashMap::new()),
            events,
        }
    }

    /// Allocate a fresh session and publish a connect event synchronously to
    /// subscribers.
    pub async fn create(&self, client_info: Value, protocol_version: impl Into<String>) -> Arc<Session> {
        let session = Arc::new(Session {
            id: Uuid::new_v4(),
            connected_at: Utc::now(),
            client_info,
            protocol_version: protocol_version.into(),
        });

        self.sessions.write().await.insert(session.id, session.clone());
        tracing::info!(session_id = %session.id, "session created");
        let _ = self.events.send(SessionEvent::Connected(session.id));
        session
    }

    /// Bind a transport connection to a session, many-to-one.
    pub async fn map_transport(&self, transport_id: TransportId, session_id: SessionId) {
        self.transport_bindings.write().await.insert(transport_id, session_id);
    }

    /// End a session: removes it and every transport binding pointing to it,
    /// and publishes a disconnect event. Idempotent.
    pub async fn end(&self, session_id: SessionId) {
        let removed = self.sessions.write().await.remove(&session_id).is_some();
        if !removed {
            return;
        }

        self.transport_bindings.write().await.retain(|_, sid| *sid != session_id);
        tracing::info!(session_id = %session_id, "session ended");
        let _ = self.events.send(SessionEvent::Disconnected(session_id));
    }

    pub async fn get(&self, session_id: SessionId) -> Option<Arc<Session>> {
        self.sessions.read().await.get(&session_id).cloned()
    }

    pub async fn get_by_transport(&self, transport_id: TransportId) -> Option<Arc<Session>> {
        let session_id = *self.transport_bindings.read().await.get(&transport_id)?;
        self.get(session_id).await
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Subscribe to connect/disconnect events. A bounded, drop-oldest buffer;
    /// lagging subscribers see a `RecvError::Lagged` rather than blocking the
    /// publisher.
    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let mgr = SessionManager::new();
        let session = mgr.create(serde_json::json!({"name": "x"}), "2025-03-26").await;

        let found = mgr.get(session.id).await;
        assert!(found.is_some());
        assert_eq!(found.unwrap().protocol_version, "2025-03-26");
    }

    #[tokio::test]
    async fn end_is_idempotent_and_removes_transport_bindings() {
        let mgr = SessionManager::new();
        let session = mgr.create(serde_json::json!({}), "2025-03-26").await;
        let transport_id = Uuid::new_v4();
        mgr.map_transport(transport_id, session.id).await;

        assert!(mgr.get_by_transport(transport_id).await.is_some());

        mgr.end(session.id).await;
        assert!(mgr.get(session.id).await.is_none());
        assert!(mgr.get_by_transport(transport_id).await.is_none());

        // Ending an unknown/already-ended session is a no-op, not an error.
        mgr.end(session.id).await;
    }

    #[tokio::test]
    async fn ending_one_session_does_not_accept_further_messages_for_it() {
        let mgr = SessionManager::new();
        let session = mgr.create(serde_json::json!({}), "2025-03-26").await;
        let id = session.id;
        mgr.end(id).await;

        // For all sessions s, after end(s) returns, no further lookup by s succeeds.
        assert!(mgr.get(id).await.is_none());
    }

    #[tokio::test]
    async fn connect_and_disconnect_events_are_published() {
        let mgr = SessionManager::new();
        let mut events = mgr.subscribe_events();

        let session = mgr.create(serde_json::json!({}), "2025-03-26").await;
        match events.recv().await.unwrap() {
            SessionEvent::Connected(id) => assert_eq!(id, session.id),
            other => panic!("unexpected event: {other:?}"),
        }

        mgr.end(session.id).await;
        match events.recv().await.unwrap() {
            SessionEvent::Disconnected(id) => assert_eq!(id, session.id),
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
