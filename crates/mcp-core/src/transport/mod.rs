//! Transport abstraction (spec §4.5): an inbound message stream plus an
//! outbound `send`, shared by the HTTP and stdio transports.

pub mod http;
pub mod stdio;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::error::TransportError;
use crate::session::{SessionId, TransportId};

/// A decoded inbound message, tagged with the connection it arrived on and,
/// if already known, the session it belongs to (spec §3).
#[derive(Debug, Clone)]
pub struct TransportMessage {
    pub data: Value,
    pub transport_id: TransportId,
    pub session_id: Option<SessionId>,
}

/// Contract every concrete transport satisfies (spec §4.5).
///
/// Inbound messages are published on a broadcast stream so the engine (and,
/// in principle, an observability subscriber) can consume them independently.
/// Outbound replies and notifications both go through `send`; the transport
/// alone decides which physical stream (an SSE sink, a stdout line, ...) a
/// given `(payload, session_id)` pair is delivered on.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Subscribe to inbound messages. Each call returns an independent
    /// receiver over the same broadcast channel.
    fn subscribe(&self) -> broadcast::Receiver<TransportMessage>;

    /// Send a payload. A payload with an `id` field is a response; one
    /// without is a notification. `session_id` is `None` only for replies to
    /// messages that never resolved a session (e.g. framing errors before
    /// `initialize`).
    async fn send(&self, payload: Value, session_id: Option<SessionId>) -> Result<(), TransportError>;

    /// Record that `transport_id` now belongs to `session_id`, called by the
    /// engine immediately after it creates a session.
    async fn associate_session(&self, transport_id: TransportId, session_id: SessionId);

    /// Release the transport's resources. Idempotent.
    async fn close(&self);

    /// Resolve once the transport has actually released its resources.
    /// Distinct from `close`, which only requests release and may return
    /// before in-flight cleanup (e.g. a background task tearing down a live
    /// stream) has finished.
    async fn on_close(&self);
}
