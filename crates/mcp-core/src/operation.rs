//! Tracks in-flight tool calls, correlates progress tokens, and records
//! cancellation flags (spec §4.3).

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::session::SessionId;

pub type OperationId = Uuid;

/// Client-supplied opaque identifier correlating progress notifications with
/// the call that produced them (spec: GLOSSARY).
pub type ProgressToken = Value;

/// One in-flight tool invocation (spec §3).
#[derive(Debug, Clone)]
pub struct Operation {
    pub id: OperationId,
    pub session_id: SessionId,
    pub kind: String,
    pub created_at: DateTime<Utc>,
    pub is_cancelled: bool,
    pub original_request_id: Option<Value>,
    pub progress_token: Option<ProgressToken>,
}

/// A live view over one operation's cancellation flag.
///
/// The spec's canonical design snapshots the flag at call entry; the Design
/// Note in spec §9 flags a live reference as an explicit improvement so late
/// cancels are observed. This implementation takes that improvement: each
/// `is_cancelled` call re-reads the operation table.
#[derive(Clone)]
pub struct CancellationToken {
    manager: Arc<OperationManager>,
    operation_id: OperationId,
}

impl CancellationToken {
    pub async fn is_cancelled(&self) -> bool {
        self.manager.is_cancelled(self.operation_id).await
    }
}

/// Bundle handed to a tool handler: which operation it's running as, and a
/// token to poll for cancellation.
#[derive(Clone)]
pub struct OperationHandle {
    pub id: OperationId,
    pub cancellation: CancellationToken,
    manager: Arc<OperationManager>,
}

impl OperationHandle {
    /// Report progress for this operation. No-op if the operation has no
    /// progress token (spec §4.3).
    pub async fn notify_progress(&self, progress: f64, message: Option<String>) -> Option<ProgressNotice> {
        self.manager.notify_progress(self.id, progress, message).await
    }
}

/// A progress update ready to be emitted as a `notifications/progress`
/// message by the engine.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ProgressNotice {
    #[serde(rename = "progressToken")]
    pub progress_token: ProgressToken,
    pub progress: f64,
    pub total: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Tracks every live operation.
pub struct OperationManager {
    operations: RwLock<HashMap<OperationId, Operation>>,
}

impl OperationManager {
    #[must_use]
    pub fn new() -> Self {
        Self { operations: RwLock::new(HashMap::new()) }
    }

    /// Register a new operation and return a handle for the handler to carry.
    pub async fn register(
        self: &Arc<Self>,
        session_id: SessionId,
        kind: impl Into<String>,
        progress_token: Option<ProgressToken>,
        original_request_id: Option<Value>,
    ) -> OperationHandle {
        let id = Uuid::new_v4();
        let operation = Operation {
            id,
            session_id,
            kind: kind.into(),
            created_at: Utc::now(),
            is_cancelled: false,
            original_request_id,
            progress_token,
        };
        self.operations.write().await.insert(id, operation);

        OperationHandle {
            id,
            cancellation: CancellationToken { manager: self.clone(), operation_id: id },
            manager: self.clone(),
        }
    }

    /// Find the operation whose progress token equals `token`. Linear scan;
    /// expected to be small (spec §4.3).
    pub async fn lookup_by_token(&self, token: &ProgressToken) -> Option<Operation> {
        self.operations
            .read()
            .await
            .values()
            .find(|op| op.progress_token.as_ref() == Some(token))
            .cloned()
    }

    pub async fn get(&self, id: OperationId) -> Option<Operation> {
        self.operations.read().await.get(&id).cloned()
    }

    /// Mark an operation cancelled. Idempotent.
    pub async fn cancel(&self, id: OperationId) {
        if let Some(op) = self.operations.write().await.get_mut(&id) {
            op.is_cancelled = true;
        }
    }

    /// True for unknown operation ids (fail-safe cancellation, spec §4.3).
    pub async fn is_cancelled(&self, id: OperationId) -> bool {
        self.operations.read().await.get(&id).map_or(true, |op| op.is_cancelled)
    }

    /// Cancel whichever live operation was registered for the given original
    /// JSON-RPC request id, if any (spec §4.3: `operations/cancel` by
    /// `requestId`). Returns whether a matching operation was found.
    pub async fn cancel_by_original_request_id(&self, request_id: &Value) -> bool {
        let mut operations = self.operations.write().await;
        let target = operations.values_mut().find(|op| op.original_request_id.as_ref() == Some(request_id));
        match target {
            Some(op) => {
                op.is_cancelled = true;
                true
            }
            None => false,
        }
    }

    /// Drop the operation record. Called by the dispatcher's completion hook.
    pub async fn unregister(&self, id: OperationId) {
        self.operations.write().await.remove(&id);
    }

    /// Drop all operations owned by a session. Invoked on disconnect.
    pub async fn cleanup_session(&self, session_id: SessionId) {
        self.operations.write().await.retain(|_, op| op.session_id != session_id);
    }

    /// Build the outbound notification for a progress update, recording
    /// nothing else — emission is the engine's job, since only the engine
    /// holds the bound transport.
    pub async fn notify_progress(
        &self,
        id: OperationId,
        progress: f64,
        message: Option<String>,
    ) -> Option<ProgressNotice> {
        let token = self.operations.read().await.get(&id)?.progress_token.clone()?;
        Some(ProgressNotice { progress_token: token, progress, total: 1.0, message })
    }

    pub async fn len(&self) -> usize {
        self.operations.read().await.len()
    }
}

impl Default for OperationManager {
    fn default() -> Self {
        Self::new()
    }
}
