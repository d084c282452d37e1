//! Name-keyed registries mapping descriptors to handler callbacks.
//!
//! Three instances of the same generic `Registry<K, D, H>` back tools
//! (keyed by name), resources (keyed by URI), and prompts (keyed by name).
//! Registration is last-write-wins rather than rejecting duplicates.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::error::McpError;
use crate::model::{CallToolResult, PromptResult, ReadResourceResult};
use crate::model::{PromptDescriptor, ResourceDescriptor, ToolDescriptor};
use crate::operation::OperationHandle;
use crate::protocol;
use crate::session::Session;
use crate::transport::Transport;

/// Context a tool handler executes with: the resolved session, a handle to
/// the operation record the engine created for this call, and a cancellation
/// token the handler should poll cooperatively.
#[derive(Clone)]
pub struct ToolContext {
    pub session: Arc<Session>,
    pub operation: OperationHandle,
    pub(crate) transport: Arc<dyn Transport>,
}

impl ToolContext {
    /// Emit a `notifications/progress` message for this call. A no-op if the
    /// original request carried no progress token.
    pub async fn report_progress(&self, progress: f64, message: Option<String>) {
        let Some(notice) = self.operation.notify_progress(progress, message).await else {
            return;
        };
        let payload = serde_json::json!({
            "jsonrpc": protocol::JSONRPC_VERSION,
            "method": protocol::methods::PROGRESS_NOTIFICATION,
            "params": notice,
        });
        if let Err(err) = self.transport.send(payload, Some(self.session.id)).await {
            tracing::warn!(error = %err, "failed to deliver progress notification");
        }
    }

    /// Convenience accessor mirroring [`OperationHandle::cancellation`].
    pub async fn is_cancelled(&self) -> bool {
        self.operation.cancellation.is_cancelled().await
    }
}

/// Context a resource/prompt handler executes with. Reads and prompt
/// expansions are not cancellable.
#[derive(Clone)]
pub struct RequestContext {
    pub session: Arc<Session>,
}

/// An already-built tool handler; the engine only ever calls `execute`.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn execute(&self, ctx: ToolContext, arguments: Value) -> Result<CallToolResult, McpError>;
}

#[async_trait]
pub trait ResourceHandler: Send + Sync {
    async fn read(
        &self,
        uri: &str,
        params: Value,
        ctx: RequestContext,
    ) -> Result<ReadResourceResult, McpError>;
}

#[async_trait]
pub trait PromptHandler: Send + Sync {
    async fn get(&self, arguments: Value, ctx: RequestContext) -> Result<PromptResult, McpError>;
}

/// A generic name-keyed registry of (descriptor, handler) pairs.
///
/// Enumeration order from [`Registry::list`] follows `HashMap` iteration
/// order; callers must not rely on it.
pub struct Registry<D, H: ?Sized> {
    entries: RwLock<HashMap<String, (D, Arc<H>)>>,
}

impl<D: Clone, H: ?Sized> Registry<D, H> {
    #[must_use]
    pub fn new() -> Self {
        Self { entries: RwLock::new(HashMap::new()) }
    }

    /// Register a descriptor/handler pair under `key`. Overwrites any
    /// existing entry with the same key.
    pub async fn register(&self, key: impl Into<String>, descriptor: D, handler: Arc<H>) {
        self.entries.write().await.insert(key.into(), (descriptor, handler));
    }

    /// Look up the handler registered under `key`.
    pub async fn lookup(&self, key: &str) -> Option<Arc<H>> {
        self.entries.read().await.get(key).map(|(_, h)| h.clone())
    }

    /// Enumerate all registered descriptors. Order is not stable.
    pub async fn list(&self) -> Vec<D> {
        self.entries.read().await.values().map(|(d, _)| d.clone()).collect()
    }

    /// Number of registered entries.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl<D: Clone, H: ?Sized> Default for Registry<D, H> {
    fn default() -> Self {
        Self::new()
    }
}

pub type ToolRegistry = Registry<ToolDescriptor, dyn ToolHandler>;
pub type ResourceRegistry = Registry<ResourceDescriptor, dyn ResourceHandler>;
pub type PromptRegistry = Registry<PromptDescriptor, dyn PromptHandler>;

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoTool;

    #[async_trait]
    impl ToolHandler for EchoTool {
        async fn execute(&self, _ctx: ToolContext, arguments: Value) -> Result<CallToolResult, McpError> {
            Ok(CallToolResult::text(arguments.to_string()))
        }
    }

    #[tokio::test]
    async fn register_then_list_includes_descriptor() {
        let registry: ToolRegistry = Registry::new();
        let descriptor = ToolDescriptor::new("echo", "echoes input", serde_json::json!({}));
        registry.register("echo", descriptor, Arc::new(EchoTool)).await;

        let list = registry.list().await;
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].name, "echo");
        assert!(registry.lookup("echo").await.is_some());
        assert!(registry.lookup("missing").await.is_none());
    }

    #[tokio::test]
    async fn re_registering_same_key_overwrites() {
        let registry: ToolRegistry = Registry::new();
        registry
            .register("echo", ToolDescriptor::new("echo", "v1", serde_json::json!({})), Arc::new(EchoTool))
            .await;
        registry
            .register("echo", ToolDescriptor::new("echo", "v2", serde_json::json!({})), Arc::new(EchoTool))
            .await;

        let list = registry.list().await;
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].description, "v2");
    }
}
