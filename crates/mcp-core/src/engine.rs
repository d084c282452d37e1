//! Dispatch engine (spec §4.4): binds to one bound [`Transport`], resolves
//! the session for each inbound message, and routes the method table to the
//! registries and operation manager.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::error::McpError;
use crate::model::{ServerCapabilities, ServerInfo};
use crate::operation::OperationManager;
use crate::protocol;
use crate::registry::{PromptRegistry, RequestContext, ResourceRegistry, ToolContext, ToolRegistry};
use crate::session::{Session, SessionId, SessionManager};
use crate::transport::{Transport, TransportMessage};

/// The central dispatch engine. One engine can be bound to several
/// transports at once (spec §5: "one spawn per bound transport").
pub struct Engine {
    pub tools: Arc<ToolRegistry>,
    pub resources: Arc<ResourceRegistry>,
    pub prompts: Arc<PromptRegistry>,
    pub sessions: Arc<SessionManager>,
    pub operations: Arc<OperationManager>,
    server_info: ServerInfo,
    capabilities: ServerCapabilities,
}

impl Engine {
    #[must_use]
    pub fn new(server_info: ServerInfo) -> Arc<Self> {
        debug_assert!(
            assert_total_dispatch(),
            "protocol::methods::ALL names a method `dispatch` does not route (spec §4.4: dispatch must be total)"
        );
        let engine = Arc::new(Self {
            tools: Arc::new(ToolRegistry::new()),
            resources: Arc::new(ResourceRegistry::new()),
            prompts: Arc::new(PromptRegistry::new()),
            sessions: Arc::new(SessionManager::new()),
            operations: Arc::new(OperationManager::new()),
            server_info,
            capabilities: ServerCapabilities::default(),
        });
        engine.spawn_disconnect_cleanup();
        engine
    }

    /// Subscribe to the session manager's disconnect events and drop every
    /// operation owned by the ended session (spec §4.2: "the engine
    /// subscribes to disconnect to invoke operation cleanup").
    fn spawn_disconnect_cleanup(self: &Arc<Self>) {
        let operations = Arc::clone(&self.operations);
        let mut events = self.sessions.subscribe_events();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(crate::session::SessionEvent::Disconnected(session_id)) => {
                        operations.cleanup_session(session_id).await;
                    }
                    Ok(crate::session::SessionEvent::Connected(_)) => {}
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }

    /// Override the advertised capabilities (defaults to the core's baked-in
    /// promises: progress and cancellation support, no list-change
    /// notifications, no resource subscriptions).
    #[must_use]
    pub fn with_capabilities(mut self: Arc<Self>, capabilities: ServerCapabilities) -> Arc<Self> {
        Arc::get_mut(&mut self)
            .expect("with_capabilities must run before the engine is shared")
            .capabilities = capabilities;
        self
    }

    /// Subscribe to a transport's inbound stream and spawn one task per
    /// message (spec §5). Returns the supervising task's handle; dropping it
    /// does not stop the loop, only `JoinHandle::abort` does.
    pub fn bind(self: &Arc<Self>, transport: Arc<dyn Transport>) -> JoinHandle<()> {
        let engine = Arc::clone(self);
        let mut inbound = transport.subscribe();

        tokio::spawn(async move {
            loop {
                match inbound.recv().await {
                    Ok(message) => {
                        let engine = Arc::clone(&engine);
                        let transport = Arc::clone(&transport);
                        tokio::spawn(async move {
                            engine.dispatch(transport, message).await;
                        });
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "inbound transport receiver lagged; messages were dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    async fn resolve_session(&self, message: &TransportMessage) -> Option<Arc<Session>> {
        if let Some(session_id) = message.session_id {
            return self.sessions.get(session_id).await;
        }
        self.sessions.get_by_transport(message.transport_id).await
    }

    async fn reply_ok(&self, transport: &Arc<dyn Transport>, session_id: Option<SessionId>, id: Value, result: Value) {
        let payload = serde_json::json!({
            "jsonrpc": protocol::JSONRPC_VERSION,
            "id": id,
            "result": result,
        });
        if let Err(err) = transport.send(payload, session_id).await {
            tracing::warn!(error = %err, "failed to deliver response");
        }
    }

    async fn reply_err(&self, transport: &Arc<dyn Transport>, session_id: Option<SessionId>, id: Value, err: McpError) {
        tracing::debug!(code = err.code(), message = %err.wire_message(), "request failed");
        let payload = serde_json::json!({
            "jsonrpc": protocol::JSONRPC_VERSION,
            "id": id,
            "error": { "code": err.code(), "message": err.wire_message() },
        });
        if let Err(send_err) = transport.send(payload, session_id).await {
            tracing::warn!(error = %send_err, "failed to deliver error response");
        }
    }

    /// Route one inbound message end to end. Never propagates an error out:
    /// every failure becomes either a JSON-RPC error reply or, for
    /// notifications, a logged drop (spec §7).
    async fn dispatch(self: Arc<Self>, transport: Arc<dyn Transport>, message: TransportMessage) {
        let Some(obj) = message.data.as_object() else {
            tracing::warn!("dropping inbound message that is not a JSON object");
            return;
        };

        if obj.get("jsonrpc").and_then(Value::as_str) != Some(protocol::JSONRPC_VERSION) {
            if let Some(id) = obj.get("id").cloned().filter(|v| !v.is_null()) {
                let err = McpError::InvalidRequest("missing or unsupported jsonrpc version".into());
                self.reply_err(&transport, message.session_id, id, err).await;
            }
            return;
        }

        let Some(method) = obj.get("method").and_then(Value::as_str).map(str::to_string) else {
            if let Some(id) = obj.get("id").cloned().filter(|v| !v.is_null()) {
                let err = McpError::InvalidRequest("missing method".into());
                self.reply_err(&transport, message.session_id, id, err).await;
            }
            return;
        };

        let id = obj.get("id").cloned().filter(|v| !v.is_null());
        let params = obj.get("params").cloned().unwrap_or(Value::Null);

        // `route_for` is the single source of truth for which methods this
        // match actually handles; `assert_total_dispatch` diffs it against
        // `protocol::methods::ALL` at engine construction time, so the two
        // can never silently drift apart.
        let route = route_for(&method);

        if route == Route::Initialize {
            let Some(id) = id else {
                tracing::warn!("initialize sent as a notification; ignoring");
                return;
            };
            self.handle_initialize(&transport, &message, &params, id).await;
            return;
        }

        if route == Route::Initialized {
            // Purely informational; no reply is ever sent, by spec.
            return;
        }

        let Some(session) = self.resolve_session(&message).await else {
            if let Some(id) = id {
                let err = McpError::InvalidRequest("no active session for this connection".into());
                self.reply_err(&transport, None, id, err).await;
            }
            return;
        };
        let session_id = Some(session.id);

        match route {
            Route::Ping => {
                if let Some(id) = id {
                    self.reply_ok(&transport, session_id, id, serde_json::json!({})).await;
                }
            }
            Route::ToolsList => {
                if let Some(id) = id {
                    let tools = self.tools.list().await;
                    self.reply_ok(&transport, session_id, id, serde_json::json!({ "tools": tools })).await;
                }
            }
            Route::ToolsCall => {
                self.handle_tools_call(&transport, session, id, params).await;
            }
            Route::ResourcesList => {
                if let Some(id) = id {
                    let resources = self.resources.list().await;
                    self.reply_ok(&transport, session_id, id, serde_json::json!({ "resources": resources })).await;
                }
            }
            Route::ResourcesRead => {
                self.handle_resources_read(&transport, session, id, params).await;
            }
            Route::PromptsList => {
                if let Some(id) = id {
                    let prompts = self.prompts.list().await;
                    self.reply_ok(&transport, session_id, id, serde_json::json!({ "prompts": prompts })).await;
                }
            }
            Route::PromptsGet => {
                self.handle_prompts_get(&transport, session, id, params).await;
            }
            Route::OperationsCancel => {
                self.handle_operations_cancel(&transport, session, id, params).await;
            }
            Route::Initialize | Route::Initialized => {
                unreachable!("handled above before session resolution")
            }
            Route::Unknown => {
                if let Some(id) = id {
                    let err = McpError::MethodNotFound(method.clone());
                    self.reply_err(&transport, session_id, id, err).await;
                }
            }
        }
    }

    async fn handle_initialize(
        self: &Arc<Self>,
        transport: &Arc<dyn Transport>,
        message: &TransportMessage,
        params: &Value,
        id: Value,
    ) {
        let client_info = params.get("clientInfo").cloned().unwrap_or(Value::Null);
        // The server always replies with the protocol version it actually
        // implements, regardless of what the client requested (spec §4.4).
        let session = self.sessions.create(client_info, protocol::PROTOCOL_VERSION).await;
        self.sessions.map_transport(message.transport_id, session.id).await;
        transport.associate_session(message.transport_id, session.id).await;

        let result = serde_json::json!({
            "protocolVersion": protocol::PROTOCOL_VERSION,
            "capabilities": self.capabilities,
            "serverInfo": self.server_info,
        });
        self.reply_ok(transport, Some(session.id), id, result).await;
    }

    async fn handle_tools_call(
        self: &Arc<Self>,
        transport: &Arc<dyn Transport>,
        session: Arc<Session>,
        id: Option<Value>,
        params: Value,
    ) {
        let Some(id) = id else {
            tracing::warn!("tools/call sent as a notification; ignoring");
            return;
        };
        let session_id = Some(session.id);

        let Some(name) = params.get("name").and_then(Value::as_str).map(str::to_string) else {
            let err = McpError::InvalidParams("missing tool name".into());
            self.reply_err(transport, session_id, id, err).await;
            return;
        };

        let Some(handler) = self.tools.lookup(&name).await else {
            self.reply_err(transport, session_id, id, McpError::ToolNotFound(name)).await;
            return;
        };

        let arguments = params.get("arguments").cloned().unwrap_or(Value::Null);
        let progress_token = params.get("_meta").and_then(|meta| meta.get("progressToken")).cloned();

        let operation = self.operations.register(session.id, protocol::methods::TOOLS_CALL, progress_token, Some(id.clone())).await;
        let operation_id = operation.id;
        let ctx = ToolContext { session: session.clone(), operation, transport: transport.clone() };

        let outcome = handler.execute(ctx, arguments).await;
        self.operations.unregister(operation_id).await;

        match outcome {
            Ok(result) => {
                let value = serde_json::to_value(result).unwrap_or(Value::Null);
                self.reply_ok(transport, session_id, id, value).await;
            }
            Err(err) => self.reply_err(transport, session_id, id, err).await,
        }
    }

    async fn handle_resources_read(
        self: &Arc<Self>,
        transport: &Arc<dyn Transport>,
        session: Arc<Session>,
        id: Option<Value>,
        params: Value,
    ) {
        let Some(id) = id else {
            tracing::warn!("resources/read sent as a notification; ignoring");
            return;
        };
        let session_id = Some(session.id);

        let Some(uri) = params.get("uri").and_then(Value::as_str).map(str::to_string) else {
            let err = McpError::InvalidParams("missing uri".into());
            self.reply_err(transport, session_id, id, err).await;
            return;
        };

        let Some(handler) = self.resources.lookup(&uri).await else {
            self.reply_err(transport, session_id, id, McpError::ResourceNotFound(uri.clone())).await;
            return;
        };

        let read_params = params.get("params").cloned().unwrap_or(Value::Null);
        let ctx = RequestContext { session: session.clone() };

        match handler.read(&uri, read_params, ctx).await {
            Ok(result) => {
                let value = serde_json::to_value(result).unwrap_or(Value::Null);
                self.reply_ok(transport, session_id, id, value).await;
            }
            Err(err) => self.reply_err(transport, session_id, id, err).await,
        }
    }

    async fn handle_prompts_get(
        self: &Arc<Self>,
        transport: &Arc<dyn Transport>,
        session: Arc<Session>,
        id: Option<Value>,
        params: Value,
    ) {
        let Some(id) = id else {
            tracing::warn!("prompts/get sent as a notification; ignoring");
            return;
        };
        let session_id = Some(session.id);

        let Some(name) = params.get("name").and_then(Value::as_str).map(str::to_string) else {
            let err = McpError::InvalidParams("missing prompt name".into());
            self.reply_err(transport, session_id, id, err).await;
            return;
        };

        let Some(handler) = self.prompts.lookup(&name).await else {
            self.reply_err(transport, session_id, id, McpError::PromptNotFound(name)).await;
            return;
        };

        let arguments = params.get("arguments").cloned().unwrap_or(Value::Null);
        let ctx = RequestContext { session: session.clone() };

        match handler.get(arguments, ctx).await {
            Ok(result) => {
                let value = serde_json::to_value(result).unwrap_or(Value::Null);
                self.reply_ok(transport, session_id, id, value).await;
            }
            Err(err) => self.reply_err(transport, session_id, id, err).await,
        }
    }

    /// `operations/cancel` always replies with an empty result, whether or
    /// not a matching operation was found — cancellation is inherently racy
    /// against completion, so the caller cannot distinguish "already done"
    /// from "not found" (spec §4.3).
    async fn handle_operations_cancel(
        self: &Arc<Self>,
        transport: &Arc<dyn Transport>,
        session: Arc<Session>,
        id: Option<Value>,
        params: Value,
    ) {
        // The wire field is `operationId` (spec §6), but the only handles a
        // client actually holds are the progress token it minted and the
        // original request id of the `tools/call` it wants to interrupt,
        // since the server never exposes its internal operation UUID. Accept
        // either as the value of `operationId` (or the legacy field names)
        // and match against both to resolve that ambiguity defensively.
        let target = params
            .get("operationId")
            .or_else(|| params.get("requestId"))
            .or_else(|| params.get("progressToken"))
            .cloned();
        if let Some(target) = target {
            if !self.operations.cancel_by_original_request_id(&target).await {
                if let Some(operation) = self.operations.lookup_by_token(&target).await {
                    self.operations.cancel(operation.id).await;
                }
            }
        }

        if let Some(id) = id {
            self.reply_ok(transport, Some(session.id), id, serde_json::json!({})).await;
        }
    }
}

/// Which arm of `dispatch`'s routing handles a given method name, or
/// `Unknown` if none does. `dispatch` itself routes through this
/// classification rather than a separately maintained match, so this and the
/// engine's actual behavior cannot silently drift apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    Initialize,
    Initialized,
    Ping,
    ToolsList,
    ToolsCall,
    ResourcesList,
    ResourcesRead,
    PromptsList,
    PromptsGet,
    OperationsCancel,
    Unknown,
}

fn route_for(method: &str) -> Route {
    match method {
        m if m == protocol::methods::INITIALIZE => Route::Initialize,
        m if m == protocol::methods::INITIALIZED => Route::Initialized,
        m if m == protocol::methods::PING => Route::Ping,
        m if m == protocol::methods::TOOLS_LIST => Route::ToolsList,
        m if m == protocol::methods::TOOLS_CALL => Route::ToolsCall,
        m if m == protocol::methods::RESOURCES_LIST => Route::ResourcesList,
        m if m == protocol::methods::RESOURCES_READ => Route::ResourcesRead,
        m if m == protocol::methods::PROMPTS_LIST => Route::PromptsList,
        m if m == protocol::methods::PROMPTS_GET => Route::PromptsGet,
        m if m == protocol::methods::OPERATIONS_CANCEL => Route::OperationsCancel,
        _ => Route::Unknown,
    }
}

/// Diff [`protocol::methods::ALL`] against the routing `dispatch` actually
/// performs (spec §4.4: "dispatch must be total over the method table").
/// Invoked as a debug assertion at every `Engine::new` (construction time is
/// the "startup check" the spec calls for), and exercised directly by the
/// test below.
#[must_use]
pub fn assert_total_dispatch() -> bool {
    protocol::methods::ALL.iter().all(|m| route_for(m) != Route::Unknown)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::model::{CallToolResult, PromptResult, ReadResourceResult, ResourceContent};
    use crate::registry::{PromptHandler, ResourceHandler, ToolHandler};
    use crate::session::TransportId;
    use async_trait::async_trait;
    use std::time::Duration;

    /// An in-process transport for exercising the dispatch engine without a
    /// real socket: inbound messages are published directly, outbound
    /// traffic is captured on a broadcast stream tests can subscribe to.
    struct MockTransport {
        transport_id: TransportId,
        inbound_tx: broadcast::Sender<TransportMessage>,
        outbound_tx: broadcast::Sender<Value>,
    }

    impl MockTransport {
        fn new() -> Arc<Self> {
            let (inbound_tx, _) = broadcast::channel(64);
            let (outbound_tx, _) = broadcast::channel(64);
            Arc::new(Self { transport_id: TransportId::new_v4(), inbound_tx, outbound_tx })
        }

        fn publish(&self, data: Value) {
            let message = TransportMessage { data, transport_id: self.transport_id, session_id: None };
            let _ = self.inbound_tx.send(message);
        }

        fn subscribe_outbound(&self) -> broadcast::Receiver<Value> {
            self.outbound_tx.subscribe()
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        fn subscribe(&self) -> broadcast::Receiver<TransportMessage> {
            self.inbound_tx.subscribe()
        }

        async fn send(&self, payload: Value, _session_id: Option<SessionId>) -> Result<(), TransportError> {
            let _ = self.outbound_tx.send(payload);
            Ok(())
        }

        async fn associate_session(&self, _transport_id: TransportId, _session_id: SessionId) {}

        async fn close(&self) {}

        async fn on_close(&self) {}
    }

    struct EchoTool;

    #[async_trait]
    impl ToolHandler for EchoTool {
        async fn execute(&self, ctx: ToolContext, arguments: Value) -> Result<CallToolResult, McpError> {
            ctx.report_progress(0.5, Some("halfway".into())).await;
            Ok(CallToolResult::text(arguments.to_string()))
        }
    }

    struct StaticResource;

    #[async_trait]
    impl ResourceHandler for StaticResource {
        async fn read(&self, uri: &str, _params: Value, _ctx: RequestContext) -> Result<ReadResourceResult, McpError> {
            Ok(ReadResourceResult { contents: vec![ResourceContent::text(uri, "hello")] })
        }
    }

    struct StaticPrompt;

    #[async_trait]
    impl PromptHandler for StaticPrompt {
        async fn get(&self, _arguments: Value, _ctx: RequestContext) -> Result<PromptResult, McpError> {
            Ok(PromptResult { description: None, messages: vec![] })
        }
    }

    fn test_engine() -> Arc<Engine> {
        Engine::new(ServerInfo { name: "test-server".into(), version: "0.0.0".into() })
    }

    async fn recv_value(rx: &mut broadcast::Receiver<Value>) -> Value {
        tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("expected a reply within timeout")
            .unwrap()
    }

    #[tokio::test]
    async fn initialize_then_tools_call_round_trips() {
        let engine = test_engine();
        engine
            .tools
            .register(
                "echo",
                crate::model::ToolDescriptor::new("echo", "echoes input", serde_json::json!({})),
                Arc::new(EchoTool),
            )
            .await;

        let transport = MockTransport::new();
        let _handle = engine.bind(transport.clone());
        let mut out = transport.subscribe_outbound();

        transport.publish(serde_json::json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}}));
        let init_reply = recv_value(&mut out).await;
        assert_eq!(init_reply["result"]["serverInfo"]["name"], "test-server");

        transport.publish(
            serde_json::json!({"jsonrpc": "2.0", "id": 2, "method": "tools/call", "params": {"name": "echo", "arguments": {"x": 1}}}),
        );

        // First message on the outbound stream is the progress notification,
        // the second is the call's result.
        let progress = recv_value(&mut out).await;
        assert_eq!(progress["method"], "notifications/progress");

        let reply = recv_value(&mut out).await;
        assert_eq!(reply["id"], 2);
        assert!(reply["result"]["content"][0]["text"].as_str().unwrap().contains('1'));
    }

    #[tokio::test]
    async fn unknown_tool_returns_tool_not_found() {
        let engine = test_engine();
        let transport = MockTransport::new();
        let _handle = engine.bind(transport.clone());
        let mut out = transport.subscribe_outbound();

        transport.publish(serde_json::json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}}));
        let _ = recv_value(&mut out).await;

        transport.publish(serde_json::json!({"jsonrpc": "2.0", "id": 2, "method": "tools/call", "params": {"name": "missing"}}));
        let reply = recv_value(&mut out).await;
        assert_eq!(reply["error"]["code"], -32101);
    }

    #[tokio::test]
    async fn unsessioned_request_is_rejected() {
        let engine = test_engine();
        let transport = MockTransport::new();
        let _handle = engine.bind(transport.clone());
        let mut out = transport.subscribe_outbound();

        transport.publish(serde_json::json!({"jsonrpc": "2.0", "id": 1, "method": "ping"}));
        let reply = recv_value(&mut out).await;
        assert_eq!(reply["error"]["code"], -32600);
    }

    #[tokio::test]
    async fn resources_read_and_prompts_get_round_trip() {
        let engine = test_engine();
        engine
            .resources
            .register(
                "file:///a.txt",
                crate::model::ResourceDescriptor::new("file:///a.txt", "a", "a file"),
                Arc::new(StaticResource),
            )
            .await;
        engine
            .prompts
            .register(
                "greet",
                crate::model::PromptDescriptor { name: "greet".into(), description: "greets".into(), arguments: vec![] },
                Arc::new(StaticPrompt),
            )
            .await;

        let transport = MockTransport::new();
        let _handle = engine.bind(transport.clone());
        let mut out = transport.subscribe_outbound();

        transport.publish(serde_json::json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}}));
        let _ = recv_value(&mut out).await;

        transport.publish(
            serde_json::json!({"jsonrpc": "2.0", "id": 2, "method": "resources/read", "params": {"uri": "file:///a.txt"}}),
        );
        let resource_reply = recv_value(&mut out).await;
        assert_eq!(resource_reply["result"]["contents"][0]["text"], "hello");

        transport.publish(serde_json::json!({"jsonrpc": "2.0", "id": 3, "method": "prompts/get", "params": {"name": "greet"}}));
        let prompt_reply = recv_value(&mut out).await;
        assert_eq!(prompt_reply["id"], 3);
        assert!(prompt_reply.get("error").is_none());
    }

    #[test]
    fn dispatch_is_total_over_the_method_table() {
        assert!(assert_total_dispatch());
    }

    #[test]
    fn route_for_disagrees_with_all_on_an_unknown_method() {
        // Guards against `assert_total_dispatch` becoming hollow again: an
        // entry not actually routed must be caught.
        assert_eq!(route_for("not/a/real/method"), Route::Unknown);
    }

    #[tokio::test]
    async fn every_method_in_the_table_is_actually_routed() {
        // Drives every request-shaped method in `protocol::methods::ALL`
        // through a real engine and asserts none comes back
        // `MethodNotFound`, the way `assert_total_dispatch` claims at
        // construction time.
        let engine = test_engine();
        engine
            .tools
            .register("echo", crate::model::ToolDescriptor::new("echo", "echo", serde_json::json!({})), Arc::new(EchoTool))
            .await;
        engine
            .resources
            .register(
                "file:///a.txt",
                crate::model::ResourceDescriptor::new("file:///a.txt", "a", "a file"),
                Arc::new(StaticResource),
            )
            .await;
        engine
            .prompts
            .register(
                "greet",
                crate::model::PromptDescriptor { name: "greet".into(), description: "greets".into(), arguments: vec![] },
                Arc::new(StaticPrompt),
            )
            .await;

        let transport = MockTransport::new();
        let _handle = engine.bind(transport.clone());
        let mut out = transport.subscribe_outbound();

        transport.publish(serde_json::json!({"jsonrpc": "2.0", "id": "init", "method": "initialize", "params": {}}));
        let _ = recv_value(&mut out).await;

        let params_for = |method: &str| -> Value {
            match method {
                "tools/call" => serde_json::json!({"name": "echo", "arguments": {}}),
                "resources/read" => serde_json::json!({"uri": "file:///a.txt"}),
                "prompts/get" => serde_json::json!({"name": "greet"}),
                "operations/cancel" => serde_json::json!({"operationId": "none"}),
                _ => serde_json::json!({}),
            }
        };

        for (i, method) in protocol::methods::ALL.iter().enumerate() {
            if *method == protocol::methods::INITIALIZE || *method == protocol::methods::INITIALIZED {
                // Covered by the handshake above / never replies; routing
                // totality for these two is exercised structurally instead.
                continue;
            }
            let id = i as i64 + 1;
            transport.publish(serde_json::json!({
                "jsonrpc": "2.0", "id": id, "method": method, "params": params_for(method),
            }));
            let reply = recv_value(&mut out).await;
            assert_ne!(
                reply["error"]["code"], -32601,
                "method {method} came back MethodNotFound; dispatch does not route it"
            );
        }
    }
}
