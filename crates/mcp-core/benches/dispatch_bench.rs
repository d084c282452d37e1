//! Throughput benchmark for the dispatch engine's `tools/call` path.

use std::sync::Arc;

use async_trait::async_trait;
use criterion::{criterion_group, criterion_main, Criterion};
use serde_json::Value;
use tokio::sync::broadcast;

use mcp_core::model::{CallToolResult, ServerInfo, ToolDescriptor};
use mcp_core::registry::ToolContext;
use mcp_core::session::{SessionId, TransportId};
use mcp_core::{Engine, McpError, Transport, TransportMessage};

struct EchoTool;

#[async_trait]
impl mcp_core::ToolHandler for EchoTool {
    async fn execute(&self, _ctx: ToolContext, arguments: Value) -> Result<CallToolResult, McpError> {
        Ok(CallToolResult::text(arguments.to_string()))
    }
}

struct NullTransport {
    transport_id: TransportId,
    inbound_tx: broadcast::Sender<TransportMessage>,
}

impl NullTransport {
    fn new() -> Arc<Self> {
        let (inbound_tx, _) = broadcast::channel(1024);
        Arc::new(Self { transport_id: TransportId::new_v4(), inbound_tx })
    }
}

#[async_trait]
impl Transport for NullTransport {
    fn subscribe(&self) -> broadcast::Receiver<TransportMessage> {
        self.inbound_tx.subscribe()
    }

    async fn send(&self, _payload: Value, _session_id: Option<SessionId>) -> Result<(), mcp_core::TransportError> {
        Ok(())
    }

    async fn associate_session(&self, _transport_id: TransportId, _session_id: SessionId) {}

    async fn close(&self) {}

    async fn on_close(&self) {}
}

fn dispatch_throughput(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().expect("tokio runtime");

    let (engine, transport) = runtime.block_on(async {
        let engine = Engine::new(ServerInfo { name: "bench".into(), version: "0.0.0".into() });
        engine
            .tools
            .register("echo", ToolDescriptor::new("echo", "echoes input", serde_json::json!({})), Arc::new(EchoTool))
            .await;

        let transport = NullTransport::new();
        let _handle = engine.bind(transport.clone());

        let init = serde_json::json!({"jsonrpc": "2.0", "id": 0, "method": "initialize", "params": {}});
        let message = TransportMessage { data: init, transport_id: transport.transport_id, session_id: None };
        let _ = transport.inbound_tx.send(message);
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        (engine, transport)
    });

    let mut counter = 0u64;
    c.bench_function("tools_call_dispatch", |b| {
        b.to_async(&runtime).iter(|| {
            counter += 1;
            let call = serde_json::json!({
                "jsonrpc": "2.0",
                "id": counter,
                "method": "tools/call",
                "params": {"name": "echo", "arguments": {"n": counter}},
            });
            let message = TransportMessage { data: call, transport_id: transport.transport_id, session_id: None };
            let _ = transport.inbound_tx.send(message);
            async { tokio::time::sleep(std::time::Duration::from_micros(50)).await }
        });
    });

    let _ = engine;
}

criterion_group!(benches, dispatch_throughput);
criterion_main!(benches);
