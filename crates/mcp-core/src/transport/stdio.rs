//! Stdio transport: JSON-RPC 2.0 over stdin/stdout, one message per line.
//!
//! Out of scope per spec §1 ("specified only by the abstract transport
//! interface it satisfies"); implemented anyway as a second, minimal
//! realization of [`Transport`], the way every MCP server in the corpus
//! ships one alongside its HTTP transport.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{broadcast, Mutex};

use super::{Transport, TransportMessage};
use crate::error::TransportError;
use crate::session::{SessionId, TransportId};

/// A single stdio connection represents exactly one logical client, so it
/// has exactly one transport id for its lifetime.
pub struct StdioTransport {
    transport_id: TransportId,
    inbound_tx: broadcast::Sender<TransportMessage>,
    stdout: Mutex<tokio::io::Stdout>,
}

impl StdioTransport {
    #[must_use]
    pub fn new() -> Arc<Self> {
        let (inbound_tx, _) = broadcast::channel(256);
        Arc::new(Self {
            transport_id: TransportId::new_v4(),
            inbound_tx,
            stdout: Mutex::new(tokio::io::stdout()),
        })
    }

    /// Drive the read loop: one JSON value per line, published to the
    /// inbound broadcast stream until stdin closes.
    pub async fn run(self: Arc<Self>) -> std::io::Result<()> {
        let stdin = tokio::io::stdin();
        let mut reader = BufReader::new(stdin);
        let mut line = String::new();

        loop {
            line.clear();
            let bytes_read = reader.read_line(&mut line).await?;
            if bytes_read == 0 {
                tracing::info!("stdin closed, stdio transport shutting down");
                break;
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            match serde_json::from_str::<Value>(trimmed) {
                Ok(data) => {
                    let message = TransportMessage { data, transport_id: self.transport_id, session_id: None };
                    // No active subscriber is a legitimate race at startup; drop silently.
                    let _ = self.inbound_tx.send(message);
                }
                Err(err) => {
                    tracing::warn!(error = %err, "failed to parse stdio line as JSON");
                    let error_envelope = serde_json::json!({
                        "jsonrpc": "2.0",
                        "id": Value::Null,
                        "error": { "code": -32700, "message": format!("Parse error: {err}") }
                    });
                    let _ = self.write_line(&error_envelope).await;
                }
            }
        }

        Ok(())
    }

    async fn write_line(&self, payload: &Value) -> Result<(), TransportError> {
        let mut line = serde_json::to_string(payload)?;
        line.push('\n');
        let mut stdout = self.stdout.lock().await;
        stdout.write_all(line.as_bytes()).await?;
        stdout.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl Transport for StdioTransport {
    fn subscribe(&self) -> broadcast::Receiver<TransportMessage> {
        self.inbound_tx.subscribe()
    }

    async fn send(&self, payload: Value, _session_id: Option<SessionId>) -> Result<(), TransportError> {
        self.write_line(&payload).await
    }

    async fn associate_session(&self, _transport_id: TransportId, _session_id: SessionId) {
        // A stdio connection is always exactly one session; nothing to bind.
    }

    async fn close(&self) {}

    async fn on_close(&self) {
        // Nothing is spawned or buffered beyond the stdout writer itself;
        // flushing it is the only resource release this transport owns.
        let mut stdout = self.stdout.lock().await;
        let _ = stdout.flush().await;
    }
}
