//! The streamable HTTP transport (spec §4.6): a single configurable
//! endpoint (`/mcp` by default) handling POST (request/response), GET (the
//! long-lived notification channel), DELETE (session termination), and
//! OPTIONS (CORS preflight, handled by [`tower_http::cors::CorsLayer`]).
//!
//! # Design note: per-request transport ids
//!
//! Unlike a socket-oriented transport, a streamable-HTTP POST has no
//! persistent connection to tag — each POST is its own ephemeral
//! "connection" in the abstract [`Transport`] model. This implementation
//! mints a fresh [`TransportId`] per POST request purely as a correlation
//! handle for the `initialize` session-announcement handshake described
//! below; it carries no meaning beyond that one request.
//!
//! # Design note: session-id header timing
//!
//! The `initialize` response must carry the freshly minted session id in
//! the `Mcp-Session-Id` header, but the engine only creates that session
//! *after* the POST handler has already started building the HTTP
//! response. The handler resolves this by registering a one-shot
//! "session announced" channel for its ephemeral transport id before
//! publishing the inbound message, but only awaits it when the request's
//! own `method` is `initialize` — the one case in which the engine is
//! guaranteed to call [`Transport::associate_session`] before it emits a
//! reply. For every other method the response header echoes whatever
//! session id the request already carried (or none), so the handler never
//! blocks on an announcement that will never arrive.

use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::stream::Stream;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot, RwLock};
use tower_http::cors::{Any, CorsLayer};

use super::{Transport, TransportMessage};
use crate::auth::{www_authenticate_header, AuthFailure, AuthMode};
use crate::error::TransportError;
use crate::protocol::SESSION_HEADER;
use crate::session::{SessionId, SessionManager, TransportId};

/// Configuration for the HTTP streamable transport.
#[derive(Clone)]
pub struct HttpTransportConfig {
    pub bind_addr: SocketAddr,
    /// Path of the single MCP endpoint. Default `/mcp`.
    pub endpoint_path: String,
    pub auth: AuthMode,
    /// URL surfaced in `WWW-Authenticate: ... resource_metadata="..."` on a
    /// 401, if configured (spec §4.6).
    pub resource_metadata_url: Option<String>,
}

impl Default for HttpTransportConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            endpoint_path: "/mcp".to_string(),
            auth: AuthMode::None,
            resource_metadata_url: None,
        }
    }
}

/// Sink for a single POST request's response stream, plus whatever progress
/// notifications fan out onto it before the response arrives.
type ResponseSink = mpsc::UnboundedSender<Value>;

/// Tracks GET-stream cleanup tasks spawned by [`GetStreamGuard`] so
/// [`Transport::on_close`] can wait for them to actually finish instead of
/// returning while one is still removing a sink or ending a session.
#[derive(Default)]
struct CleanupGate {
    inflight: std::sync::atomic::AtomicUsize,
    idle: tokio::sync::Notify,
}

impl CleanupGate {
    fn enter(&self) {
        self.inflight.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
    }

    fn leave(&self) {
        if self.inflight.fetch_sub(1, std::sync::atomic::Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }

    async fn drain(&self) {
        while self.inflight.load(std::sync::atomic::Ordering::SeqCst) > 0 {
            self.idle.notified().await;
        }
    }
}

/// The streamable HTTP transport.
pub struct HttpTransport {
    config: HttpTransportConfig,
    sessions: Arc<SessionManager>,
    inbound_tx: broadcast::Sender<TransportMessage>,

    /// Pending POST response sinks, keyed by the JSON-RPC request id
    /// (serialized to a string so numbers and strings key uniformly).
    response_sinks: RwLock<HashMap<String, ResponseSink>>,
    /// Per-session fallback sink for notifications when no GET stream is
    /// open: the most recently opened `tools/call` POST stream for that
    /// session (spec §4.6).
    post_fallback_sinks: RwLock<HashMap<SessionId, ResponseSink>>,
    /// Per-session long-lived GET notification sink.
    get_sinks: RwLock<HashMap<SessionId, ResponseSink>>,
    /// One-shot "a session was just created for this request" channel, used
    /// only by `initialize` requests (see module docs).
    session_announcements: RwLock<HashMap<TransportId, oneshot::Sender<SessionId>>>,
    cleanup_gate: CleanupGate,
}

impl HttpTransport {
    #[must_use]
    pub fn new(config: HttpTransportConfig, sessions: Arc<SessionManager>) -> Arc<Self> {
        let (inbound_tx, _) = broadcast::channel(1024);
        Arc::new(Self {
            config,
            sessions,
            inbound_tx,
            response_sinks: RwLock::new(HashMap::new()),
            post_fallback_sinks: RwLock::new(HashMap::new()),
            get_sinks: RwLock::new(HashMap::new()),
            session_announcements: RwLock::new(HashMap::new()),
            cleanup_gate: CleanupGate::default(),
        })
    }

    fn id_key(id: &Value) -> String {
        serde_json::to_string(id).unwrap_or_default()
    }

    async fn register_response_sink(&self, id_key: String, sink: ResponseSink) {
        self.response_sinks.write().await.insert(id_key, sink);
    }

    async fn register_post_fallback(&self, session_id: SessionId, sink: ResponseSink) {
        self.post_fallback_sinks.write().await.insert(session_id, sink);
    }

    /// Register a per-session GET notification sink, closing any prior sink
    /// for the same session (spec §4.6).
    async fn register_get_sink(&self, session_id: SessionId, sink: ResponseSink) {
        let mut sinks = self.get_sinks.write().await;
        // Dropping the old sender closes its receiver's stream.
        sinks.insert(session_id, sink);
    }

    async fn remove_get_sink(&self, session_id: SessionId) {
        self.get_sinks.write().await.remove(&session_id);
    }

    /// Remove the GET sink for `session_id` only if `sink` is still the one
    /// currently registered, identity-compared via `same_channel`. Used by
    /// [`GetStreamGuard`] so a stale connection's cleanup can't clobber a
    /// newer GET that has already replaced it (spec §4.6: "any prior sink
    /// for the same session is closed" on replacement, not the other way
    /// around). Returns whether it actually removed the sink.
    async fn remove_get_sink_if_current(&self, session_id: SessionId, sink: &ResponseSink) -> bool {
        let mut sinks = self.get_sinks.write().await;
        match sinks.get(&session_id) {
            Some(current) if current.same_channel(sink) => {
                sinks.remove(&session_id);
                true
            }
            _ => false,
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn subscribe(&self) -> broadcast::Receiver<TransportMessage> {
        self.inbound_tx.subscribe()
    }

    async fn send(&self, payload: Value, session_id: Option<SessionId>) -> Result<(), TransportError> {
        let has_id = payload.get("id").is_some_and(|v| !v.is_null());

        if has_id {
            let id_key = Self::id_key(payload.get("id").unwrap());
            let sink = self.response_sinks.write().await.remove(&id_key);
            match sink {
                Some(sink) => {
                    // The response closes the stream; forget the fallback
                    // mapping too so later notifications fall through to
                    // "dropped" instead of reusing a dead sender.
                    if let Some(session_id) = session_id {
                        let mut fallback = self.post_fallback_sinks.write().await;
                        if fallback.get(&session_id).map(|s| s.same_channel(&sink)).unwrap_or(false) {
                            fallback.remove(&session_id);
                        }
                    }
                    let _ = sink.send(payload);
                    Ok(())
                }
                None => {
                    tracing::warn!(id = %id_key, "no POST response sink registered; dropping reply");
                    Err(TransportError::NoResponseSink(id_key))
                }
            }
        } else {
            // Notification: prefer the session's GET sink, then its active
            // POST fallback, else drop with a log (spec §4.6).
            let Some(session_id) = session_id else {
                tracing::debug!("dropping notification with no session id");
                return Ok(());
            };

            if let Some(sink) = self.get_sinks.read().await.get(&session_id) {
                let _ = sink.send(payload);
                return Ok(());
            }
            if let Some(sink) = self.post_fallback_sinks.read().await.get(&session_id) {
                let _ = sink.send(payload);
                return Ok(());
            }
            tracing::debug!(session_id = %session_id, "no sink for notification; dropping");
            Ok(())
        }
    }

    async fn associate_session(&self, transport_id: TransportId, session_id: SessionId) {
        if let Some(sender) = self.session_announcements.write().await.remove(&transport_id) {
            let _ = sender.send(session_id);
        }
    }

    async fn close(&self) {
        self.response_sinks.write().await.clear();
        self.post_fallback_sinks.write().await.clear();
        self.get_sinks.write().await.clear();
        self.session_announcements.write().await.clear();
    }

    async fn on_close(&self) {
        // Dropping the sinks above closes every live stream's receiver, but
        // the corresponding `GetStreamGuard`s still have to run their
        // cleanup (removing the now-stale sink entry, ending the session)
        // on a spawned task; wait for that to actually finish before
        // resolving.
        self.close().await;
        self.cleanup_gate.drain().await;
    }
}

/// Shared state handed to every axum handler.
struct AppState {
    transport: Arc<HttpTransport>,
    sessions: Arc<SessionManager>,
    endpoint_path: String,
    auth: AuthMode,
    resource_metadata_url: Option<String>,
}

/// Build the axum router for the streamable HTTP transport.
///
/// Routes beyond the MCP endpoint (`/health`, `/ready`) are ambient
/// operational surface grounded in the teacher's `health_check`/
/// `readiness_check` handlers; they are not part of the JSON-RPC method
/// table.
#[must_use]
pub fn build_router(transport: Arc<HttpTransport>, sessions: Arc<SessionManager>) -> Router {
    let endpoint_path = transport.config.endpoint_path.clone();
    let auth = transport.config.auth.clone();
    let resource_metadata_url = transport.config.resource_metadata_url.clone();

    let state = Arc::new(AppState { transport, sessions, endpoint_path: endpoint_path.clone(), auth, resource_metadata_url });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            axum::http::Method::POST,
            axum::http::Method::GET,
            axum::http::Method::DELETE,
            axum::http::Method::OPTIONS,
        ])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::header::AUTHORIZATION,
            axum::http::HeaderName::from_static("mcp-session-id"),
        ])
        .expose_headers([axum::http::HeaderName::from_static("mcp-session-id")]);

    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route(
            &endpoint_path,
            post(handle_post).get(handle_get).delete(handle_delete),
        )
        .layer(cors)
        .with_state(state)
}

/// Start a router bound to `addr`. Convenience wrapper; callers embedding
/// this router in a larger axum app should use [`build_router`] directly.
///
/// # Errors
/// Returns an error if the listener cannot bind or the server fails.
pub async fn serve(router: Router, addr: SocketAddr) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "HTTP transport listening");
    axum::serve(listener, router).await?;
    Ok(())
}

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn readiness_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ready",
        "sessions": state.sessions.session_count().await,
    }))
}

fn auth_failure_response(failure: &AuthFailure, resource_metadata_url: Option<&str>) -> Response {
    let header = www_authenticate_header(resource_metadata_url, failure);
    let mut response = StatusCode::UNAUTHORIZED.into_response();
    response.headers_mut().insert(
        axum::http::header::WWW_AUTHENTICATE,
        header.parse().expect("valid header value"),
    );
    response
}

fn session_id_from_headers(headers: &HeaderMap) -> Option<SessionId> {
    headers.get(SESSION_HEADER).and_then(|v| v.to_str().ok()).and_then(|s| s.parse().ok())
}

async fn handle_post(State(state): State<Arc<AppState>>, headers: HeaderMap, body: axum::body::Bytes) -> Response {
    if let Err(failure) = state.auth.check(&headers).await {
        return auth_failure_response(&failure, state.resource_metadata_url.as_deref());
    }

    let parsed: Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(err) => {
            return Json(serde_json::json!({
                "jsonrpc": "2.0",
                "id": Value::Null,
                "error": { "code": -32700, "message": format!("Parse error: {err}") }
            }))
            .into_response();
        }
    };

    if parsed.is_array() {
        return (StatusCode::BAD_REQUEST, "Batch requests are not supported").into_response();
    }
    if !parsed.is_object() {
        return (StatusCode::BAD_REQUEST, "Request body must be a JSON object").into_response();
    }

    let method = parsed.get("method").and_then(Value::as_str).unwrap_or_default().to_string();
    let is_initialize = method == "initialize";

    let header_session_id = session_id_from_headers(&headers);
    let known_session_id = match header_session_id {
        Some(id) if state.sessions.get(id).await.is_some() => Some(id),
        // An unknown session id is stripped, not forwarded (spec §4.6): the
        // engine will reject the call as unsession'd.
        _ => None,
    };

    let transport_id = TransportId::new_v4();

    let announce_rx = if is_initialize {
        let (tx, rx) = oneshot::channel();
        state.transport.session_announcements.write().await.insert(transport_id, tx);
        Some(rx)
    } else {
        None
    };

    let id_field = parsed.get("id").cloned().filter(|v| !v.is_null());

    let message = TransportMessage { data: parsed, transport_id, session_id: known_session_id };

    let Some(id_value) = id_field else {
        // Notification: forward and acknowledge immediately.
        let _ = state.transport.inbound_tx.send(message);
        return StatusCode::ACCEPTED.into_response();
    };

    let id_key = HttpTransport::id_key(&id_value);
    let (tx, mut rx) = mpsc::unbounded_channel::<Value>();
    state.transport.register_response_sink(id_key.clone(), tx.clone()).await;
    if method == "tools/call" {
        if let Some(session_id) = known_session_id {
            state.transport.register_post_fallback(session_id, tx.clone()).await;
        }
    }

    let _ = state.transport.inbound_tx.send(message);

    // Resolve the session id to echo in the response header. For
    // `initialize` this blocks on the announcement, which the engine is
    // guaranteed to send before it replies (see module docs); for every
    // other method we already know the answer.
    let response_session_id = if is_initialize {
        match announce_rx.unwrap().await {
            Ok(sid) => Some(sid),
            Err(_) => known_session_id,
        }
    } else {
        known_session_id
    };

    let stream = post_response_stream(rx, id_key);
    let mut response = Sse::new(stream)
        .keep_alive(KeepAlive::new().interval(Duration::from_secs(15)).text("ping"))
        .into_response();

    response.headers_mut().insert(axum::http::header::CACHE_CONTROL, "no-cache".parse().unwrap());
    if let Some(session_id) = response_session_id {
        response
            .headers_mut()
            .insert(SESSION_HEADER, session_id.to_string().parse().expect("valid header value"));
    }
    response
}

/// Guarantees GET-stream cleanup runs even when the client disconnects
/// mid-stream rather than letting the loop exhaust normally.
///
/// `async_stream::stream!` compiles to a generator; when axum drops the
/// response future on disconnect, it drops that generator while it's
/// suspended at the `rx.recv().await` inside the loop, so any code written
/// *after* the loop never runs. A value owned by the generator's own local
/// state is different: its `Drop` impl always runs when the generator is
/// dropped, mid-poll or not. Holding this guard as a local inside the
/// `stream!` block is what makes cleanup unconditional.
///
/// Exhaustion of the loop (the sink was replaced by a newer GET for the same
/// session, see `register_get_sink`) also drops this guard, which is why its
/// cleanup only ends the session when it's still the current sink —
/// otherwise the old stream's teardown would end the session the *new*
/// stream just started serving.
struct GetStreamGuard {
    transport: Arc<HttpTransport>,
    session_id: SessionId,
    sink: ResponseSink,
}

impl Drop for GetStreamGuard {
    fn drop(&mut self) {
        let transport = self.transport.clone();
        let session_id = self.session_id;
        let sink = self.sink.clone();
        transport.cleanup_gate.enter();
        tokio::spawn(async move {
            if transport.remove_get_sink_if_current(session_id, &sink).await {
                transport.sessions.end(session_id).await;
            }
            transport.cleanup_gate.leave();
        });
    }
}

async fn handle_get(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    if let Err(failure) = state.auth.check(&headers).await {
        return auth_failure_response(&failure, state.resource_metadata_url.as_deref());
    }

    let Some(session_id) = session_id_from_headers(&headers) else {
        return (StatusCode::BAD_REQUEST, "missing or unknown mcp-session-id header").into_response();
    };
    if state.sessions.get(session_id).await.is_none() {
        return (StatusCode::BAD_REQUEST, "missing or unknown mcp-session-id header").into_response();
    }

    let (tx, rx) = mpsc::unbounded_channel::<Value>();
    state.transport.register_get_sink(session_id, tx.clone()).await;

    let transport = state.transport.clone();
    let stream = async_stream::stream! {
        let mut rx = rx;
        let _guard = GetStreamGuard { transport, session_id, sink: tx };
        while let Some(payload) = rx.recv().await {
            let event = Event::default().json_data(&payload).unwrap_or_else(|_| Event::default().data("{}"));
            yield Ok::<_, Infallible>(event);
        }
    };

    let mut response = Sse::new(stream)
        .keep_alive(KeepAlive::new().interval(Duration::from_secs(15)).text("ping"))
        .into_response();
    response.headers_mut().insert(axum::http::header::CACHE_CONTROL, "no-cache".parse().unwrap());
    response
        .headers_mut()
        .insert(SESSION_HEADER, session_id.to_string().parse().expect("valid header value"));
    response
}

async fn handle_delete(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    if let Err(failure) = state.auth.check(&headers).await {
        return auth_failure_response(&failure, state.resource_metadata_url.as_deref());
    }

    // Idempotent: an absent or already-unknown session id still returns 204
    // (spec §4.6).
    if let Some(session_id) = session_id_from_headers(&headers) {
        state.sessions.end(session_id).await;
        state.transport.remove_get_sink(session_id).await;
        state.transport.post_fallback_sinks.write().await.remove(&session_id);
    }
    StatusCode::NO_CONTENT.into_response()
}

/// Merge an additional, statically-handled route into a built router — the
/// hook for bypass surfaces such as OAuth discovery documents that must live
/// outside the JSON-RPC endpoint and carry no shared transport state.
#[must_use]
pub fn with_extra_route(router: Router, path: &str, method_router: axum::routing::MethodRouter) -> Router {
    router.route(path, method_router)
}

/// Builds the SSE item stream for one POST request: forwards every payload
/// received on `rx` (progress notifications fanned onto this request's
/// fallback sink, followed eventually by the final response), closing once a
/// payload whose `id` matches `id_key` has been emitted.
fn post_response_stream(
    mut rx: mpsc::UnboundedReceiver<Value>,
    id_key: String,
) -> impl Stream<Item = Result<Event, Infallible>> + Send + 'static {
    async_stream::stream! {
        while let Some(payload) = rx.recv().await {
            let is_final = payload.get("id").map(HttpTransport::id_key).as_deref() == Some(id_key.as_str());
            let event = Event::default().json_data(&payload).unwrap_or_else(|_| Event::default().data("{}"));
            yield Ok(event);
            if is_final {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionManager;

    fn transport() -> (Arc<HttpTransport>, Arc<SessionManager>) {
        let sessions = Arc::new(SessionManager::new());
        let transport = HttpTransport::new(HttpTransportConfig::default(), sessions.clone());
        (transport, sessions)
    }

    #[tokio::test]
    async fn send_response_without_registered_sink_errors() {
        let (transport, _sessions) = transport();
        let payload = serde_json::json!({"jsonrpc": "2.0", "id": 1, "result": {}});
        let err = transport.send(payload, None).await.unwrap_err();
        assert!(matches!(err, TransportError::NoResponseSink(_)));
    }

    #[tokio::test]
    async fn send_response_delivers_to_registered_sink() {
        let (transport, _sessions) = transport();
        let (tx, mut rx) = mpsc::unbounded_channel();
        transport.register_response_sink(HttpTransport::id_key(&serde_json::json!(1)), tx).await;

        let payload = serde_json::json!({"jsonrpc": "2.0", "id": 1, "result": {"ok": true}});
        transport.send(payload.clone(), None).await.unwrap();

        let received = rx.recv().await.unwrap();
        assert_eq!(received, payload);
    }

    #[tokio::test]
    async fn notification_prefers_get_sink_over_post_fallback() {
        let (transport, sessions) = transport();
        let session = sessions.create(serde_json::json!({}), "2025-03-26").await;

        let (get_tx, mut get_rx) = mpsc::unbounded_channel();
        let (fallback_tx, mut fallback_rx) = mpsc::unbounded_channel();
        transport.register_get_sink(session.id, get_tx).await;
        transport.register_post_fallback(session.id, fallback_tx).await;

        let notice = serde_json::json!({"jsonrpc": "2.0", "method": "notifications/progress", "params": {}});
        transport.send(notice.clone(), Some(session.id)).await.unwrap();

        assert_eq!(get_rx.recv().await.unwrap(), notice);
        assert!(fallback_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn notification_falls_back_when_no_get_sink() {
        let (transport, sessions) = transport();
        let session = sessions.create(serde_json::json!({}), "2025-03-26").await;

        let (fallback_tx, mut fallback_rx) = mpsc::unbounded_channel();
        transport.register_post_fallback(session.id, fallback_tx).await;

        let notice = serde_json::json!({"jsonrpc": "2.0", "method": "notifications/progress", "params": {}});
        transport.send(notice.clone(), Some(session.id)).await.unwrap();

        assert_eq!(fallback_rx.recv().await.unwrap(), notice);
    }

    #[tokio::test]
    async fn associate_session_resolves_pending_announcement() {
        let (transport, _sessions) = transport();
        let transport_id = TransportId::new_v4();
        let (tx, rx) = oneshot::channel();
        transport.session_announcements.write().await.insert(transport_id, tx);

        let session_id = SessionId::new_v4();
        transport.associate_session(transport_id, session_id).await;

        assert_eq!(rx.await.unwrap(), session_id);
    }

    #[test]
    fn id_key_distinguishes_numeric_and_string_ids() {
        assert_ne!(HttpTransport::id_key(&serde_json::json!(1)), HttpTransport::id_key(&serde_json::json!("1")));
    }
}
