//! HTTP+SSE transport server
//!
//! Implements the classic dual-endpoint MCP binding: a long-lived
//! `GET <sse_endpoint>` stream carries server→client messages, and
//! `POST <message_endpoint>` carries client→server messages. Session
//! identity is assigned on SSE connect and travels back to the client via
//! the stream's `endpoint` event; subsequent POSTs identify themselves with
//! the `MCP-Session-ID` header or a `sessionId` query parameter (both
//! accepted).

use crate::{ConnectionState, Result, ShutdownConfig, Transport, TransportError, TransportHealth};
use async_trait::async_trait;
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{
        sse::{Event, KeepAlive},
        IntoResponse, Response, Sse,
    },
    routing::{get, post},
    Router,
};
use futures::stream;
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};
use ultrafast_mcp_core::protocol::JsonRpcMessage;

/// HTTP+SSE transport configuration.
#[derive(Debug, Clone)]
pub struct HttpTransportConfig {
    pub host: String,
    pub port: u16,
    pub cors_enabled: bool,
    pub protocol_version: String,
    pub allow_origin: Option<String>,
    pub sse_endpoint: String,
    pub message_endpoint: String,
    /// Channel depth for a session's outbound SSE event queue.
    pub session_buffer: usize,
}

impl Default for HttpTransportConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            cors_enabled: true,
            protocol_version: "2025-06-18".to_string(),
            allow_origin: Some("http://localhost:*".to_string()),
            sse_endpoint: "/sse".to_string(),
            message_endpoint: "/message".to_string(),
            session_buffer: 256,
        }
    }
}

enum SseEvent {
    Endpoint(String),
    Message(JsonRpcMessage),
    Close,
}

struct SessionEntry {
    outbound_tx: mpsc::Sender<SseEvent>,
    inbound_tx: mpsc::Sender<JsonRpcMessage>,
    next_event_id: Arc<AtomicU64>,
}

/// Callback invoked once per accepted SSE connection with a fresh
/// [`HttpSseTransport`]; mirrors the spec's `setSessionFactory`.
pub type SessionFactory =
    Arc<dyn Fn(HttpSseTransport) -> Pin<Box<dyn std::future::Future<Output = ()> + Send>> + Send + Sync>;

struct SharedState {
    sessions: RwLock<HashMap<String, SessionEntry>>,
    config: HttpTransportConfig,
    closing: AtomicBool,
    session_factory: RwLock<Option<SessionFactory>>,
}

/// Server-side provider for the HTTP+SSE binding: owns the live-session
/// registry, builds the axum [`Router`], and exposes `broadcast` for
/// fanning a notification out to every connected session.
#[derive(Clone)]
pub struct HttpTransportProvider {
    state: Arc<SharedState>,
}

impl HttpTransportProvider {
    pub fn new(config: HttpTransportConfig) -> Self {
        Self {
            state: Arc::new(SharedState {
                sessions: RwLock::new(HashMap::new()),
                config,
                closing: AtomicBool::new(false),
                session_factory: RwLock::new(None),
            }),
        }
    }

    /// Register the factory invoked for each newly accepted SSE connection.
    /// Typically spawns a task that drives a session core's receive loop
    /// against the handed-back [`HttpSseTransport`].
    pub async fn set_session_factory(&self, factory: SessionFactory) {
        *self.state.session_factory.write().await = Some(factory);
    }

    pub fn router(&self) -> Router {
        let mut router = Router::new()
            .route(&self.state.config.sse_endpoint, get(handle_sse))
            .route(&self.state.config.message_endpoint, post(handle_message))
            .with_state(self.state.clone());

        if self.state.config.cors_enabled {
            router = router.layer(CorsLayer::permissive());
        }
        router
    }

    pub async fn run(self) -> Result<()> {
        let addr = (self.state.config.host.as_str(), self.state.config.port);
        info!("Starting HTTP+SSE transport on {}:{}", addr.0, addr.1);
        let listener =
            tokio::net::TcpListener::bind(addr)
                .await
                .map_err(|e| TransportError::InitializationError {
                    message: format!("Failed to bind to address: {}", e),
                })?;
        axum::serve(listener, self.router().into_make_service())
            .await
            .map_err(|e| TransportError::InitializationError {
                message: format!("Server failed: {}", e),
            })?;
        Ok(())
    }

    /// Fan a notification out to every live session, tolerating per-session
    /// send failures (a stalled session never blocks delivery to others).
    pub async fn broadcast(&self, method: &str, params: Option<serde_json::Value>) {
        let notification = JsonRpcMessage::Notification(
            ultrafast_mcp_core::protocol::jsonrpc::JsonRpcRequest::notification(
                method.to_string(),
                params,
            ),
        );
        let sessions = self.state.sessions.read().await;
        for (id, entry) in sessions.iter() {
            if entry
                .outbound_tx
                .send(SseEvent::Message(notification.clone()))
                .await
                .is_err()
            {
                warn!("Broadcast to session {} failed (channel closed)", id);
            }
        }
    }

    pub async fn session_count(&self) -> usize {
        self.state.sessions.read().await.len()
    }

    /// Refuse new SSE connections and send a `close` event to every live
    /// session, removing them from the registry. Callers that need a
    /// bounded grace window should race this against a timeout.
    pub async fn close_gracefully(&self) {
        self.state.closing.store(true, Ordering::SeqCst);
        let mut sessions = self.state.sessions.write().await;
        for (id, entry) in sessions.iter() {
            if entry.outbound_tx.send(SseEvent::Close).await.is_err() {
                warn!("Session {} already gone during shutdown", id);
            }
        }
        sessions.clear();
    }
}

fn extract_session_id(headers: &HeaderMap, query: &HashMap<String, String>) -> Option<String> {
    headers
        .get("mcp-session-id")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .or_else(|| query.get("sessionId").cloned())
}

fn validate_origin(headers: &HeaderMap, config: &HttpTransportConfig) -> bool {
    match headers.get("origin").and_then(|v| v.to_str().ok()) {
        Some(origin) => {
            if config.host == "127.0.0.1" || config.host == "localhost" {
                origin.contains("localhost") || origin.contains("127.0.0.1")
            } else {
                config
                    .allow_origin
                    .as_deref()
                    .map(|allowed| allowed == origin)
                    .unwrap_or(false)
            }
        }
        None => config.host == "127.0.0.1" || config.host == "localhost",
    }
}

async fn handle_sse(
    State(state): State<Arc<SharedState>>,
    headers: HeaderMap,
) -> impl IntoResponse {
    if !validate_origin(&headers, &state.config) {
        return (StatusCode::FORBIDDEN, "Origin not allowed").into_response();
    }
    if state.closing.load(Ordering::SeqCst) {
        return (StatusCode::SERVICE_UNAVAILABLE, "Server is shutting down").into_response();
    }

    let session_id = uuid::Uuid::new_v4().to_string();
    let (outbound_tx, mut outbound_rx) = mpsc::channel(state.config.session_buffer);
    let (inbound_tx, inbound_rx) = mpsc::channel(state.config.session_buffer);
    let next_event_id = Arc::new(AtomicU64::new(0));

    state.sessions.write().await.insert(
        session_id.clone(),
        SessionEntry {
            outbound_tx: outbound_tx.clone(),
            inbound_tx,
            next_event_id: next_event_id.clone(),
        },
    );

    let endpoint_url = format!(
        "{}?sessionId={}",
        state.config.message_endpoint, session_id
    );
    let _ = outbound_tx.send(SseEvent::Endpoint(endpoint_url)).await;

    let transport = HttpSseTransport {
        session_id: session_id.clone(),
        inbound_rx,
        outbound_tx,
        health: TransportHealth {
            state: ConnectionState::Connected,
            ..Default::default()
        },
        connected_at: Some(std::time::SystemTime::now()),
    };

    if let Some(factory) = state.session_factory.read().await.clone() {
        tokio::spawn(factory(transport));
    }

    info!("Opened SSE session {}", session_id);

    let stream = stream::unfold(
        (outbound_rx, next_event_id, state.clone(), session_id.clone(), false),
        |(mut rx, next_id, state, sid, done)| async move {
            if done {
                state.sessions.write().await.remove(&sid);
                info!("Closed SSE session {}", sid);
                return None;
            }
            match rx.recv().await {
                Some(SseEvent::Endpoint(url)) => {
                    let id = next_id.fetch_add(1, Ordering::SeqCst);
                    let event = Event::default().id(id.to_string()).event("endpoint").data(url);
                    Some((Ok::<_, axum::Error>(event), (rx, next_id, state, sid, false)))
                }
                Some(SseEvent::Message(message)) => {
                    let id = next_id.fetch_add(1, Ordering::SeqCst);
                    let data = serde_json::to_string(&message).unwrap_or_default();
                    let event = Event::default().id(id.to_string()).event("message").data(data);
                    Some((Ok(event), (rx, next_id, state, sid, false)))
                }
                Some(SseEvent::Close) => {
                    let id = next_id.fetch_add(1, Ordering::SeqCst);
                    let event = Event::default().id(id.to_string()).event("close").data("");
                    Some((Ok(event), (rx, next_id, state, sid, true)))
                }
                None => {
                    state.sessions.write().await.remove(&sid);
                    info!("Closed SSE session {}", sid);
                    None
                }
            }
        },
    );

    Sse::new(stream).keep_alive(KeepAlive::default()).into_response()
}

async fn handle_message(
    State(state): State<Arc<SharedState>>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if !validate_origin(&headers, &state.config) {
        return (StatusCode::FORBIDDEN, "Origin not allowed").into_response();
    }

    let session_id = match extract_session_id(&headers, &query) {
        Some(id) => id,
        None => return (StatusCode::BAD_REQUEST, "Missing session id").into_response(),
    };

    let message: JsonRpcMessage = match serde_json::from_slice(&body) {
        Ok(message) => message,
        Err(e) => {
            return (StatusCode::BAD_REQUEST, format!("Malformed JSON: {}", e)).into_response()
        }
    };

    let sessions = state.sessions.read().await;
    let entry = match sessions.get(&session_id) {
        Some(entry) => entry,
        None => return (StatusCode::NOT_FOUND, "Unknown session").into_response(),
    };

    match entry.inbound_tx.send(message).await {
        Ok(()) => StatusCode::ACCEPTED.into_response(),
        Err(e) => {
            error!("Failed to dispatch message for session {}: {}", session_id, e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Dispatch failure").into_response()
        }
    }
}

/// One live SSE session's view of the [`Transport`] contract: the handle a
/// server's session core reads inbound messages from and writes outbound
/// messages (and its `close` event) to.
pub struct HttpSseTransport {
    session_id: String,
    inbound_rx: mpsc::Receiver<JsonRpcMessage>,
    outbound_tx: mpsc::Sender<SseEvent>,
    health: TransportHealth,
    connected_at: Option<std::time::SystemTime>,
}

impl HttpSseTransport {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

#[async_trait]
impl Transport for HttpSseTransport {
    async fn send_message(&mut self, message: JsonRpcMessage) -> Result<()> {
        if !matches!(self.health.state, ConnectionState::Connected) {
            return Err(TransportError::NotReady {
                state: self.health.state.clone(),
            });
        }
        self.outbound_tx
            .send(SseEvent::Message(message))
            .await
            .map_err(|_| TransportError::ConnectionClosed)?;
        self.health.messages_sent += 1;
        self.health.last_activity = Some(std::time::SystemTime::now());
        Ok(())
    }

    async fn receive_message(&mut self) -> Result<JsonRpcMessage> {
        match self.inbound_rx.recv().await {
            Some(message) => {
                self.health.messages_received += 1;
                self.health.last_activity = Some(std::time::SystemTime::now());
                Ok(message)
            }
            None => {
                self.health.state = ConnectionState::Disconnected;
                Err(TransportError::ConnectionClosed)
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.health.state = ConnectionState::Disconnected;
        let _ = self.outbound_tx.send(SseEvent::Close).await;
        Ok(())
    }

    fn get_state(&self) -> ConnectionState {
        self.health.state.clone()
    }

    fn get_health(&self) -> TransportHealth {
        let mut health = self.health.clone();
        if let Some(connected_at) = self.connected_at {
            health.connection_duration = connected_at.elapsed().ok();
        }
        health
    }

    async fn shutdown(&mut self, _config: ShutdownConfig) -> Result<()> {
        self.health.state = ConnectionState::ShuttingDown;
        self.close().await
    }

    async fn force_shutdown(&mut self) -> Result<()> {
        self.close().await
    }

    async fn reset(&mut self) -> Result<()> {
        Err(TransportError::InternalError {
            message: "HttpSseTransport cannot be reset; a new SSE connection creates a new session"
                .to_string(),
        })
    }
}
