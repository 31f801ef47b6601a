//! HTTP+SSE transport client
//!
//! Opens a long-lived `GET <sse_endpoint>` stream, waits for the server's
//! `endpoint` event to learn the POST URL and session id, then forwards
//! `message` events into an inbound channel and POSTs outbound messages
//! against the learned URL. No SSE-client crate is used: frames are parsed
//! by hand off the raw byte stream, the same shape the server side produces
//! them in (`event: <type>\ndata: <payload>\n\n`).

use crate::{ConnectionState, Result, Transport, TransportError, TransportHealth};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{
    header::{HeaderMap, HeaderValue},
    Client,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex};
use ultrafast_mcp_core::protocol::JsonRpcMessage;

/// MCP Protocol version constant
pub const MCP_PROTOCOL_VERSION: &str = "2025-06-18";

/// HTTP+SSE client configuration.
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub base_url: String,
    pub sse_endpoint: String,
    pub protocol_version: String,
    pub timeout: Duration,
    /// How long to wait for the stream's `endpoint` event before giving up.
    pub endpoint_timeout: Duration,
    pub auth_token: Option<String>,
}

impl HttpClientConfig {
    pub fn sse_url(&self) -> String {
        format!("{}{}", self.base_url, self.sse_endpoint)
    }
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080".to_string(),
            sse_endpoint: "/sse".to_string(),
            protocol_version: MCP_PROTOCOL_VERSION.to_string(),
            timeout: Duration::from_secs(30),
            endpoint_timeout: Duration::from_secs(10),
            auth_token: None,
        }
    }
}

/// One parsed SSE frame: an optional event type plus its (possibly
/// multi-line) data payload.
#[derive(Debug, Default)]
struct SseFrame {
    event: Option<String>,
    data: String,
}

fn parse_frame(raw: &str) -> SseFrame {
    let mut frame = SseFrame::default();
    let mut data_lines = Vec::new();
    for line in raw.lines() {
        if let Some(value) = line.strip_prefix("event:") {
            frame.event = Some(value.trim().to_string());
        } else if let Some(value) = line.strip_prefix("data:") {
            data_lines.push(value.trim_start().to_string());
        }
        // `id:`/`retry:` fields and comments (`:`-prefixed) carry no
        // information this client needs to act on.
    }
    frame.data = data_lines.join("\n");
    frame
}

struct ConnectShared {
    state: Mutex<ConnectionState>,
}

/// Client-side half of the HTTP+SSE binding. Implements [`Transport`] over
/// a background task that drives the SSE read loop.
pub struct HttpSseClient {
    client: Client,
    config: HttpClientConfig,
    message_url: Option<String>,
    inbound_rx: mpsc::Receiver<JsonRpcMessage>,
    shared: Arc<ConnectShared>,
    health: TransportHealth,
    connected_at: Option<std::time::SystemTime>,
}

impl HttpSseClient {
    pub fn new(config: HttpClientConfig) -> Result<Self> {
        let client = Client::builder().build().map_err(|e| {
            TransportError::InitializationError {
                message: format!("Failed to create HTTP client: {}", e),
            }
        })?;

        let (_tx, rx) = mpsc::channel(1);

        Ok(Self {
            client,
            config,
            message_url: None,
            inbound_rx: rx,
            shared: Arc::new(ConnectShared {
                state: Mutex::new(ConnectionState::Disconnected),
            }),
            health: TransportHealth::default(),
            connected_at: None,
        })
    }

    fn auth_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "mcp-protocol-version",
            str_to_header_value(&self.config.protocol_version)?,
        );
        if let Some(token) = &self.config.auth_token {
            headers.insert("authorization", str_to_header_value(token)?);
        }
        Ok(headers)
    }

    /// Open the SSE stream and block until the server's `endpoint` event
    /// resolves the POST URL, or `endpoint_timeout` elapses.
    pub async fn connect(&mut self) -> Result<()> {
        let response = self
            .client
            .get(self.config.sse_url())
            .headers(self.auth_headers()?)
            .send()
            .await
            .map_err(|e| TransportError::ConnectionError {
                message: format!("Failed to open SSE stream: {}", e),
            })?;

        if !response.status().is_success() {
            return Err(TransportError::ConnectionError {
                message: format!("SSE handshake failed with status {}", response.status()),
            });
        }

        let (endpoint_tx, endpoint_rx) = oneshot::channel();
        let (message_tx, message_rx) = mpsc::channel(256);
        self.inbound_rx = message_rx;

        let shared = self.shared.clone();
        *shared.state.lock().await = ConnectionState::Connected;

        tokio::spawn(run_sse_loop(response, endpoint_tx, message_tx, shared));

        let endpoint_path = tokio::time::timeout(self.config.endpoint_timeout, endpoint_rx)
            .await
            .map_err(|_| TransportError::InitializationError {
                message: "Timed out waiting for endpoint event".to_string(),
            })?
            .map_err(|_| TransportError::InitializationError {
                message: "SSE stream closed before sending endpoint event".to_string(),
            })?;

        self.message_url = Some(format!("{}{}", self.config.base_url, endpoint_path));
        self.connected_at = Some(std::time::SystemTime::now());
        self.health.state = ConnectionState::Connected;
        Ok(())
    }
}

async fn run_sse_loop(
    response: reqwest::Response,
    endpoint_tx: oneshot::Sender<String>,
    message_tx: mpsc::Sender<JsonRpcMessage>,
    shared: Arc<ConnectShared>,
) {
    let mut endpoint_tx = Some(endpoint_tx);
    let mut buffer = String::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                tracing::warn!("SSE stream read error: {}", e);
                break;
            }
        };
        buffer.push_str(&String::from_utf8_lossy(&chunk));

        while let Some(idx) = buffer.find("\n\n") {
            let raw_frame: String = buffer.drain(..idx + 2).collect();
            let frame = parse_frame(&raw_frame);
            match frame.event.as_deref() {
                Some("endpoint") => {
                    if let Some(tx) = endpoint_tx.take() {
                        let _ = tx.send(frame.data);
                    }
                }
                Some("message") => match serde_json::from_str::<JsonRpcMessage>(&frame.data) {
                    Ok(message) => {
                        if message_tx.send(message).await.is_err() {
                            return;
                        }
                    }
                    Err(e) => tracing::warn!("Failed to parse SSE message payload: {}", e),
                },
                Some("close") => {
                    *shared.state.lock().await = ConnectionState::Disconnected;
                    return;
                }
                _ => {}
            }
        }
    }

    *shared.state.lock().await = ConnectionState::Disconnected;
}

#[async_trait]
impl Transport for HttpSseClient {
    async fn send_message(&mut self, message: JsonRpcMessage) -> Result<()> {
        let url = self
            .message_url
            .as_ref()
            .ok_or_else(|| TransportError::NotReady {
                state: ConnectionState::Disconnected,
            })?;

        let mut headers = self.auth_headers()?;
        headers.insert("content-type", str_to_header_value("application/json")?);

        let response = self
            .client
            .post(url)
            .headers(headers)
            .json(&message)
            .send()
            .await
            .map_err(|e| TransportError::NetworkError {
                message: format!("Failed to send message: {}", e),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::NetworkError {
                message: format!("POST rejected with {}: {}", status, body),
            });
        }

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
        *self.shared.state.lock().await = ConnectionState::Disconnected;
        self.inbound_rx.close();
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

    async fn shutdown(&mut self, _config: crate::ShutdownConfig) -> Result<()> {
        self.close().await
    }

    async fn force_shutdown(&mut self) -> Result<()> {
        self.close().await
    }

    async fn reset(&mut self) -> Result<()> {
        self.message_url = None;
        self.connect().await
    }
}

fn str_to_header_value(s: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(s).map_err(|e| TransportError::InitializationError {
        message: format!("Failed to parse header value: {}", e),
    })
}
