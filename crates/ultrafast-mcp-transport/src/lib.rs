//! # UltraFast MCP Transport
//!
//! Transport layer implementations for the Model Context Protocol (MCP).
//!
//! This crate provides the bidirectional message-channel abstraction MCP
//! sessions run over, plus two concrete bindings:
//!
//! - **STDIO**: line-delimited JSON-RPC over a child process's stdin/stdout,
//!   with stderr forwarded out-of-band.
//! - **HTTP+SSE**: a long-lived `GET /sse` stream carries server→client
//!   messages; `POST <messageEndpoint>` carries client→server messages.
//!   Session identity travels via the `MCP-Session-ID` header or the
//!   `sessionId` query parameter learned from the stream's `endpoint` event.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐    ┌─────────────────┐    ┌─────────────────┐
//! │   Session Core  │◄──►│   Transport     │◄──►│   Wire          │
//! │   (dispatch)    │    │   trait         │    │   (pipe / HTTP) │
//! └─────────────────┘    └─────────────────┘    └─────────────────┘
//! ```
//!
//! Server-side HTTP+SSE additionally exposes a *provider*: a concurrent
//! registry of live sessions, a `set_session_factory` hook invoked once per
//! accepted connection, and a `broadcast` that fans a notification out to
//! every live session, tolerating per-session failures.
//!
//! ## Usage
//!
//! ```rust
//! use ultrafast_mcp_transport::{Transport, TransportConfig, create_transport};
//! use ultrafast_mcp_core::protocol::JsonRpcMessage;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut transport = create_transport(TransportConfig::Stdio).await?;
//!     let response = transport.receive_message().await?;
//!     transport.close().await?;
//!     Ok(())
//! }
//! ```

use async_trait::async_trait;
use thiserror::Error;
use ultrafast_mcp_core::protocol::JsonRpcMessage;

pub type Result<T> = std::result::Result<T, TransportError>;

pub mod middleware;
pub mod stdio;

pub use stdio::{StdioClientTransport, StdioLaunchConfig, StdioTransport};

#[cfg(feature = "http")]
pub mod http;

#[cfg(feature = "http")]
pub use http::{
    HttpSseClient, HttpSseTransport, HttpTransportConfig, HttpTransportProvider,
};

/// Transport-level errors. Session-level errors (`MCPError`) wrap these at
/// the session boundary rather than duplicating the taxonomy.
#[derive(Error, Debug, Clone)]
pub enum TransportError {
    #[error("Connection error: {message}")]
    ConnectionError { message: String },

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Transport not ready: {state:?}")]
    NotReady { state: ConnectionState },

    #[error("Serialization error: {message}")]
    SerializationError { message: String },

    #[error("Network error: {message}")]
    NetworkError { message: String },

    #[error("Protocol error: {message}")]
    ProtocolError { message: String },

    #[error("Initialization error: {message}")]
    InitializationError { message: String },

    #[error("Internal error: {message}")]
    InternalError { message: String },
}

/// Connection lifecycle state tracked per transport instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    Disconnected,
    Failed(String),
    ShuttingDown,
}

/// Lightweight health/diagnostics snapshot a transport keeps updated as it
/// sends and receives. Not part of the wire protocol; purely for logging
/// and operational visibility.
#[derive(Debug, Clone)]
pub struct TransportHealth {
    pub state: ConnectionState,
    pub error_count: u64,
    pub last_error: Option<String>,
    pub messages_sent: u64,
    pub messages_received: u64,
    pub last_activity: Option<std::time::SystemTime>,
    pub connection_duration: Option<std::time::Duration>,
}

impl Default for TransportHealth {
    fn default() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            error_count: 0,
            last_error: None,
            messages_sent: 0,
            messages_received: 0,
            last_activity: None,
            connection_duration: None,
        }
    }
}

/// Grace period and signal used by [`Transport::shutdown`].
#[derive(Debug, Clone)]
pub struct ShutdownConfig {
    pub grace_period: std::time::Duration,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            grace_period: std::time::Duration::from_secs(5),
        }
    }
}

/// The bidirectional message channel a session runs over.
///
/// `send_message`/`receive_message` are the spec's `send`/inbound-delivery
/// halves of the contract; `close` is immediate termination, `shutdown` is
/// the graceful variant (stop accepting new sends, let the grace period
/// elapse, then terminate).
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send_message(&mut self, message: JsonRpcMessage) -> Result<()>;

    async fn receive_message(&mut self) -> Result<JsonRpcMessage>;

    async fn close(&mut self) -> Result<()>;

    fn get_state(&self) -> ConnectionState;

    fn get_health(&self) -> TransportHealth;

    async fn shutdown(&mut self, config: ShutdownConfig) -> Result<()>;

    async fn force_shutdown(&mut self) -> Result<()>;

    async fn reset(&mut self) -> Result<()>;
}

/// Transport configuration accepted by [`create_transport`].
#[derive(Debug, Clone)]
pub enum TransportConfig {
    Stdio,

    #[cfg(feature = "http")]
    HttpSse {
        base_url: String,
        sse_endpoint: Option<String>,
        auth_token: Option<String>,
    },
}

/// Build and connect a client-side transport from configuration.
pub async fn create_transport(config: TransportConfig) -> Result<Box<dyn Transport>> {
    match config {
        TransportConfig::Stdio => {
            let transport = stdio::StdioTransport::new().await?;
            Ok(Box::new(transport))
        }

        #[cfg(feature = "http")]
        TransportConfig::HttpSse {
            base_url,
            sse_endpoint,
            auth_token,
        } => {
            let client_config = http::HttpClientConfig {
                base_url,
                sse_endpoint: sse_endpoint.unwrap_or_else(|| "/sse".to_string()),
                auth_token,
                ..Default::default()
            };

            let mut client = http::HttpSseClient::new(client_config)?;
            client.connect().await?;
            Ok(Box::new(client))
        }
    }
}
