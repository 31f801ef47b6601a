//! STDIO transport implementation for MCP
//!
//! This module provides a transport that communicates over standard input/output,
//! which is the most common transport for MCP servers.

use crate::{ConnectionState, Result, ShutdownConfig, Transport, TransportError, TransportHealth};
use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tracing::{debug, trace};
use ultrafast_mcp_core::protocol::JsonRpcMessage;

/// STDIO transport for MCP communication
pub struct StdioTransport {
    stdin: BufReader<tokio::io::Stdin>,
    stdout: BufWriter<tokio::io::Stdout>,
    health: TransportHealth,
    connected_at: Option<std::time::SystemTime>,
}

impl StdioTransport {
    /// Create a new STDIO transport
    pub async fn new() -> Result<Self> {
        let stdin = tokio::io::stdin();
        let stdout = tokio::io::stdout();

        let health = TransportHealth {
            state: ConnectionState::Connected,
            ..Default::default()
        };

        let connected_at = Some(std::time::SystemTime::now());

        Ok(Self {
            stdin: BufReader::new(stdin),
            stdout: BufWriter::new(stdout),
            health,
            connected_at,
        })
    }

    fn update_connection_duration(&mut self) {
        if let Some(connected_at) = self.connected_at {
            self.health.connection_duration = connected_at.elapsed().ok();
        }
    }
}

#[async_trait]
impl Transport for StdioTransport {
    async fn send_message(&mut self, message: JsonRpcMessage) -> Result<()> {
        if !matches!(self.health.state, ConnectionState::Connected) {
            return Err(TransportError::NotReady {
                state: self.health.state.clone(),
            });
        }

        // Serialize the message to JSON
        let json_str = serde_json::to_string(&message).map_err(|e| {
            self.health.error_count += 1;
            self.health.last_error = Some(format!("Serialization error: {}", e));
            TransportError::SerializationError {
                message: format!("Failed to serialize message: {}", e),
            }
        })?;

        trace!("Sending message: {}", json_str);

        // MCP STDIO protocol: newline-delimited JSON (one message per line)
        self.stdout
            .write_all(json_str.as_bytes())
            .await
            .map_err(|e| {
                self.health.error_count += 1;
                self.health.last_error = Some(format!("Write error: {}", e));
                self.health.state = ConnectionState::Failed(format!("Write failed: {}", e));
                TransportError::NetworkError {
                    message: format!("Failed to write message: {}", e),
                }
            })?;

        // Add newline to delimit the message
        self.stdout.write_all(b"\n").await.map_err(|e| {
            self.health.error_count += 1;
            self.health.last_error = Some(format!("Write newline error: {}", e));
            self.health.state = ConnectionState::Failed(format!("Write newline failed: {}", e));
            TransportError::NetworkError {
                message: format!("Failed to write newline: {}", e),
            }
        })?;

        self.stdout.flush().await.map_err(|e| {
            self.health.error_count += 1;
            self.health.last_error = Some(format!("Flush error: {}", e));
            self.health.state = ConnectionState::Failed(format!("Flush failed: {}", e));
            TransportError::NetworkError {
                message: format!("Failed to flush stdout: {}", e),
            }
        })?;

        // Update health metrics
        self.health.messages_sent += 1;
        self.health.last_activity = Some(std::time::SystemTime::now());
        self.update_connection_duration();

        debug!("Successfully sent message with {} bytes", json_str.len());
        Ok(())
    }

    async fn receive_message(&mut self) -> Result<JsonRpcMessage> {
        if !matches!(self.health.state, ConnectionState::Connected) {
            return Err(TransportError::NotReady {
                state: self.health.state.clone(),
            });
        }

        // Read a line from stdin (newline-delimited JSON)
        let mut line = String::new();
        let bytes_read = self.stdin.read_line(&mut line).await.map_err(|e| {
            self.health.error_count += 1;
            self.health.last_error = Some(format!("Read error: {}", e));
            TransportError::NetworkError {
                message: format!("Failed to read line from stdin: {}", e),
            }
        })?;

        if bytes_read == 0 {
            // EOF reached
            self.health.state = ConnectionState::Disconnected;
            return Err(TransportError::ConnectionClosed);
        }

        // Remove trailing newline
        let message_str = line.trim_end();

        if message_str.is_empty() {
            self.health.error_count += 1;
            self.health.last_error = Some("Empty message received".to_string());
            return Err(TransportError::SerializationError {
                message: "Received empty message".to_string(),
            });
        }

        trace!("Received message: {}", message_str);

        // Parse the JSON message
        let message: JsonRpcMessage = serde_json::from_str(message_str).map_err(|e| {
            self.health.error_count += 1;
            self.health.last_error = Some(format!("Parse error: {}", e));
            TransportError::SerializationError {
                message: format!("Failed to parse JSON message: {}", e),
            }
        })?;

        // Update health metrics
        self.health.messages_received += 1;
        self.health.last_activity = Some(std::time::SystemTime::now());
        self.update_connection_duration();

        debug!("Successfully received message");
        Ok(message)
    }

    async fn close(&mut self) -> Result<()> {
        self.health.state = ConnectionState::Disconnected;
        debug!("STDIO transport closed");
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
        debug!("STDIO transport shutting down gracefully");
        self.close().await
    }

    async fn force_shutdown(&mut self) -> Result<()> {
        debug!("STDIO transport force shutdown");
        self.close().await
    }

    async fn reset(&mut self) -> Result<()> {
        self.health = TransportHealth::default();
        self.health.state = ConnectionState::Connected;
        self.connected_at = Some(std::time::SystemTime::now());
        debug!("STDIO transport reset");
        Ok(())
    }
}

/// Launch configuration for a client-spawned server subprocess.
#[derive(Debug, Clone)]
pub struct StdioLaunchConfig {
    pub command: String,
    pub args: Vec<String>,
    pub env: std::collections::HashMap<String, String>,
}

/// Client-side STDIO transport: launches the server as a child process and
/// speaks line-delimited JSON-RPC over its stdin/stdout. The child's stderr
/// is forwarded line-by-line to an optional sink for diagnostics.
pub struct StdioClientTransport {
    child: tokio::process::Child,
    stdin: BufWriter<tokio::process::ChildStdin>,
    stdout: BufReader<tokio::process::ChildStdout>,
    health: TransportHealth,
    connected_at: Option<std::time::SystemTime>,
}

impl StdioClientTransport {
    /// Spawn `config.command` with the given args/env and wire up stdio
    /// pipes. `stderr_sink`, if provided, receives each stderr line as it
    /// arrives (out-of-band diagnostics; never part of the JSON-RPC stream).
    pub async fn spawn(
        config: StdioLaunchConfig,
        stderr_sink: Option<tokio::sync::mpsc::Sender<String>>,
    ) -> Result<Self> {
        let mut command = tokio::process::Command::new(&config.command);
        command
            .args(&config.args)
            .envs(&config.env)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped());

        let mut child = command
            .spawn()
            .map_err(|e| TransportError::InitializationError {
                message: format!("Failed to spawn child process '{}': {}", config.command, e),
            })?;

        let stdin =
            child
                .stdin
                .take()
                .ok_or_else(|| TransportError::InitializationError {
                    message: "Child process did not expose stdin".to_string(),
                })?;
        let stdout =
            child
                .stdout
                .take()
                .ok_or_else(|| TransportError::InitializationError {
                    message: "Child process did not expose stdout".to_string(),
                })?;
        let stderr = child.stderr.take();

        if let (Some(stderr), Some(sink)) = (stderr, stderr_sink) {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if sink.send(line).await.is_err() {
                        break;
                    }
                }
            });
        }

        Ok(Self {
            child,
            stdin: BufWriter::new(stdin),
            stdout: BufReader::new(stdout),
            health: TransportHealth {
                state: ConnectionState::Connected,
                ..Default::default()
            },
            connected_at: Some(std::time::SystemTime::now()),
        })
    }
}

#[async_trait]
impl Transport for StdioClientTransport {
    async fn send_message(&mut self, message: JsonRpcMessage) -> Result<()> {
        if !matches!(self.health.state, ConnectionState::Connected) {
            return Err(TransportError::NotReady {
                state: self.health.state.clone(),
            });
        }

        let json_str =
            serde_json::to_string(&message).map_err(|e| TransportError::SerializationError {
                message: format!("Failed to serialize message: {}", e),
            })?;

        self.stdin
            .write_all(json_str.as_bytes())
            .await
            .map_err(|e| TransportError::NetworkError {
                message: format!("Failed to write to child stdin: {}", e),
            })?;
        self.stdin
            .write_all(b"\n")
            .await
            .map_err(|e| TransportError::NetworkError {
                message: format!("Failed to write newline: {}", e),
            })?;
        self.stdin
            .flush()
            .await
            .map_err(|e| TransportError::NetworkError {
                message: format!("Failed to flush child stdin: {}", e),
            })?;

        self.health.messages_sent += 1;
        self.health.last_activity = Some(std::time::SystemTime::now());
        trace!("Sent message to child process: {} bytes", json_str.len());
        Ok(())
    }

    async fn receive_message(&mut self) -> Result<JsonRpcMessage> {
        if !matches!(self.health.state, ConnectionState::Connected) {
            return Err(TransportError::NotReady {
                state: self.health.state.clone(),
            });
        }

        let mut line = String::new();
        let bytes_read = self.stdout.read_line(&mut line).await.map_err(|e| {
            TransportError::NetworkError {
                message: format!("Failed to read from child stdout: {}", e),
            }
        })?;

        if bytes_read == 0 {
            self.health.state = ConnectionState::Disconnected;
            return Err(TransportError::ConnectionClosed);
        }

        let message_str = line.trim_end();
        if message_str.is_empty() {
            return Err(TransportError::SerializationError {
                message: "Received empty line from child process".to_string(),
            });
        }

        let message: JsonRpcMessage =
            serde_json::from_str(message_str).map_err(|e| TransportError::SerializationError {
                message: format!("Failed to parse JSON from child: {}", e),
            })?;

        self.health.messages_received += 1;
        self.health.last_activity = Some(std::time::SystemTime::now());
        Ok(message)
    }

    async fn close(&mut self) -> Result<()> {
        let _ = self.child.start_kill();
        self.health.state = ConnectionState::Disconnected;
        debug!("Killed child process");
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

    /// Send a graceful shutdown signal (SIGTERM on unix; otherwise request
    /// exit by closing stdin) and wait up to `config.grace_period` for the
    /// child to exit on its own before force-killing it.
    async fn shutdown(&mut self, config: ShutdownConfig) -> Result<()> {
        self.health.state = ConnectionState::ShuttingDown;

        #[cfg(unix)]
        {
            if let Some(pid) = self.child.id() {
                // SAFETY: libc::kill with SIGTERM is a standard, non-destructive
                // request that the target process may ignore; no memory unsafety.
                unsafe {
                    libc_kill(pid as i32, 15);
                }
            }
        }
        #[cfg(not(unix))]
        {
            drop(self.stdin.get_ref());
        }

        match tokio::time::timeout(config.grace_period, self.child.wait()).await {
            Ok(Ok(_)) => {
                debug!("Child process exited gracefully");
                self.health.state = ConnectionState::Disconnected;
                Ok(())
            }
            _ => {
                debug!("Grace period elapsed, force-killing child process");
                self.force_shutdown().await
            }
        }
    }

    async fn force_shutdown(&mut self) -> Result<()> {
        let _ = self.child.kill().await;
        self.health.state = ConnectionState::Disconnected;
        Ok(())
    }

    async fn reset(&mut self) -> Result<()> {
        Err(TransportError::InternalError {
            message: "StdioClientTransport cannot be reset; spawn a new instance".to_string(),
        })
    }
}

#[cfg(unix)]
unsafe fn libc_kill(pid: i32, signal: i32) {
    extern "C" {
        fn kill(pid: i32, sig: i32) -> i32;
    }
    kill(pid, signal);
}
