//! Mock implementations for testing

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use ultrafast_mcp_core::protocol::JsonRpcMessage;
use ultrafast_mcp_transport::{ConnectionState, Transport, TransportError, TransportHealth};

/// Mock transport for testing without real network connections
pub struct MockTransport {
    pub sent_messages: Arc<Mutex<Vec<JsonRpcMessage>>>,
    pub receive_queue: Arc<Mutex<VecDeque<JsonRpcMessage>>>,
    pub state: Arc<Mutex<ConnectionState>>,
    pub should_fail_send: Arc<Mutex<bool>>,
    pub should_fail_receive: Arc<Mutex<bool>>,
    /// When true, an empty receive queue awaits the next `add_receive_message`
    /// instead of returning `ConnectionClosed`. Lets a session stay registered
    /// across a test's async steps instead of tearing down as soon as it runs
    /// dry, mirroring a real socket that blocks between messages.
    pub block_when_empty: Arc<Mutex<bool>>,
    pub notify: Arc<tokio::sync::Notify>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            sent_messages: Arc::new(Mutex::new(Vec::new())),
            receive_queue: Arc::new(Mutex::new(VecDeque::new())),
            state: Arc::new(Mutex::new(ConnectionState::Connected)),
            should_fail_send: Arc::new(Mutex::new(false)),
            should_fail_receive: Arc::new(Mutex::new(false)),
            block_when_empty: Arc::new(Mutex::new(false)),
            notify: Arc::new(tokio::sync::Notify::new()),
        }
    }

    /// Add a message to the receive queue
    pub fn add_receive_message(&self, message: JsonRpcMessage) {
        let mut queue = self.receive_queue.lock().unwrap();
        queue.push_back(message);
        self.notify.notify_one();
    }

    /// Keep `receive_message` waiting on an empty queue instead of closing.
    pub fn set_block_when_empty(&self, block: bool) {
        *self.block_when_empty.lock().unwrap() = block;
        if block {
            self.notify.notify_one();
        }
    }

    /// Get all sent messages
    pub fn get_sent_messages(&self) -> Vec<JsonRpcMessage> {
        self.sent_messages.lock().unwrap().clone()
    }

    /// Clear sent messages
    pub fn clear_sent_messages(&self) {
        self.sent_messages.lock().unwrap().clear();
    }

    /// Set whether send operations should fail
    pub fn set_fail_send(&self, should_fail: bool) {
        *self.should_fail_send.lock().unwrap() = should_fail;
    }

    /// Set whether receive operations should fail
    pub fn set_fail_receive(&self, should_fail: bool) {
        *self.should_fail_receive.lock().unwrap() = should_fail;
    }

    /// Set the connection state
    pub fn set_state(&self, state: ConnectionState) {
        *self.state.lock().unwrap() = state;
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Transport for MockTransport {
    async fn send_message(&mut self, message: JsonRpcMessage) -> Result<(), TransportError> {
        if *self.should_fail_send.lock().unwrap() {
            return Err(TransportError::ConnectionError {
                message: "Mock send failure".to_string(),
            });
        }

        let mut sent = self.sent_messages.lock().unwrap();
        sent.push(message);
        Ok(())
    }

    async fn receive_message(&mut self) -> Result<JsonRpcMessage, TransportError> {
        loop {
            if *self.should_fail_receive.lock().unwrap() {
                return Err(TransportError::ConnectionError {
                    message: "Mock receive failure".to_string(),
                });
            }

            if let Some(message) = self.receive_queue.lock().unwrap().pop_front() {
                return Ok(message);
            }

            if !*self.block_when_empty.lock().unwrap() {
                return Err(TransportError::ConnectionClosed);
            }

            self.notify.notified().await;
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.set_state(ConnectionState::Disconnected);
        Ok(())
    }

    fn get_state(&self) -> ConnectionState {
        self.state.lock().unwrap().clone()
    }

    fn get_health(&self) -> TransportHealth {
        TransportHealth {
            state: self.get_state(),
            last_activity: Some(std::time::SystemTime::now()),
            messages_sent: self.sent_messages.lock().unwrap().len() as u64,
            messages_received: 0, // Mock doesn't track this
            connection_duration: Some(std::time::Duration::from_secs(10)),
            error_count: 0,
            last_error: None,
        }
    }
}

/// Create a mock transport with predefined messages
pub fn create_mock_transport_with_messages(messages: Vec<JsonRpcMessage>) -> MockTransport {
    let transport = MockTransport::new();
    for message in messages {
        transport.add_receive_message(message);
    }
    transport
}

/// Create a mock transport that fails on send
pub fn create_failing_send_transport() -> MockTransport {
    let transport = MockTransport::new();
    transport.set_fail_send(true);
    transport
}

/// Create a mock transport that fails on receive
pub fn create_failing_receive_transport() -> MockTransport {
    let transport = MockTransport::new();
    transport.set_fail_receive(true);
    transport
}
