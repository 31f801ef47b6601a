//! Tests for server-initiated requests and session lifecycle.
//!
//! Covers the session registry populated by `run_with_transport`, the
//! `send_request`/`handle_response` round trip used for
//! `sampling/createMessage` and `roots/list`, and the automatic
//! `list_changed` broadcast on tool registration.

#[cfg(test)]
mod tests {
    use serde_json::json;
    use std::time::Duration;
    use tokio::time::sleep;
    use ultrafast_mcp::{ServerCapabilities, ServerInfo, Tool, UltraFastServer};
    use ultrafast_mcp_core::protocol::{
        capabilities::ToolsCapability,
        jsonrpc::{JsonRpcMessage, JsonRpcResponse},
    };
    use ultrafast_mcp_core::types::roots::{ListRootsResponse, Root};
    use ultrafast_mcp_test_utils::mocks::MockTransport;

    fn create_session_test_server() -> UltraFastServer {
        let server_info = ServerInfo {
            name: "session-test-server".to_string(),
            version: "1.0.0".to_string(),
            description: None,
            homepage: None,
            repository: None,
            authors: None,
            license: None,
        };

        let capabilities = ServerCapabilities {
            tools: Some(ToolsCapability {
                list_changed: Some(true),
            }),
            ..Default::default()
        };

        UltraFastServer::new(server_info, capabilities)
    }

    fn echo_tool(name: &str) -> Tool {
        Tool {
            name: name.to_string(),
            description: "echoes its input".to_string(),
            input_schema: json!({"type": "object", "properties": {}}),
            output_schema: None,
            annotations: None,
        }
    }

    /// A session stays registered for as long as `run_with_transport`'s
    /// receive loop is running, and is removed once the loop exits.
    #[tokio::test]
    async fn test_session_registered_while_transport_runs() {
        let server = create_session_test_server();
        let transport = MockTransport::new();
        transport.set_block_when_empty(true);

        let server_for_task = server.clone();
        let handle = tokio::spawn(async move {
            server_for_task
                .run_with_transport(Box::new(transport))
                .await
        });

        sleep(Duration::from_millis(50)).await;
        let sessions = server.list_sessions().await;
        assert_eq!(sessions.len(), 1);

        handle.abort();
        sleep(Duration::from_millis(20)).await;
    }

    /// Registering a tool broadcasts `notifications/tools/list_changed` to
    /// every connected session without the caller having to reach for a
    /// transport handle itself.
    #[tokio::test]
    async fn test_register_tool_broadcasts_list_changed() {
        let server = create_session_test_server();
        let transport = MockTransport::new();
        transport.set_block_when_empty(true);
        let sent_messages = transport.sent_messages.clone();

        let server_for_task = server.clone();
        let handle = tokio::spawn(async move {
            server_for_task
                .run_with_transport(Box::new(transport))
                .await
        });

        sleep(Duration::from_millis(50)).await;

        server
            .register_tool(echo_tool("broadcast_tool"))
            .await
            .expect("registration should succeed");

        sleep(Duration::from_millis(50)).await;

        let sent = sent_messages.lock().unwrap();
        let saw_notification = sent.iter().any(|message| matches!(
            message,
            JsonRpcMessage::Notification(request)
                if request.method == "notifications/tools/list_changed"
        ));
        assert!(
            saw_notification,
            "expected a list_changed notification to have been sent, got: {sent:?}"
        );

        handle.abort();
    }

    /// Unregistering a tool also broadcasts, but only when something was
    /// actually removed.
    #[tokio::test]
    async fn test_unregister_tool_broadcasts_only_on_removal() {
        let server = create_session_test_server();
        server
            .register_tool(echo_tool("doomed_tool"))
            .await
            .expect("registration should succeed");

        let transport = MockTransport::new();
        transport.set_block_when_empty(true);
        let sent_messages = transport.sent_messages.clone();

        let server_for_task = server.clone();
        let handle = tokio::spawn(async move {
            server_for_task
                .run_with_transport(Box::new(transport))
                .await
        });

        sleep(Duration::from_millis(50)).await;

        assert!(!server.unregister_tool("does_not_exist").await);
        sleep(Duration::from_millis(20)).await;
        assert!(sent_messages.lock().unwrap().is_empty());

        assert!(server.unregister_tool("doomed_tool").await);
        sleep(Duration::from_millis(50)).await;
        let sent = sent_messages.lock().unwrap();
        assert_eq!(sent.len(), 1);

        handle.abort();
    }

    /// `request_roots_list` sends `roots/list` to the target session and
    /// resolves once a matching response arrives back through that
    /// session's receive loop, mirroring the client's own request
    /// bookkeeping in reverse.
    #[tokio::test]
    async fn test_request_roots_list_round_trip() {
        let server = create_session_test_server();
        let transport = MockTransport::new();
        transport.set_block_when_empty(true);
        let sent_messages = transport.sent_messages.clone();
        let receive_queue = transport.receive_queue.clone();
        let notify = transport.notify.clone();

        let server_for_task = server.clone();
        let handle = tokio::spawn(async move {
            server_for_task
                .run_with_transport(Box::new(transport))
                .await
        });

        sleep(Duration::from_millis(50)).await;
        let session_id = server
            .list_sessions()
            .await
            .into_iter()
            .next()
            .expect("session should be registered");

        let server_for_request = server.clone();
        let session_id_for_request = session_id.clone();
        let request_task = tokio::spawn(async move {
            server_for_request
                .request_roots_list(&session_id_for_request)
                .await
        });

        // Wait for the outbound roots/list request to reach the transport,
        // then reply with a matching response using its request id.
        sleep(Duration::from_millis(50)).await;
        let request_id = sent_messages
            .lock()
            .unwrap()
            .iter()
            .find_map(|message| match message {
                JsonRpcMessage::Request(request) if request.method == "roots/list" => {
                    request.id.clone()
                }
                _ => None,
            })
            .expect("server should have sent a roots/list request");

        let response = JsonRpcResponse::success(
            serde_json::to_value(ListRootsResponse {
                roots: vec![Root {
                    uri: "file:///tmp".to_string(),
                    name: Some("tmp".to_string()),
                    security: None,
                }],
            })
            .unwrap(),
            request_id,
        );
        receive_queue
            .lock()
            .unwrap()
            .push_back(JsonRpcMessage::Response(response));
        notify.notify_one();

        let result = tokio::time::timeout(Duration::from_secs(2), request_task)
            .await
            .expect("request_roots_list should not hang")
            .expect("task should not panic")
            .expect("request should resolve successfully");

        assert_eq!(result.roots.len(), 1);
        assert_eq!(result.roots[0].uri, "file:///tmp");

        handle.abort();
    }

    /// Sending a request to a session id that isn't connected fails fast
    /// instead of hanging.
    #[tokio::test]
    async fn test_send_request_unknown_session_errors() {
        let server = create_session_test_server();
        let result = server.request_roots_list("not-a-real-session").await;
        assert!(result.is_err());
    }
}
