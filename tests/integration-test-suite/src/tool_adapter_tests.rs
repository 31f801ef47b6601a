//! Tests for the tool adapter: a registered adapted tool is callable through
//! `tools/call` and listed through `tools/list` with no `ToolHandler` wired
//! up at all, argument coercion/validation happens before the callable runs,
//! thrown exceptions surface as an error result rather than a JSON-RPC
//! error, and duplicate registration is rejected except when merging.

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::sleep;
    use ultrafast_mcp::{
        AdaptedTool, ClientCapabilities, ClientInfo, Context, Json, ServerCapabilities,
        ServerInfo, ToolExecutionException, ToolsCapability, UltraFastServer, adapt_tool,
    };
    use ultrafast_mcp_core::protocol::jsonrpc::{
        JsonRpcMessage, JsonRpcRequest, JsonRpcResponse, RequestId,
    };
    use ultrafast_mcp_core::protocol::lifecycle::InitializeRequest;
    use ultrafast_mcp_test_utils::mocks::MockTransport;

    #[derive(Deserialize, schemars::JsonSchema)]
    struct EchoArgs {
        message: String,
    }

    async fn echo(args: EchoArgs, _ctx: Context) -> Result<Json<String>, ToolExecutionException> {
        Ok(Json(args.message))
    }

    #[derive(Deserialize, schemars::JsonSchema)]
    struct DivideArgs {
        numerator: f64,
        denominator: f64,
    }

    #[derive(Serialize)]
    struct DivideResult {
        quotient: f64,
    }

    async fn divide(
        args: DivideArgs,
        _ctx: Context,
    ) -> Result<Json<DivideResult>, ToolExecutionException> {
        if args.denominator == 0.0 {
            return Err(ToolExecutionException::new("division by zero"));
        }
        Ok(Json(DivideResult {
            quotient: args.numerator / args.denominator,
        }))
    }

    fn echo_tool() -> AdaptedTool {
        adapt_tool("echo", |args: EchoArgs, ctx: Context| echo(args, ctx))
    }

    fn divide_tool() -> AdaptedTool {
        adapt_tool("divide", |args: DivideArgs, ctx: Context| {
            divide(args, ctx)
        })
    }

    fn tool_test_server() -> UltraFastServer {
        let server_info = ServerInfo {
            name: "tool-adapter-test-server".to_string(),
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

    fn init_message(id: i64) -> JsonRpcMessage {
        JsonRpcMessage::Request(JsonRpcRequest::new(
            "initialize".to_string(),
            Some(
                serde_json::to_value(InitializeRequest {
                    protocol_version: "2025-06-18".to_string(),
                    capabilities: ClientCapabilities::default(),
                    client_info: ClientInfo {
                        name: "tool-adapter-test-client".to_string(),
                        version: "1.0.0".to_string(),
                        description: None,
                        authors: None,
                        homepage: None,
                        repository: None,
                        license: None,
                    },
                })
                .unwrap(),
            ),
            Some(RequestId::Number(id)),
        ))
    }

    fn request_message(method: &str, params: serde_json::Value, id: i64) -> JsonRpcMessage {
        JsonRpcMessage::Request(JsonRpcRequest::new(
            method.to_string(),
            Some(params),
            Some(RequestId::Number(id)),
        ))
    }

    async fn await_response(
        sent_messages: &Arc<std::sync::Mutex<Vec<JsonRpcMessage>>>,
        id: i64,
    ) -> JsonRpcResponse {
        for _ in 0..50 {
            if let Some(response) = sent_messages.lock().unwrap().iter().find_map(|m| match m {
                JsonRpcMessage::Response(r) if r.id == Some(RequestId::Number(id)) => {
                    Some(r.clone())
                }
                _ => None,
            }) {
                return response;
            }
            sleep(Duration::from_millis(20)).await;
        }
        panic!("no response with id {id} arrived in time");
    }

    #[tokio::test]
    async fn adapted_tool_is_listed_and_callable_with_no_tool_handler() {
        let server = tool_test_server();
        server
            .register_adapted_tool(echo_tool())
            .await
            .expect("registration should succeed");

        let transport = MockTransport::new();
        transport.set_block_when_empty(true);
        let sent_messages = transport.sent_messages.clone();
        let receive_queue = transport.receive_queue.clone();
        let notify = transport.notify.clone();

        let handle =
            tokio::spawn(async move { server.run_with_transport(Box::new(transport)).await });

        receive_queue.lock().unwrap().push_back(init_message(1));
        notify.notify_one();
        await_response(&sent_messages, 1).await;

        receive_queue
            .lock()
            .unwrap()
            .push_back(request_message("tools/list", json!({}), 2));
        notify.notify_one();
        let response = await_response(&sent_messages, 2).await;
        let result = response.result.expect("tools/list should succeed");
        let tools = result["tools"].as_array().expect("tools array");
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0]["name"], "echo");
        assert_eq!(tools[0]["inputSchema"]["type"], "object");

        receive_queue.lock().unwrap().push_back(request_message(
            "tools/call",
            json!({"name": "echo", "arguments": {"message": "hi"}}),
            3,
        ));
        notify.notify_one();
        let response = await_response(&sent_messages, 3).await;
        let result = response.result.expect("tools/call should succeed");
        assert_eq!(result["isError"], json!(false));
        assert_eq!(result["content"][0]["text"], "\"hi\"");

        handle.abort();
    }

    #[tokio::test]
    async fn thrown_exception_surfaces_as_error_result_not_jsonrpc_error() {
        let server = tool_test_server();
        server
            .register_adapted_tool(divide_tool())
            .await
            .expect("registration should succeed");

        let transport = MockTransport::new();
        transport.set_block_when_empty(true);
        let sent_messages = transport.sent_messages.clone();
        let receive_queue = transport.receive_queue.clone();
        let notify = transport.notify.clone();

        let handle =
            tokio::spawn(async move { server.run_with_transport(Box::new(transport)).await });

        receive_queue.lock().unwrap().push_back(init_message(1));
        notify.notify_one();
        await_response(&sent_messages, 1).await;

        receive_queue.lock().unwrap().push_back(request_message(
            "tools/call",
            json!({"name": "divide", "arguments": {"numerator": 1.0, "denominator": 0.0}}),
            2,
        ));
        notify.notify_one();
        let response = await_response(&sent_messages, 2).await;

        assert!(response.error.is_none(), "exceptions are not JSON-RPC errors");
        let result = response.result.expect("tools/call should still return a result");
        assert_eq!(result["isError"], json!(true));
        assert_eq!(result["content"][0]["text"], "division by zero");

        handle.abort();
    }

    #[tokio::test]
    async fn missing_required_argument_is_rejected_as_invalid_params() {
        let server = tool_test_server();
        server
            .register_adapted_tool(divide_tool())
            .await
            .expect("registration should succeed");

        let transport = MockTransport::new();
        transport.set_block_when_empty(true);
        let sent_messages = transport.sent_messages.clone();
        let receive_queue = transport.receive_queue.clone();
        let notify = transport.notify.clone();

        let handle =
            tokio::spawn(async move { server.run_with_transport(Box::new(transport)).await });

        receive_queue.lock().unwrap().push_back(init_message(1));
        notify.notify_one();
        await_response(&sent_messages, 1).await;

        receive_queue.lock().unwrap().push_back(request_message(
            "tools/call",
            json!({"name": "divide", "arguments": {"numerator": 1.0}}),
            2,
        ));
        notify.notify_one();
        let response = await_response(&sent_messages, 2).await;

        let error = response.error.expect("malformed arguments should be a JSON-RPC error");
        assert_eq!(error.code, -32602);

        handle.abort();
    }

    #[tokio::test]
    async fn duplicate_registration_is_rejected() {
        let server = tool_test_server();
        server
            .register_adapted_tool(echo_tool())
            .await
            .expect("first registration should succeed");

        let result = server.register_adapted_tool(echo_tool()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn merge_keeps_first_occurrence_on_name_collision() {
        let server = tool_test_server();

        let first = adapt_tool("echo", |args: EchoArgs, ctx: Context| async move {
            echo(EchoArgs { message: format!("first:{}", args.message) }, ctx).await
        });
        let second = adapt_tool("echo", |args: EchoArgs, ctx: Context| async move {
            echo(EchoArgs { message: format!("second:{}", args.message) }, ctx).await
        });

        server
            .register_adapted_tools_merge(vec![first, second])
            .await;

        assert_eq!(server.tool_count().await, 1);

        let result = server
            .execute_tool_call("echo", json!({"message": "hi"}))
            .await
            .expect("echo should still be callable");
        match &result.content[0] {
            ultrafast_mcp_core::types::tools::ToolContent::Text { text } => {
                assert_eq!(text, "\"first:hi\"");
            }
            other => panic!("expected text content, got {other:?}"),
        }
    }
}
