//! Tests for the resource/prompt/completion registries and the
//! framework-enforced validation built on top of them: registry fallback
//! when a handler returns nothing, URI-template matching gating
//! `resources/read`, required-argument checking gating `prompts/get`, and
//! reference validation gating `completion/complete`.

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::sleep;
    use ultrafast_mcp::{
        ClientCapabilities, ClientInfo, CompletionCapability, CompletionHandler, MCPResult,
        PromptHandler, PromptsCapability, Resource, ResourceHandler, ResourceTemplate,
        ResourcesCapability, ServerCapabilities, ServerInfo, UltraFastServer,
    };
    use ultrafast_mcp_core::protocol::jsonrpc::{
        JsonRpcMessage, JsonRpcRequest, JsonRpcResponse, RequestId,
    };
    use ultrafast_mcp_core::protocol::lifecycle::InitializeRequest;
    use ultrafast_mcp_core::types::completion::{CompleteRequest, CompleteResponse, Completion};
    use ultrafast_mcp_core::types::prompts::{
        GetPromptRequest, GetPromptResponse, ListPromptsRequest, ListPromptsResponse, Prompt,
        PromptArgument, PromptContent, PromptMessage, PromptRole,
    };
    use ultrafast_mcp_core::types::resources::{
        ListResourceTemplatesRequest, ListResourceTemplatesResponse, ListResourcesRequest,
        ListResourcesResponse, ReadResourceRequest, ReadResourceResponse, ResourceContent,
    };
    use ultrafast_mcp_test_utils::mocks::MockTransport;

    struct StubResourceHandler;

    #[async_trait]
    impl ResourceHandler for StubResourceHandler {
        async fn read_resource(
            &self,
            request: ReadResourceRequest,
        ) -> MCPResult<ReadResourceResponse> {
            Ok(ReadResourceResponse {
                contents: vec![ResourceContent::text(
                    request.uri,
                    "stub content".to_string(),
                )],
            })
        }

        async fn list_resources(
            &self,
            _request: ListResourcesRequest,
        ) -> MCPResult<ListResourcesResponse> {
            // Empty so the server falls back to its own registry.
            Ok(ListResourcesResponse {
                resources: vec![],
                next_cursor: None,
            })
        }

        async fn list_resource_templates(
            &self,
            _request: ListResourceTemplatesRequest,
        ) -> MCPResult<ListResourceTemplatesResponse> {
            Ok(ListResourceTemplatesResponse {
                resource_templates: vec![],
                next_cursor: None,
            })
        }
    }

    struct StubPromptHandler;

    #[async_trait]
    impl PromptHandler for StubPromptHandler {
        async fn get_prompt(&self, request: GetPromptRequest) -> MCPResult<GetPromptResponse> {
            Ok(GetPromptResponse {
                description: None,
                messages: vec![PromptMessage {
                    role: PromptRole::User,
                    content: PromptContent::Text {
                        text: format!("hello from {}", request.name),
                    },
                }],
            })
        }

        async fn list_prompts(
            &self,
            _request: ListPromptsRequest,
        ) -> MCPResult<ListPromptsResponse> {
            Ok(ListPromptsResponse {
                prompts: vec![],
                next_cursor: None,
            })
        }
    }

    struct StubCompletionHandler;

    #[async_trait]
    impl CompletionHandler for StubCompletionHandler {
        async fn complete(&self, _request: CompleteRequest) -> MCPResult<CompleteResponse> {
            Ok(CompleteResponse {
                completion: Completion::new(vec![]),
            })
        }
    }

    fn registry_test_server() -> UltraFastServer {
        let server_info = ServerInfo {
            name: "registry-test-server".to_string(),
            version: "1.0.0".to_string(),
            description: None,
            homepage: None,
            repository: None,
            authors: None,
            license: None,
        };

        let capabilities = ServerCapabilities {
            resources: Some(ResourcesCapability {
                subscribe: Some(false),
                list_changed: Some(true),
            }),
            prompts: Some(PromptsCapability {
                list_changed: Some(true),
            }),
            completion: Some(CompletionCapability {}),
            ..Default::default()
        };

        UltraFastServer::new(server_info, capabilities)
            .with_resource_handler(Arc::new(StubResourceHandler))
            .with_prompt_handler(Arc::new(StubPromptHandler))
            .with_completion_handler(Arc::new(StubCompletionHandler))
    }

    fn init_message(id: i64) -> JsonRpcMessage {
        JsonRpcMessage::Request(JsonRpcRequest::new(
            "initialize".to_string(),
            Some(
                serde_json::to_value(InitializeRequest {
                    protocol_version: "2025-06-18".to_string(),
                    capabilities: ClientCapabilities::default(),
                    client_info: ClientInfo {
                        name: "registry-test-client".to_string(),
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

    /// Find the response matching `id` among everything the transport has
    /// sent so far, polling briefly since the session loop processes
    /// messages asynchronously.
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

    /// Resources registered directly on the server (with no matching
    /// handler-side listing) surface through `resources/list`, the same
    /// fallback `tools/list` already had.
    #[tokio::test]
    async fn test_resources_list_falls_back_to_registry() {
        let server = registry_test_server();
        server
            .register_resource(Resource {
                uri: "file:///docs/readme".to_string(),
                name: "readme".to_string(),
                description: None,
                mime_type: None,
            })
            .await
            .expect("registration should succeed");

        let transport = MockTransport::new();
        transport.set_block_when_empty(true);
        let sent_messages = transport.sent_messages.clone();
        let receive_queue = transport.receive_queue.clone();
        let notify = transport.notify.clone();

        let server_for_task = server;
        let handle =
            tokio::spawn(async move { server_for_task.run_with_transport(Box::new(transport)).await });

        receive_queue.lock().unwrap().push_back(init_message(1));
        notify.notify_one();
        await_response(&sent_messages, 1).await;

        receive_queue
            .lock()
            .unwrap()
            .push_back(request_message("resources/list", json!({}), 2));
        notify.notify_one();
        let response = await_response(&sent_messages, 2).await;

        let result = response.result.expect("resources/list should succeed");
        let resources = result["resources"].as_array().expect("resources array");
        assert_eq!(resources.len(), 1);
        assert_eq!(resources[0]["uri"], "file:///docs/readme");

        handle.abort();
    }

    /// `resources/read` rejects a URI that matches neither a registered
    /// resource nor a registered template, without ever reaching the
    /// handler.
    #[tokio::test]
    async fn test_resources_read_rejects_unregistered_uri() {
        let server = registry_test_server();
        server
            .register_resource(Resource {
                uri: "file:///docs/readme".to_string(),
                name: "readme".to_string(),
                description: None,
                mime_type: None,
            })
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
            "resources/read",
            json!({"uri": "file:///docs/other"}),
            2,
        ));
        notify.notify_one();
        let response = await_response(&sent_messages, 2).await;

        let error = response.error.expect("should be rejected before the handler runs");
        assert_eq!(error.code, -32602);

        handle.abort();
    }

    /// `resources/read` accepts a URI that matches a registered template's
    /// shape, even though it was never registered verbatim.
    #[tokio::test]
    async fn test_resources_read_accepts_template_match() {
        let server = registry_test_server();
        server
            .register_resource_template(ResourceTemplate {
                uri_template: "file:///docs/{id}".to_string(),
                name: "doc".to_string(),
                description: None,
                mime_type: None,
            })
            .await
            .expect("template registration should succeed");

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
            "resources/read",
            json!({"uri": "file:///docs/42"}),
            2,
        ));
        notify.notify_one();
        let response = await_response(&sent_messages, 2).await;

        assert!(response.error.is_none(), "expected success, got {:?}", response.error);
        let result = response.result.expect("resources/read should succeed");
        assert_eq!(result["contents"][0]["text"], "stub content");

        handle.abort();
    }

    /// `prompts/get` rejects a call missing a required argument before the
    /// handler is invoked.
    #[tokio::test]
    async fn test_prompts_get_rejects_missing_required_argument() {
        let server = registry_test_server();
        server
            .register_prompt(Prompt {
                name: "code_review".to_string(),
                description: None,
                arguments: Some(vec![PromptArgument {
                    name: "language".to_string(),
                    description: None,
                    required: Some(true),
                }]),
            })
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
            "prompts/get",
            json!({"name": "code_review"}),
            2,
        ));
        notify.notify_one();
        let response = await_response(&sent_messages, 2).await;
        let error = response.error.expect("missing required argument should be rejected");
        assert_eq!(error.code, -32602);

        receive_queue.lock().unwrap().push_back(request_message(
            "prompts/get",
            json!({"name": "code_review", "arguments": {"language": "rust"}}),
            3,
        ));
        notify.notify_one();
        let response = await_response(&sent_messages, 3).await;
        assert!(response.error.is_none(), "expected success, got {:?}", response.error);

        handle.abort();
    }

    /// `completion/complete` rejects a reference to a prompt that was never
    /// registered, once the prompt registry has anything in it, but accepts
    /// a reference to one that was.
    #[tokio::test]
    async fn test_completion_rejects_unknown_prompt_reference() {
        let server = registry_test_server();
        server
            .register_prompt(Prompt {
                name: "greeting".to_string(),
                description: None,
                arguments: None,
            })
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
            "completion/complete",
            json!({"ref": "prompts", "name": "does_not_exist"}),
            2,
        ));
        notify.notify_one();
        let response = await_response(&sent_messages, 2).await;
        let error = response.error.expect("unknown prompt reference should be rejected");
        assert_eq!(error.code, -32602);

        receive_queue.lock().unwrap().push_back(request_message(
            "completion/complete",
            json!({"ref": "prompts", "name": "greeting"}),
            3,
        ));
        notify.notify_one();
        let response = await_response(&sent_messages, 3).await;
        assert!(response.error.is_none(), "expected success, got {:?}", response.error);

        handle.abort();
    }
}
