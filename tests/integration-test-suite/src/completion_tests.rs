//! Comprehensive MCP Completion Tests
//!
//! This test suite validates that the ultrafast-mcp implementation correctly handles
//! completion requests as specified in MCP 2025-06-18.

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use std::sync::Arc;
    use ultrafast_mcp::{
        ClientCapabilities, ClientInfo, CompletionCapability, CompletionHandler, MCPResult,
        ServerCapabilities, ServerInfo, UltraFastClient, UltraFastServer,
    };
    use ultrafast_mcp_core::types::completion::{
        CompleteRequest, CompleteResponse, Completion, CompletionValue,
    };

    // Mock completion handler for testing
    struct TestCompletionHandler;

    #[async_trait]
    impl CompletionHandler for TestCompletionHandler {
        async fn complete(&self, request: CompleteRequest) -> MCPResult<CompleteResponse> {
            let partial = request.argument.as_deref().unwrap_or("");

            let values = match (request.ref_type.as_str(), request.ref_name.as_str()) {
                ("prompts", "code_review") => {
                    let mut suggestions =
                        vec!["python", "pytorch", "pyside", "rust", "javascript", "typescript"];
                    suggestions.retain(|s| s.starts_with(partial));
                    suggestions
                }
                ("prompts", "greeting") => {
                    let mut suggestions = vec!["casual", "formal", "technical", "friendly"];
                    suggestions.retain(|s| s.starts_with(partial));
                    suggestions
                }
                ("resource_templates", _) => {
                    let mut suggestions = vec!["1", "2", "3", "4", "5"];
                    suggestions.retain(|s| s.starts_with(partial));
                    suggestions
                }
                _ => vec![],
            };

            Ok(CompleteResponse {
                completion: Completion::new(values.into_iter().map(CompletionValue::new).collect()),
            })
        }
    }

    fn create_test_server() -> UltraFastServer {
        let server_info = ServerInfo {
            name: "completion-test-server".to_string(),
            version: "1.0.0".to_string(),
            description: Some("Test server for completion tests".to_string()),
            authors: None,
            homepage: None,
            license: None,
            repository: None,
        };

        let capabilities = ServerCapabilities {
            completion: Some(CompletionCapability {}),
            ..Default::default()
        };

        UltraFastServer::new(server_info, capabilities)
            .with_completion_handler(Arc::new(TestCompletionHandler))
    }

    fn create_test_client() -> UltraFastClient {
        let client_info = ClientInfo {
            name: "completion-test-client".to_string(),
            version: "1.0.0".to_string(),
            authors: None,
            description: Some("Test client for completion tests".to_string()),
            homepage: None,
            repository: None,
            license: None,
        };

        let capabilities = ClientCapabilities::default();
        UltraFastClient::new(client_info, capabilities)
    }

    #[tokio::test]
    async fn test_completion_request_structure() {
        let request = CompleteRequest {
            ref_type: "prompts".to_string(),
            ref_name: "code_review".to_string(),
            argument: Some("py".to_string()),
        };

        assert_eq!(request.ref_type, "prompts");
        assert_eq!(request.ref_name, "code_review");
        assert_eq!(request.argument.as_deref(), Some("py"));
    }

    #[tokio::test]
    async fn test_completion_handler_basic() {
        let handler = TestCompletionHandler;

        let request = CompleteRequest {
            ref_type: "prompts".to_string(),
            ref_name: "code_review".to_string(),
            argument: Some("py".to_string()),
        };

        let response = handler.complete(request).await.unwrap();
        let values: Vec<&str> = response
            .completion
            .values
            .iter()
            .map(|v| v.value.as_str())
            .collect();
        assert!(values.contains(&"python"));
        assert!(values.contains(&"pytorch"));
        assert!(values.contains(&"pyside"));
    }

    #[tokio::test]
    async fn test_completion_filtering() {
        let handler = TestCompletionHandler;

        let request = CompleteRequest {
            ref_type: "prompts".to_string(),
            ref_name: "code_review".to_string(),
            argument: Some("pyt".to_string()),
        };

        let response = handler.complete(request).await.unwrap();
        let values: Vec<&str> = response
            .completion
            .values
            .iter()
            .map(|v| v.value.as_str())
            .collect();
        assert_eq!(values.len(), 2);
        assert!(values.contains(&"python"));
        assert!(values.contains(&"pytorch"));
    }

    #[tokio::test]
    async fn test_resource_template_completion() {
        let handler = TestCompletionHandler;

        let request = CompleteRequest {
            ref_type: "resource_templates".to_string(),
            ref_name: "file:///{id}".to_string(),
            argument: Some("1".to_string()),
        };

        let response = handler.complete(request).await.unwrap();
        let values: Vec<&str> = response
            .completion
            .values
            .iter()
            .map(|v| v.value.as_str())
            .collect();
        assert_eq!(values, vec!["1"]);
    }

    #[tokio::test]
    async fn test_completion_unknown_reference_is_empty() {
        let handler = TestCompletionHandler;

        let request = CompleteRequest {
            ref_type: "prompts".to_string(),
            ref_name: "does_not_exist".to_string(),
            argument: None,
        };

        let response = handler.complete(request).await.unwrap();
        assert!(response.completion.values.is_empty());
    }

    #[tokio::test]
    async fn test_completion_value_creation() {
        let basic = CompletionValue::new("test");
        assert_eq!(basic.value, "test");
        assert_eq!(basic.label, None);

        let with_label = CompletionValue::with_label("test", "Test Label");
        assert_eq!(with_label.label, Some("Test Label".to_string()));

        let with_description = CompletionValue::with_description("test", "Test Description");
        assert_eq!(with_description.description, Some("Test Description".to_string()));
    }

    #[tokio::test]
    async fn test_completion_serialization() {
        let original_request = CompleteRequest {
            ref_type: "prompts".to_string(),
            ref_name: "code_review".to_string(),
            argument: Some("py".to_string()),
        };

        let serialized = serde_json::to_string(&original_request).unwrap();
        let deserialized: CompleteRequest = serde_json::from_str(&serialized).unwrap();

        assert_eq!(original_request.ref_type, deserialized.ref_type);
        assert_eq!(original_request.ref_name, deserialized.ref_name);
        assert_eq!(original_request.argument, deserialized.argument);
    }

    #[tokio::test]
    async fn test_completion_server_integration() {
        let server = create_test_server();
        assert_eq!(server.info().name, "completion-test-server");
    }

    #[tokio::test]
    async fn test_completion_client_integration() {
        let client = create_test_client();
        assert_eq!(client.info().name, "completion-test-client");
    }
}
