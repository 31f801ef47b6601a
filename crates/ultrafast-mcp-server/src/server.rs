//! UltraFastServer implementation module
//!
//! This module contains the main server implementation with all the core functionality.

use std::{borrow::Cow, collections::HashMap, sync::Arc};
use tokio::sync::{RwLock, oneshot};
use tracing::{error, info, warn};
use uuid::Uuid;

use ultrafast_mcp_core::{
    config::TimeoutConfig,
    error::{MCPError, MCPResult},
    protocol::{
        capabilities::ServerCapabilities,
        jsonrpc::{JsonRpcError, JsonRpcMessage, JsonRpcRequest, JsonRpcResponse, RequestId},
    },
    schema::validation::validate_tool_schema,
    types::{
        notifications::{LogLevel, LogLevelSetRequest, LogLevelSetResponse},
        prompts::Prompt,
        resources::{Resource, ResourceTemplate, SubscribeResponse},
        roots::{RootsListChangedNotification, SetRootsRequest, SetRootsResponse},
        server::ServerInfo,
        tools::Tool,
    },
    utils::{CancellationManager, PingManager},
};
#[cfg(feature = "http")]
use ultrafast_mcp_transport::{HttpSseTransport, HttpTransportConfig, HttpTransportProvider};
use ultrafast_mcp_transport::{Transport, TransportConfig, create_transport};

use crate::context::{Context, LoggerConfig};
use crate::handlers::*;
use crate::tool_adapter::{AdaptedTool, ToolAdapterError};

/// MCP Server state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerState {
    Uninitialized,
    Initializing,
    Initialized,
    Operating,
    ShuttingDown,
    Shutdown,
}

impl ServerState {
    /// Check if the server can accept operations
    /// According to MCP 2025-06-18 specification, operations are allowed
    /// once the server is initialized (after initialize response)
    pub fn can_operate(&self) -> bool {
        matches!(self, ServerState::Initialized | ServerState::Operating)
    }

    /// Check if the server is initialized
    pub fn is_initialized(&self) -> bool {
        matches!(self, ServerState::Initialized | ServerState::Operating)
    }

    /// Check if the server is shutting down
    pub fn is_shutting_down(&self) -> bool {
        matches!(self, ServerState::ShuttingDown | ServerState::Shutdown)
    }
}

/// Tool registration error
#[derive(Debug, thiserror::Error)]
pub enum ToolRegistrationError {
    #[error("Tool with name '{0}' already exists")]
    ToolAlreadyExists(String),
    #[error("Invalid tool schema: {0}")]
    InvalidSchema(String),
    #[error("Tool name '{0}' is reserved")]
    ReservedName(String),
    #[error("Tool description is required")]
    MissingDescription,
    #[error("Tool input schema is required")]
    MissingInputSchema,
    #[error("Tool output schema is required")]
    MissingOutputSchema,
}

/// Resource registration error
#[derive(Debug, thiserror::Error)]
pub enum ResourceRegistrationError {
    #[error("Resource with URI '{0}' already exists")]
    ResourceAlreadyExists(String),
    #[error("Resource template with URI template '{0}' already exists")]
    TemplateAlreadyExists(String),
    #[error("Resource URI is required")]
    MissingUri,
    #[error("Resource name is required")]
    MissingName,
    #[error("Invalid resource template: {0}")]
    InvalidTemplate(#[from] ultrafast_mcp_core::types::resources::TemplateError),
}

/// Prompt registration error
#[derive(Debug, thiserror::Error)]
pub enum PromptRegistrationError {
    #[error("Prompt with name '{0}' already exists")]
    PromptAlreadyExists(String),
    #[error("Prompt name is required")]
    MissingName,
}

/// Server logging configuration
#[derive(Debug, Clone)]
pub struct ServerLoggingConfig {
    /// Current minimum log level
    pub current_level: LogLevel,
    /// Whether clients can change the log level
    pub allow_level_changes: bool,
    /// Default logger configuration for new contexts
    pub default_logger_config: LoggerConfig,
}

impl Default for ServerLoggingConfig {
    fn default() -> Self {
        Self {
            current_level: LogLevel::Info,
            allow_level_changes: true,
            default_logger_config: LoggerConfig::default(),
        }
    }
}

/// MCP Server implementation
#[derive(Clone)]
pub struct UltraFastServer {
    info: ServerInfo,
    capabilities: ServerCapabilities,
    state: Arc<RwLock<ServerState>>,
    tools: Arc<RwLock<HashMap<String, Tool>>>,
    tool_adapters: Arc<RwLock<HashMap<String, Arc<AdaptedTool>>>>,
    resources: Arc<RwLock<HashMap<String, Resource>>>,
    resource_templates: Arc<RwLock<HashMap<String, ResourceTemplate>>>,
    prompts: Arc<RwLock<HashMap<String, Prompt>>>,
    tool_handler: Option<Arc<dyn ToolHandler>>,
    resource_handler: Option<Arc<dyn ResourceHandler>>,
    prompt_handler: Option<Arc<dyn PromptHandler>>,
    sampling_handler: Option<Arc<dyn SamplingHandler>>,
    completion_handler: Option<Arc<dyn CompletionHandler>>,
    roots_handler: Option<Arc<dyn RootsHandler>>,
    elicitation_handler: Option<Arc<dyn ElicitationHandler>>,
    subscription_handler: Option<Arc<dyn ResourceSubscriptionHandler>>,
    #[allow(dead_code)]
    resource_subscriptions: Arc<RwLock<HashMap<String, Vec<String>>>>,
    cancellation_manager: Arc<CancellationManager>,
    ping_manager: Arc<PingManager>,
    // Enhanced logging configuration
    logging_config: Arc<RwLock<ServerLoggingConfig>>,

    // Advanced handlers
    advanced_sampling_handler: Option<Arc<dyn AdvancedSamplingHandler>>,

    // Timeout configuration (MCP 2025-06-18 compliance)
    timeout_config: Arc<TimeoutConfig>,

    // Server-initiated requests (sampling/createMessage, roots/list): one
    // transport handle per connected session, and the outstanding requests
    // waiting on a matching response.
    sessions: Arc<RwLock<HashMap<String, Arc<RwLock<Box<dyn Transport>>>>>>,
    pending: Arc<RwLock<HashMap<serde_json::Value, oneshot::Sender<MCPResult<serde_json::Value>>>>>,
}

impl std::fmt::Debug for UltraFastServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UltraFastServer")
            .field("info", &self.info)
            .field("capabilities", &self.capabilities)
            .finish()
    }
}

impl UltraFastServer {
    /// Create a new UltraFastServer with the given info and capabilities
    pub fn new(info: ServerInfo, capabilities: ServerCapabilities) -> Self {
        Self {
            info,
            capabilities,
            state: Arc::new(RwLock::new(ServerState::Uninitialized)),
            tools: Arc::new(RwLock::new(HashMap::new())),
            tool_adapters: Arc::new(RwLock::new(HashMap::new())),
            resources: Arc::new(RwLock::new(HashMap::new())),
            resource_templates: Arc::new(RwLock::new(HashMap::new())),
            prompts: Arc::new(RwLock::new(HashMap::new())),
            tool_handler: None,
            resource_handler: None,
            prompt_handler: None,
            sampling_handler: None,
            completion_handler: None,
            roots_handler: None,
            elicitation_handler: None,
            subscription_handler: None,
            resource_subscriptions: Arc::new(RwLock::new(HashMap::new())),
            cancellation_manager: Arc::new(CancellationManager::new()),
            ping_manager: Arc::new(PingManager::default()),
            logging_config: Arc::new(RwLock::new(ServerLoggingConfig::default())),

            // Advanced handlers
            advanced_sampling_handler: None,

            // Timeout configuration (MCP 2025-06-18 compliance)
            timeout_config: Arc::new(TimeoutConfig::default()),

            sessions: Arc::new(RwLock::new(HashMap::new())),
            pending: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Configure server logging
    pub async fn set_logging_config(&self, config: ServerLoggingConfig) {
        let mut logging_config = self.logging_config.write().await;
        *logging_config = config;
        info!("Server logging configuration updated");
    }

    /// Get current server logging configuration
    pub async fn get_logging_config(&self) -> ServerLoggingConfig {
        self.logging_config.read().await.clone()
    }

    /// Set timeout configuration
    pub fn with_timeout_config(mut self, config: TimeoutConfig) -> Self {
        self.timeout_config = Arc::new(config);
        self
    }

    /// Get current timeout configuration
    pub fn get_timeout_config(&self) -> TimeoutConfig {
        (*self.timeout_config).clone()
    }

    /// Set timeout configuration for high-performance scenarios
    pub fn with_high_performance_timeouts(mut self) -> Self {
        self.timeout_config = Arc::new(TimeoutConfig::high_performance());
        self
    }

    /// Set timeout configuration for long-running operations
    pub fn with_long_running_timeouts(mut self) -> Self {
        self.timeout_config = Arc::new(TimeoutConfig::long_running());
        self
    }

    /// Get timeout for a specific operation
    pub fn get_operation_timeout(&self, operation: &str) -> std::time::Duration {
        self.timeout_config.get_timeout_for_operation(operation)
    }

    /// Validate timeout configuration
    pub fn validate_timeout_config(&self) -> Result<(), String> {
        let config = &self.timeout_config;

        // Validate all timeouts are within bounds
        if !config.validate_timeout(config.connect_timeout) {
            return Err("Connect timeout is out of bounds".to_string());
        }
        if !config.validate_timeout(config.request_timeout) {
            return Err("Request timeout is out of bounds".to_string());
        }
        if !config.validate_timeout(config.response_timeout) {
            return Err("Response timeout is out of bounds".to_string());
        }
        if !config.validate_timeout(config.tool_execution_timeout) {
            return Err("Tool execution timeout is out of bounds".to_string());
        }
        if !config.validate_timeout(config.resource_read_timeout) {
            return Err("Resource read timeout is out of bounds".to_string());
        }
        if !config.validate_timeout(config.prompt_generation_timeout) {
            return Err("Prompt generation timeout is out of bounds".to_string());
        }
        if !config.validate_timeout(config.sampling_timeout) {
            return Err("Sampling timeout is out of bounds".to_string());
        }
        if !config.validate_timeout(config.completion_timeout) {
            return Err("Completion timeout is out of bounds".to_string());
        }
        if !config.validate_timeout(config.shutdown_timeout) {
            return Err("Shutdown timeout is out of bounds".to_string());
        }
        if !config.validate_timeout(config.heartbeat_interval) {
            return Err("Heartbeat interval is out of bounds".to_string());
        }

        Ok(())
    }

    /// Set the current log level
    pub async fn set_log_level(&self, level: LogLevel) -> MCPResult<()> {
        let mut logging_config = self.logging_config.write().await;

        if !logging_config.allow_level_changes {
            return Err(MCPError::invalid_request(
                "Log level changes are not allowed on this server".to_string(),
            ));
        }

        logging_config.current_level = level.clone();
        logging_config.default_logger_config.min_level = level.clone();

        info!("Server log level changed to: {:?}", level);
        Ok(())
    }

    /// Get the current log level
    pub async fn get_log_level(&self) -> LogLevel {
        self.logging_config.read().await.current_level.clone()
    }

    // ===== FLUENT BUILDER METHODS =====

    /// Create a context with the current server logging configuration
    pub async fn create_context(&self) -> Context {
        let logging_config = self.logging_config.read().await;
        let logger_config = logging_config.default_logger_config.clone();

        Context::new().with_logger_config(logger_config)
    }

    /// Create a context with custom request and session IDs
    pub async fn create_context_with_ids(
        &self,
        request_id: String,
        session_id: Option<String>,
    ) -> Context {
        let logging_config = self.logging_config.read().await;
        let logger_config = logging_config.default_logger_config.clone();

        let mut context = Context::new()
            .with_request_id(request_id)
            .with_logger_config(logger_config);

        if let Some(session_id) = session_id {
            context = context.with_session_id(session_id);
        }

        context
    }

    /// Register a tool with validation
    pub async fn register_tool(&self, tool: Tool) -> Result<(), ToolRegistrationError> {
        // Validate tool name
        if tool.name.is_empty() {
            return Err(ToolRegistrationError::MissingDescription);
        }

        if self.is_reserved_name(&tool.name) {
            return Err(ToolRegistrationError::ReservedName(tool.name.clone()));
        }

        // Validate required fields
        if tool.description.is_empty() {
            return Err(ToolRegistrationError::MissingDescription);
        }

        // Validate tool schema
        if let Err(e) = validate_tool_schema(&tool.input_schema) {
            return Err(ToolRegistrationError::InvalidSchema(format!(
                "Input schema: {e}"
            )));
        }

        if let Some(output_schema) = &tool.output_schema {
            if let Err(e) = validate_tool_schema(output_schema) {
                return Err(ToolRegistrationError::InvalidSchema(format!(
                    "Output schema: {e}"
                )));
            }
        } else {
            return Err(ToolRegistrationError::MissingOutputSchema);
        }

        // Check for existing tool
        let mut tools = self.tools.write().await;
        if tools.contains_key(&tool.name) {
            return Err(ToolRegistrationError::ToolAlreadyExists(tool.name.clone()));
        }

        // Register the tool
        let tool_name = tool.name.clone();
        tools.insert(tool_name.clone(), tool);
        drop(tools);
        info!("Registered tool: {}", tool_name);

        let notification =
            ultrafast_mcp_core::types::notifications::ToolsListChangedNotification::new();
        self.broadcast_notification(
            "notifications/tools/list_changed",
            serde_json::to_value(notification).ok(),
        )
        .await;

        Ok(())
    }

    /// Register multiple tools
    pub async fn register_tools(&self, tools: Vec<Tool>) -> Result<(), ToolRegistrationError> {
        for tool in tools {
            self.register_tool(tool).await?;
        }
        Ok(())
    }

    /// Unregister a tool by name
    pub async fn unregister_tool(&self, name: &str) -> bool {
        let removed = self.tools.write().await.remove(name).is_some();
        self.tool_adapters.write().await.remove(name);
        if removed {
            let notification =
                ultrafast_mcp_core::types::notifications::ToolsListChangedNotification::new();
            self.broadcast_notification(
                "notifications/tools/list_changed",
                serde_json::to_value(notification).ok(),
            )
            .await;
        }
        removed
    }

    /// Register an [`AdaptedTool`]: a Rust callable wrapped into a tool,
    /// carrying both its `Tool` metadata and its own invoker. Unlike
    /// [`register_tool`](Self::register_tool), no output schema is required —
    /// the callable's return value is converted at call time, not declared
    /// up front.
    pub async fn register_adapted_tool(
        &self,
        adapted: AdaptedTool,
    ) -> Result<(), ToolRegistrationError> {
        if self.is_reserved_name(&adapted.tool.name) {
            return Err(ToolRegistrationError::ReservedName(adapted.tool.name.clone()));
        }

        let mut tool_adapters = self.tool_adapters.write().await;
        let mut tools = self.tools.write().await;
        if tool_adapters.contains_key(&adapted.tool.name) || tools.contains_key(&adapted.tool.name)
        {
            return Err(ToolRegistrationError::ToolAlreadyExists(
                adapted.tool.name.clone(),
            ));
        }

        let name = adapted.tool.name.clone();
        tools.insert(name.clone(), adapted.tool.clone());
        tool_adapters.insert(name.clone(), Arc::new(adapted));
        drop(tools);
        drop(tool_adapters);
        info!("Registered adapted tool: {}", name);

        let notification =
            ultrafast_mcp_core::types::notifications::ToolsListChangedNotification::new();
        self.broadcast_notification(
            "notifications/tools/list_changed",
            serde_json::to_value(notification).ok(),
        )
        .await;

        Ok(())
    }

    /// Register many adapted tools, keeping the first occurrence of any
    /// name collision instead of rejecting the whole batch — the behavior a
    /// merge of several tool sources (e.g. from different upstream servers)
    /// needs, as opposed to [`register_adapted_tool`](Self::register_adapted_tool)'s
    /// strict one-at-a-time uniqueness check.
    pub async fn register_adapted_tools_merge(&self, adapted_tools: Vec<AdaptedTool>) {
        for adapted in adapted_tools {
            let already_present = {
                let tool_adapters = self.tool_adapters.read().await;
                let tools = self.tools.read().await;
                tool_adapters.contains_key(&adapted.tool.name)
                    || tools.contains_key(&adapted.tool.name)
            };
            if already_present {
                continue;
            }
            let _ = self.register_adapted_tool(adapted).await;
        }
    }

    /// Get a tool by name
    pub async fn get_tool(&self, name: &str) -> Option<Tool> {
        let tools = self.tools.read().await;
        tools.get(name).cloned()
    }

    /// List all registered tools
    pub async fn list_tools(&self) -> Vec<Tool> {
        let tools = self.tools.read().await;
        tools.values().cloned().collect()
    }

    /// Check if a tool exists
    pub async fn has_tool(&self, name: &str) -> bool {
        let tools = self.tools.read().await;
        tools.contains_key(name)
    }

    /// Get tool count
    pub async fn tool_count(&self) -> usize {
        let tools = self.tools.read().await;
        tools.len()
    }

    /// Clear all tools
    pub async fn clear_tools(&self) {
        let mut tools = self.tools.write().await;
        let count = tools.len();
        tools.clear();
        info!("Cleared {} tools", count);
    }

    /// Register a resource with the framework's registry. Listed via
    /// `resources/list` and checked by `resources/read` before a configured
    /// `ResourceHandler` is asked for content, the same way `register_tool`
    /// feeds `tools/list`/`tools/call`.
    pub async fn register_resource(
        &self,
        resource: Resource,
    ) -> Result<(), ResourceRegistrationError> {
        if resource.uri.is_empty() {
            return Err(ResourceRegistrationError::MissingUri);
        }
        if resource.name.is_empty() {
            return Err(ResourceRegistrationError::MissingName);
        }

        let mut resources = self.resources.write().await;
        if resources.contains_key(&resource.uri) {
            return Err(ResourceRegistrationError::ResourceAlreadyExists(
                resource.uri.clone(),
            ));
        }

        let uri = resource.uri.clone();
        resources.insert(uri.clone(), resource);
        drop(resources);
        info!("Registered resource: {}", uri);

        self.broadcast_resources_changed().await;
        Ok(())
    }

    /// Register multiple resources
    pub async fn register_resources(
        &self,
        resources: Vec<Resource>,
    ) -> Result<(), ResourceRegistrationError> {
        for resource in resources {
            self.register_resource(resource).await?;
        }
        Ok(())
    }

    /// Unregister a resource by URI
    pub async fn unregister_resource(&self, uri: &str) -> bool {
        let removed = self.resources.write().await.remove(uri).is_some();
        if removed {
            self.broadcast_resources_changed().await;
        }
        removed
    }

    /// Get a registered resource by URI
    pub async fn get_resource(&self, uri: &str) -> Option<Resource> {
        self.resources.read().await.get(uri).cloned()
    }

    /// List all registered resources
    pub async fn list_resources(&self) -> Vec<Resource> {
        self.resources.read().await.values().cloned().collect()
    }

    /// Register a resource template, validating it against RFC 6570 template
    /// rules before it's used to match incoming `resources/read` URIs.
    pub async fn register_resource_template(
        &self,
        template: ResourceTemplate,
    ) -> Result<(), ResourceRegistrationError> {
        template.validate()?;

        let mut templates = self.resource_templates.write().await;
        if templates.contains_key(&template.uri_template) {
            return Err(ResourceRegistrationError::TemplateAlreadyExists(
                template.uri_template.clone(),
            ));
        }

        let uri_template = template.uri_template.clone();
        templates.insert(uri_template.clone(), template);
        drop(templates);
        info!("Registered resource template: {}", uri_template);

        self.broadcast_resources_changed().await;
        Ok(())
    }

    /// Unregister a resource template by its URI template string
    pub async fn unregister_resource_template(&self, uri_template: &str) -> bool {
        let removed = self
            .resource_templates
            .write()
            .await
            .remove(uri_template)
            .is_some();
        if removed {
            self.broadcast_resources_changed().await;
        }
        removed
    }

    /// List all registered resource templates
    pub async fn list_resource_templates(&self) -> Vec<ResourceTemplate> {
        self.resource_templates
            .read()
            .await
            .values()
            .cloned()
            .collect()
    }

    /// Whether a URI is covered by the registry: an exact resource match, or
    /// the shape of a registered template. Returns `true` (nothing to check)
    /// when no resources or templates have been registered at all, so
    /// handler-only servers that never touch the registry keep full control
    /// over `resources/read` validation.
    async fn resource_uri_is_registered(&self, uri: &str) -> bool {
        let resources = self.resources.read().await;
        if resources.is_empty() {
            drop(resources);
            let templates = self.resource_templates.read().await;
            if templates.is_empty() {
                return true;
            }
            return templates.values().any(|t| t.matches(uri));
        }
        if resources.contains_key(uri) {
            return true;
        }
        drop(resources);
        self.resource_templates
            .read()
            .await
            .values()
            .any(|t| t.matches(uri))
    }

    async fn broadcast_resources_changed(&self) {
        let notification =
            ultrafast_mcp_core::types::notifications::ResourcesListChangedNotification::new();
        self.broadcast_notification(
            "notifications/resources/list_changed",
            serde_json::to_value(notification).ok(),
        )
        .await;
    }

    /// Register a prompt with the framework's registry, mirroring
    /// `register_tool`'s uniqueness enforcement and `list_changed` broadcast.
    pub async fn register_prompt(&self, prompt: Prompt) -> Result<(), PromptRegistrationError> {
        if prompt.name.is_empty() {
            return Err(PromptRegistrationError::MissingName);
        }

        let mut prompts = self.prompts.write().await;
        if prompts.contains_key(&prompt.name) {
            return Err(PromptRegistrationError::PromptAlreadyExists(
                prompt.name.clone(),
            ));
        }

        let name = prompt.name.clone();
        prompts.insert(name.clone(), prompt);
        drop(prompts);
        info!("Registered prompt: {}", name);

        self.broadcast_prompts_changed().await;
        Ok(())
    }

    /// Register multiple prompts
    pub async fn register_prompts(
        &self,
        prompts: Vec<Prompt>,
    ) -> Result<(), PromptRegistrationError> {
        for prompt in prompts {
            self.register_prompt(prompt).await?;
        }
        Ok(())
    }

    /// Unregister a prompt by name
    pub async fn unregister_prompt(&self, name: &str) -> bool {
        let removed = self.prompts.write().await.remove(name).is_some();
        if removed {
            self.broadcast_prompts_changed().await;
        }
        removed
    }

    /// Get a registered prompt by name
    pub async fn get_prompt(&self, name: &str) -> Option<Prompt> {
        self.prompts.read().await.get(name).cloned()
    }

    /// List all registered prompts
    pub async fn list_prompts(&self) -> Vec<Prompt> {
        self.prompts.read().await.values().cloned().collect()
    }

    /// Validate requested arguments against a registered prompt's declared
    /// arguments: every argument marked `required` must be present.
    pub async fn validate_prompt_arguments(
        &self,
        name: &str,
        arguments: Option<&serde_json::Value>,
    ) -> Result<(), MCPError> {
        let Some(prompt) = self.get_prompt(name).await else {
            return Ok(());
        };
        let Some(declared) = &prompt.arguments else {
            return Ok(());
        };

        for arg in declared {
            if arg.required == Some(true) {
                let present = arguments
                    .and_then(|values| values.get(&arg.name))
                    .is_some();
                if !present {
                    return Err(MCPError::invalid_request(format!(
                        "Prompt '{name}' is missing required argument '{}'",
                        arg.name
                    )));
                }
            }
        }
        Ok(())
    }

    async fn broadcast_prompts_changed(&self) {
        let notification =
            ultrafast_mcp_core::types::notifications::PromptsListChangedNotification::new();
        self.broadcast_notification(
            "notifications/prompts/list_changed",
            serde_json::to_value(notification).ok(),
        )
        .await;
    }

    /// Check if a name is reserved
    fn is_reserved_name(&self, name: &str) -> bool {
        // MCP reserved method names
        let reserved_names = [
            "initialize",
            "initialized",
            "shutdown",
            "exit",
            "ping",
            "tools/list",
            "tools/call",
            "resources/list",
            "resources/read",
            "resources/subscribe",
            "resources/unsubscribe",
            "prompts/list",
            "prompts/get",
            "sampling/create",
            "completion/complete",
            "roots/list",
            "elicitation/request",
            "logging/setLevel",
        ];

        reserved_names.contains(&name)
    }

    /// Validate tool call arguments against tool schema
    pub async fn validate_tool_call(
        &self,
        tool_name: &str,
        arguments: &serde_json::Value,
    ) -> Result<(), MCPError> {
        let tool = self.get_tool(tool_name).await;
        let tool =
            tool.ok_or_else(|| MCPError::invalid_request(format!("Tool '{tool_name}' not found")))?;

        ultrafast_mcp_core::schema::validation::validate_tool_input(arguments, &tool.input_schema)
            .map_err(|e| {
                MCPError::invalid_request(format!(
                    "Tool '{tool_name}' input validation failed: {e}"
                ))
            })?;

        Ok(())
    }

    /// Execute a tool call with validation
    pub async fn execute_tool_call(
        &self,
        tool_name: &str,
        arguments: serde_json::Value,
    ) -> Result<ultrafast_mcp_core::types::tools::ToolResult, MCPError> {
        // Validate the tool call
        self.validate_tool_call(tool_name, &arguments).await?;

        // An adapted tool carries its own invoker; prefer it over the
        // catch-all handler so register_adapted_tool callers don't also need
        // to wire a ToolHandler just to make their tools callable.
        if let Some(adapted) = self.tool_adapters.read().await.get(tool_name).cloned() {
            let ctx = self.create_context().await;
            return adapted.invoke(arguments, ctx).await.map_err(|e| match e {
                ToolAdapterError::InvalidArguments(msg) => MCPError::invalid_params(msg),
            });
        }

        // Get the tool handler
        let tool_handler = self
            .tool_handler
            .as_ref()
            .ok_or_else(|| MCPError::internal_error("No tool handler configured".to_string()))?;

        // Create the tool call
        let tool_call = ultrafast_mcp_core::types::tools::ToolCall {
            name: tool_name.to_string(),
            arguments: Some(arguments),
        };

        // Execute the tool call
        tool_handler
            .handle_tool_call(tool_call)
            .await
            .map_err(|e| MCPError::internal_error(format!("Tool execution failed: {e}")))
    }

    /// Add a tool handler to the server
    pub fn with_tool_handler(mut self, handler: Arc<dyn ToolHandler>) -> Self {
        self.tool_handler = Some(handler);
        self
    }

    /// Add a resource handler to the server
    pub fn with_resource_handler(mut self, handler: Arc<dyn ResourceHandler>) -> Self {
        self.resource_handler = Some(handler);
        self
    }

    /// Add a prompt handler to the server
    pub fn with_prompt_handler(mut self, handler: Arc<dyn PromptHandler>) -> Self {
        self.prompt_handler = Some(handler);
        self
    }

    /// Add a sampling handler to the server
    pub fn with_sampling_handler(mut self, handler: Arc<dyn SamplingHandler>) -> Self {
        self.sampling_handler = Some(handler);
        self
    }

    /// Add a completion handler to the server
    pub fn with_completion_handler(mut self, handler: Arc<dyn CompletionHandler>) -> Self {
        self.completion_handler = Some(handler);
        self
    }

    /// Add a roots handler to the server
    pub fn with_roots_handler(mut self, handler: Arc<dyn RootsHandler>) -> Self {
        self.roots_handler = Some(handler);
        // Note: Roots is a client capability, not server capability
        // The server responds to roots requests but doesn't advertise it
        self
    }

    /// Add an elicitation handler to the server
    pub fn with_elicitation_handler(mut self, handler: Arc<dyn ElicitationHandler>) -> Self {
        self.elicitation_handler = Some(handler);
        // Note: Elicitation is a client capability, not server capability
        // The server responds to elicitation requests but doesn't advertise it
        self
    }

    /// Add a subscription handler to the server
    pub fn with_subscription_handler(
        mut self,
        handler: Arc<dyn ResourceSubscriptionHandler>,
    ) -> Self {
        self.subscription_handler = Some(handler);
        self
    }

    /// Configure logging with a custom configuration
    pub fn with_logging_config(mut self, config: ServerLoggingConfig) -> Self {
        let logging_config = Arc::get_mut(&mut self.logging_config)
            .expect("Cannot modify logging config after server has been cloned");
        *logging_config.get_mut() = config;
        self
    }

    /// Run the server with stdio transport
    pub async fn run_stdio(&self) -> MCPResult<()> {
        let transport = create_transport(TransportConfig::Stdio)
            .await
            .map_err(|e| MCPError::internal_error(format!("Transport creation failed: {e}")))?;
        self.run_with_transport(transport).await
    }

    /// Run the server with a custom transport
    ///
    /// The transport is registered under a fresh session id for the
    /// duration of the loop, so `send_request`/`send_notification` and the
    /// `notify_*` broadcast helpers can reach this connection from outside
    /// the inbound message handler (e.g. from `register_tool`).
    pub async fn run_with_transport(&self, transport: Box<dyn Transport>) -> MCPResult<()> {
        info!("Starting UltraFastServer with transport");

        // Initialize the server
        *self.state.write().await = ServerState::Initializing;

        let session_id = Uuid::new_v4().to_string();
        let transport = Arc::new(RwLock::new(transport));
        self.sessions
            .write()
            .await
            .insert(session_id.clone(), transport.clone());

        // Start message handling loop
        loop {
            let received = transport.write().await.receive_message().await;
            match received {
                Ok(message) => {
                    if let Err(e) = self.handle_message(message, &transport).await {
                        error!("Error handling message: {}", e);
                    }
                }
                Err(e) => {
                    error!("Transport error: {}", e);
                    break;
                }
            }
        }

        self.sessions.write().await.remove(&session_id);
        // Any requests still waiting on this session resolve via their own
        // timeout in `send_request` rather than being cancelled eagerly here.

        Ok(())
    }

    /// Run the server with the HTTP+SSE transport, binding `host:port`.
    #[cfg(feature = "http")]
    pub async fn run_http(&self, host: &str, port: u16) -> MCPResult<()> {
        let config = HttpTransportConfig {
            host: host.to_string(),
            port,
            ..Default::default()
        };
        self.run_http_with_config(config).await
    }

    /// Run the server with a custom HTTP+SSE transport configuration.
    ///
    /// Each accepted SSE connection becomes its own session: the provider's
    /// session factory hands a fresh [`HttpSseTransport`] to a spawned copy
    /// of `run_with_transport`, so sessions run their message loops fully
    /// independently of one another.
    #[cfg(feature = "http")]
    pub async fn run_http_with_config(&self, config: HttpTransportConfig) -> MCPResult<()> {
        info!("Starting HTTP+SSE transport server with config: {:?}", config);

        let provider = HttpTransportProvider::new(config);
        let server = self.clone();
        provider
            .set_session_factory(Arc::new(move |transport: HttpSseTransport| {
                let server = server.clone();
                Box::pin(async move {
                    let session_id = transport.session_id().to_string();
                    if let Err(e) = server.run_with_transport(Box::new(transport)).await {
                        error!("HTTP session {} ended with error: {}", session_id, e);
                    }
                })
            }))
            .await;

        provider
            .run()
            .await
            .map_err(|e| MCPError::internal_error(format!("HTTP server failed: {e}")))
    }

    /// Get server info
    pub fn info(&self) -> &ServerInfo {
        &self.info
    }

    /// Get cancellation manager
    pub fn cancellation_manager(&self) -> Arc<CancellationManager> {
        self.cancellation_manager.clone()
    }

    /// Get ping manager
    pub fn ping_manager(&self) -> Arc<PingManager> {
        self.ping_manager.clone()
    }

    /// Start periodic ping monitoring (optional, for connection health)
    /// This method should be called after the server is running with a transport
    pub async fn start_ping_monitoring(&self, ping_interval: std::time::Duration) -> MCPResult<()> {
        info!(
            "Starting periodic ping monitoring with interval: {:?}",
            ping_interval
        );

        // Note: This is a placeholder for future implementation
        // The actual ping monitoring would need to be integrated with the transport layer
        // For now, we log that ping monitoring is enabled
        info!("Ping monitoring enabled (interval: {:?})", ping_interval);

        // The PingManager is already configured with default intervals
        // Future implementation would integrate with the transport layer
        // to send periodic pings to clients

        Ok(())
    }

    /// Stop ping monitoring
    pub async fn stop_ping_monitoring(&self) -> MCPResult<()> {
        info!("Stopping periodic ping monitoring");
        // The ping monitoring task will naturally stop when the transport is closed
        Ok(())
    }

    /// Handle MCP initialize request
    async fn handle_initialize(
        &self,
        request: ultrafast_mcp_core::protocol::InitializeRequest,
    ) -> Result<ultrafast_mcp_core::protocol::InitializeResponse, MCPError> {
        info!(
            "Handling initialize request from client: {} (version: {})",
            request.client_info.name, request.protocol_version
        );

        // Negotiate protocol version
        let negotiated_version = match ultrafast_mcp_core::protocol::version::negotiate_version(
            &request.protocol_version,
        ) {
            Ok(version) => {
                info!(
                    "Protocol version negotiated: {} -> {}",
                    request.protocol_version, version
                );
                version
            }
            Err(e) => {
                error!("Protocol version negotiation failed: {}", e);
                return Err(MCPError::invalid_request(format!(
                    "Protocol version negotiation failed: {}. Supported versions: {:?}",
                    e,
                    ultrafast_mcp_core::protocol::version::SUPPORTED_VERSIONS
                )));
            }
        };

        // Validate the initialize request
        if let Err(e) = request.validate_protocol_version() {
            warn!("Initialize request validation warning: {}", e);
            // Continue with warning but don't fail
        }

        // Validate compatibility
        if let Err(e) = ultrafast_mcp_core::protocol::capabilities::validate_compatibility(
            &request.capabilities,
            &self.capabilities,
        ) {
            error!("Capability validation failed: {}", e);
            return Err(MCPError::Protocol(
                ultrafast_mcp_core::error::ProtocolError::CapabilityNotSupported(e),
            ));
        }

        info!("Capabilities validated successfully");

        // Update server state to Initialized (not Operating yet)
        // This follows MCP 2025-06-18 specification: server should wait for initialized notification
        {
            let mut state = self.state.write().await;
            *state = ServerState::Initialized;
        }

        info!(
            "Server initialized with protocol version: {} (waiting for initialized notification)",
            negotiated_version
        );

        Ok(ultrafast_mcp_core::protocol::InitializeResponse {
            protocol_version: negotiated_version,
            capabilities: self.capabilities.clone(),
            server_info: self.info.clone(),
            instructions: None,
        })
    }

    /// Handle MCP initialized notification
    async fn handle_initialized(
        &self,
        _notification: ultrafast_mcp_core::protocol::InitializedNotification,
    ) -> MCPResult<()> {
        info!("Received initialized notification from client");

        // Ensure server state is operating (it should already be from initialize)
        {
            let mut state = self.state.write().await;
            *state = ServerState::Operating;
        }

        info!("Server confirmed operating state via initialized notification");
        Ok(())
    }

    /// Handle MCP shutdown request
    async fn handle_shutdown(
        &self,
        request: ultrafast_mcp_core::protocol::ShutdownRequest,
    ) -> MCPResult<()> {
        info!("Handling shutdown request: {:?}", request.reason);

        // Update server state
        {
            let mut state = self.state.write().await;
            *state = ServerState::ShuttingDown;
        }

        // Perform cleanup
        self.perform_shutdown_cleanup().await;

        // Update state to shutdown
        {
            let mut state = self.state.write().await;
            *state = ServerState::Shutdown;
        }

        info!("Server shutdown completed");
        Ok(())
    }

    /// Perform shutdown cleanup
    async fn perform_shutdown_cleanup(&self) {
        info!("Performing shutdown cleanup");

        // Clear all tools
        self.clear_tools().await;

        // Clear all resources
        {
            let mut resources = self.resources.write().await;
            resources.clear();
        }
        {
            let mut templates = self.resource_templates.write().await;
            templates.clear();
        }

        // Clear all prompts
        {
            let mut prompts = self.prompts.write().await;
            prompts.clear();
        }

        // Clear resource subscriptions
        {
            let mut subscriptions = self.resource_subscriptions.write().await;
            subscriptions.clear();
        }

        info!("Shutdown cleanup completed");
    }

    /// Get current server state
    pub async fn get_state(&self) -> ServerState {
        self.state.read().await.clone()
    }

    /// Check if server can accept operations
    pub async fn can_operate(&self) -> bool {
        self.state.read().await.can_operate()
    }

    /// Helper function to deserialize request parameters with proper defaults
    fn deserialize_list_tools_request(
        &self,
        params: Option<serde_json::Value>,
    ) -> ultrafast_mcp_core::types::tools::ListToolsRequest {
        serde_json::from_value(params.unwrap_or_default()).unwrap_or_default()
    }

    fn deserialize_list_resources_request(
        &self,
        params: Option<serde_json::Value>,
    ) -> ultrafast_mcp_core::types::resources::ListResourcesRequest {
        serde_json::from_value(params.unwrap_or_default()).unwrap_or_default()
    }

    fn deserialize_list_prompts_request(
        &self,
        params: Option<serde_json::Value>,
    ) -> ultrafast_mcp_core::types::prompts::ListPromptsRequest {
        serde_json::from_value(params.unwrap_or_default()).unwrap_or_default()
    }

    fn deserialize_get_prompt_request(
        &self,
        params: Option<serde_json::Value>,
    ) -> ultrafast_mcp_core::types::prompts::GetPromptRequest {
        serde_json::from_value(params.unwrap_or_default()).unwrap_or_default()
    }

    fn deserialize_read_resource_request(
        &self,
        params: Option<serde_json::Value>,
    ) -> ultrafast_mcp_core::types::resources::ReadResourceRequest {
        serde_json::from_value(params.unwrap_or_default()).unwrap_or_default()
    }

    fn deserialize_list_resource_templates_request(
        &self,
        params: Option<serde_json::Value>,
    ) -> ultrafast_mcp_core::types::resources::ListResourceTemplatesRequest {
        serde_json::from_value(params.unwrap_or_default()).unwrap_or_default()
    }

    fn deserialize_subscribe_request(
        &self,
        params: Option<serde_json::Value>,
    ) -> ultrafast_mcp_core::types::resources::SubscribeRequest {
        serde_json::from_value(params.unwrap_or_default()).unwrap_or_else(|_| {
            ultrafast_mcp_core::types::resources::SubscribeRequest { uri: String::new() }
        })
    }

    fn deserialize_unsubscribe_request(
        &self,
        params: Option<serde_json::Value>,
    ) -> ultrafast_mcp_core::types::resources::UnsubscribeRequest {
        serde_json::from_value(params.unwrap_or_default()).unwrap_or_else(|_| {
            ultrafast_mcp_core::types::resources::UnsubscribeRequest { uri: String::new() }
        })
    }

    fn deserialize_create_message_request(
        &self,
        params: Option<serde_json::Value>,
    ) -> ultrafast_mcp_core::types::sampling::CreateMessageRequest {
        serde_json::from_value(params.unwrap_or_default()).unwrap_or_default()
    }

    fn deserialize_elicitation_request(
        &self,
        params: Option<serde_json::Value>,
    ) -> ultrafast_mcp_core::types::elicitation::ElicitationRequest {
        serde_json::from_value(params.unwrap_or_default()).unwrap_or_default()
    }

    fn deserialize_complete_request(
        &self,
        params: Option<serde_json::Value>,
    ) -> ultrafast_mcp_core::types::completion::CompleteRequest {
        match params {
            Some(params) => serde_json::from_value(params).unwrap_or_else(|_| {
                ultrafast_mcp_core::types::completion::CompleteRequest {
                    ref_type: "ref/prompt".to_string(),
                    ref_name: "".to_string(),
                    argument: None,
                }
            }),
            None => ultrafast_mcp_core::types::completion::CompleteRequest {
                ref_type: "ref/prompt".to_string(),
                ref_name: "".to_string(),
                argument: None,
            },
        }
    }

    /// Handle incoming messages
    async fn handle_message(
        &self,
        message: JsonRpcMessage,
        transport: &Arc<RwLock<Box<dyn Transport>>>,
    ) -> MCPResult<()> {
        match message {
            JsonRpcMessage::Request(request) => {
                // Check if this is actually a notification (no ID)
                if request.id.is_none() {
                    // This is a notification, handle it as such
                    self.handle_notification(request).await?;
                } else {
                    // This is a request, handle it with timeout
                    let operation_timeout = self.get_operation_timeout(&request.method);
                    let request_id = request.id.clone(); // Clone before moving request
                    let response =
                        tokio::time::timeout(operation_timeout, self.handle_request(request)).await;

                    match response {
                        Ok(response) => {
                            transport
                                .write()
                                .await
                                .send_message(JsonRpcMessage::Response(response))
                                .await
                                .map_err(|e| {
                                    MCPError::internal_error(format!("Failed to send message: {e}"))
                                })?;
                        }
                        Err(_) => {
                            // Request timed out, send timeout error
                            let timeout_error = JsonRpcResponse::error(
                                JsonRpcError::new(-32000, "Request timeout".to_string()),
                                request_id.clone(),
                            );
                            transport
                                .write()
                                .await
                                .send_message(JsonRpcMessage::Response(timeout_error))
                                .await
                                .map_err(|e| {
                                    MCPError::internal_error(format!(
                                        "Failed to send timeout error: {e}"
                                    ))
                                })?;

                            // Send cancellation notification
                            if let Some(request_id) = &request_id {
                                self.notify_cancelled(
                                    serde_json::Value::String(request_id.to_string()),
                                    Some("Request timed out".to_string()),
                                    transport,
                                )
                                .await?;
                            }
                        }
                    }
                }
            }
            JsonRpcMessage::Notification(notification) => {
                self.handle_notification(notification).await?;
            }
            JsonRpcMessage::Response(response) => {
                self.handle_response(response).await;
            }
        }
        Ok(())
    }

    /// Resolve a pending server-initiated request (`send_request`) with the
    /// client's response, matching on request id.
    async fn handle_response(&self, response: JsonRpcResponse) {
        let Some(id) = response.id.clone() else {
            warn!("Received response message with no id");
            return;
        };
        let id_value = match serde_json::to_value(&id) {
            Ok(value) => value,
            Err(e) => {
                warn!("Failed to encode response id {:?}: {}", id, e);
                return;
            }
        };

        let sender = self.pending.write().await.remove(&id_value);
        let Some(sender) = sender else {
            warn!("Received response with unknown or already-resolved id: {id:?}");
            return;
        };

        let result = if let Some(error) = response.error {
            Err(MCPError::from(error))
        } else {
            Ok(response.result.unwrap_or(serde_json::Value::Null))
        };

        if sender.send(result).is_err() {
            warn!("Failed to deliver response to pending server-initiated request");
        }
    }

    /// Handle incoming requests
    async fn handle_request(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        info!(
            "Handling request: {} (id: {:?})",
            request.method, request.id
        );

        match request.method.as_str() {
            // MCP Lifecycle methods
            "initialize" => {
                match serde_json::from_value::<ultrafast_mcp_core::protocol::InitializeRequest>(
                    request.params.unwrap_or_default(),
                ) {
                    Ok(init_request) => match self.handle_initialize(init_request).await {
                        Ok(response) => match serde_json::to_value(response) {
                            Ok(value) => JsonRpcResponse::success(value, request.id),
                            Err(e) => JsonRpcResponse::error(
                                JsonRpcError::new(-32603, format!("Serialization error: {e}")),
                                request.id,
                            ),
                        },
                        Err(e) => JsonRpcResponse::error(
                            JsonRpcError::new(-32603, e.to_string()),
                            request.id,
                        ),
                    },
                    Err(e) => JsonRpcResponse::error(
                        JsonRpcError::invalid_params(Some(format!(
                            "Invalid initialize request: {e}"
                        ))),
                        request.id,
                    ),
                }
            }
            "shutdown" => {
                let shutdown_request = match serde_json::from_value::<
                    ultrafast_mcp_core::protocol::ShutdownRequest,
                >(request.params.unwrap_or_default())
                {
                    Ok(req) => req,
                    Err(_) => ultrafast_mcp_core::protocol::ShutdownRequest { reason: None },
                };

                match self.handle_shutdown(shutdown_request).await {
                    Ok(_) => JsonRpcResponse::success(serde_json::json!({}), request.id),
                    Err(e) => {
                        JsonRpcResponse::error(JsonRpcError::new(-32603, e.to_string()), request.id)
                    }
                }
            }

            // Tools methods
            "tools/list" => {
                if !self.can_operate().await {
                    return JsonRpcResponse::error(
                        JsonRpcError::internal_error(Some("Server not ready".to_string())),
                        request.id,
                    );
                }

                let list_request = self.deserialize_list_tools_request(request.params.clone());

                if let Some(handler) = &self.tool_handler {
                    match handler.list_tools(list_request).await {
                        Ok(response) => {
                            // If handler returns empty tools, fallback to registered tools
                            if response.tools.is_empty() {
                                let tools = self.list_tools().await;
                                let response =
                                    ultrafast_mcp_core::types::tools::ListToolsResponse {
                                        tools,
                                        next_cursor: None,
                                    };
                                match serde_json::to_value(response) {
                                    Ok(value) => JsonRpcResponse::success(value, request.id),
                                    Err(e) => JsonRpcResponse::error(
                                        JsonRpcError::new(
                                            -32603,
                                            format!("Serialization error: {e}"),
                                        ),
                                        request.id,
                                    ),
                                }
                            } else {
                                match serde_json::to_value(response) {
                                    Ok(value) => JsonRpcResponse::success(value, request.id),
                                    Err(e) => JsonRpcResponse::error(
                                        JsonRpcError::new(
                                            -32603,
                                            format!("Serialization error: {e}"),
                                        ),
                                        request.id,
                                    ),
                                }
                            }
                        }
                        Err(e) => JsonRpcResponse::error(
                            JsonRpcError::new(-32603, format!("Tools list failed: {e}")),
                            request.id,
                        ),
                    }
                } else {
                    // Fallback to registered tools
                    let tools = self.list_tools().await;
                    let response = ultrafast_mcp_core::types::tools::ListToolsResponse {
                        tools,
                        next_cursor: None,
                    };
                    match serde_json::to_value(response) {
                        Ok(value) => JsonRpcResponse::success(value, request.id),
                        Err(e) => JsonRpcResponse::error(
                            JsonRpcError::new(-32603, format!("Serialization error: {e}")),
                            request.id,
                        ),
                    }
                }
            }
            "tools/call" => {
                if !self.can_operate().await {
                    return JsonRpcResponse::error(
                        JsonRpcError::internal_error(Some("Server not ready".to_string())),
                        request.id,
                    );
                }

                let params = match &request.params {
                    Some(params) => params,
                    None => {
                        return JsonRpcResponse::error(
                            JsonRpcError::new(
                                -32602,
                                "Tool call failed: Missing parameters".to_string(),
                            ),
                            request.id,
                        );
                    }
                };

                let tool_name = params.get("name").and_then(|v| v.as_str());
                let arguments = params
                    .get("arguments")
                    .cloned()
                    .unwrap_or(serde_json::json!({}));

                if let Some(tool_name) = tool_name {
                    if let Some(adapted) = self.tool_adapters.read().await.get(tool_name).cloned()
                    {
                        // Adapted tools carry their own invoker and take
                        // priority over the catch-all handler, the same way
                        // the registered resource/prompt registries are
                        // consulted ahead of falling back to a handler.
                        let ctx = self.create_context().await;
                        match adapted.invoke(arguments, ctx).await {
                            Ok(result) => match serde_json::to_value(result) {
                                Ok(value) => JsonRpcResponse::success(value, request.id),
                                Err(e) => JsonRpcResponse::error(
                                    JsonRpcError::new(-32603, format!("Serialization error: {e}")),
                                    request.id,
                                ),
                            },
                            Err(ToolAdapterError::InvalidArguments(msg)) => {
                                JsonRpcResponse::error(
                                    JsonRpcError::new(
                                        -32602,
                                        format!("Tool call failed: {msg}"),
                                    ),
                                    request.id,
                                )
                            }
                        }
                    } else if let Some(handler) = &self.tool_handler {
                        let tool_call = ultrafast_mcp_core::types::tools::ToolCall {
                            name: tool_name.to_string(),
                            arguments: Some(arguments.clone()),
                        };
                        // Arguments validation will be handled by the tool handler
                        match handler.handle_tool_call(tool_call).await {
                            Ok(result) => match serde_json::to_value(result) {
                                Ok(value) => JsonRpcResponse::success(value, request.id),
                                Err(e) => JsonRpcResponse::error(
                                    JsonRpcError::new(-32603, format!("Serialization error: {e}")),
                                    request.id,
                                ),
                            },
                            Err(e) => {
                                use ultrafast_mcp_core::error::{MCPError, ProtocolError};
                                let (code, msg) = match &e {
                                    MCPError::Protocol(ProtocolError::InvalidParams(_))
                                    | MCPError::Protocol(ProtocolError::NotFound(_)) => {
                                        (-32602, format!("Tool call failed: {e}"))
                                    }
                                    _ => (-32603, format!("Tool call failed: {e}")),
                                };
                                JsonRpcResponse::error(JsonRpcError::new(code, msg), request.id)
                            }
                        }
                    } else {
                        // Fallback to registered tools
                        if !self.has_tool(tool_name).await {
                            return JsonRpcResponse::error(
                                JsonRpcError::new(
                                    -32602,
                                    format!("Tool call failed: Tool not found: {tool_name}"),
                                ),
                                request.id,
                            );
                        }
                        // Arguments validation will be handled by the tool handler
                        match self.execute_tool_call(tool_name, arguments).await {
                            Ok(result) => match serde_json::to_value(result) {
                                Ok(value) => JsonRpcResponse::success(value, request.id),
                                Err(e) => JsonRpcResponse::error(
                                    JsonRpcError::new(-32603, format!("Serialization error: {e}")),
                                    request.id,
                                ),
                            },
                            Err(e) => {
                                use ultrafast_mcp_core::error::{MCPError, ProtocolError};
                                let (code, msg) = match &e {
                                    MCPError::Protocol(ProtocolError::InvalidParams(_))
                                    | MCPError::Protocol(ProtocolError::NotFound(_)) => {
                                        (-32602, format!("Tool call failed: {e}"))
                                    }
                                    _ => (-32603, format!("Tool call failed: {e}")),
                                };
                                JsonRpcResponse::error(JsonRpcError::new(code, msg), request.id)
                            }
                        }
                    }
                } else {
                    JsonRpcResponse::error(
                        JsonRpcError::new(
                            -32602,
                            "Tool call failed: Missing or invalid tool name".to_string(),
                        ),
                        request.id,
                    )
                }
            }

            // Resources methods
            "resources/list" => {
                if !self.can_operate().await {
                    return JsonRpcResponse::error(
                        JsonRpcError::new(-32000, "Server not ready".to_string()),
                        request.id,
                    );
                }

                let list_request = self.deserialize_list_resources_request(request.params.clone());

                if let Some(handler) = &self.resource_handler {
                    // For resources/list, we don't validate against roots since it's a general listing
                    // Root validation will be done when individual resources are accessed

                    match handler.list_resources(list_request).await {
                        // If the handler has nothing of its own, fall back to
                        // the registry, mirroring tools/list.
                        Ok(response) if response.resources.is_empty() => {
                            let response = ultrafast_mcp_core::types::resources::ListResourcesResponse {
                                resources: self.list_resources().await,
                                next_cursor: None,
                            };
                            match serde_json::to_value(response) {
                                Ok(value) => JsonRpcResponse::success(value, request.id),
                                Err(e) => JsonRpcResponse::error(
                                    JsonRpcError::new(
                                        -32603,
                                        format!("Serialization error: {e}"),
                                    ),
                                    request.id,
                                ),
                            }
                        }
                        Ok(response) => match serde_json::to_value(response) {
                            Ok(value) => JsonRpcResponse::success(value, request.id),
                            Err(e) => JsonRpcResponse::error(
                                JsonRpcError::new(-32603, format!("Serialization error: {e}")),
                                request.id,
                            ),
                        },
                        Err(e) => JsonRpcResponse::error(
                            JsonRpcError::new(-32603, format!("Resources list failed: {e}")),
                            request.id,
                        ),
                    }
                } else if !self.resources.read().await.is_empty() {
                    let response = ultrafast_mcp_core::types::resources::ListResourcesResponse {
                        resources: self.list_resources().await,
                        next_cursor: None,
                    };
                    match serde_json::to_value(response) {
                        Ok(value) => JsonRpcResponse::success(value, request.id),
                        Err(e) => JsonRpcResponse::error(
                            JsonRpcError::new(-32603, format!("Serialization error: {e}")),
                            request.id,
                        ),
                    }
                } else {
                    JsonRpcResponse::error(
                        JsonRpcError::new(-32601, "Resources not supported".to_string()),
                        request.id,
                    )
                }
            }
            "resources/read" => {
                if !self.can_operate().await {
                    return JsonRpcResponse::error(
                        JsonRpcError::new(-32000, "Server not ready".to_string()),
                        request.id,
                    );
                }

                let read_request = self.deserialize_read_resource_request(request.params.clone());

                if let Some(handler) = &self.resource_handler {
                    // Anything registered (exact resource or URI template) must
                    // match before we bother the handler, so registrations
                    // actually constrain what can be read.
                    if !self.resource_uri_is_registered(&read_request.uri).await {
                        return JsonRpcResponse::error(
                            JsonRpcError::new(
                                -32602,
                                format!("Resource not found: {}", read_request.uri),
                            ),
                            request.id,
                        );
                    }

                    // Validate against roots if roots handler is available
                    if let Some(roots_handler) = &self.roots_handler {
                        match roots_handler.list_roots().await {
                            Ok(roots) => {
                                if let Err(e) = handler
                                    .validate_resource_access(
                                        &read_request.uri,
                                        ultrafast_mcp_core::types::roots::RootOperation::Read,
                                        &roots,
                                    )
                                    .await
                                {
                                    return JsonRpcResponse::error(
                                        JsonRpcError::new(
                                            -32603,
                                            format!("Root validation failed: {e}"),
                                        ),
                                        request.id,
                                    );
                                }
                            }
                            Err(e) => {
                                return JsonRpcResponse::error(
                                    JsonRpcError::new(-32603, format!("Failed to get roots: {e}")),
                                    request.id,
                                );
                            }
                        }
                    }

                    match handler.read_resource(read_request).await {
                        Ok(response) => match serde_json::to_value(response) {
                            Ok(value) => JsonRpcResponse::success(value, request.id),
                            Err(e) => JsonRpcResponse::error(
                                JsonRpcError::new(-32603, format!("Serialization error: {e}")),
                                request.id,
                            ),
                        },
                        Err(e) => JsonRpcResponse::error(
                            JsonRpcError::new(-32603, format!("Resource read failed: {e}")),
                            request.id,
                        ),
                    }
                } else {
                    JsonRpcResponse::error(
                        JsonRpcError::new(-32601, "Resources not supported".to_string()),
                        request.id,
                    )
                }
            }
            "resources/templates/list" => {
                if !self.can_operate().await {
                    return JsonRpcResponse::error(
                        JsonRpcError::new(-32000, "Server not ready".to_string()),
                        request.id,
                    );
                }

                let list_request =
                    self.deserialize_list_resource_templates_request(request.params.clone());

                if let Some(handler) = &self.resource_handler {
                    match handler.list_resource_templates(list_request).await {
                        Ok(response) if response.resource_templates.is_empty() => {
                            let response = ultrafast_mcp_core::types::resources::ListResourceTemplatesResponse {
                                resource_templates: self.list_resource_templates().await,
                                next_cursor: None,
                            };
                            JsonRpcResponse::success(
                                serde_json::to_value(response).unwrap(),
                                request.id,
                            )
                        }
                        Ok(response) => JsonRpcResponse::success(
                            serde_json::to_value(response).unwrap(),
                            request.id,
                        ),
                        Err(e) => JsonRpcResponse::error(
                            JsonRpcError::new(
                                -32603,
                                format!("Resource templates list failed: {e}"),
                            ),
                            request.id,
                        ),
                    }
                } else if !self.resource_templates.read().await.is_empty() {
                    let response = ultrafast_mcp_core::types::resources::ListResourceTemplatesResponse {
                        resource_templates: self.list_resource_templates().await,
                        next_cursor: None,
                    };
                    JsonRpcResponse::success(serde_json::to_value(response).unwrap(), request.id)
                } else {
                    JsonRpcResponse::error(
                        JsonRpcError::new(-32601, "Resources not supported".to_string()),
                        request.id,
                    )
                }
            }
            "resources/subscribe" => {
                if !self.can_operate().await {
                    return JsonRpcResponse::error(
                        JsonRpcError::new(-32000, "Server not ready".to_string()),
                        request.id,
                    );
                }

                let subscribe_request = self.deserialize_subscribe_request(request.params.clone());

                // Validate against roots if roots handler is available
                if let Some(roots_handler) = &self.roots_handler {
                    if let Some(resource_handler) = &self.resource_handler {
                        match roots_handler.list_roots().await {
                            Ok(roots) => {
                                if let Err(e) = resource_handler
                                    .validate_resource_access(
                                        &subscribe_request.uri,
                                        ultrafast_mcp_core::types::roots::RootOperation::Read,
                                        &roots,
                                    )
                                    .await
                                {
                                    return JsonRpcResponse::error(
                                        JsonRpcError::new(
                                            -32603,
                                            format!("Root validation failed: {e}"),
                                        ),
                                        request.id,
                                    );
                                }
                            }
                            Err(e) => {
                                return JsonRpcResponse::error(
                                    JsonRpcError::new(-32603, format!("Failed to get roots: {e}")),
                                    request.id,
                                );
                            }
                        }
                    }
                }

                if let Some(handler) = &self.subscription_handler {
                    match handler.subscribe(subscribe_request.uri.clone()).await {
                        Ok(_) => {
                            // Subscription successful - return success response
                            // Note: The client may timeout if it expects immediate notifications
                            // This is a limitation of the current MCP architecture
                            JsonRpcResponse::success(
                                serde_json::to_value(SubscribeResponse::new()).unwrap(),
                                request.id,
                            )
                        }
                        Err(e) => JsonRpcResponse::error(
                            JsonRpcError::new(-32603, format!("Resource subscribe failed: {e}")),
                            request.id,
                        ),
                    }
                } else {
                    JsonRpcResponse::error(
                        JsonRpcError::new(
                            -32601,
                            "Resource subscriptions not supported".to_string(),
                        ),
                        request.id,
                    )
                }
            }
            "resources/unsubscribe" => {
                if !self.can_operate().await {
                    return JsonRpcResponse::error(
                        JsonRpcError::new(-32000, "Server not ready".to_string()),
                        request.id,
                    );
                }

                let unsubscribe_request =
                    self.deserialize_unsubscribe_request(request.params.clone());

                if let Some(handler) = &self.subscription_handler {
                    match handler.unsubscribe(unsubscribe_request.uri).await {
                        Ok(_) => JsonRpcResponse::success(serde_json::Value::Null, request.id),
                        Err(e) => JsonRpcResponse::error(
                            JsonRpcError::new(-32603, format!("Resource unsubscribe failed: {e}")),
                            request.id,
                        ),
                    }
                } else {
                    JsonRpcResponse::error(
                        JsonRpcError::new(
                            -32601,
                            "Resource subscriptions not supported".to_string(),
                        ),
                        request.id,
                    )
                }
            }

            // Prompts methods
            "prompts/list" => {
                if !self.can_operate().await {
                    return JsonRpcResponse::error(
                        JsonRpcError::new(-32000, "Server not ready".to_string()),
                        request.id,
                    );
                }

                let list_request = self.deserialize_list_prompts_request(request.params.clone());

                if let Some(handler) = &self.prompt_handler {
                    match handler.list_prompts(list_request).await {
                        Ok(response) if response.prompts.is_empty() => {
                            let response = ultrafast_mcp_core::types::prompts::ListPromptsResponse {
                                prompts: self.list_prompts().await,
                                next_cursor: None,
                            };
                            JsonRpcResponse::success(
                                serde_json::to_value(response).unwrap(),
                                request.id,
                            )
                        }
                        Ok(response) => JsonRpcResponse::success(
                            serde_json::to_value(response).unwrap(),
                            request.id,
                        ),
                        Err(e) => JsonRpcResponse::error(
                            JsonRpcError::new(-32603, format!("Prompts list failed: {e}")),
                            request.id,
                        ),
                    }
                } else if !self.prompts.read().await.is_empty() {
                    let response = ultrafast_mcp_core::types::prompts::ListPromptsResponse {
                        prompts: self.list_prompts().await,
                        next_cursor: None,
                    };
                    JsonRpcResponse::success(serde_json::to_value(response).unwrap(), request.id)
                } else {
                    JsonRpcResponse::error(
                        JsonRpcError::new(-32601, "Prompts not supported".to_string()),
                        request.id,
                    )
                }
            }
            "prompts/get" => {
                if !self.can_operate().await {
                    return JsonRpcResponse::error(
                        JsonRpcError::new(-32000, "Server not ready".to_string()),
                        request.id,
                    );
                }

                let get_request = self.deserialize_get_prompt_request(request.params.clone());

                if let Some(handler) = &self.prompt_handler {
                    if let Err(e) = self
                        .validate_prompt_arguments(&get_request.name, get_request.arguments.as_ref())
                        .await
                    {
                        return JsonRpcResponse::error(
                            JsonRpcError::new(-32602, format!("Prompt get failed: {e}")),
                            request.id,
                        );
                    }

                    match handler.get_prompt(get_request).await {
                        Ok(response) => JsonRpcResponse::success(
                            serde_json::to_value(response).unwrap(),
                            request.id,
                        ),
                        Err(e) => JsonRpcResponse::error(
                            JsonRpcError::new(-32603, format!("Prompt get failed: {e}")),
                            request.id,
                        ),
                    }
                } else {
                    JsonRpcResponse::error(
                        JsonRpcError::new(-32601, "Prompts not supported".to_string()),
                        request.id,
                    )
                }
            }

            // Completion methods
            "completion/complete" => {
                if !self.can_operate().await {
                    return JsonRpcResponse::error(
                        JsonRpcError::new(-32000, "Server not ready".to_string()),
                        request.id,
                    );
                }

                let complete_request = self.deserialize_complete_request(request.params.clone());

                if let Some(handler) = &self.completion_handler {
                    // Reject references to prompts/resource templates that
                    // don't exist, when the registry has anything registered
                    // to check against.
                    match complete_request.ref_type.as_str() {
                        "prompts" if !self.prompts.read().await.is_empty() => {
                            if self.get_prompt(&complete_request.ref_name).await.is_none() {
                                return JsonRpcResponse::error(
                                    JsonRpcError::new(
                                        -32602,
                                        format!(
                                            "Completion failed: unknown prompt '{}'",
                                            complete_request.ref_name
                                        ),
                                    ),
                                    request.id,
                                );
                            }
                        }
                        "resource_templates" if !self.resource_templates.read().await.is_empty() => {
                            let known = self
                                .resource_templates
                                .read()
                                .await
                                .contains_key(&complete_request.ref_name);
                            if !known {
                                return JsonRpcResponse::error(
                                    JsonRpcError::new(
                                        -32602,
                                        format!(
                                            "Completion failed: unknown resource template '{}'",
                                            complete_request.ref_name
                                        ),
                                    ),
                                    request.id,
                                );
                            }
                        }
                        _ => {}
                    }

                    match handler.complete(complete_request).await {
                        Ok(response) => JsonRpcResponse::success(
                            serde_json::to_value(response).unwrap(),
                            request.id,
                        ),
                        Err(e) => JsonRpcResponse::error(
                            JsonRpcError::new(-32603, format!("Completion failed: {e}")),
                            request.id,
                        ),
                    }
                } else {
                    JsonRpcResponse::error(
                        JsonRpcError::new(-32601, "Completion not supported".to_string()),
                        request.id,
                    )
                }
            }

            // Sampling methods
            "sampling/createMessage" => {
                if !self.can_operate().await {
                    return JsonRpcResponse::error(
                        JsonRpcError::new(-32000, "Server not ready".to_string()),
                        request.id,
                    );
                }

                let create_request =
                    self.deserialize_create_message_request(request.params.clone());

                if let Some(handler) = &self.sampling_handler {
                    match handler.create_message(create_request).await {
                        Ok(response) => JsonRpcResponse::success(
                            serde_json::to_value(response).unwrap(),
                            request.id,
                        ),
                        Err(e) => JsonRpcResponse::error(
                            JsonRpcError::new(-32603, format!("Message creation failed: {e}")),
                            request.id,
                        ),
                    }
                } else {
                    JsonRpcResponse::error(
                        JsonRpcError::new(-32601, "Sampling not supported".to_string()),
                        request.id,
                    )
                }
            }

            // Roots methods
            "roots/list" => {
                if !self.can_operate().await {
                    return JsonRpcResponse::error(
                        JsonRpcError::new(-32000, "Server not ready".to_string()),
                        request.id,
                    );
                }

                if let Some(handler) = &self.roots_handler {
                    match handler.list_roots().await {
                        Ok(response) => JsonRpcResponse::success(
                            serde_json::to_value(response).unwrap(),
                            request.id,
                        ),
                        Err(e) => JsonRpcResponse::error(
                            JsonRpcError::new(-32603, format!("Roots list failed: {e}")),
                            request.id,
                        ),
                    }
                } else {
                    JsonRpcResponse::error(
                        JsonRpcError::new(-32601, "Roots not supported".to_string()),
                        request.id,
                    )
                }
            }

            // Elicitation methods
            "elicitation/create" => {
                if !self.can_operate().await {
                    return JsonRpcResponse::error(
                        JsonRpcError::new(-32000, "Server not ready".to_string()),
                        request.id,
                    );
                }

                let elicitation_request =
                    self.deserialize_elicitation_request(request.params.clone());

                if let Some(handler) = &self.elicitation_handler {
                    match handler.handle_elicitation(elicitation_request).await {
                        Ok(response) => JsonRpcResponse::success(
                            serde_json::to_value(response).unwrap(),
                            request.id,
                        ),
                        Err(e) => JsonRpcResponse::error(
                            JsonRpcError::new(-32603, format!("Elicitation failed: {e}")),
                            request.id,
                        ),
                    }
                } else {
                    JsonRpcResponse::error(
                        JsonRpcError::new(-32601, "Elicitation not supported".to_string()),
                        request.id,
                    )
                }
            }

            "elicitation/respond" => {
                if !self.can_operate().await {
                    return JsonRpcResponse::error(
                        JsonRpcError::new(-32000, "Server not ready".to_string()),
                        request.id,
                    );
                }

                let elicitation_response = match serde_json::from_value::<
                    ultrafast_mcp_core::types::elicitation::ElicitationResponse,
                >(
                    request.params.unwrap_or_default()
                ) {
                    Ok(response) => response,
                    Err(e) => {
                        return JsonRpcResponse::error(
                            JsonRpcError::new(-32602, format!("Invalid elicitation response: {e}")),
                            request.id,
                        );
                    }
                };

                // Log the elicitation response
                info!(
                    "Received elicitation response: {:?}",
                    elicitation_response.action
                );

                // In a real implementation, this would be handled by the server's elicitation flow
                // For now, we'll just return success
                JsonRpcResponse::success(serde_json::json!({}), request.id)
            }

            // Logging methods
            "logging/setLevel" => {
                let params = match &request.params {
                    Some(params) => params,
                    None => {
                        return JsonRpcResponse::error(
                            JsonRpcError::new(-32602, "Missing parameters".to_string()),
                            request.id,
                        );
                    }
                };

                match serde_json::from_value::<LogLevelSetRequest>(params.clone()) {
                    Ok(set_request) => match self.set_log_level(set_request.level).await {
                        Ok(()) => {
                            let response = LogLevelSetResponse::new();
                            JsonRpcResponse::success(
                                serde_json::to_value(response).unwrap(),
                                request.id,
                            )
                        }
                        Err(e) => JsonRpcResponse::error(
                            JsonRpcError::new(-32603, format!("Failed to set log level: {e}")),
                            request.id,
                        ),
                    },
                    Err(e) => JsonRpcResponse::error(
                        JsonRpcError::new(-32602, format!("Invalid log level set request: {e}")),
                        request.id,
                    ),
                }
            }

            // Ping method for connection health monitoring
            "ping" => {
                let ping_request = match serde_json::from_value::<
                    ultrafast_mcp_core::types::notifications::PingRequest,
                >(request.params.unwrap_or_default())
                {
                    Ok(req) => req,
                    Err(_) => ultrafast_mcp_core::types::notifications::PingRequest { data: None },
                };

                match self.ping_manager.handle_ping(ping_request).await {
                    Ok(response) => JsonRpcResponse::success(
                        serde_json::to_value(response).unwrap(),
                        request.id,
                    ),
                    Err(e) => JsonRpcResponse::error(
                        JsonRpcError::new(-32603, format!("Ping failed: {e}")),
                        request.id,
                    ),
                }
            }

            // Roots methods
            "roots/set" => {
                let params = match &request.params {
                    Some(params) => params,
                    None => {
                        return JsonRpcResponse::error(
                            JsonRpcError::new(-32602, "Missing parameters".to_string()),
                            request.id,
                        );
                    }
                };

                match serde_json::from_value::<SetRootsRequest>(params.clone()) {
                    Ok(set_request) => {
                        let response = self.handle_set_roots(set_request.roots).await;
                        JsonRpcResponse::success(
                            serde_json::to_value(response).unwrap(),
                            request.id,
                        )
                    }
                    Err(e) => JsonRpcResponse::error(
                        JsonRpcError::new(-32602, format!("Invalid roots set request: {e}")),
                        request.id,
                    ),
                }
            }

            // Unknown method
            _ => JsonRpcResponse::error(
                JsonRpcError::new(
                    -32601,
                    format!("Method not implemented: {}", request.method),
                ),
                request.id,
            ),
        }
    }

    /// Handle incoming notifications
    async fn handle_notification(&self, notification: JsonRpcRequest) -> MCPResult<()> {
        info!("Handling notification: {}", notification.method);

        match notification.method.as_str() {
            "initialized" => {
                let notification = ultrafast_mcp_core::protocol::InitializedNotification {};
                self.handle_initialized(notification).await?;
                Ok(())
            }
            "notifications/cancelled" => {
                // Handle cancellation notification
                if let Some(params) = notification.params {
                    let cancellation_notification: ultrafast_mcp_core::types::notifications::CancelledNotification =
                        serde_json::from_value(params)?;

                    // Use the cancellation manager to handle the cancellation
                    let _cancelled = self
                        .cancellation_manager
                        .handle_cancellation(cancellation_notification)
                        .await?;
                    info!("Cancellation notification processed");
                }
                Ok(())
            }
            _ => {
                warn!("Unknown notification method: {}", notification.method);
                Ok(())
            }
        }
    }

    // ===== NOTIFICATION METHODS =====

    /// Send tools list changed notification
    pub async fn notify_tools_changed(
        &self,
        transport: &Arc<RwLock<Box<dyn Transport>>>,
    ) -> MCPResult<()> {
        let notification =
            ultrafast_mcp_core::types::notifications::ToolsListChangedNotification::new();
        self.send_notification(
            "notifications/tools/list_changed",
            Some(serde_json::to_value(notification)?),
            transport,
        )
        .await
    }

    /// Send resources list changed notification
    pub async fn notify_resources_changed(
        &self,
        transport: &Arc<RwLock<Box<dyn Transport>>>,
    ) -> MCPResult<()> {
        let notification =
            ultrafast_mcp_core::types::notifications::ResourcesListChangedNotification::new();
        self.send_notification(
            "notifications/resources/list_changed",
            Some(serde_json::to_value(notification)?),
            transport,
        )
        .await
    }

    /// Send prompts list changed notification
    pub async fn notify_prompts_changed(
        &self,
        transport: &Arc<RwLock<Box<dyn Transport>>>,
    ) -> MCPResult<()> {
        let notification =
            ultrafast_mcp_core::types::notifications::PromptsListChangedNotification::new();
        self.send_notification(
            "notifications/prompts/list_changed",
            Some(serde_json::to_value(notification)?),
            transport,
        )
        .await
    }

    /// Send resource updated notification
    pub async fn notify_resource_updated(
        &self,
        uri: String,
        transport: &Arc<RwLock<Box<dyn Transport>>>,
    ) -> MCPResult<()> {
        let notification =
            ultrafast_mcp_core::types::resources::ResourceUpdatedNotification { uri };
        self.send_notification(
            "notifications/resources/updated",
            Some(serde_json::to_value(notification)?),
            transport,
        )
        .await
    }

    /// Send progress notification
    pub async fn notify_progress(
        &self,
        progress_token: serde_json::Value,
        progress: f64,
        total: Option<f64>,
        message: Option<String>,
        transport: &Arc<RwLock<Box<dyn Transport>>>,
    ) -> MCPResult<()> {
        let mut notification = ultrafast_mcp_core::types::notifications::ProgressNotification::new(
            progress_token,
            progress,
        );
        if let Some(total) = total {
            notification = notification.with_total(total);
        }
        if let Some(message) = message {
            notification = notification.with_message(message);
        }
        self.send_notification(
            "notifications/progress",
            Some(serde_json::to_value(notification)?),
            transport,
        )
        .await
    }

    /// Send logging message notification
    pub async fn notify_logging_message(
        &self,
        level: ultrafast_mcp_core::types::notifications::LogLevel,
        data: serde_json::Value,
        logger: Option<String>,
        transport: &Arc<RwLock<Box<dyn Transport>>>,
    ) -> MCPResult<()> {
        let mut notification =
            ultrafast_mcp_core::types::notifications::LoggingMessageNotification::new(level, data);
        if let Some(logger) = logger {
            notification = notification.with_logger(logger);
        }
        self.send_notification(
            "notifications/logging/message",
            Some(serde_json::to_value(notification)?),
            transport,
        )
        .await
    }

    /// Send cancellation notification
    pub async fn notify_cancelled(
        &self,
        request_id: serde_json::Value,
        reason: Option<String>,
        transport: &Arc<RwLock<Box<dyn Transport>>>,
    ) -> MCPResult<()> {
        let mut notification =
            ultrafast_mcp_core::types::notifications::CancelledNotification::new(request_id);
        if let Some(reason) = reason {
            notification = notification.with_reason(reason);
        }
        self.send_notification(
            "notifications/cancelled",
            Some(serde_json::to_value(notification)?),
            transport,
        )
        .await
    }

    /// Send roots list changed notification
    pub async fn notify_roots_changed(
        &self,
        transport: &Arc<RwLock<Box<dyn Transport>>>,
    ) -> MCPResult<()> {
        let notification =
            ultrafast_mcp_core::types::notifications::RootsListChangedNotification::new();
        self.send_notification(
            "notifications/roots/list_changed",
            Some(serde_json::to_value(notification)?),
            transport,
        )
        .await
    }

    /// Generic method to send notifications
    async fn send_notification(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
        transport: &Arc<RwLock<Box<dyn Transport>>>,
    ) -> MCPResult<()> {
        let notification = JsonRpcRequest {
            jsonrpc: Cow::Borrowed("2.0"),
            id: None, // Notifications have no ID
            method: method.to_string(),
            params,
            meta: std::collections::HashMap::new(),
        };

        transport
            .write()
            .await
            .send_message(JsonRpcMessage::Request(notification))
            .await
            .map_err(|e| MCPError::internal_error(format!("Failed to send notification: {e}")))?;

        info!("Sent notification: {}", method);
        Ok(())
    }

    /// Broadcast a notification to every currently connected session.
    ///
    /// Used by mutation methods (`register_tool`, resource/prompt
    /// registration) so callers don't have to thread a transport handle
    /// through themselves; per-session send failures are logged, not
    /// propagated, since one dead session shouldn't stop the others from
    /// being notified.
    pub async fn broadcast_notification(&self, method: &str, params: Option<serde_json::Value>) {
        let sessions: Vec<_> = self.sessions.read().await.values().cloned().collect();
        for transport in &sessions {
            if let Err(e) = self
                .send_notification(method, params.clone(), transport)
                .await
            {
                warn!("Failed to broadcast {} to a session: {}", method, e);
            }
        }
    }

    /// Send a JSON-RPC request to a specific connected session and await its
    /// response, mirroring the client's own request/response bookkeeping:
    /// the request id is registered in `pending` before the request is
    /// written, and `handle_response` resolves it once the matching
    /// response arrives back through that session's `run_with_transport`
    /// loop.
    pub async fn send_request<T>(
        &self,
        session_id: &str,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> MCPResult<T>
    where
        T: serde::de::DeserializeOwned,
    {
        let transport = self
            .sessions
            .read()
            .await
            .get(session_id)
            .cloned()
            .ok_or_else(|| MCPError::internal_error(format!("Unknown session: {session_id}")))?;

        let request_id = RequestId::String(Uuid::new_v4().to_string());
        let request = JsonRpcRequest {
            jsonrpc: Cow::Borrowed("2.0"),
            method: method.to_string(),
            params,
            id: Some(request_id.clone()),
            meta: std::collections::HashMap::new(),
        };

        let (sender, receiver) = oneshot::channel();
        self.pending
            .write()
            .await
            .insert(serde_json::to_value(&request_id)?, sender);

        let send_result = transport
            .write()
            .await
            .send_message(JsonRpcMessage::Request(request))
            .await;
        if let Err(e) = send_result {
            self.pending
                .write()
                .await
                .remove(&serde_json::to_value(&request_id)?);
            return Err(MCPError::internal_error(format!("Send failed: {e}")));
        }

        let result = tokio::time::timeout(self.get_operation_timeout(method), receiver)
            .await
            .map_err(|_| MCPError::request_timeout())?
            .map_err(|_| MCPError::internal_error("Request cancelled".to_string()))??;

        serde_json::from_value(result).map_err(|e| MCPError::serialization_error(e.to_string()))
    }

    /// Send a notification to a specific connected session.
    pub async fn send_notification_to_session(
        &self,
        session_id: &str,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> MCPResult<()> {
        let transport = self
            .sessions
            .read()
            .await
            .get(session_id)
            .cloned()
            .ok_or_else(|| MCPError::internal_error(format!("Unknown session: {session_id}")))?;
        self.send_notification(method, params, &transport).await
    }

    /// Ask a client to list its roots (`roots/list`). The caller is
    /// responsible for only targeting sessions whose negotiated
    /// `ClientCapabilities` advertised the roots capability.
    pub async fn request_roots_list(
        &self,
        session_id: &str,
    ) -> MCPResult<ultrafast_mcp_core::types::roots::ListRootsResponse> {
        self.send_request(session_id, "roots/list", None).await
    }

    /// Ask a client to sample from its LLM (`sampling/createMessage`). The
    /// caller is responsible for only targeting sessions whose negotiated
    /// `ClientCapabilities` advertised the sampling capability.
    pub async fn request_sampling(
        &self,
        session_id: &str,
        request: ultrafast_mcp_core::types::sampling::CreateMessageRequest,
    ) -> MCPResult<ultrafast_mcp_core::types::sampling::CreateMessageResponse> {
        self.send_request(
            session_id,
            "sampling/createMessage",
            Some(serde_json::to_value(request)?),
        )
        .await
    }

    /// List the ids of currently connected sessions.
    pub async fn list_sessions(&self) -> Vec<String> {
        self.sessions.read().await.keys().cloned().collect()
    }

    /// Set the advanced sampling handler for context collection and human-in-the-loop features
    pub fn with_advanced_sampling_handler(
        mut self,
        handler: Arc<dyn AdvancedSamplingHandler>,
    ) -> Self {
        self.advanced_sampling_handler = Some(handler);
        self
    }

    /// Set the advanced sampling handler with default implementation
    pub fn with_default_advanced_sampling(mut self) -> Self {
        let default_handler = Arc::new(DefaultAdvancedSamplingHandler::new(self.info.clone()));
        self.advanced_sampling_handler = Some(default_handler);
        self
    }

    /// Handle a roots/set request
    pub async fn handle_set_roots(
        &self,
        roots: Vec<ultrafast_mcp_core::types::roots::Root>,
    ) -> SetRootsResponse {
        if let Some(handler) = &self.roots_handler {
            match handler.set_roots(roots.clone()).await {
                Ok(_) => {
                    let notification = RootsListChangedNotification { roots };
                    let params = serde_json::to_value(notification).ok();
                    self.broadcast_notification("notifications/roots/list_changed", params)
                        .await;
                    SetRootsResponse {
                        success: true,
                        error: None,
                    }
                }
                Err(e) => SetRootsResponse {
                    success: false,
                    error: Some(e.to_string()),
                },
            }
        } else {
            SetRootsResponse {
                success: false,
                error: Some("Roots handler not available".to_string()),
            }
        }
    }
}
