//! Adapts a Rust callable into a [`Tool`] that can be registered and invoked over MCP.
//!
//! A tool built from [`adapt_tool`] pairs the `Tool` metadata (name, description,
//! JSON Schema) with the invoker that actually runs the callable, so the two can
//! never drift apart the way a hand-written schema and a hand-written match arm
//! can. Schema generation is delegated to `schemars`, the same crate
//! `ultrafast_mcp_core::schema::generation` already uses for typed schema output.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use base64::Engine;
use schemars::JsonSchema;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::context::Context;
use ultrafast_mcp_core::types::tools::{Tool, ToolAnnotations, ToolContent, ToolResult};

/// Error raised while decoding the arguments handed to an adapted tool.
///
/// This is distinct from a failure *inside* the callable: argument decoding
/// failures are protocol errors (`INVALID_PARAMS`), while the callable's own
/// errors are wrapped into a `CallToolResult{isError:true}` and never
/// propagate past `invoke`.
#[derive(Debug, thiserror::Error)]
pub enum ToolAdapterError {
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
}

/// An error thrown by the wrapped callable during execution.
///
/// Carries only a message: the adapter surfaces it to the caller as
/// `CallToolResult{isError:true, content:[Text(message)]}`, never as a
/// JSON-RPC error.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct ToolExecutionException(pub String);

impl ToolExecutionException {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl From<String> for ToolExecutionException {
    fn from(message: String) -> Self {
        Self(message)
    }
}

impl From<&str> for ToolExecutionException {
    fn from(message: &str) -> Self {
        Self(message.to_string())
    }
}

/// What an adapted tool's callable produced, before it is wrapped into
/// `ToolContent`.
pub enum ToolAdapterOutput {
    /// `null` / `void` returns render as `CallToolResult("Done")`.
    Empty,
    /// Already-formatted text, used as-is.
    Text(String),
    /// A JSON value to serialize into a single `Text` content item. A JSON
    /// `null` here is treated the same as `Empty`.
    Json(Value),
    /// Image bytes with an explicit mime type, rendered as an `Image`
    /// content item. Rust has no runtime reflection to detect "this return
    /// value happens to be image-shaped" the way the host language this
    /// protocol was modeled on does, so image results are always explicit.
    Image { data: Vec<u8>, mime_type: String },
}

impl ToolAdapterOutput {
    fn into_content(self) -> Vec<ToolContent> {
        match self {
            ToolAdapterOutput::Empty => vec![ToolContent::text("Done".to_string())],
            ToolAdapterOutput::Text(text) => vec![ToolContent::text(text)],
            ToolAdapterOutput::Json(value) if value.is_null() => {
                vec![ToolContent::text("Done".to_string())]
            }
            ToolAdapterOutput::Json(value) => {
                let text =
                    serde_json::to_string(&value).unwrap_or_else(|_| value.to_string());
                vec![ToolContent::text(text)]
            }
            ToolAdapterOutput::Image { data, mime_type } => {
                let encoded = base64::engine::general_purpose::STANDARD.encode(data);
                vec![ToolContent::image(encoded, mime_type)]
            }
        }
    }
}

impl From<()> for ToolAdapterOutput {
    fn from(_: ()) -> Self {
        ToolAdapterOutput::Empty
    }
}

impl From<Value> for ToolAdapterOutput {
    fn from(value: Value) -> Self {
        ToolAdapterOutput::Json(value)
    }
}

/// Image bytes returned from a tool callable, explicitly tagged with a mime
/// type since Rust return types carry no such metadata on their own.
pub struct ToolImage {
    pub data: Vec<u8>,
    pub mime_type: String,
}

impl ToolImage {
    pub fn png(data: Vec<u8>) -> Self {
        Self {
            data,
            mime_type: "image/png".to_string(),
        }
    }
}

impl From<ToolImage> for ToolAdapterOutput {
    fn from(image: ToolImage) -> Self {
        ToolAdapterOutput::Image {
            data: image.data,
            mime_type: image.mime_type,
        }
    }
}

/// Wrapper opting an arbitrary `Serialize` type into JSON-text output,
/// mirroring the `Json<T>` extractor/response convention used elsewhere in
/// the Rust ecosystem (there is no blanket `impl<T: Serialize>` here since
/// that would collide with the dedicated `()` and `Value` impls above).
pub struct Json<T>(pub T);

impl<T: Serialize> From<Json<T>> for ToolAdapterOutput {
    fn from(Json(value): Json<T>) -> Self {
        match serde_json::to_value(value) {
            Ok(value) => ToolAdapterOutput::Json(value),
            Err(e) => ToolAdapterOutput::Text(format!("failed to serialize tool result: {e}")),
        }
    }
}

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;
type ToolInvoker =
    Arc<dyn Fn(Value, Context) -> BoxFuture<Result<ToolResult, ToolAdapterError>> + Send + Sync>;

/// A host callable wrapped into a registerable, invokable MCP tool.
#[derive(Clone)]
pub struct AdaptedTool {
    pub tool: Tool,
    invoker: ToolInvoker,
}

impl AdaptedTool {
    pub fn name(&self) -> &str {
        &self.tool.name
    }

    /// Decode `arguments`, run the wrapped callable, and translate its
    /// outcome into a `ToolResult`.
    ///
    /// Returns `Err` only when `arguments` cannot be decoded into the
    /// callable's parameter type — a protocol-level `INVALID_PARAMS`
    /// failure. Errors raised by the callable itself are represented in the
    /// `Ok` result as `is_error: Some(true)`.
    pub async fn invoke(
        &self,
        arguments: Value,
        ctx: Context,
    ) -> Result<ToolResult, ToolAdapterError> {
        (self.invoker)(arguments, ctx).await
    }
}

/// Options controlling schema generation and metadata for [`adapt_tool`].
#[derive(Clone, Default)]
pub struct ToolAdapterOptions {
    description: Option<String>,
    annotations: Option<ToolAnnotations>,
    uppercase_schema_types: bool,
}

impl ToolAdapterOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Explicit description; overrides the de-camel-cased identifier.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_annotations(mut self, annotations: ToolAnnotations) -> Self {
        self.annotations = Some(annotations);
        self
    }

    /// Upper-case every `type` value in the generated schema, for providers
    /// that expect `"type":"STRING"` over `"type":"string"`.
    pub fn with_uppercase_schema_types(mut self) -> Self {
        self.uppercase_schema_types = true;
        self
    }
}

/// Wrap `handler` into an [`AdaptedTool`] named `identifier`.
///
/// `Args` is the callable's argument struct; its `JsonSchema` derive drives
/// input-schema generation. The tool-context side channel is not a field on
/// `Args` at all — it is the handler's second parameter — so there is no
/// per-field exclusion step the way there would be in a reflection-based
/// host: the context simply never participates in the schema.
pub fn adapt_tool<Args, R, F, Fut>(identifier: impl Into<String>, handler: F) -> AdaptedTool
where
    Args: DeserializeOwned + JsonSchema + Send + 'static,
    F: Fn(Args, Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, ToolExecutionException>> + Send + 'static,
    R: Into<ToolAdapterOutput>,
{
    adapt_tool_with_options(identifier, ToolAdapterOptions::default(), handler)
}

/// As [`adapt_tool`], with explicit metadata and schema options.
pub fn adapt_tool_with_options<Args, R, F, Fut>(
    identifier: impl Into<String>,
    options: ToolAdapterOptions,
    handler: F,
) -> AdaptedTool
where
    Args: DeserializeOwned + JsonSchema + Send + 'static,
    F: Fn(Args, Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, ToolExecutionException>> + Send + 'static,
    R: Into<ToolAdapterOutput>,
{
    let identifier = identifier.into();
    let description = options
        .description
        .clone()
        .unwrap_or_else(|| decamel_case(&identifier));
    let schema = generate_input_schema::<Args>(options.uppercase_schema_types);

    let mut tool = Tool::new(identifier, description, schema);
    if let Some(annotations) = options.annotations {
        tool = tool.with_annotations(annotations);
    }

    let handler = Arc::new(handler);
    let invoker: ToolInvoker = Arc::new(move |arguments, ctx| {
        let handler = handler.clone();
        Box::pin(async move {
            let arguments = if arguments.is_null() {
                Value::Object(Default::default())
            } else {
                arguments
            };
            let args: Args = serde_json::from_value(arguments)
                .map_err(|e| ToolAdapterError::InvalidArguments(e.to_string()))?;

            match handler(args, ctx).await {
                Ok(output) => Ok(ToolResult {
                    content: output.into().into_content(),
                    is_error: Some(false),
                }),
                Err(exception) => Ok(ToolResult {
                    content: vec![ToolContent::text(exception.0)],
                    is_error: Some(true),
                }),
            }
        })
    });

    AdaptedTool { tool, invoker }
}

fn generate_input_schema<Args: JsonSchema>(uppercase_types: bool) -> Value {
    let mut schema = ultrafast_mcp_core::schema::generation::generate_schema_for::<Args>();
    normalize_root_object(&mut schema);
    if uppercase_types {
        uppercase_schema_types(&mut schema);
    }
    schema
}

/// Force the root schema into `{type:"object", properties, additionalProperties:false}`
/// shape and strip metadata `schemars` adds that a tool's input schema has no
/// use for.
fn normalize_root_object(schema: &mut Value) {
    if let Value::Object(map) = schema {
        map.entry("type".to_string())
            .or_insert_with(|| Value::String("object".to_string()));
        map.entry("properties".to_string())
            .or_insert_with(|| Value::Object(Default::default()));
        map.entry("additionalProperties".to_string())
            .or_insert(Value::Bool(false));
        map.remove("title");
        map.remove("$schema");
    }
}

fn uppercase_schema_types(value: &mut Value) {
    match value {
        Value::Object(map) => {
            if let Some(Value::String(type_name)) = map.get_mut("type") {
                *type_name = type_name.to_uppercase();
            }
            for nested in map.values_mut() {
                uppercase_schema_types(nested);
            }
        }
        Value::Array(items) => {
            for item in items {
                uppercase_schema_types(item);
            }
        }
        _ => {}
    }
}

/// Insert a space before each interior uppercase letter: `getWeather` → `get Weather`.
pub fn decamel_case(identifier: &str) -> String {
    let mut result = String::with_capacity(identifier.len() + 4);
    for (i, ch) in identifier.chars().enumerate() {
        if i > 0 && ch.is_uppercase() {
            result.push(' ');
        }
        result.push(ch);
    }
    result
}

/// Join a server/namespace prefix and a tool name, rejecting either if
/// empty.
///
/// The upstream predicate this was ported from threw when either argument
/// had text, which is backwards: the correct behavior is to throw when
/// either is empty (see the open-question note in the design docs).
pub fn prefixed_tool_name(prefix: &str, tool_name: &str) -> Result<String, ToolAdapterError> {
    if prefix.is_empty() || tool_name.is_empty() {
        return Err(ToolAdapterError::InvalidArguments(
            "prefix and tool name must both be non-empty".to_string(),
        ));
    }
    Ok(format!("{prefix}__{tool_name}"))
}
