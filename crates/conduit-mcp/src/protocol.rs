//! JSON-RPC 2.0 protocol types for talking to tool providers.
//!
//! Covers the handshake (`initialize`), capability discovery (`tools/list`,
//! `resources/list`, `prompts/list`) and the three invocation methods
//! (`tools/call`, `prompts/get`, `resources/read`).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Value of the `jsonrpc` member on every frame.
pub const JSONRPC_VERSION: &str = "2.0";

/// Protocol revision offered in `initialize`.
pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";

// ─────────────────────────────────────────────────────────────────────────────
// Framing
// ─────────────────────────────────────────────────────────────────────────────

/// An outbound call that expects a reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: u64,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    pub fn new(id: u64, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            method: method.into(),
            params,
        }
    }
}

/// An outbound message with no id; providers never answer it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcNotification {
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params,
        }
    }
}

/// A reply to a request, carrying either `result` or `error`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    /// Id of the request being answered.
    pub id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// Build a success response.
    pub fn success(id: u64, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// True when the provider answered with an error object.
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Split into the result value (`null` when absent) or the error object.
    pub fn into_result(self) -> Result<Value, JsonRpcError> {
        if let Some(error) = self.error {
            Err(error)
        } else {
            Ok(self.result.unwrap_or(Value::Null))
        }
    }
}

/// The `error` member of a failed reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;
}

/// Classification of a raw message read from a provider.
///
/// Providers may interleave their own requests (`ping`, `roots/list`) and
/// notifications with responses, so every inbound message is sorted before
/// it is matched against the outstanding request.
#[derive(Debug, Clone)]
pub enum IncomingMessage {
    /// A response to one of our requests.
    Response(JsonRpcResponse),
    /// A request initiated by the provider.
    Request {
        /// Provider-chosen request id (number or string).
        id: Value,
        /// Method name.
        method: String,
    },
    /// A notification from the provider.
    Notification {
        /// Method name.
        method: String,
    },
}

impl IncomingMessage {
    /// Classify a decoded JSON value.
    pub fn classify(value: Value) -> Result<Self, serde_json::Error> {
        let method = value
            .get("method")
            .and_then(Value::as_str)
            .map(str::to_string);
        match (method, value.get("id").cloned()) {
            (Some(method), Some(id)) if !id.is_null() => Ok(Self::Request { id, method }),
            (Some(method), _) => Ok(Self::Notification { method }),
            (None, _) => Ok(Self::Response(serde_json::from_value(value)?)),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Handshake
// ─────────────────────────────────────────────────────────────────────────────

/// What we advertise in `initialize`. Conduit offers nothing optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientCapabilities {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub experimental: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sampling: Option<Value>,
}

/// Name and version reported to providers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientInfo {
    pub name: String,
    pub version: String,
}

impl Default for ClientInfo {
    fn default() -> Self {
        Self {
            name: "conduit".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// `initialize` request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    pub protocol_version: String,
    pub capabilities: ClientCapabilities,
    pub client_info: ClientInfo,
}

impl Default for InitializeParams {
    fn default() -> Self {
        Self {
            protocol_version: MCP_PROTOCOL_VERSION.to_string(),
            capabilities: ClientCapabilities::default(),
            client_info: ClientInfo::default(),
        }
    }
}

/// Feature blocks a provider declares. A missing block means the provider
/// does not serve that list, so discovery skips it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerCapabilities {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<ListChangedCapability>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompts: Option<ListChangedCapability>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub experimental: Option<Value>,
}

/// Capability block shared by `tools` and `prompts`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListChangedCapability {
    /// Whether the server emits list-changed notifications.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub list_changed: Option<bool>,
}

/// Name and version a provider reports about itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
}

/// `initialize` reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    pub protocol_version: String,
    pub capabilities: ServerCapabilities,
    pub server_info: ServerInfo,
    /// Optional usage instructions supplied by the server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Capability Discovery
// ─────────────────────────────────────────────────────────────────────────────

/// One entry of a `tools/list` page.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolInfo {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Provider-native JSON Schema for the arguments.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<Value>,
}

/// A `tools/list` page.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListToolsResult {
    pub tools: Vec<ToolInfo>,
    /// Cursor for the next page, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

/// A resource exposed by the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceInfo {
    /// Resource URI.
    pub uri: String,
    /// Short resource name.
    pub name: String,
    /// Human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// MIME type of the resource content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

/// Result of the resources/list request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResourcesResult {
    /// Resources on this page.
    pub resources: Vec<ResourceInfo>,
    /// Cursor for the next page, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

/// A named argument accepted by a prompt template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptArgument {
    /// Argument name.
    pub name: String,
    /// Human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Whether the argument must be supplied.
    #[serde(default)]
    pub required: bool,
}

/// A prompt template exposed by the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptInfo {
    /// Prompt name.
    pub name: String,
    /// Human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Declared arguments.
    #[serde(default)]
    pub arguments: Vec<PromptArgument>,
}

/// Result of the prompts/list request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListPromptsResult {
    /// Prompts on this page.
    pub prompts: Vec<PromptInfo>,
    /// Cursor for the next page, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

/// Parameters for any paginated list request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PaginatedParams {
    /// Opaque cursor returned by the previous page.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Invocation
// ─────────────────────────────────────────────────────────────────────────────

/// `tools/call` request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallToolParams {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Value>,
}

/// A native invocation payload, ready to be sent to one provider.
#[derive(Debug, Clone, PartialEq)]
pub enum NativeInvocation {
    /// `tools/call`
    CallTool {
        /// Tool name as the provider knows it.
        name: String,
        /// Argument object.
        arguments: Value,
    },
    /// `prompts/get`
    GetPrompt {
        /// Prompt name.
        name: String,
        /// Prompt arguments (always strings on the wire).
        arguments: BTreeMap<String, String>,
    },
    /// `resources/read`
    ReadResource {
        /// Resource URI.
        uri: String,
    },
}

impl NativeInvocation {
    /// JSON-RPC method for this invocation.
    pub fn method(&self) -> &'static str {
        match self {
            Self::CallTool { .. } => "tools/call",
            Self::GetPrompt { .. } => "prompts/get",
            Self::ReadResource { .. } => "resources/read",
        }
    }

    /// JSON-RPC params for this invocation.
    pub fn params(&self) -> Value {
        match self {
            Self::CallTool { name, arguments } => serde_json::json!({
                "name": name,
                "arguments": arguments,
            }),
            Self::GetPrompt { name, arguments } => serde_json::json!({
                "name": name,
                "arguments": arguments,
            }),
            Self::ReadResource { uri } => serde_json::json!({ "uri": uri }),
        }
    }

    /// Short label used in logs.
    pub fn target(&self) -> &str {
        match self {
            Self::CallTool { name, .. } | Self::GetPrompt { name, .. } => name,
            Self::ReadResource { uri } => uri,
        }
    }
}

/// Contents of an embedded or read resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceContents {
    /// Resource URI.
    pub uri: String,
    /// MIME type, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    /// Text body for textual resources.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Base64 body for binary resources.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blob: Option<String>,
}

/// One item of result content, tagged by `type`.
///
/// Binary payloads (`image`, `audio`) stay base64; only `text` and textual
/// resources contribute to [`CallToolResult::text`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ToolContent {
    Text {
        text: String,
    },
    Image {
        data: String,
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
    Audio {
        data: String,
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
    Resource {
        resource: ResourceContents,
    },
    /// Any content kind added after this client was written.
    #[serde(other)]
    Unsupported,
}

/// Uniform reply shape for all three invocation methods.
///
/// `prompts/get` and `resources/read` replies are converted into this via
/// `From`, so callers only ever see one result type.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallToolResult {
    #[serde(default)]
    pub content: Vec<ToolContent>,
    /// Set by the provider when the tool itself failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
}

impl CallToolResult {
    /// Textual items joined with newlines, or `None` if there are none.
    pub fn text(&self) -> Option<String> {
        let parts: Vec<&str> = self
            .content
            .iter()
            .filter_map(|c| match c {
                ToolContent::Text { text } => Some(text.as_str()),
                ToolContent::Resource { resource } => resource.text.as_deref(),
                _ => None,
            })
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("\n"))
        }
    }

    /// `isError`, treating an absent flag as success.
    pub fn is_error(&self) -> bool {
        self.is_error.unwrap_or(false)
    }
}

/// A message produced by `prompts/get`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptMessage {
    /// Message role ("user" or "assistant").
    pub role: String,
    /// Message content.
    pub content: ToolContent,
}

/// Result of the prompts/get request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetPromptResult {
    /// Optional description of the rendered prompt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Rendered messages.
    #[serde(default)]
    pub messages: Vec<PromptMessage>,
}

impl From<GetPromptResult> for CallToolResult {
    fn from(result: GetPromptResult) -> Self {
        Self {
            content: result.messages.into_iter().map(|m| m.content).collect(),
            is_error: None,
        }
    }
}

/// Result of the resources/read request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadResourceResult {
    /// Resource contents.
    #[serde(default)]
    pub contents: Vec<ResourceContents>,
}

impl From<ReadResourceResult> for CallToolResult {
    fn from(result: ReadResourceResult) -> Self {
        Self {
            content: result
                .contents
                .into_iter()
                .map(|resource| ToolContent::Resource { resource })
                .collect(),
            is_error: None,
        }
    }
}
