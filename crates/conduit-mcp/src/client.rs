//! Client for a single provider.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::capability::CapabilitySet;
use crate::error::{McpError, Result};
use crate::protocol::{
    CallToolParams, CallToolResult, GetPromptResult, InitializeParams, InitializeResult,
    JsonRpcNotification, JsonRpcRequest, ListPromptsResult, ListResourcesResult, ListToolsResult,
    NativeInvocation, PaginatedParams, PromptInfo, ReadResourceResult, ResourceInfo,
    ServerCapabilities, ServerInfo, ToolInfo,
};
use crate::transport::{DEFAULT_TIMEOUT, HttpTransportConfig, McpTransport};

/// Upper bound on pages fetched for one list request.
const MAX_LIST_PAGES: usize = 64;

/// Transport type for provider connections.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportType {
    /// Spawn a child process and talk over its stdio.
    #[default]
    Stdio,
    /// Connect to a remote provider via HTTP POST.
    Http,
}

/// Where a provider definition came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderOrigin {
    /// Shipped with the application.
    PreRegistered,
    /// Added by the user in their config.
    #[default]
    UserAdded,
    /// Discovered in the custom servers directory.
    Custom,
}

/// Immutable description of how to reach one provider.
#[derive(Debug, Clone)]
pub struct ProviderDescriptor {
    /// Unique provider name.
    pub name: String,
    /// Transport type.
    pub transport: TransportType,
    /// Command to spawn (stdio).
    pub command: String,
    /// Endpoint URL (HTTP).
    pub url: Option<String>,
    /// Arguments to pass to the command.
    pub args: Vec<String>,
    /// Environment variables to set.
    pub env: Vec<(String, String)>,
    /// HTTP headers.
    pub headers: Vec<(String, String)>,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Number of retries (HTTP).
    pub retries: Option<u32>,
    /// Which configuration group defined this provider.
    pub origin: ProviderOrigin,
}

impl ProviderDescriptor {
    /// Create a new descriptor for a stdio provider.
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            transport: TransportType::Stdio,
            command: command.into(),
            url: None,
            args: Vec::new(),
            env: Vec::new(),
            headers: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
            retries: None,
            origin: ProviderOrigin::default(),
        }
    }

    /// Create a new descriptor for an HTTP provider.
    pub fn http(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            transport: TransportType::Http,
            url: Some(url.into()),
            ..Self::new(name, String::new())
        }
    }

    /// Replace the argument list.
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Add an argument.
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add an environment variable.
    pub fn with_env_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Add an HTTP header.
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    /// Set the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set number of retries (HTTP).
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = Some(retries);
        self
    }

    /// Set the configuration group.
    pub fn with_origin(mut self, origin: ProviderOrigin) -> Self {
        self.origin = origin;
        self
    }

    /// Check if this is an HTTP provider.
    pub fn is_http(&self) -> bool {
        self.transport == TransportType::Http
    }

    /// Check if this is a stdio provider.
    pub fn is_stdio(&self) -> bool {
        self.transport == TransportType::Stdio
    }
}

/// A client connected to a single provider.
pub struct McpClient {
    descriptor: ProviderDescriptor,
    transport: McpTransport,
    init: Option<InitializeResult>,
    request_id: AtomicU64,
}

impl McpClient {
    /// Connect using the descriptor's transport.
    ///
    /// This spawns or connects but does NOT perform the handshake; call
    /// [`initialize`](Self::initialize) next.
    pub fn connect(descriptor: ProviderDescriptor) -> Result<Self> {
        let transport = match descriptor.transport {
            TransportType::Stdio => {
                let transport = McpTransport::spawn_stdio(
                    &descriptor.command,
                    &descriptor.args,
                    &descriptor.env,
                    descriptor.timeout,
                )?;
                tracing::info!(
                    server = %descriptor.name,
                    command = %descriptor.command,
                    "connected to provider via stdio"
                );
                transport
            }
            TransportType::Http => {
                let url = descriptor
                    .url
                    .as_ref()
                    .ok_or_else(|| McpError::transport("HTTP transport requires a URL"))?;

                let mut http_config =
                    HttpTransportConfig::new(url).with_timeout(descriptor.timeout);
                if let Some(retries) = descriptor.retries {
                    http_config = http_config.with_retries(retries);
                }
                for (key, value) in &descriptor.headers {
                    http_config = http_config.with_header(key, value);
                }

                let transport = McpTransport::connect_http(http_config)?;
                tracing::info!(server = %descriptor.name, url = %url, "connected to provider via HTTP");
                transport
            }
        };

        Ok(Self {
            descriptor,
            transport,
            init: None,
            request_id: AtomicU64::new(1),
        })
    }

    /// Get the provider name.
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    /// Get the descriptor this client was built from.
    pub fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    /// Get the server info (after initialization).
    pub fn server_info(&self) -> Option<&ServerInfo> {
        self.init.as_ref().map(|i| &i.server_info)
    }

    /// Get the advertised server capabilities (after initialization).
    pub fn server_capabilities(&self) -> Option<&ServerCapabilities> {
        self.init.as_ref().map(|i| &i.capabilities)
    }

    /// Check if the handshake has completed.
    pub fn is_initialized(&self) -> bool {
        self.init.is_some()
    }

    fn next_request_id(&self) -> u64 {
        self.request_id.fetch_add(1, Ordering::SeqCst)
    }

    async fn send_request(&self, method: &str, params: Option<Value>) -> Result<Value> {
        let request = JsonRpcRequest::new(self.next_request_id(), method, params);
        let response = self.transport.send_request(&request).await?;
        response
            .into_result()
            .map_err(|e| McpError::server_error(e.code, e.message, e.data))
    }

    fn ensure_initialized(&self) -> Result<()> {
        if self.init.is_some() {
            Ok(())
        } else {
            Err(McpError::NotInitialized)
        }
    }

    /// Perform the handshake: `initialize`, then `notifications/initialized`.
    pub async fn initialize(&mut self) -> Result<&InitializeResult> {
        if self.init.is_none() {
            let params = serde_json::to_value(InitializeParams::default())?;
            let result = self.send_request("initialize", Some(params)).await?;
            let init_result: InitializeResult = serde_json::from_value(result)?;

            tracing::info!(
                server = %self.descriptor.name,
                remote = %init_result.server_info.name,
                version = %init_result.server_info.version,
                protocol = %init_result.protocol_version,
                "provider initialized"
            );

            self.transport
                .send_notification(&JsonRpcNotification::new("notifications/initialized", None))
                .await?;
            self.init = Some(init_result);
        }

        self.init.as_ref().ok_or(McpError::NotInitialized)
    }

    /// Follow `nextCursor` until the list is exhausted.
    async fn list_paginated<T, F>(&self, method: &str, mut page: F) -> Result<Vec<T>>
    where
        F: FnMut(Value) -> Result<(Vec<T>, Option<String>)>,
    {
        self.ensure_initialized()?;

        let mut items = Vec::new();
        let mut cursor = None;
        for _ in 0..MAX_LIST_PAGES {
            let params = serde_json::to_value(PaginatedParams { cursor })?;
            let (batch, next) = page(self.send_request(method, Some(params)).await?)?;
            items.extend(batch);
            match next {
                Some(next) => cursor = Some(next),
                None => return Ok(items),
            }
        }

        tracing::warn!(server = %self.descriptor.name, method, "list pagination limit reached");
        Ok(items)
    }

    /// List available tools from the provider.
    pub async fn list_tools(&self) -> Result<Vec<ToolInfo>> {
        let tools = self
            .list_paginated("tools/list", |v| {
                let r: ListToolsResult = serde_json::from_value(v)?;
                Ok((r.tools, r.next_cursor))
            })
            .await?;
        tracing::debug!(server = %self.descriptor.name, tool_count = tools.len(), "listed tools");
        Ok(tools)
    }

    /// List resources from the provider.
    pub async fn list_resources(&self) -> Result<Vec<ResourceInfo>> {
        let resources = self
            .list_paginated("resources/list", |v| {
                let r: ListResourcesResult = serde_json::from_value(v)?;
                Ok((r.resources, r.next_cursor))
            })
            .await?;
        tracing::debug!(
            server = %self.descriptor.name,
            resource_count = resources.len(),
            "listed resources"
        );
        Ok(resources)
    }

    /// List prompt templates from the provider.
    pub async fn list_prompts(&self) -> Result<Vec<PromptInfo>> {
        let prompts = self
            .list_paginated("prompts/list", |v| {
                let r: ListPromptsResult = serde_json::from_value(v)?;
                Ok((r.prompts, r.next_cursor))
            })
            .await?;
        tracing::debug!(
            server = %self.descriptor.name,
            prompt_count = prompts.len(),
            "listed prompts"
        );
        Ok(prompts)
    }

    /// Query everything the provider advertised during the handshake.
    ///
    /// Tools are always listed. Resources and prompts are listed only when
    /// the matching capability was advertised.
    pub async fn list_capabilities(&self) -> Result<CapabilitySet> {
        let caps = self
            .server_capabilities()
            .cloned()
            .ok_or(McpError::NotInitialized)?;

        let tools = self.list_tools().await?;
        let resources = if caps.resources.is_some() {
            self.list_resources().await?
        } else {
            Vec::new()
        };
        let prompts = if caps.prompts.is_some() {
            self.list_prompts().await?
        } else {
            Vec::new()
        };

        Ok(CapabilitySet {
            tools,
            resources,
            prompts,
        })
    }

    /// Call a tool on the provider.
    pub async fn call_tool(&self, name: &str, arguments: Option<Value>) -> Result<CallToolResult> {
        self.ensure_initialized()?;

        let params = CallToolParams {
            name: name.to_string(),
            arguments,
        };
        let result = self
            .send_request("tools/call", Some(serde_json::to_value(&params)?))
            .await?;
        let call_result: CallToolResult = serde_json::from_value(result)?;

        if call_result.is_error() {
            tracing::warn!(server = %self.descriptor.name, tool = %name, "tool call returned error");
        } else {
            tracing::debug!(server = %self.descriptor.name, tool = %name, "tool call succeeded");
        }

        Ok(call_result)
    }

    /// Dispatch any native invocation and normalize the reply to a tool
    /// result.
    pub async fn invoke(&self, invocation: &NativeInvocation) -> Result<CallToolResult> {
        match invocation {
            NativeInvocation::CallTool { name, arguments } => {
                self.call_tool(name, Some(arguments.clone())).await
            }
            NativeInvocation::GetPrompt { .. } | NativeInvocation::ReadResource { .. } => {
                self.ensure_initialized()?;
                let result = self
                    .send_request(invocation.method(), Some(invocation.params()))
                    .await?;
                tracing::debug!(
                    server = %self.descriptor.name,
                    method = invocation.method(),
                    target = %invocation.target(),
                    "invocation succeeded"
                );
                Ok(match invocation {
                    NativeInvocation::GetPrompt { .. } => {
                        serde_json::from_value::<GetPromptResult>(result)?.into()
                    }
                    _ => serde_json::from_value::<ReadResourceResult>(result)?.into(),
                })
            }
        }
    }

    /// Shut the connection down.
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!(server = %self.descriptor.name, "shutting down provider client");
        self.transport.shutdown().await
    }

    /// Check if the connection is still active.
    pub async fn is_connected(&self) -> bool {
        self.transport.is_connected().await
    }
}

impl std::fmt::Debug for McpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpClient")
            .field("name", &self.descriptor.name)
            .field("transport", &self.descriptor.transport)
            .field("initialized", &self.is_initialized())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_builder() {
        let descriptor = ProviderDescriptor::new("bmi", "python3")
            .with_arg("bmi_server.py")
            .with_env_var("DEBUG", "1")
            .with_timeout(Duration::from_secs(10))
            .with_origin(ProviderOrigin::Custom);

        assert_eq!(descriptor.name, "bmi");
        assert_eq!(descriptor.command, "python3");
        assert_eq!(descriptor.args, vec!["bmi_server.py"]);
        assert_eq!(descriptor.env, vec![("DEBUG".to_string(), "1".to_string())]);
        assert_eq!(descriptor.timeout, Duration::from_secs(10));
        assert_eq!(descriptor.origin, ProviderOrigin::Custom);
        assert!(descriptor.is_stdio());
    }

    #[test]
    fn test_http_descriptor_builder() {
        let descriptor = ProviderDescriptor::http("remote", "https://mcp.example.com/api")
            .with_header("Authorization", "Bearer token123")
            .with_retries(5);

        assert!(descriptor.is_http());
        assert_eq!(descriptor.url.as_deref(), Some("https://mcp.example.com/api"));
        assert_eq!(descriptor.timeout, DEFAULT_TIMEOUT);
        assert_eq!(descriptor.retries, Some(5));
    }

    #[tokio::test]
    async fn test_connect_nonexistent_command() {
        let descriptor = ProviderDescriptor::new("test", "nonexistent-provider-12345");
        assert!(matches!(
            McpClient::connect(descriptor),
            Err(McpError::SpawnFailed(_))
        ));
    }

    #[test]
    fn test_connect_http_no_url() {
        let mut descriptor = ProviderDescriptor::http("remote", "http://localhost:8080/mcp");
        descriptor.url = None;
        assert!(McpClient::connect(descriptor).is_err());
    }

    #[tokio::test]
    async fn test_calls_before_initialize_fail() {
        let descriptor = ProviderDescriptor::http("remote", "http://localhost:8080/mcp");
        let client = McpClient::connect(descriptor).unwrap();
        assert!(!client.is_initialized());
        assert!(matches!(
            client.list_tools().await,
            Err(McpError::NotInitialized)
        ));
        assert!(matches!(
            client.call_tool("echo", None).await,
            Err(McpError::NotInitialized)
        ));
    }
}
