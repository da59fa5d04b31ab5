//! Provider protocol client and session manager for Conduit.
//!
//! Tool providers are external programs (or HTTP endpoints) speaking the
//! Model Context Protocol. This crate starts them, performs the handshake,
//! discovers what they expose, and dispatches invocations to them.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  SessionManager                                             │
//! │  - One slot per provider, started lazily on acquire         │
//! │  - Restart after degradation, lazy crash detection          │
//! └─────────────────────────────────────────────────────────────┘
//!                           │
//!                           ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  McpClient                                                  │
//! │  - initialize, tools/resources/prompts list, invocations    │
//! └─────────────────────────────────────────────────────────────┘
//!                           │
//!                           ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  McpTransport                                               │
//! │  - Stdio: newline-delimited JSON-RPC 2.0, one request at    │
//! │    a time, matched by id                                    │
//! │  - HTTP: POST, JSON or event-stream replies, concurrent     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The protocol flow is:
//! 1. Client sends `initialize` with capabilities
//! 2. Provider responds with its capabilities
//! 3. Client sends `notifications/initialized`
//! 4. Client lists tools (and resources/prompts when advertised)
//! 5. Client dispatches `tools/call`, `prompts/get`, `resources/read`

pub mod capability;
pub mod client;
pub mod error;
pub mod manager;
pub mod protocol;
pub mod transport;

pub use capability::{CapabilitySet, ToolDescriptor, ToolKind};
pub use client::{McpClient, ProviderDescriptor, ProviderOrigin, TransportType};
pub use error::{McpError, Result, SessionError, SessionResult};
pub use manager::{HealthState, ProviderSession, SessionManager};
pub use protocol::{
    CallToolResult, InitializeResult, JsonRpcError, JsonRpcNotification, JsonRpcRequest,
    JsonRpcResponse, NativeInvocation, PromptInfo, ResourceContents, ResourceInfo,
    ServerCapabilities, ServerInfo, ToolContent, ToolInfo,
};
pub use transport::{DEFAULT_TIMEOUT, HttpTransportConfig, McpTransport};
