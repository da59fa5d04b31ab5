//! Error types for provider protocol and session operations.

use thiserror::Error;

/// Result type for low-level protocol operations.
pub type Result<T> = std::result::Result<T, McpError>;

/// Error type for talking to a single provider.
#[derive(Debug, Error)]
pub enum McpError {
    /// Failed to spawn the provider process.
    #[error("failed to spawn provider: {0}")]
    SpawnFailed(String),

    /// Failed to communicate with the provider.
    #[error("transport error: {0}")]
    Transport(String),

    /// JSON-RPC protocol error.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Provider returned an error response.
    #[error("server error {code}: {message}")]
    ServerError {
        /// Error code from the provider.
        code: i64,
        /// Error message from the provider.
        message: String,
        /// Optional additional data.
        data: Option<serde_json::Value>,
    },

    /// Handshake has not completed.
    #[error("provider not initialized - call initialize() first")]
    NotInitialized,

    /// Connection closed.
    #[error("connection closed")]
    ConnectionClosed,

    /// Timeout waiting for response.
    #[error("timeout waiting for response")]
    Timeout,
}

impl McpError {
    /// Create a spawn failed error.
    pub fn spawn_failed(msg: impl Into<String>) -> Self {
        Self::SpawnFailed(msg.into())
    }

    /// Create a transport error.
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Create a protocol error.
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Create a server error from an error response.
    pub fn server_error(
        code: i64,
        message: impl Into<String>,
        data: Option<serde_json::Value>,
    ) -> Self {
        Self::ServerError {
            code,
            message: message.into(),
            data,
        }
    }

    /// Whether this failure leaves the connection in an unknown state.
    ///
    /// A provider that answered with a JSON-RPC error is still healthy;
    /// anything that broke the channel is not.
    pub fn is_connection_failure(&self) -> bool {
        matches!(
            self,
            Self::Transport(_)
                | Self::Io(_)
                | Self::ConnectionClosed
                | Self::Timeout
                | Self::Protocol(_)
        )
    }
}

/// Result type for session manager operations.
pub type SessionResult<T> = std::result::Result<T, SessionError>;

/// Errors surfaced by the session manager.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    /// The provider could not be started, or is not configured.
    #[error("provider '{provider}' unavailable: {reason}")]
    ProviderUnavailable {
        /// Provider name.
        provider: String,
        /// Why it could not be used.
        reason: String,
    },

    /// A request reached a provider session but did not produce a result.
    #[error("invocation of '{tool}' on '{provider}' failed: {reason}")]
    InvocationFailed {
        /// Provider name.
        provider: String,
        /// Tool, prompt or resource being invoked.
        tool: String,
        /// Failure detail.
        reason: String,
    },
}

impl SessionError {
    /// Create a provider unavailable error.
    pub fn unavailable(provider: impl Into<String>, reason: impl ToString) -> Self {
        Self::ProviderUnavailable {
            provider: provider.into(),
            reason: reason.to_string(),
        }
    }

    /// Create an invocation failed error.
    pub fn invocation(
        provider: impl Into<String>,
        tool: impl Into<String>,
        reason: impl ToString,
    ) -> Self {
        Self::InvocationFailed {
            provider: provider.into(),
            tool: tool.into(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = McpError::spawn_failed("command not found");
        assert!(err.to_string().contains("spawn"));
        assert!(err.to_string().contains("command not found"));

        let err = McpError::server_error(-32600, "Invalid Request", None);
        assert!(err.to_string().contains("-32600"));
        assert!(err.to_string().contains("Invalid Request"));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let mcp_err: McpError = json_err.into();
        assert!(matches!(mcp_err, McpError::Json(_)));
    }

    #[test]
    fn test_connection_failure_classification() {
        assert!(McpError::Timeout.is_connection_failure());
        assert!(McpError::ConnectionClosed.is_connection_failure());
        assert!(McpError::transport("broken pipe").is_connection_failure());
        assert!(!McpError::server_error(-32602, "bad args", None).is_connection_failure());
    }

    #[test]
    fn test_session_error_display() {
        let err = SessionError::unavailable("weather", "not configured");
        assert_eq!(
            err.to_string(),
            "provider 'weather' unavailable: not configured"
        );

        let err = SessionError::invocation("bmi", "calculate_bmi", McpError::Timeout);
        assert!(err.to_string().contains("calculate_bmi"));
        assert!(err.to_string().contains("timeout"));
    }
}
