//! Error types for the agent crate.

use thiserror::Error;

/// Result type alias using the agent error type.
pub type Result<T> = std::result::Result<T, AgentError>;

/// Error type for agent operations.
#[derive(Debug, Error)]
pub enum AgentError {
    /// The model named a tool the catalog does not contain.
    #[error("Tool '{0}' is not available.")]
    UnknownTool(String),
}

/// Errors raised while building the tool catalog. Fatal: no partial
/// catalog is produced.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CatalogError {
    /// Two providers expose a capability with the same name.
    #[error("tool '{name}' is exposed by both '{first}' and '{second}'")]
    DuplicateTool {
        /// Colliding tool name.
        name: String,
        /// Provider registered first.
        first: String,
        /// Provider that collided.
        second: String,
    },
}
