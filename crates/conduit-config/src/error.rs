//! Configuration error types.

/// Result type alias for config operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors that can occur during configuration loading and resolution.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read a config file.
    #[error("failed to read config file '{path}': {source}")]
    ReadFile {
        path: String,
        source: std::io::Error,
    },

    /// Failed to write a config file.
    #[error("failed to write config file '{path}': {source}")]
    WriteFile {
        path: String,
        source: std::io::Error,
    },

    /// Failed to list the custom servers directory.
    #[error("failed to read custom servers directory '{path}': {source}")]
    ReadDir {
        path: String,
        source: std::io::Error,
    },

    /// Failed to parse TOML.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Failed to serialize config.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// The same provider name is defined more than once.
    #[error("provider '{name}' is defined in both {first} and {second}")]
    DuplicateProvider {
        name: String,
        first: String,
        second: String,
    },

    /// A provider entry cannot be launched as written.
    #[error("provider '{name}' is invalid: {reason}")]
    InvalidProvider { name: String, reason: String },
}
