//! Configuration types.
//!
//! ```toml
//! [providers.preregistered.time]
//! command = "uvx"
//! args = ["mcp-server-time"]
//!
//! [providers.user.search]
//! transport = "http"
//! url = "https://search.example.com/mcp"
//! headers = { Authorization = "Bearer abc" }
//! timeout_secs = 10
//!
//! [tools]
//! embedded_json = true
//! custom_servers_path = "servers"
//! python = "python3"
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Default per-request timeout for providers, in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConduitConfig {
    /// Provider definitions, by group.
    pub providers: ProvidersConfig,
    /// Tool detection and discovery settings.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<ToolsConfig>,
}

impl ConduitConfig {
    /// Create an empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> crate::Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> crate::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Merge another config on top of this one (other takes priority).
    ///
    /// Provider entries are replaced one name at a time within their group;
    /// the `[tools]` table is replaced as a whole.
    pub fn merge(&mut self, other: ConduitConfig) {
        self.providers
            .preregistered
            .extend(other.providers.preregistered);
        self.providers.user.extend(other.providers.user);

        if other.tools.is_some() {
            self.tools = other.tools;
        }
    }

    /// The `[tools]` table, or its defaults.
    pub fn tools(&self) -> ToolsConfig {
        self.tools.clone().unwrap_or_default()
    }
}

/// Provider groups.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    /// Providers shipped with the application.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub preregistered: BTreeMap<String, ProviderEntry>,
    /// Providers added by the user.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub user: BTreeMap<String, ProviderEntry>,
}

/// Transport kind for a provider entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderTransport {
    /// Spawn a child process.
    #[default]
    Stdio,
    /// POST to a remote endpoint.
    Http,
}

/// One provider as written in the config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderEntry {
    /// Transport kind. Defaults to stdio.
    #[serde(default)]
    pub transport: ProviderTransport,
    /// Command to run (stdio).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub command: String,
    /// Endpoint URL (http).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Command arguments.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    /// Extra environment variables for the process.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    /// Extra HTTP headers.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    /// Per-request timeout in seconds. Defaults to 30.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    /// HTTP retries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retries: Option<u32>,
    /// Whether this provider is used. Defaults to true.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl ProviderEntry {
    /// Create a stdio entry.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            transport: ProviderTransport::Stdio,
            command: command.into(),
            url: None,
            args: Vec::new(),
            env: BTreeMap::new(),
            headers: BTreeMap::new(),
            timeout_secs: None,
            retries: None,
            enabled: true,
        }
    }

    /// Create an HTTP entry.
    pub fn http(url: impl Into<String>) -> Self {
        Self {
            transport: ProviderTransport::Http,
            url: Some(url.into()),
            ..Self::new(String::new())
        }
    }

    /// Add an argument.
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add an environment variable.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Add an HTTP header.
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Set the request timeout.
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// Set enabled state.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Effective timeout in seconds.
    pub fn timeout_secs(&self) -> u64 {
        self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS)
    }

    /// Check if this is an HTTP entry.
    pub fn is_http(&self) -> bool {
        self.transport == ProviderTransport::Http
    }

    /// Environment as `(key, value)` tuples.
    pub fn env_tuples(&self) -> Vec<(String, String)> {
        self.env
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Headers as `(key, value)` tuples.
    pub fn header_tuples(&self) -> Vec<(String, String)> {
        self.headers
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

/// `[tools]` settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Detect tool calls written as JSON inside plain model text.
    pub embedded_json: bool,
    /// Directory of locally authored provider programs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_servers_path: Option<PathBuf>,
    /// Interpreter used for `*.py` custom providers.
    pub python: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            embedded_json: false,
            custom_servers_path: None,
            python: "python3".to_string(),
        }
    }
}
