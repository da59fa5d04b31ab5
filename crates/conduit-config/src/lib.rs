//! Configuration for Conduit.
//!
//! Provides TOML-based configuration with:
//! - Provider groups (`[providers.preregistered.<name>]`, `[providers.user.<name>]`)
//! - Discovery of locally authored providers in a custom servers directory
//! - Launcher checks for `npx`, `uvx` and `node` based providers
//! - Config file layering (user config + project-local overrides)

pub mod discovery;
pub mod error;
pub mod providers;
pub mod types;

pub use discovery::{
    ConfigSource, LoadedConfig, load_config, load_config_file, load_config_with_options,
    save_config, user_config_dir, user_config_path,
};
pub use error::{ConfigError, Result};
pub use providers::{
    ProviderGroup, ResolvedProvider, ResolvedProviders, RuntimeAvailability,
    discover_custom_servers, on_path, resolve_providers, resolve_providers_with,
};
pub use types::*;
