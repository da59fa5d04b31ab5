//! CLI command handlers.

pub mod call;
pub mod providers;
pub mod replay;
pub mod tools;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result};

use conduit_agent::{Catalog, DiscoveryReport, Orchestrator};
use conduit_config::{
    ConduitConfig, ProviderGroup, ResolvedProvider, ResolvedProviders, ToolsConfig,
    load_config, load_config_file, resolve_providers,
};
use conduit_mcp::{ProviderDescriptor, ProviderOrigin, SessionManager};

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Explicit config file, bypassing discovery.
    pub config_path: Option<PathBuf>,
    /// Output as JSON for scripting.
    pub json_output: bool,
    /// Verbose output enabled.
    pub verbose: bool,
}

impl Context {
    /// Load the configuration and the directory relative paths resolve
    /// against.
    pub fn load_config(&self) -> Result<(ConduitConfig, PathBuf)> {
        match &self.config_path {
            Some(path) => {
                let config = load_config_file(path)
                    .with_context(|| format!("loading {}", path.display()))?;
                let base = path
                    .parent()
                    .filter(|p| !p.as_os_str().is_empty())
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| PathBuf::from("."));
                Ok((config, base))
            }
            None => {
                let loaded = load_config(None)?;
                let base = loaded
                    .base_dir()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| PathBuf::from("."));
                Ok((loaded.config, base))
            }
        }
    }

    /// Load the configuration and resolve its providers.
    pub fn resolve(&self) -> Result<(ConduitConfig, ResolvedProviders)> {
        let (config, base) = self.load_config()?;
        let resolved = resolve_providers(&config, &base)?;
        Ok((config, resolved))
    }

    /// Start every provider and build the catalog.
    pub async fn start(&self) -> Result<Runtime> {
        let (config, resolved) = self.resolve()?;
        let manager = Arc::new(SessionManager::new(
            resolved.providers.iter().map(provider_descriptor),
        ));
        let (catalog, report) = Catalog::discover(&manager).await?;

        for (name, error) in &report.failed {
            if !self.json_output {
                eprintln!("warning: provider '{name}' unavailable: {error}");
            }
        }

        Ok(Runtime {
            manager,
            catalog: Arc::new(catalog),
            report,
            tools: config.tools(),
        })
    }
}

/// Live providers plus the catalog built from them.
pub struct Runtime {
    /// Session manager owning every provider.
    pub manager: Arc<SessionManager>,
    /// Catalog across all providers that started.
    pub catalog: Arc<Catalog>,
    /// Which providers started.
    pub report: DiscoveryReport,
    /// `[tools]` settings.
    pub tools: ToolsConfig,
}

impl Runtime {
    /// An orchestrator dispatching through this runtime's providers.
    pub fn orchestrator(&self) -> Orchestrator {
        Orchestrator::new(self.manager.clone()).with_embedded_json(self.tools.embedded_json)
    }

    /// Stop every provider.
    pub async fn shutdown(&self) {
        self.manager.shutdown_all().await;
    }
}

/// Launch descriptor for a resolved provider.
pub fn provider_descriptor(provider: &ResolvedProvider) -> ProviderDescriptor {
    let entry = &provider.entry;
    let descriptor = match &entry.url {
        Some(url) if entry.is_http() => ProviderDescriptor::http(&provider.name, url),
        _ => ProviderDescriptor::new(&provider.name, &entry.command).with_args(entry.args.clone()),
    };

    let mut descriptor = descriptor
        .with_timeout(Duration::from_secs(entry.timeout_secs()))
        .with_origin(match provider.group {
            ProviderGroup::PreRegistered => ProviderOrigin::PreRegistered,
            ProviderGroup::User => ProviderOrigin::UserAdded,
            ProviderGroup::Custom => ProviderOrigin::Custom,
        });
    descriptor.env = entry.env_tuples();
    descriptor.headers = entry.header_tuples();
    if let Some(retries) = entry.retries {
        descriptor = descriptor.with_retries(retries);
    }
    descriptor
}
