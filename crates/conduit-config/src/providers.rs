//! Provider resolution: groups, custom server discovery, launcher checks.
//!
//! Every provider ends up as a [`ResolvedProvider`] tagged with the group it
//! came from. Names must be unique across all groups, including programs
//! discovered in the custom servers directory.

use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::types::{ConduitConfig, ProviderEntry, ProviderTransport};
use crate::{ConfigError, Result};

/// Which part of the configuration a provider came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderGroup {
    /// `[providers.preregistered]`
    PreRegistered,
    /// `[providers.user]`
    User,
    /// A program found in `custom_servers_path`.
    Custom,
}

impl fmt::Display for ProviderGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PreRegistered => f.write_str("providers.preregistered"),
            Self::User => f.write_str("providers.user"),
            Self::Custom => f.write_str("custom servers"),
        }
    }
}

/// A provider ready to be turned into a launch descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedProvider {
    /// Unique provider name.
    pub name: String,
    /// Origin group.
    pub group: ProviderGroup,
    /// Launch details.
    pub entry: ProviderEntry,
}

/// Launchers some providers depend on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeAvailability {
    /// `npx` on PATH.
    pub npx: bool,
    /// `uvx` on PATH.
    pub uvx: bool,
    /// `node` on PATH.
    pub node: bool,
}

impl RuntimeAvailability {
    /// Probe PATH for every launcher.
    pub fn detect() -> Self {
        let runtimes = Self {
            npx: on_path("npx"),
            uvx: on_path("uvx"),
            node: on_path("node"),
        };
        tracing::debug!(
            npx = runtimes.npx,
            uvx = runtimes.uvx,
            node = runtimes.node,
            "detected provider runtimes"
        );
        runtimes
    }

    /// Assume every launcher is present.
    pub fn all() -> Self {
        Self {
            npx: true,
            uvx: true,
            node: true,
        }
    }

    /// Whether `command` can be launched. Commands other than the known
    /// launchers are assumed to be available.
    pub fn allows(&self, command: &str) -> bool {
        match command {
            "npx" => self.npx,
            "uvx" => self.uvx,
            "node" => self.node,
            _ => true,
        }
    }
}

/// Check whether `program` is an executable file somewhere on PATH.
pub fn on_path(program: &str) -> bool {
    let Some(paths) = std::env::var_os("PATH") else {
        return false;
    };
    std::env::split_paths(&paths).any(|dir| {
        let candidate = dir.join(program);
        candidate.is_file() || (cfg!(windows) && candidate.with_extension("exe").is_file())
    })
}

/// Result of provider resolution.
#[derive(Debug, Clone, Default)]
pub struct ResolvedProviders {
    /// Providers to start, in group order then name order.
    pub providers: Vec<ResolvedProvider>,
    /// Providers skipped (disabled, missing launcher), with the reason.
    pub warnings: Vec<String>,
}

impl ResolvedProviders {
    /// Look up a provider by name.
    pub fn get(&self, name: &str) -> Option<&ResolvedProvider> {
        self.providers.iter().find(|p| p.name == name)
    }

    /// Provider names in resolution order.
    pub fn names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name.as_str()).collect()
    }
}

/// Resolve all providers, probing PATH for launchers.
///
/// `base_dir` anchors a relative `custom_servers_path`.
pub fn resolve_providers(config: &ConduitConfig, base_dir: &Path) -> Result<ResolvedProviders> {
    resolve_providers_with(config, base_dir, &RuntimeAvailability::detect())
}

/// Resolve all providers against a known set of launchers.
pub fn resolve_providers_with(
    config: &ConduitConfig,
    base_dir: &Path,
    runtimes: &RuntimeAvailability,
) -> Result<ResolvedProviders> {
    let tools = config.tools();

    let mut candidates: Vec<ResolvedProvider> = Vec::new();
    let groups = [
        (ProviderGroup::PreRegistered, &config.providers.preregistered),
        (ProviderGroup::User, &config.providers.user),
    ];
    for (group, entries) in groups {
        for (name, entry) in entries {
            candidates.push(ResolvedProvider {
                name: name.clone(),
                group,
                entry: entry.clone(),
            });
        }
    }

    if let Some(dir) = &tools.custom_servers_path {
        let dir = if dir.is_absolute() {
            dir.clone()
        } else {
            base_dir.join(dir)
        };
        candidates.extend(discover_custom_servers(&dir, &tools.python)?);
    }

    let mut seen: BTreeMap<String, ProviderGroup> = BTreeMap::new();
    for candidate in &candidates {
        if let Some(first) = seen.insert(candidate.name.clone(), candidate.group) {
            return Err(ConfigError::DuplicateProvider {
                name: candidate.name.clone(),
                first: first.to_string(),
                second: candidate.group.to_string(),
            });
        }
        validate_entry(&candidate.name, &candidate.entry)?;
    }

    let mut resolved = ResolvedProviders::default();
    for candidate in candidates {
        if !candidate.entry.enabled {
            tracing::debug!(server = %candidate.name, "provider disabled, skipping");
            continue;
        }
        if candidate.entry.transport == ProviderTransport::Stdio
            && !runtimes.allows(&candidate.entry.command)
        {
            let warning = format!(
                "{} is not available; cannot load provider '{}'",
                candidate.entry.command, candidate.name
            );
            tracing::warn!(server = %candidate.name, command = %candidate.entry.command, "launcher not on PATH, skipping provider");
            resolved.warnings.push(warning);
            continue;
        }
        tracing::debug!(server = %candidate.name, group = %candidate.group, "loaded provider");
        resolved.providers.push(candidate);
    }

    Ok(resolved)
}

fn validate_entry(name: &str, entry: &ProviderEntry) -> Result<()> {
    let invalid = |reason: &str| ConfigError::InvalidProvider {
        name: name.to_string(),
        reason: reason.to_string(),
    };
    match entry.transport {
        ProviderTransport::Stdio if entry.command.trim().is_empty() => {
            Err(invalid("stdio providers need a command"))
        }
        ProviderTransport::Http if entry.url.as_deref().is_none_or(str::is_empty) => {
            Err(invalid("http providers need a url"))
        }
        _ => Ok(()),
    }
}

/// List provider programs in `dir`.
///
/// `*.py` files run under `python`, `*.js` files under `node`. Anything else
/// is ignored. A missing directory yields nothing.
pub fn discover_custom_servers(dir: &Path, python: &str) -> Result<Vec<ResolvedProvider>> {
    if !dir.is_dir() {
        tracing::warn!(path = %dir.display(), "custom servers directory not found");
        return Ok(Vec::new());
    }

    let read_dir = std::fs::read_dir(dir).map_err(|e| ConfigError::ReadDir {
        path: dir.display().to_string(),
        source: e,
    })?;

    let mut files: Vec<PathBuf> = read_dir
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file())
        .collect();
    files.sort();

    let mut servers = Vec::new();
    for path in files {
        let launcher = match path.extension().and_then(OsStr::to_str) {
            Some("py") => python,
            Some("js") => "node",
            _ => continue,
        };
        let Some(name) = path.file_stem().and_then(OsStr::to_str) else {
            continue;
        };

        tracing::debug!(server = %name, path = %path.display(), "discovered custom provider");
        servers.push(ResolvedProvider {
            name: name.to_string(),
            group: ProviderGroup::Custom,
            entry: ProviderEntry::new(launcher).with_arg(path.to_string_lossy()),
        });
    }

    Ok(servers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn config(toml: &str) -> ConduitConfig {
        ConduitConfig::from_toml(toml).unwrap()
    }

    #[test]
    fn test_resolve_groups_in_order() {
        let cfg = config(
            r#"
[providers.user.zeta]
command = "zeta-server"

[providers.preregistered.alpha]
command = "alpha-server"
"#,
        );
        let resolved =
            resolve_providers_with(&cfg, Path::new("."), &RuntimeAvailability::all()).unwrap();
        assert_eq!(resolved.names(), vec!["alpha", "zeta"]);
        assert_eq!(
            resolved.get("alpha").unwrap().group,
            ProviderGroup::PreRegistered
        );
        assert_eq!(resolved.get("zeta").unwrap().group, ProviderGroup::User);
    }

    #[test]
    fn test_duplicate_across_groups() {
        let cfg = config(
            r#"
[providers.preregistered.search]
command = "a"

[providers.user.search]
command = "b"
"#,
        );
        let err =
            resolve_providers_with(&cfg, Path::new("."), &RuntimeAvailability::all()).unwrap_err();
        match err {
            ConfigError::DuplicateProvider {
                name,
                first,
                second,
            } => {
                assert_eq!(name, "search");
                assert_eq!(first, "providers.preregistered");
                assert_eq!(second, "providers.user");
            }
            other => panic!("expected DuplicateProvider, got {other:?}"),
        }
    }

    #[test]
    fn test_duplicate_with_custom_server() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("weather.py"), "# provider").unwrap();

        let cfg = config(&format!(
            r#"
[providers.user.weather]
command = "weather-server"

[tools]
custom_servers_path = "{}"
"#,
            dir.path().display()
        ));
        let err =
            resolve_providers_with(&cfg, Path::new("."), &RuntimeAvailability::all()).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateProvider { ref name, .. } if name == "weather"));
    }

    #[test]
    fn test_invalid_entries() {
        let cfg = config(
            r#"
[providers.user.broken]
args = ["--flag"]
"#,
        );
        let err =
            resolve_providers_with(&cfg, Path::new("."), &RuntimeAvailability::all()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidProvider { ref name, .. } if name == "broken"));

        let cfg = config(
            r#"
[providers.user.remote]
transport = "http"
"#,
        );
        let err =
            resolve_providers_with(&cfg, Path::new("."), &RuntimeAvailability::all()).unwrap_err();
        assert!(err.to_string().contains("url"));
    }

    #[test]
    fn test_missing_launcher_is_skipped() {
        let cfg = config(
            r#"
[providers.preregistered.time]
command = "uvx"
args = ["mcp-server-time"]

[providers.user.files]
command = "npx"
args = ["-y", "@modelcontextprotocol/server-filesystem"]
"#,
        );
        let runtimes = RuntimeAvailability {
            npx: true,
            uvx: false,
            node: true,
        };
        let resolved = resolve_providers_with(&cfg, Path::new("."), &runtimes).unwrap();
        assert_eq!(resolved.names(), vec!["files"]);
        assert_eq!(resolved.warnings.len(), 1);
        assert!(resolved.warnings[0].contains("uvx"));
        assert!(resolved.warnings[0].contains("time"));
    }

    #[test]
    fn test_disabled_provider_is_skipped() {
        let cfg = config(
            r#"
[providers.user.off]
command = "off-server"
enabled = false
"#,
        );
        let resolved =
            resolve_providers_with(&cfg, Path::new("."), &RuntimeAvailability::all()).unwrap();
        assert!(resolved.providers.is_empty());
        assert!(resolved.warnings.is_empty());
    }

    #[test]
    fn test_discover_custom_servers() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("bmi.py"), "# provider").unwrap();
        fs::write(dir.path().join("clock.js"), "// provider").unwrap();
        fs::write(dir.path().join("README.md"), "docs").unwrap();
        fs::create_dir(dir.path().join("nested.py")).unwrap();

        let servers = discover_custom_servers(dir.path(), "python3.12").unwrap();
        let names: Vec<_> = servers.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["bmi", "clock"]);

        let bmi = &servers[0];
        assert_eq!(bmi.group, ProviderGroup::Custom);
        assert_eq!(bmi.entry.command, "python3.12");
        assert!(bmi.entry.args[0].ends_with("bmi.py"));
        assert_eq!(servers[1].entry.command, "node");
    }

    #[test]
    fn test_relative_custom_path_uses_base_dir() {
        let base = TempDir::new().unwrap();
        fs::create_dir(base.path().join("servers")).unwrap();
        fs::write(base.path().join("servers").join("echo.py"), "").unwrap();

        let cfg = config(
            r#"
[tools]
custom_servers_path = "servers"
"#,
        );
        let resolved =
            resolve_providers_with(&cfg, base.path(), &RuntimeAvailability::all()).unwrap();
        assert_eq!(resolved.names(), vec!["echo"]);
    }

    #[test]
    fn test_custom_js_skipped_without_node() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("clock.js"), "").unwrap();

        let cfg = config(&format!(
            "[tools]\ncustom_servers_path = \"{}\"\n",
            dir.path().display()
        ));
        let runtimes = RuntimeAvailability {
            npx: true,
            uvx: true,
            node: false,
        };
        let resolved = resolve_providers_with(&cfg, Path::new("."), &runtimes).unwrap();
        assert!(resolved.providers.is_empty());
        assert_eq!(resolved.warnings.len(), 1);
    }

    #[test]
    fn test_missing_custom_dir_is_empty() {
        let servers = discover_custom_servers(Path::new("/nonexistent/servers"), "python3").unwrap();
        assert!(servers.is_empty());
    }

    #[test]
    fn test_runtime_allows_unknown_commands() {
        let none = RuntimeAvailability {
            npx: false,
            uvx: false,
            node: false,
        };
        assert!(none.allows("my-server"));
        assert!(!none.allows("npx"));
    }
}
