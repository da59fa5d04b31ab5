//! Finding `conduit.toml` files and stacking them.
//!
//! Layers, lowest precedence first:
//! 1. `~/.config/conduit/config.toml` (user config, or `$CONDUIT_CONFIG_DIR`)
//! 2. `./conduit.toml` (project-local)
//! 3. An explicit `--config` file (handled by [`load_config_file`])

use std::path::{Path, PathBuf};

use crate::{ConduitConfig, ConfigError, Result};

/// Looked up in the project directory (or the working directory).
const PROJECT_CONFIG_FILE: &str = "conduit.toml";

const USER_CONFIG_FILE: &str = "config.toml";

const APP_NAME: &str = "conduit";

/// Replaces the platform config directory when set and non-empty.
const CONFIG_DIR_ENV: &str = "CONDUIT_CONFIG_DIR";

/// One candidate layer and whether it contributed.
#[derive(Debug, Clone)]
pub struct ConfigSource {
    pub path: PathBuf,
    pub loaded: bool,
}

/// Merged configuration plus a record of how it was assembled.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: ConduitConfig,
    /// Every layer that was considered, lowest precedence first.
    pub sources: Vec<ConfigSource>,
    /// Layers that existed but could not be read or parsed.
    pub warnings: Vec<String>,
}

impl LoadedConfig {
    /// Layers that actually contributed entries.
    pub fn loaded_from(&self) -> Vec<&Path> {
        self.sources
            .iter()
            .filter(|s| s.loaded)
            .map(|s| s.path.as_path())
            .collect()
    }

    /// Directory of the highest-precedence loaded file.
    ///
    /// Relative paths inside the config resolve against it.
    pub fn base_dir(&self) -> Option<&Path> {
        self.sources
            .iter()
            .rev()
            .find(|s| s.loaded)
            .and_then(|s| s.path.parent())
    }
}

/// Discover and merge the user and project layers.
pub fn load_config(project_dir: Option<&Path>) -> Result<LoadedConfig> {
    load_config_with_options(project_dir, None)
}

/// Like [`load_config`], with `config_dir` standing in for the user
/// directory (ignoring `CONDUIT_CONFIG_DIR` and the platform default).
pub fn load_config_with_options(
    project_dir: Option<&Path>,
    config_dir: Option<&Path>,
) -> Result<LoadedConfig> {
    let mut config = ConduitConfig::new();
    let mut sources = Vec::new();
    let mut warnings = Vec::new();

    let user_config_path = match config_dir {
        Some(dir) => Some(dir.join(USER_CONFIG_FILE)),
        None => user_config_path(),
    };
    if let Some(path) = user_config_path {
        sources.push(load_layer(&mut config, &path, &mut warnings));
    }

    let project_path = project_dir
        .map(|d| d.join(PROJECT_CONFIG_FILE))
        .unwrap_or_else(|| PathBuf::from(PROJECT_CONFIG_FILE));
    sources.push(load_layer(&mut config, &project_path, &mut warnings));

    for warning in &warnings {
        tracing::warn!("{warning}");
    }

    Ok(LoadedConfig {
        config,
        sources,
        warnings,
    })
}

/// Parse exactly one file. Missing or malformed files are errors here.
pub fn load_config_file(path: &Path) -> Result<ConduitConfig> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.display().to_string(),
        source: e,
    })?;
    ConduitConfig::from_toml(&contents)
}

/// Write `config` as TOML, creating missing parent directories.
pub fn save_config(config: &ConduitConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::WriteFile {
            path: parent.display().to_string(),
            source: e,
        })?;
    }

    let contents = config.to_toml()?;
    std::fs::write(path, contents).map_err(|e| ConfigError::WriteFile {
        path: path.display().to_string(),
        source: e,
    })?;

    Ok(())
}

/// Path of the user config file.
pub fn user_config_path() -> Option<PathBuf> {
    user_config_dir().map(|d| d.join(USER_CONFIG_FILE))
}

/// `$CONDUIT_CONFIG_DIR`, or `<platform config dir>/conduit`.
pub fn user_config_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var(CONFIG_DIR_ENV)
        && !dir.is_empty()
    {
        return Some(PathBuf::from(dir));
    }
    dirs::config_dir().map(|d| d.join(APP_NAME))
}

/// Load a config file and merge it in. Unreadable or malformed files are
/// recorded as warnings and skipped.
fn load_layer(config: &mut ConduitConfig, path: &Path, warnings: &mut Vec<String>) -> ConfigSource {
    let loaded = path.is_file()
        && match load_config_file(path) {
            Ok(layer) => {
                config.merge(layer);
                true
            }
            Err(e) => {
                warnings.push(format!("Failed to load {}: {}", path.display(), e));
                false
            }
        };

    ConfigSource {
        path: path.to_path_buf(),
        loaded,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    use crate::ProviderEntry;

    #[test]
    fn test_single_file_parses_providers() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
[providers.user.echo]
command = "echo-server"
"#,
        )
        .unwrap();

        let config = load_config_file(&path).unwrap();
        assert_eq!(config.providers.user["echo"].command, "echo-server");
    }

    #[test]
    fn test_explicit_file_errors_are_hard() {
        let missing = load_config_file(Path::new("/no/such/dir/conduit.toml")).unwrap_err();
        assert!(matches!(missing, ConfigError::ReadFile { .. }));

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("conduit.toml");
        fs::write(&path, "[providers.user.echo\ncommand = 1").unwrap();
        let broken = load_config_file(&path).unwrap_err();
        assert!(matches!(broken, ConfigError::Parse(_)));
    }

    #[test]
    fn test_no_layers_present() {
        let project = TempDir::new().unwrap();
        let user = TempDir::new().unwrap();
        let loaded = load_config_with_options(Some(project.path()), Some(user.path())).unwrap();
        assert!(loaded.config.providers.user.is_empty());
        assert!(loaded.loaded_from().is_empty());
        assert!(loaded.base_dir().is_none());
    }

    #[test]
    fn test_project_layer_overrides_user_layer() {
        let user_dir = TempDir::new().unwrap();
        let project_dir = TempDir::new().unwrap();

        fs::write(
            user_dir.path().join("config.toml"),
            r#"
[providers.user.search]
command = "search-v1"

[providers.user.notes]
command = "notes-server"

[tools]
embedded_json = false
"#,
        )
        .unwrap();
        fs::write(
            project_dir.path().join("conduit.toml"),
            r#"
[providers.user.search]
command = "search-v2"

[tools]
embedded_json = true
"#,
        )
        .unwrap();

        let loaded =
            load_config_with_options(Some(project_dir.path()), Some(user_dir.path())).unwrap();

        assert_eq!(loaded.config.providers.user["search"].command, "search-v2");
        assert_eq!(loaded.config.providers.user["notes"].command, "notes-server");
        assert!(loaded.config.tools().embedded_json);
        assert_eq!(loaded.loaded_from().len(), 2);
        assert_eq!(loaded.base_dir(), Some(project_dir.path()));
    }

    #[test]
    fn test_broken_layer_is_skipped_with_warning() {
        let project = TempDir::new().unwrap();
        let user = TempDir::new().unwrap();
        fs::write(project.path().join("conduit.toml"), "[tools\nembedded_json = ").unwrap();

        let loaded = load_config_with_options(Some(project.path()), Some(user.path())).unwrap();
        assert_eq!(loaded.warnings.len(), 1);
        assert!(loaded.warnings[0].contains("Failed to load"));
        assert!(loaded.loaded_from().is_empty());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = ConduitConfig::new();
        config.providers.preregistered.insert(
            "time".into(),
            ProviderEntry::new("uvx").with_arg("mcp-server-time"),
        );
        save_config(&config, &path).unwrap();

        let reloaded = load_config_file(&path).unwrap();
        assert_eq!(reloaded, config);
    }
}
