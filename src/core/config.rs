//! Configuration management for Stepwise.
//!
//! Handles loading configuration from TOML files and the environment.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::bridge::paths::normalize;

/// Environment variable overriding the backend URL.
pub const ENV_BACKEND_URL: &str = "STEPWISE_BACKEND_URL";

/// Environment variable overriding the project root.
pub const ENV_WORKSPACE_ROOT: &str = "STEPWISE_WORKSPACE_ROOT";

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Backend connection settings
    pub backend: BackendConfig,

    /// Local project settings
    pub workspace: WorkspaceConfig,

    /// Remote mirror synchronization settings
    pub mirror: MirrorConfig,
}

/// Backend connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL of the planning backend (a bare `host:port` is accepted)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Connect timeout for HTTP calls, in seconds
    pub connect_timeout_secs: u64,
}

/// Local project settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    /// Project root; `~` is expanded. Defaults to the current directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root: Option<String>,
}

/// Settings for the full-tree snapshot pushed to the remote mirror.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MirrorConfig {
    /// Files per sync call
    pub batch_size: usize,

    /// Files larger than this many bytes are not mirrored
    pub max_file_size: u64,

    /// Directory names skipped anywhere in the tree
    pub exclude_dirs: Vec<String>,

    /// File names skipped anywhere in the tree
    pub exclude_files: Vec<String>,
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// Looks for config in:
    /// 1. `.stepwise.toml` in current directory
    /// 2. `~/.config/stepwise/config.toml`
    /// 3. Falls back to defaults
    ///
    /// Environment overrides are applied last.
    pub fn load() -> anyhow::Result<Self> {
        let mut config = Self::load_file_or_default()?;
        config.apply_env_overrides();
        Ok(config)
    }

    fn load_file_or_default() -> anyhow::Result<Self> {
        let local_config = PathBuf::from(".stepwise.toml");
        if local_config.exists() {
            return Self::load_from_file(&local_config);
        }

        if let Some(global_config) = Self::config_path() {
            if global_config.exists() {
                return Self::load_from_file(&global_config);
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        tracing::debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Apply `STEPWISE_*` environment overrides.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var(ENV_BACKEND_URL) {
            if !url.trim().is_empty() {
                self.backend.url = Some(url);
            }
        }
        if let Ok(root) = std::env::var(ENV_WORKSPACE_ROOT) {
            if !root.trim().is_empty() {
                self.workspace.root = Some(root);
            }
        }
    }

    /// Resolve the project root, expanding `~`.
    ///
    /// Falls back to the current directory when none is configured. The
    /// result is always absolute and normalized.
    pub fn workspace_root(&self) -> Option<PathBuf> {
        let cwd = std::env::current_dir().ok();
        match self.workspace.root.as_deref() {
            Some(raw) => resolve_root(raw, cwd.as_deref()),
            None => cwd,
        }
    }

    /// Get the config directory path.
    pub fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("stepwise"))
    }

    /// Get the global config file path.
    pub fn config_path() -> Option<PathBuf> {
        Self::config_dir().map(|d| d.join("config.toml"))
    }
}

/// Expand `~` in `raw` and anchor a relative result at `cwd`.
///
/// Returns `None` for a relative root when there is no working directory.
fn resolve_root(raw: &str, cwd: Option<&Path>) -> Option<PathBuf> {
    let expanded = PathBuf::from(shellexpand::tilde(raw).as_ref());
    let absolute = if expanded.is_absolute() { expanded } else { cwd?.join(expanded) };
    Some(normalize(&absolute))
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self { url: None, connect_timeout_secs: 10 }
    }
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            batch_size: 40,
            max_file_size: 1024 * 1024,
            exclude_dirs: vec![
                ".git".to_string(),
                "node_modules".to_string(),
                "dist".to_string(),
                "build".to_string(),
                "out".to_string(),
                ".venv".to_string(),
                "target".to_string(),
            ],
            exclude_files: vec![".DS_Store".to_string()],
        }
    }
}
