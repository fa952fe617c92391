//! Configuration management for rbwasm

pub mod schema;

pub use schema::{
    BuildConfig, ComponentConfig, Config, ToolchainConfig, VfsConfig, WorkspaceConfig,
    DEFAULT_ENABLED_EXTENSIONS,
};

use crate::error::{RbwasmError, RbwasmResult};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Configuration manager
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a new config manager with default path
    pub fn new() -> Self {
        Self {
            config_path: Self::default_config_path(),
        }
    }

    /// Create a config manager with a custom path
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("rbwasm")
            .join("config.toml")
    }

    /// Load configuration, using defaults if the file does not exist
    pub async fn load(&self) -> RbwasmResult<Config> {
        if !self.config_path.exists() {
            debug!("Config file not found, using defaults");
            return Ok(Config::default());
        }

        self.load_from_file(&self.config_path).await
    }

    /// Load and check configuration from a specific file
    pub async fn load_from_file(&self, path: &Path) -> RbwasmResult<Config> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| RbwasmError::io(format!("reading config from {}", path.display()), e))?;

        let invalid = |reason: String| RbwasmError::ConfigInvalid {
            path: path.to_path_buf(),
            reason,
        };
        let config: Config = toml::from_str(&content).map_err(|e| invalid(e.to_string()))?;
        check(&config).map_err(invalid)?;
        Ok(config)
    }

    /// Save configuration, replacing the file in one rename
    pub async fn save(&self, config: &Config) -> RbwasmResult<()> {
        self.ensure_config_dir().await?;

        let content = toml::to_string_pretty(config)?;
        let staged = self.config_path.with_extension("toml.tmp");
        fs::write(&staged, content)
            .await
            .map_err(|e| RbwasmError::io(format!("writing config to {}", staged.display()), e))?;
        fs::rename(&staged, &self.config_path).await.map_err(|e| {
            RbwasmError::io(
                format!("replacing config at {}", self.config_path.display()),
                e,
            )
        })?;

        info!("Configuration saved to {}", self.config_path.display());
        Ok(())
    }

    async fn ensure_config_dir(&self) -> RbwasmResult<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| RbwasmError::ConfigDirCreate {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
        }
        Ok(())
    }

    /// Get the config file path
    pub fn path(&self) -> &Path {
        &self.config_path
    }
}

/// Values that parse but cannot produce a module
fn check(config: &Config) -> Result<(), String> {
    if config.build.stack_size == 0 {
        return Err("build.stack_size must be greater than zero".to_string());
    }
    if config.build.asyncify_stack_size == 0 {
        return Err("build.asyncify_stack_size must be greater than zero".to_string());
    }
    if !config.vfs.guest_runtime_root.is_absolute() {
        return Err(format!(
            "vfs.guest_runtime_root must be an absolute guest path, got {}",
            config.vfs.guest_runtime_root.display()
        ));
    }
    Ok(())
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}
