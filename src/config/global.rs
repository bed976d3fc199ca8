//! Global configuration for Hopper.
//!
//! A single user-level TOML file holds the update channel preference, the tag of the
//! last successfully installed release, and the `[upgrade]` section.
//!
//! # Configuration File Location
//!
//! - **Unix/macOS**: `~/.hopper/config.toml`
//! - **Windows**: `%LOCALAPPDATA%\hopper\config.toml`
//!
//! The location can be overridden with the `HOPPER_CONFIG` environment variable or the
//! `--config` flag.
//!
//! # File Format
//!
//! ```toml
//! channel = "dev"
//! installed_tag = "v3.2.30-dev.adcb1ae"
//!
//! [upgrade]
//! max_pages = 5
//! timeout_secs = 20
//! ```
//!
//! A missing file is the same as an empty one: every field has a default.

use crate::upgrade::config::UpgradeConfig;
use crate::upgrade::tag::{Channel, ReleaseTag};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Environment variable overriding the configuration file path.
pub const CONFIG_PATH_ENV: &str = "HOPPER_CONFIG";

/// User-level settings persisted between runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct GlobalConfig {
    /// Update channel the installation follows.
    #[serde(default)]
    pub channel: Channel,

    /// Tag of the release installed by the last successful update.
    ///
    /// Absent until the first self-update completes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installed_tag: Option<ReleaseTag>,

    /// Self-update behaviour.
    #[serde(default, skip_serializing_if = "UpgradeConfig::is_default")]
    pub upgrade: UpgradeConfig,
}

impl GlobalConfig {
    /// Load from the default path, or defaults when no file exists.
    pub async fn load() -> Result<Self> {
        Self::load_with_optional(None).await
    }

    /// Load from `path` if given, otherwise from [`GlobalConfig::default_path`].
    pub async fn load_with_optional(path: Option<PathBuf>) -> Result<Self> {
        let path = match path {
            Some(path) => path,
            None => Self::default_path()?,
        };
        if path.exists() {
            Self::load_from(&path).await
        } else {
            Ok(Self::default())
        }
    }

    /// Load from a specific file.
    pub async fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read global config from {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse global config from {}", path.display()))
    }

    /// Write to `path`, replacing any existing file in one rename.
    ///
    /// The parent directory is created if needed. On Unix the file is readable by its
    /// owner only.
    pub async fn save_to(&self, path: &Path) -> Result<()> {
        let parent = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
        fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;

        let content = toml::to_string_pretty(self).context("Failed to serialize global config")?;

        let parent = parent.to_path_buf();
        let target = path.to_path_buf();
        tokio::task::spawn_blocking(move || write_atomically(&parent, &target, content.as_bytes()))
            .await
            .context("Config writer task failed")?
    }

    /// Platform default configuration path, honouring `HOPPER_CONFIG`.
    pub fn default_path() -> Result<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            return Ok(PathBuf::from(path));
        }

        let config_dir = if cfg!(target_os = "windows") {
            dirs::data_local_dir()
                .ok_or_else(|| anyhow::anyhow!("Unable to determine local data directory"))?
                .join("hopper")
        } else {
            dirs::home_dir()
                .ok_or_else(|| anyhow::anyhow!("Unable to determine home directory"))?
                .join(".hopper")
        };

        Ok(config_dir.join("config.toml"))
    }
}

fn write_atomically(dir: &Path, target: &Path, bytes: &[u8]) -> Result<()> {
    let mut file = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create temporary config in {}", dir.display()))?;
    file.write_all(bytes).context("Failed to write temporary config")?;
    file.as_file().sync_all().context("Failed to sync temporary config")?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(file.path(), std::fs::Permissions::from_mode(0o600))
            .with_context(|| format!("Failed to set secure permissions on {}", target.display()))?;
    }

    file.persist(target)
        .with_context(|| format!("Failed to write global config to {}", target.display()))?;
    Ok(())
}
