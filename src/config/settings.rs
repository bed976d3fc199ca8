//! Persisted preferences read and written by the update engine.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;

use crate::config::GlobalConfig;
use crate::core::UpdateError;
use crate::upgrade::tag::{Channel, ReleaseTag};

/// Store for the channel preference and the installed release tag.
///
/// The orchestrator writes through this only after a new binary is in place.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Channel the user has chosen.
    async fn channel_preference(&self) -> Result<Channel, UpdateError>;

    /// Persist a new channel preference.
    async fn set_channel_preference(&self, channel: Channel) -> Result<(), UpdateError>;

    /// Tag of the last successfully installed release.
    async fn installed_tag(&self) -> Result<Option<ReleaseTag>, UpdateError>;

    /// Persist the tag of a newly installed release.
    async fn set_installed_tag(&self, tag: &ReleaseTag) -> Result<(), UpdateError>;
}

/// [`SettingsStore`] backed by the global TOML configuration file.
///
/// Each write re-reads the file, changes one field and saves it again, so edits made
/// to other sections in the meantime are kept.
pub struct FileSettings {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileSettings {
    /// Settings stored at `path`.
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            write_lock: Mutex::new(()),
        }
    }

    /// Settings at the default configuration path.
    pub fn at_default_path() -> anyhow::Result<Self> {
        Ok(Self::new(GlobalConfig::default_path()?))
    }

    /// Backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read(&self) -> Result<GlobalConfig, UpdateError> {
        GlobalConfig::load_with_optional(Some(self.path.clone()))
            .await
            .map_err(|e| UpdateError::Settings(format!("{e:#}")))
    }

    async fn update(&self, change: impl FnOnce(&mut GlobalConfig) + Send) -> Result<(), UpdateError> {
        let _guard = self.write_lock.lock().await;
        let mut config = self.read().await?;
        change(&mut config);
        config
            .save_to(&self.path)
            .await
            .map_err(|e| UpdateError::Settings(format!("{e:#}")))?;
        debug!("Saved settings to {}", self.path.display());
        Ok(())
    }
}

#[async_trait]
impl SettingsStore for FileSettings {
    async fn channel_preference(&self) -> Result<Channel, UpdateError> {
        Ok(self.read().await?.channel)
    }

    async fn set_channel_preference(&self, channel: Channel) -> Result<(), UpdateError> {
        self.update(|config| config.channel = channel).await
    }

    async fn installed_tag(&self) -> Result<Option<ReleaseTag>, UpdateError> {
        Ok(self.read().await?.installed_tag)
    }

    async fn set_installed_tag(&self, tag: &ReleaseTag) -> Result<(), UpdateError> {
        let tag = tag.clone();
        self.update(move |config| config.installed_tag = Some(tag)).await
    }
}
