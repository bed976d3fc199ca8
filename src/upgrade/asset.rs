//! Platform-specific artifact selection and download locators.
//!
//! Release artifacts follow a predictable URL shape,
//! `https://github.com/{owner}/{repo}/releases/download/{tag}/{asset}`, so resolving a
//! download is pure string construction once the artifact name for the running
//! platform is known. Artifact names come from an ordered rule table that can be
//! overridden in configuration; nothing beyond the table is guessed.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::UpdateError;
use crate::upgrade::config::UpgradeConfig;
use crate::upgrade::listing::DEFAULT_BASE_URL;
use crate::upgrade::tag::ReleaseTag;

/// Packaging variant used when none is specified.
pub const DEFAULT_VARIANT: &str = "standard";

/// Operating system, architecture and packaging variant of an installation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformDescriptor {
    /// Operating system as reported by `std::env::consts::OS` (`linux`, `macos`, `windows`)
    pub os: String,
    /// CPU architecture as reported by `std::env::consts::ARCH` (`x86_64`, `aarch64`)
    pub arch: String,
    /// Packaging variant (`standard`, `portable`, ...)
    pub variant: String,
}

impl PlatformDescriptor {
    /// Build a descriptor from explicit values.
    pub fn new(os: impl Into<String>, arch: impl Into<String>, variant: impl Into<String>) -> Self {
        Self {
            os: os.into(),
            arch: arch.into(),
            variant: variant.into(),
        }
    }

    /// Descriptor of the running process with the default packaging variant.
    pub fn current() -> Self {
        Self::new(std::env::consts::OS, std::env::consts::ARCH, DEFAULT_VARIANT)
    }

    /// Replace the packaging variant.
    pub fn with_variant(mut self, variant: impl Into<String>) -> Self {
        self.variant = variant.into();
        self
    }
}

impl fmt::Display for PlatformDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} ({})", self.os, self.arch, self.variant)
    }
}

/// One row of the artifact table.
///
/// `arch` and `variant` are wildcards when absent. `asset` may contain `{name}`, which
/// expands to [`UpgradeConfig::asset_base_name`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetRule {
    /// Operating system this rule applies to
    pub os: String,
    /// Architecture restriction, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arch: Option<String>,
    /// Packaging variant restriction, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
    /// Artifact file name template
    pub asset: String,
}

impl AssetRule {
    /// Rule matching every architecture and variant of `os`.
    pub fn for_os(os: &str, asset: &str) -> Self {
        Self {
            os: os.to_string(),
            arch: None,
            variant: None,
            asset: asset.to_string(),
        }
    }

    fn matches(&self, platform: &PlatformDescriptor) -> bool {
        self.os.eq_ignore_ascii_case(&platform.os)
            && self.arch.as_deref().is_none_or(|arch| arch.eq_ignore_ascii_case(&platform.arch))
            && self
                .variant
                .as_deref()
                .is_none_or(|variant| variant.eq_ignore_ascii_case(&platform.variant))
    }
}

/// Ordered artifact table; the first matching rule wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetTable {
    base_name: String,
    rules: Vec<AssetRule>,
}

impl AssetTable {
    /// Table with explicit rules.
    pub fn new(base_name: impl Into<String>, rules: Vec<AssetRule>) -> Self {
        Self {
            base_name: base_name.into(),
            rules,
        }
    }

    /// The published artifact matrix: a Windows executable, a macOS universal binary and
    /// a Linux binary.
    pub fn builtin(base_name: impl Into<String>) -> Self {
        Self::new(
            base_name,
            vec![
                AssetRule::for_os("windows", "{name}.exe"),
                AssetRule::for_os("macos", "{name}-mac-universal"),
                AssetRule::for_os("linux", "{name}-linux"),
            ],
        )
    }

    /// Table from configuration, falling back to [`AssetTable::builtin`] when no rules
    /// are configured.
    pub fn from_config(config: &UpgradeConfig) -> Self {
        if config.assets.is_empty() {
            Self::builtin(config.asset_base_name.clone())
        } else {
            Self::new(config.asset_base_name.clone(), config.assets.clone())
        }
    }

    /// Artifact name for `platform`.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError::UnsupportedPlatform`] when no rule matches.
    pub fn asset_name(&self, platform: &PlatformDescriptor) -> Result<String, UpdateError> {
        self.rules
            .iter()
            .find(|rule| rule.matches(platform))
            .map(|rule| rule.asset.replace("{name}", &self.base_name))
            .ok_or_else(|| UpdateError::UnsupportedPlatform {
                os: platform.os.clone(),
                arch: platform.arch.clone(),
                variant: platform.variant.clone(),
            })
    }
}

/// Builds download locators for resolved tags.
#[derive(Debug, Clone)]
pub struct AssetResolver {
    base_url: String,
    owner: String,
    repo: String,
    table: AssetTable,
}

impl AssetResolver {
    /// Resolver for releases of `owner/repo`.
    pub fn new(owner: impl Into<String>, repo: impl Into<String>, table: AssetTable) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            owner: owner.into(),
            repo: repo.into(),
            table,
        }
    }

    /// Resolver described by an [`UpgradeConfig`].
    pub fn from_config(config: &UpgradeConfig) -> Self {
        Self::new(config.owner.clone(), config.repo.clone(), AssetTable::from_config(config))
            .with_base_url(&config.base_url)
    }

    /// Build locators on `base_url` instead of github.com.
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// The artifact table in use.
    pub fn table(&self) -> &AssetTable {
        &self.table
    }

    /// Download locator for `tag` on `platform`.
    ///
    /// Deterministic and offline.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError::UnsupportedPlatform`] when the table has no entry for the
    /// platform.
    pub fn resolve(
        &self,
        tag: &ReleaseTag,
        platform: &PlatformDescriptor,
    ) -> Result<String, UpdateError> {
        let asset = self.table.asset_name(platform)?;
        Ok(format!(
            "{}/{}/{}/releases/download/{}/{}",
            self.base_url, self.owner, self.repo, tag, asset
        ))
    }
}
