use serde::{Deserialize, Serialize};

use crate::upgrade::asset::AssetRule;

/// Configuration settings for Hopper self-update behavior.
///
/// `UpgradeConfig` names the repository whose release listing is scanned, bounds the
/// scan, and sets network and safety limits for downloads. It lives in the `[upgrade]`
/// section of the global configuration file.
///
/// # Default Behavior
///
/// - Scan at most 10 listing pages when looking for a stable release
/// - 30-second timeout on every network request
/// - Reject downloaded artifacts smaller than 1 KiB
/// - No automatic update check on startup
///
/// # Examples
///
/// ```rust,no_run
/// use hopper::upgrade::config::UpgradeConfig;
///
/// let config = UpgradeConfig::default();
/// assert_eq!(config.max_pages, 10);
/// assert!(!config.check_on_startup);
/// ```
///
/// ## TOML Example
/// ```toml
/// [upgrade]
/// owner = "hopper-launcher"
/// repo = "hopper"
/// max_pages = 10
/// timeout_secs = 30
///
/// [[upgrade.assets]]
/// os = "linux"
/// arch = "x86_64"
/// asset = "{name}-linux"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradeConfig {
    /// Host serving the release listing and artifacts.
    ///
    /// # Default: `https://github.com`
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Owner of the repository that publishes releases.
    #[serde(default = "default_owner")]
    pub owner: String,

    /// Name of the repository that publishes releases.
    #[serde(default = "default_repo")]
    pub repo: String,

    /// Base artifact name substituted for `{name}` in asset rules.
    #[serde(default = "default_asset_base_name")]
    pub asset_base_name: String,

    /// Upper bound on listing pages inspected by a stable-channel scan.
    ///
    /// # Default: `10`
    ///
    /// The dev channel always inspects exactly one page regardless of this value.
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,

    /// Timeout in seconds applied to every listing fetch and download.
    ///
    /// # Default: `30`
    ///
    /// A timed-out request counts as a network failure for that page or download.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Smallest artifact, in bytes, accepted as an executable.
    ///
    /// # Default: `1024`
    #[serde(default = "default_min_binary_size")]
    pub min_binary_size: u64,

    /// User agent sent with every request.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Whether to check for a newer release on the configured channel at startup.
    ///
    /// # Default: `false`
    #[serde(default)]
    pub check_on_startup: bool,

    /// Ordered platform-to-artifact rules. The first matching rule wins.
    ///
    /// When empty, the built-in table from [`crate::upgrade::asset::AssetTable::builtin`]
    /// is used.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub assets: Vec<AssetRule>,
}

impl Default for UpgradeConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            owner: default_owner(),
            repo: default_repo(),
            asset_base_name: default_asset_base_name(),
            max_pages: default_max_pages(),
            timeout_secs: default_timeout_secs(),
            min_binary_size: default_min_binary_size(),
            user_agent: default_user_agent(),
            check_on_startup: false,
            assets: Vec::new(),
        }
    }
}

fn default_base_url() -> String {
    "https://github.com".to_string()
}

fn default_owner() -> String {
    "hopper-launcher".to_string()
}

fn default_repo() -> String {
    "hopper".to_string()
}

fn default_asset_base_name() -> String {
    "Hopper".to_string()
}

fn default_max_pages() -> u32 {
    10
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_min_binary_size() -> u64 {
    1024
}

fn default_user_agent() -> String {
    format!("hopper-updater/{}", env!("CARGO_PKG_VERSION"))
}

impl UpgradeConfig {
    /// Create a new `UpgradeConfig` with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether every field still has its default value.
    ///
    /// Used to keep the `[upgrade]` section out of saved config files until a user
    /// changes something.
    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }
}
