//! Update availability checks that never install anything.
//!
//! [`VersionChecker`] resolves the newest release on a channel and compares it with the
//! installed tag. Older releases are never offered, so a check cannot suggest a
//! downgrade. The CLI runs it at startup when `upgrade.check_on_startup` is set.

use std::cmp::Ordering;
use tracing::{debug, info};

use crate::config::GlobalConfig;
use crate::core::UpdateError;
use crate::upgrade::listing::build_http_client;
use crate::upgrade::scanner::ReleaseScanner;
use crate::upgrade::tag::{Channel, ReleaseTag};

/// Whether installing `candidate` over `installed` would be an update on `channel`.
///
/// Base versions are compared numerically with the leading `v` and any pre-release or
/// build suffix removed. A newer base version is always an update and an older one
/// never is. Equal base versions count as an update only on the dev channel when the
/// tags differ, since successive dev builds share a base version.
///
/// ```rust
/// use hopper::upgrade::tag::{Channel, ReleaseTag};
/// use hopper::upgrade::version_check::is_update;
///
/// let installed = ReleaseTag::new("v3.2.29");
/// assert!(is_update(&installed, &ReleaseTag::new("v3.2.30"), Channel::Stable));
/// assert!(!is_update(&installed, &ReleaseTag::new("v3.2.28"), Channel::Stable));
/// assert!(!is_update(&installed, &ReleaseTag::new("v3.2.29"), Channel::Stable));
/// ```
pub fn is_update(installed: &ReleaseTag, candidate: &ReleaseTag, channel: Channel) -> bool {
    match candidate.compare_base(installed) {
        Ordering::Greater => true,
        Ordering::Less => false,
        Ordering::Equal => channel == Channel::Dev && candidate != installed,
    }
}

/// Checks whether the configured channel has something newer than what is installed.
///
/// Used at startup when `upgrade.check_on_startup` is enabled and by `hopper check`.
/// Never installs anything.
pub struct VersionChecker {
    scanner: ReleaseScanner,
    channel: Channel,
    installed: ReleaseTag,
}

impl VersionChecker {
    /// Checker comparing `installed` with what `scanner` finds for `channel`.
    pub fn new(scanner: ReleaseScanner, channel: Channel, installed: ReleaseTag) -> Self {
        Self {
            scanner,
            channel,
            installed,
        }
    }

    /// Checker for the configured channel, reading the live listing.
    ///
    /// Without a recorded installed tag the running crate version is assumed.
    pub fn from_config(config: &GlobalConfig) -> anyhow::Result<Self> {
        let client = build_http_client(&config.upgrade)?;
        let scanner = ReleaseScanner::over_http(&config.upgrade, client)?;
        let installed = config.installed_tag.clone().unwrap_or_else(Self::running_version);
        Ok(Self::new(scanner, config.channel, installed))
    }

    /// Tag of the running build, `v<crate version>`.
    pub fn running_version() -> ReleaseTag {
        ReleaseTag::new(format!("v{}", env!("CARGO_PKG_VERSION")))
    }

    /// Installed tag being compared against.
    pub fn installed(&self) -> &ReleaseTag {
        &self.installed
    }

    /// Resolve the channel and report the newer tag, if any.
    pub async fn check_now(&self) -> Result<Option<ReleaseTag>, UpdateError> {
        debug!("Performing explicit update check on {} channel", self.channel);

        let latest = self.scanner.scan(self.channel).await?.tag;
        if is_update(&self.installed, &latest, self.channel) {
            info!("Update available: {} -> {}", self.installed, latest);
            Ok(Some(latest))
        } else {
            debug!("Already on latest version ({} vs {})", self.installed, latest);
            Ok(None)
        }
    }

    /// Startup check honouring `upgrade.check_on_startup`.
    ///
    /// Failures are logged and swallowed so a flaky network never blocks startup.
    pub async fn check_for_updates_if_needed(config: &GlobalConfig) -> Option<ReleaseTag> {
        if !config.upgrade.check_on_startup {
            debug!("Automatic update checking is disabled");
            return None;
        }

        let checker = match Self::from_config(config) {
            Ok(checker) => checker,
            Err(e) => {
                debug!("Update check unavailable: {:#}", e);
                return None;
            }
        };

        match checker.check_now().await {
            Ok(latest) => latest,
            Err(e) => {
                debug!("Update check failed: {}", e);
                None
            }
        }
    }

    /// Print a boxed notice about an available update to stderr.
    pub fn display_update_notification(installed: &ReleaseTag, latest: &ReleaseTag, channel: Channel) {
        use colored::Colorize;

        let rule = "─".repeat(56);
        eprintln!();
        eprintln!("{}", rule.bright_cyan());
        eprintln!("A new {} build of Hopper is available!", channel.as_str().bold());
        eprintln!();
        eprintln!("  Installed: {}", installed.as_str().yellow());
        eprintln!("  Latest:    {}", latest.as_str().green().bold());
        eprintln!();
        eprintln!("  Run {} to install it", format!("hopper channel {channel}").cyan().bold());
        eprintln!("{}", rule.bright_cyan());
        eprintln!();
    }

    /// One-line summary for `hopper check`.
    pub fn format_version_info(installed: &ReleaseTag, latest: Option<&ReleaseTag>) -> String {
        match latest {
            Some(latest) => {
                format!("Installed: {installed}\nLatest:    {latest} (update available)")
            }
            None => format!("Installed: {installed} (up to date)"),
        }
    }
}
