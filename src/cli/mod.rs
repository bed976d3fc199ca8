//! Command-line interface for Hopper's update engine.
//!
//! # Commands
//!
//! - `channel <stable|dev>` - switch update channel, install its release and restart
//! - `check` - show what a channel would install without installing it
//! - `status` - installed release, channel, platform and artifact name (the default
//!   when no command is given)
//!
//! # Global Options
//!
//! - `--verbose` / `-v`: debug logging
//! - `--quiet` / `-q`: no logging
//! - `--config` / `-c`: configuration file (also `HOPPER_CONFIG`)
//! - `--max-pages`: override `upgrade.max_pages` for this run

mod channel;
mod check;
mod status;

#[cfg(test)]
mod tests;

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::config::{FileSettings, GlobalConfig};
use crate::upgrade::aside::AsideManager;
use crate::upgrade::{VersionChecker, cleanup_after_update};

/// Hidden flag passed to the relaunched executable after a self-update.
pub const AFTER_UPDATE_FLAG: &str = "--after-update";

/// Attempts at removing the previous executable after a relaunch. The old process may
/// still be exiting and holding the file.
const RELAUNCH_CLEANUP_ATTEMPTS: u32 = 5;

/// Settings derived from global flags, shared by every command.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    /// Log filter, or `None` for no logging
    pub log_level: Option<String>,
    /// Explicit configuration file
    pub config_path: Option<PathBuf>,
    /// Override for `upgrade.max_pages`
    pub max_pages: Option<u32>,
    /// Started by a previous process that just replaced the executable
    pub after_update: bool,
}

impl CliConfig {
    /// Configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration file in effect.
    pub fn config_path(&self) -> Result<PathBuf> {
        match &self.config_path {
            Some(path) => Ok(path.clone()),
            None => GlobalConfig::default_path(),
        }
    }

    /// Load the global configuration with command-line overrides applied.
    pub async fn load_global(&self) -> Result<GlobalConfig> {
        let mut config = GlobalConfig::load_with_optional(Some(self.config_path()?)).await?;
        if let Some(max_pages) = self.max_pages {
            config.upgrade.max_pages = max_pages;
        }
        Ok(config)
    }

    /// Arguments for the executable relaunched after an update.
    ///
    /// Carries an explicit `--config` so the new process reads the same file.
    pub fn restart_args(&self) -> Vec<String> {
        let mut args = vec![AFTER_UPDATE_FLAG.to_string()];
        if let Some(path) = &self.config_path {
            args.push("--config".to_string());
            args.push(path.display().to_string());
        }
        args
    }

    /// Settings store over the configuration file in effect.
    pub fn settings(&self) -> Result<FileSettings> {
        Ok(FileSettings::new(self.config_path()?))
    }

    /// Install the global tracing subscriber. `RUST_LOG` takes precedence.
    pub fn init_logging(&self) {
        let Some(level) = &self.log_level else {
            return;
        };
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .try_init();
    }
}

/// Hopper self-update command line.
#[derive(Parser)]
#[command(
    name = "hopper",
    about = "Hopper launcher - release channels and self-update",
    version,
    long_about = "Switches Hopper between the stable and dev release channels, downloading \
                  the matching build from the project's release listing and restarting into it."
)]
pub struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable logging
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Path to the configuration file
    #[arg(short, long, global = true, env = "HOPPER_CONFIG")]
    config: Option<PathBuf>,

    /// Maximum listing pages to scan for a stable release
    #[arg(long, global = true, value_parser = clap::value_parser!(u32).range(1..))]
    max_pages: Option<u32>,

    /// Set by the launcher when restarting into a freshly installed build
    #[arg(long = "after-update", hide = true)]
    after_update: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Switch update channel and install its latest release
    Channel(channel::ChannelCommand),
    /// Show the release a channel would install
    Check(check::CheckCommand),
    /// Show installation and channel status
    Status(status::StatusCommand),
}

impl Cli {
    /// Run the selected command.
    pub async fn execute(self) -> Result<()> {
        let config = self.build_config();
        self.execute_with_config(config).await
    }

    /// Derive the shared configuration from global flags.
    #[must_use]
    pub fn build_config(&self) -> CliConfig {
        let log_level = if self.verbose {
            Some("debug".to_string())
        } else if self.quiet {
            None
        } else {
            Some("info".to_string())
        };

        CliConfig {
            log_level,
            config_path: self.config.clone(),
            max_pages: self.max_pages,
            after_update: self.after_update,
        }
    }

    /// Run the selected command with an explicit configuration.
    pub async fn execute_with_config(self, config: CliConfig) -> Result<()> {
        config.init_logging();
        let command = self.command.unwrap_or_else(|| Commands::Status(Default::default()));
        startup(&config, &command).await;

        if config.after_update {
            println!("{}", "Update installed.".green().bold());
        }

        match command {
            Commands::Channel(cmd) => cmd.execute(&config).await,
            Commands::Check(cmd) => cmd.execute(&config).await,
            Commands::Status(cmd) => cmd.execute(&config).await,
        }
    }
}

/// Housekeeping before any command: sweep update leftovers and, when enabled, look for
/// a newer release. Never fails the command.
async fn startup(config: &CliConfig, command: &Commands) {
    if let Ok(exe) = std::env::current_exe() {
        let attempts = if config.after_update { RELAUNCH_CLEANUP_ATTEMPTS } else { 1 };
        let aside = AsideManager::new(exe.clone());
        for attempt in 1..=attempts {
            match cleanup_after_update(&exe).await {
                Ok(0) => {}
                Ok(n) => debug!("Removed {} files left by a previous update", n),
                Err(e) => debug!("Post-update cleanup skipped: {}", e),
            }
            if !aside.aside_exists() {
                break;
            }
            if attempt < attempts {
                tokio::time::sleep(Duration::from_millis(250)).await;
            }
        }
    }

    if matches!(command, Commands::Status(_)) {
        let Ok(global) = config.load_global().await else {
            return;
        };
        if let Some(latest) = VersionChecker::check_for_updates_if_needed(&global).await {
            let installed =
                global.installed_tag.clone().unwrap_or_else(VersionChecker::running_version);
            VersionChecker::display_update_notification(&installed, &latest, global.channel);
        }
    }
}
