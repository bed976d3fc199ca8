use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::sync::Arc;

use crate::cli::CliConfig;
use crate::upgrade::version_check::is_update;
use crate::upgrade::{Channel, UpdateOrchestrator, VersionChecker};

/// Resolve a channel's release without installing it.
#[derive(Args, Debug)]
pub struct CheckCommand {
    /// Channel to check; defaults to the configured one
    #[arg(long, value_name = "CHANNEL")]
    pub channel: Option<Channel>,
}

impl CheckCommand {
    pub async fn execute(self, config: &CliConfig) -> Result<()> {
        let global = config.load_global().await?;
        let channel = self.channel.unwrap_or(global.channel);
        let installed = global.installed_tag.clone().unwrap_or_else(VersionChecker::running_version);

        println!("{}", format!("Checking the {channel} channel...").cyan());

        let orchestrator =
            UpdateOrchestrator::from_config(&global.upgrade, Arc::new(config.settings()?))?;
        let resolved = orchestrator
            .check(channel)
            .await
            .with_context(|| format!("Failed to resolve the {channel} channel"))?;

        let newer = is_update(&installed, &resolved.tag, channel).then_some(&resolved.tag);
        println!("{}", VersionChecker::format_version_info(&installed, newer));
        println!("Resolved:  {}", resolved.tag.as_str().bold());
        println!("Artifact:  {}", resolved.asset_locator.dimmed());

        if newer.is_some() {
            println!("Run {} to install it", format!("hopper channel {channel}").cyan().bold());
        }
        Ok(())
    }
}
