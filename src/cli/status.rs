use anyhow::Result;
use clap::Args;
use colored::Colorize;

use crate::cli::CliConfig;
use crate::upgrade::VersionChecker;
use crate::upgrade::asset::{AssetTable, PlatformDescriptor};

/// Show the installed release, channel and platform artifact. Works offline.
#[derive(Args, Debug, Default)]
pub struct StatusCommand {
    /// Packaging variant to resolve the artifact name for
    #[arg(long, value_name = "VARIANT")]
    pub variant: Option<String>,
}

impl StatusCommand {
    pub async fn execute(self, config: &CliConfig) -> Result<()> {
        let global = config.load_global().await?;
        let mut platform = PlatformDescriptor::current();
        if let Some(variant) = self.variant {
            platform = platform.with_variant(variant);
        }

        let installed = match &global.installed_tag {
            Some(tag) => tag.to_string(),
            None => format!("{} (built-in)", VersionChecker::running_version()),
        };
        let artifact = match AssetTable::from_config(&global.upgrade).asset_name(&platform) {
            Ok(name) => name.normal(),
            Err(e) => e.to_string().red(),
        };

        println!("Installed: {}", installed.bold());
        println!("Channel:   {}", global.channel.as_str().cyan());
        println!("Platform:  {platform}");
        println!("Artifact:  {artifact}");
        println!(
            "Releases:  https://github.com/{}/{}/releases",
            global.upgrade.owner, global.upgrade.repo
        );
        println!("Config:    {}", config.config_path()?.display().to_string().dimmed());
        Ok(())
    }
}
