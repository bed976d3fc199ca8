use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::sync::Arc;
use tracing::debug;

use crate::cli::CliConfig;
use crate::config::SettingsStore;
use crate::upgrade::platform::SystemLauncher;
use crate::upgrade::state::{StatusEvent, StatusReporter};
use crate::upgrade::version_check::is_update;
use crate::upgrade::{Channel, UpdateOrchestrator, UpdateState};

/// Switch to a release channel.
///
/// Resolves the channel's release, downloads it, replaces the running executable and
/// restarts. The stored channel only changes once the new build is installed; a failed
/// dev switch falls back to stable.
#[derive(Args, Debug)]
pub struct ChannelCommand {
    /// Channel to switch to (`stable` or `dev`)
    #[arg(value_name = "CHANNEL")]
    pub channel: Channel,

    /// Reinstall even if the channel's release is already installed
    #[arg(short, long)]
    pub force: bool,
}

impl ChannelCommand {
    pub async fn execute(self, config: &CliConfig) -> Result<()> {
        let global = config.load_global().await?;
        let settings = Arc::new(config.settings()?);

        let (reporter, mut events) = StatusReporter::channel();
        // Exit only after the last status line is printed
        let orchestrator = Arc::new(
            UpdateOrchestrator::from_config(&global.upgrade, settings.clone())?
                .with_reporter(reporter)
                .with_launcher(Arc::new(SystemLauncher::deferred_exit()))
                .with_restart_args(config.restart_args()),
        );

        if !self.force && settings.channel_preference().await? == self.channel {
            if let Some(installed) = settings.installed_tag().await? {
                let resolved = orchestrator
                    .check(self.channel)
                    .await
                    .context("Failed to resolve the channel's release")?;
                if !is_update(&installed, &resolved.tag, self.channel) {
                    println!(
                        "{}",
                        format!("Already on the {} channel at {}", self.channel, installed).green()
                    );
                    return Ok(());
                }
            }
        }

        println!("{}", format!("Switching to the {} channel...", self.channel).cyan());
        let ticket = orchestrator.request_channel_switch(self.channel)?;

        let cancel = ticket.cancellation();
        let interrupt = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                debug!("Interrupted, cancelling update");
                cancel.cancel();
            }
        });
        let printer = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                print_event(&event);
            }
        });

        let result = ticket.wait().await;
        interrupt.abort();
        // Last sender goes with the orchestrator, which ends the printer
        drop(orchestrator);
        let _ = printer.await;

        let outcome = result?;
        if outcome.fell_back {
            println!(
                "{}",
                format!("Dev build unavailable; installed stable {}", outcome.tag).yellow()
            );
        }
        if let Some(e) = &outcome.settings_error {
            println!(
                "{}",
                format!("Warning: the {} channel was not saved: {e}", outcome.channel).yellow()
            );
        }
        if !outcome.replacement.restarted {
            println!(
                "{}",
                format!("Installed {}. Restart Hopper to use it.", outcome.tag).yellow()
            );
        }
        Ok(())
    }
}

fn print_event(event: &StatusEvent) {
    let line = match event.state {
        UpdateState::Failed => event.message.red().to_string(),
        UpdateState::FallingBack => event.message.yellow().to_string(),
        UpdateState::Restarted => event.message.green().to_string(),
        _ => event.message.cyan().to_string(),
    };
    println!("{line}");
}
