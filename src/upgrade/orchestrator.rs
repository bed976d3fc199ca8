//! Channel-switch state machine.
//!
//! An attempt validates the target channel, downloads the artifact next to the running
//! executable, swaps it in and relaunches:
//!
//! ```text
//! Idle -> Validating -> Downloading -> Replacing -> Restarted
//! ```
//!
//! Any phase may end in `Failed`. When the target was the dev channel and the failure
//! happened before `Replacing`, the attempt moves to `FallingBack` and runs again
//! against the stable channel. Persisted settings are written only after the new
//! binary is in place, so the stored channel always names one that was actually
//! fetched and installed.
//!
//! Attempts run on their own task. [`UpdateOrchestrator::request_channel_switch`]
//! returns at once with a [`SwitchTicket`]; progress arrives as
//! [`StatusEvent`](crate::upgrade::state::StatusEvent)s.

use anyhow::Context;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempPath;
use tokio::sync::{RwLock, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::SettingsStore;
use crate::core::UpdateError;
use crate::upgrade::asset::{AssetResolver, PlatformDescriptor};
use crate::upgrade::config::UpgradeConfig;
use crate::upgrade::download::{Downloader, HttpDownloader, stage_beside};
use crate::upgrade::guard::SingleFlight;
use crate::upgrade::listing::build_http_client;
use crate::upgrade::platform::{ProcessLauncher, SystemLauncher, current_platform};
use crate::upgrade::scanner::ReleaseScanner;
use crate::upgrade::self_replace::SelfReplacer;
use crate::upgrade::state::{
    ReplaceErrorKind, ResolvedRelease, StatusReporter, UpdateOutcome, UpdatePlan, UpdateState,
};
use crate::upgrade::tag::{Channel, ReleaseTag};
use crate::upgrade::verification::ArtifactVerifier;

/// Handle to an accepted channel-switch attempt.
pub struct SwitchTicket {
    handle: JoinHandle<Result<UpdateOutcome, UpdateError>>,
    cancel: CancellationToken,
}

impl SwitchTicket {
    /// Ask the attempt to stop.
    ///
    /// Takes effect during validation and download. Once replacement has started the
    /// attempt runs to completion.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Token that cancels this attempt, for use from another task.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Wait for the attempt to finish.
    pub async fn wait(self) -> Result<UpdateOutcome, UpdateError> {
        self.handle.await.map_err(|e| UpdateError::TaskFailed(e.to_string()))?
    }
}

/// Drives channel switches from resolution through relaunch.
///
/// Build one per process, wrap it in an [`Arc`], and call
/// [`request_channel_switch`](Self::request_channel_switch).
pub struct UpdateOrchestrator {
    scanner: ReleaseScanner,
    resolver: AssetResolver,
    platform: PlatformDescriptor,
    downloader: Arc<dyn Downloader>,
    replacer: SelfReplacer,
    launcher: Arc<dyn ProcessLauncher>,
    settings: Arc<dyn SettingsStore>,
    reporter: StatusReporter,
    current_exe: PathBuf,
    restart_args: Vec<String>,
    flight: SingleFlight,
    state: watch::Sender<UpdateState>,
    resolved: RwLock<Option<ReleaseTag>>,
}

impl UpdateOrchestrator {
    /// Orchestrator replacing the executable at `current_exe`.
    ///
    /// Defaults: the running platform's descriptor, the system launcher, no restart
    /// arguments and a silent status reporter.
    pub fn new(
        scanner: ReleaseScanner,
        resolver: AssetResolver,
        downloader: Arc<dyn Downloader>,
        replacer: SelfReplacer,
        settings: Arc<dyn SettingsStore>,
        current_exe: PathBuf,
    ) -> Self {
        let (state, _) = watch::channel(UpdateState::Idle);
        Self {
            scanner,
            resolver,
            platform: PlatformDescriptor::current(),
            downloader,
            replacer,
            launcher: Arc::new(SystemLauncher::new()),
            settings,
            reporter: StatusReporter::silent(),
            current_exe,
            restart_args: Vec::new(),
            flight: SingleFlight::new(),
            state,
            resolved: RwLock::new(None),
        }
    }

    /// Orchestrator for the running executable, talking to the network as described by
    /// `config`.
    pub fn from_config(
        config: &UpgradeConfig,
        settings: Arc<dyn SettingsStore>,
    ) -> anyhow::Result<Self> {
        let client = build_http_client(config).context("Failed to build HTTP client")?;
        let scanner = ReleaseScanner::over_http(config, client.clone())?;
        let current_exe =
            std::env::current_exe().context("Failed to locate the running executable")?;

        Ok(Self::new(
            scanner,
            AssetResolver::from_config(config),
            Arc::new(HttpDownloader::new(client)),
            SelfReplacer::new(current_platform(), config.min_binary_size),
            settings,
            current_exe,
        ))
    }

    /// Resolve assets for `platform` instead of the running one.
    pub fn with_platform(mut self, platform: PlatformDescriptor) -> Self {
        self.platform = platform;
        self
    }

    /// Relaunch through `launcher`.
    pub fn with_launcher(mut self, launcher: Arc<dyn ProcessLauncher>) -> Self {
        self.launcher = launcher;
        self
    }

    /// Send status events to `reporter`.
    pub fn with_reporter(mut self, reporter: StatusReporter) -> Self {
        self.reporter = reporter;
        self
    }

    /// Arguments passed to the relaunched executable.
    pub fn with_restart_args(mut self, args: Vec<String>) -> Self {
        self.restart_args = args;
        self
    }

    /// Current phase.
    pub fn state(&self) -> UpdateState {
        *self.state.borrow()
    }

    /// Receiver notified on every phase change.
    pub fn subscribe_state(&self) -> watch::Receiver<UpdateState> {
        self.state.subscribe()
    }

    /// Whether an attempt is running.
    pub fn is_busy(&self) -> bool {
        self.flight.is_busy()
    }

    /// Path of the executable being managed.
    pub fn current_exe(&self) -> &Path {
        &self.current_exe
    }

    /// Tag installed by the last successful attempt, or the one recorded in settings.
    pub async fn current_resolved_version(&self) -> Option<ReleaseTag> {
        if let Some(tag) = self.resolved.read().await.clone() {
            return Some(tag);
        }
        match self.settings.installed_tag().await {
            Ok(tag) => tag,
            Err(e) => {
                warn!("Could not read installed tag from settings: {}", e);
                None
            }
        }
    }

    /// Resolve the release `channel` would install, without downloading anything.
    pub async fn check(&self, channel: Channel) -> Result<ResolvedRelease, UpdateError> {
        let scan = self.scanner.scan(channel).await?;
        let asset_locator = self.resolver.resolve(&scan.tag, &self.platform)?;
        Ok(ResolvedRelease {
            tag: scan.tag,
            asset_locator,
        })
    }

    /// Start switching to `target` in the background.
    ///
    /// # Errors
    ///
    /// [`UpdateError::UpdateInProgress`] if another attempt is running; the running
    /// attempt is not affected.
    pub fn request_channel_switch(
        self: &Arc<Self>,
        target: Channel,
    ) -> Result<SwitchTicket, UpdateError> {
        let permit = self.flight.try_begin()?;
        info!("Accepted switch to {} channel", target);

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let result = this.attempt(target, &token).await;
            if let Err(e) = &result {
                this.report_failure(e);
            }
            drop(permit);
            result
        });

        Ok(SwitchTicket { handle, cancel })
    }

    /// Switch to `target` and wait for the outcome.
    pub async fn switch_channel(
        self: &Arc<Self>,
        target: Channel,
    ) -> Result<UpdateOutcome, UpdateError> {
        self.request_channel_switch(target)?.wait().await
    }

    async fn attempt(
        &self,
        target: Channel,
        cancel: &CancellationToken,
    ) -> Result<UpdateOutcome, UpdateError> {
        let (plan, staged) = self.prepare(target, cancel).await?;

        if cancel.is_cancelled() {
            return Err(UpdateError::Cancelled);
        }

        self.install(target, plan, staged).await
    }

    /// Validate and download for `target`, falling back to stable for dev targets.
    async fn prepare(
        &self,
        target: Channel,
        cancel: &CancellationToken,
    ) -> Result<(UpdatePlan, TempPath), UpdateError> {
        let fallback = match target {
            Channel::Dev => Some(Channel::Stable),
            Channel::Stable => None,
        };

        let primary = match self.validate_and_download(target, fallback, cancel).await {
            Ok(prepared) => return Ok(prepared),
            Err(e) => e,
        };

        let Some(fallback) = fallback.filter(|_| primary.allows_fallback()) else {
            return Err(primary);
        };

        warn!("{} channel attempt failed: {}", target, primary);
        self.transition(UpdateState::Failed, format!("Could not switch to {target}: {primary}"));
        self.transition(UpdateState::FallingBack, format!("Falling back to the {fallback} channel"));

        self.validate_and_download(fallback, None, cancel)
            .await
            .map_err(|secondary| match secondary {
                UpdateError::Cancelled => UpdateError::Cancelled,
                secondary => UpdateError::FallbackFailed {
                    primary: Box::new(primary),
                    fallback: Box::new(secondary),
                },
            })
    }

    async fn validate_and_download(
        &self,
        channel: Channel,
        fallback: Option<Channel>,
        cancel: &CancellationToken,
    ) -> Result<(UpdatePlan, TempPath), UpdateError> {
        self.transition(
            UpdateState::Validating,
            format!("Checking {channel} channel availability"),
        );
        let scan = until_cancelled(cancel, self.scanner.scan(channel)).await?;
        let asset_locator = self.resolver.resolve(&scan.tag, &self.platform)?;
        debug!("Checked {} listing pages for {}", scan.pages_checked, channel);

        let plan = UpdatePlan {
            target_channel: channel,
            resolved_release: ResolvedRelease {
                tag: scan.tag,
                asset_locator,
            },
            fallback_channel: fallback,
        };

        self.transition(
            UpdateState::Downloading,
            format!("Downloading {}", plan.resolved_release.tag),
        );
        let staged = stage_beside(&self.current_exe)?;
        let bytes = until_cancelled(
            cancel,
            self.downloader.download(&plan.resolved_release.asset_locator, &staged),
        )
        .await?;

        if bytes == 0 {
            return Err(UpdateError::DownloadVerificationFailed {
                reason: format!("{} returned no data", plan.resolved_release.asset_locator),
            });
        }
        ArtifactVerifier::check_artifact(&staged, self.replacer.min_binary_size()).await?;

        Ok((plan, staged))
    }

    async fn install(
        &self,
        requested: Channel,
        plan: UpdatePlan,
        staged: TempPath,
    ) -> Result<UpdateOutcome, UpdateError> {
        let tag = plan.resolved_release.tag.clone();
        self.transition(UpdateState::Replacing, format!("Installing {tag}"));

        let installed = self
            .replacer
            .replace(&self.current_exe, &staged)
            .await
            .map_err(|failure| {
                error!("Replacement failed ({:?}): {}", failure.kind, failure.error);
                UpdateError::from(failure)
            })?;
        drop(staged);

        // The new binary is in place: record what it is before handing over
        let mut unsaved = Vec::new();
        if let Err(e) = self.settings.set_installed_tag(&tag).await {
            error!("Failed to record installed tag {}: {}", tag, e);
            unsaved.push(format!("installed release: {e}"));
        }
        if let Err(e) = self.settings.set_channel_preference(plan.target_channel).await {
            error!("Failed to save channel preference {}: {}", plan.target_channel, e);
            unsaved.push(format!("channel preference: {e}"));
        }
        let settings_error = (!unsaved.is_empty()).then(|| unsaved.join("; "));
        *self.resolved.write().await = Some(tag.clone());

        let fell_back = plan.target_channel != requested;
        let message = match &settings_error {
            None => format!("Updated to {tag} on the {} channel, restarting", plan.target_channel),
            Some(e) => format!(
                "Updated to {tag}, but the {} channel could not be saved ({e}); restarting",
                plan.target_channel
            ),
        };
        self.transition(UpdateState::Restarted, message);

        let replacement = installed.restart(self.launcher.as_ref(), &self.restart_args);
        if replacement.error_kind == Some(ReplaceErrorKind::RestartFailed) {
            self.transition(
                UpdateState::Failed,
                format!("Installed {tag} but could not restart; please restart manually"),
            );
        }

        Ok(UpdateOutcome {
            channel: plan.target_channel,
            tag,
            fell_back,
            replacement,
            settings_error,
        })
    }

    fn transition(&self, state: UpdateState, message: impl Into<String>) {
        let message = message.into();
        info!("{} -> {}: {}", self.state(), state, message);
        self.state.send_replace(state);
        self.reporter.report(state, message);
    }

    fn report_failure(&self, error: &UpdateError) {
        let message = match error {
            UpdateError::Cancelled => "Update cancelled".to_string(),
            UpdateError::ReplaceFailed { restored: false, .. } => {
                format!("Found an update but failed to install it; manual reinstall required: {error}")
            }
            e if e.is_resolution_failure() => format!("Could not find an update: {e}"),
            e => format!("Found an update but failed to install it: {e}"),
        };
        self.transition(UpdateState::Failed, message);
    }
}

async fn until_cancelled<T>(
    cancel: &CancellationToken,
    operation: impl Future<Output = Result<T, UpdateError>>,
) -> Result<T, UpdateError> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(UpdateError::Cancelled),
        result = operation => result,
    }
}
