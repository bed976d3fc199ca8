//! Data carried through a channel-switch attempt and the events it emits.

use std::fmt;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::debug;

use crate::upgrade::tag::{Channel, ReleaseTag};

/// Phase of a channel-switch attempt.
///
/// ```text
/// Idle -> Validating -> Downloading -> Replacing -> Restarted
///            |              |             |
///            +------> Failed <------------+
///                       |
///                       +-> FallingBack -> Validating (stable)   [dev target only]
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdateState {
    /// No attempt running
    Idle,
    /// Scanning the listing for the target channel
    Validating,
    /// Fetching the resolved artifact
    Downloading,
    /// Swapping the artifact into place
    Replacing,
    /// Relaunch requested; terminal for this process
    Restarted,
    /// The attempt stopped
    Failed,
    /// A dev-channel attempt failed and stable is being tried instead
    FallingBack,
}

impl UpdateState {
    /// Whether no further transitions follow.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Restarted | Self::Failed)
    }
}

impl fmt::Display for UpdateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Validating => "validating",
            Self::Downloading => "downloading",
            Self::Replacing => "replacing",
            Self::Restarted => "restarted",
            Self::Failed => "failed",
            Self::FallingBack => "falling back",
        };
        f.write_str(name)
    }
}

/// Human-readable progress notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEvent {
    /// Phase entered
    pub state: UpdateState,
    /// Message suitable for a status bar
    pub message: String,
}

/// Sending half of the status channel.
///
/// Sending never blocks; events sent after the receiver is gone are dropped.
#[derive(Debug, Clone)]
pub struct StatusReporter {
    tx: Option<mpsc::UnboundedSender<StatusEvent>>,
}

impl StatusReporter {
    /// Reporter paired with a fresh receiver.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<StatusEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// Reporter that discards every event.
    pub fn silent() -> Self {
        Self { tx: None }
    }

    /// Emit an event.
    pub fn report(&self, state: UpdateState, message: impl Into<String>) {
        let event = StatusEvent {
            state,
            message: message.into(),
        };
        debug!("status [{}]: {}", event.state, event.message);
        if let Some(tx) = &self.tx {
            // Receiver gone means nobody is listening
            let _ = tx.send(event);
        }
    }
}

/// A tag together with the locator of its platform artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRelease {
    /// Tag observed on a listing page
    pub tag: ReleaseTag,
    /// Download URL of the artifact for this platform
    pub asset_locator: String,
}

/// What one attempt is trying to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdatePlan {
    /// Channel being switched to
    pub target_channel: Channel,
    /// Release chosen for it
    pub resolved_release: ResolvedRelease,
    /// Channel to retry with if this plan fails before replacement
    pub fallback_channel: Option<Channel>,
}

/// Why a replacement stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplaceErrorKind {
    /// Staged artifact missing, empty or too small
    InvalidArtifact,
    /// Preparing the artifact (quarantine, permissions) failed
    PrepareFailed,
    /// Moving the running executable aside failed
    AsideFailed,
    /// Moving the artifact to the canonical path failed
    SwapFailed,
    /// Installed file does not match the staged artifact
    DigestMismatch,
    /// Binary installed but the relaunch could not be started
    RestartFailed,
}

/// Terminal record of a self-replace attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplacementResult {
    /// Whether the new binary is at the canonical path
    pub success: bool,
    /// Failure kind, if any step failed
    pub error_kind: Option<ReplaceErrorKind>,
    /// Whether the relaunch was requested
    pub restarted: bool,
    /// SHA-256 of the installed binary (`sha256:<hex>`)
    pub digest: Option<String>,
    /// Where the previous executable was moved, if it still exists
    pub aside_path: Option<PathBuf>,
}

/// Result of a completed channel switch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateOutcome {
    /// Channel the installation now follows
    pub channel: Channel,
    /// Tag that was installed
    pub tag: ReleaseTag,
    /// Whether a dev request ended on stable
    pub fell_back: bool,
    /// Record of the replacement
    pub replacement: ReplacementResult,
    /// Settings that could not be written after the install. The new binary is still
    /// in place, but the stored channel or installed tag may be stale.
    pub settings_error: Option<String>,
}
