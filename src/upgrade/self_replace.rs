//! Replacing the running executable with a staged download.
//!
//! The canonical executable path must always hold a runnable binary. The swap is a
//! single rename within one directory, and on platforms that lock the running file the
//! previous executable is renamed aside first and renamed back if the swap fails.
//! A relaunch is only requested once the new binary is in place and its digest matches
//! the staged artifact.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::core::UpdateError;
use crate::upgrade::aside::AsideManager;
use crate::upgrade::platform::{ExecutablePlatform, ProcessLauncher};
use crate::upgrade::state::{ReplaceErrorKind, ReplacementResult};
use crate::upgrade::verification::ArtifactVerifier;

/// A replacement that stopped before a relaunch, with the step that failed.
#[derive(Debug, Clone)]
pub struct ReplaceFailure {
    /// Step that failed
    pub kind: ReplaceErrorKind,
    /// Error surfaced to the caller
    pub error: UpdateError,
}

impl ReplaceFailure {
    fn new(kind: ReplaceErrorKind, reason: impl Into<String>, restored: bool) -> Self {
        Self {
            kind,
            error: UpdateError::ReplaceFailed {
                reason: reason.into(),
                restored,
            },
        }
    }

    /// Terminal record for this failure.
    pub fn result(&self) -> ReplacementResult {
        ReplacementResult {
            success: false,
            error_kind: Some(self.kind),
            restarted: false,
            digest: None,
            aside_path: None,
        }
    }
}

impl From<ReplaceFailure> for UpdateError {
    fn from(failure: ReplaceFailure) -> Self {
        failure.error
    }
}

/// A new binary sitting at the canonical path, not yet running.
#[derive(Debug, Clone)]
pub struct InstalledBinary {
    path: PathBuf,
    digest: String,
    aside_path: Option<PathBuf>,
}

impl InstalledBinary {
    /// Canonical executable path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `sha256:<hex>` of the installed file.
    pub fn digest(&self) -> &str {
        &self.digest
    }

    /// Previous executable kept aside, when the platform required one.
    pub fn aside_path(&self) -> Option<&Path> {
        self.aside_path.as_deref()
    }

    /// Record of the replacement without a relaunch.
    pub fn result(&self, restarted: bool) -> ReplacementResult {
        ReplacementResult {
            success: true,
            error_kind: None,
            restarted,
            digest: Some(self.digest.clone()),
            aside_path: self.aside_path.clone(),
        }
    }

    /// Start the new binary and end this process.
    ///
    /// If the spawn fails the new binary stays installed and the result carries
    /// [`ReplaceErrorKind::RestartFailed`].
    pub fn restart(self, launcher: &dyn ProcessLauncher, args: &[String]) -> ReplacementResult {
        info!("Restarting into {:?}", self.path);
        match launcher.restart_as(&self.path, args) {
            Ok(()) => self.result(true),
            Err(e) => {
                error!("Failed to relaunch updated executable: {}", e);
                ReplacementResult {
                    error_kind: Some(ReplaceErrorKind::RestartFailed),
                    ..self.result(false)
                }
            }
        }
    }
}

/// Swaps staged artifacts into the canonical executable path.
pub struct SelfReplacer {
    platform: Arc<dyn ExecutablePlatform>,
    min_binary_size: u64,
}

impl SelfReplacer {
    /// Replacer using `platform` and rejecting artifacts below `min_binary_size` bytes.
    pub fn new(platform: Arc<dyn ExecutablePlatform>, min_binary_size: u64) -> Self {
        Self {
            platform,
            min_binary_size,
        }
    }

    /// Smallest artifact accepted, in bytes.
    pub fn min_binary_size(&self) -> u64 {
        self.min_binary_size
    }

    /// Install `staged` at `current`.
    ///
    /// `staged` should live in the same directory as `current` so that the swap is a
    /// same-volume rename. On success `staged` no longer exists.
    ///
    /// # Errors
    ///
    /// Every failure is an [`UpdateError::ReplaceFailed`]; its `restored` flag tells
    /// whether the previous executable is intact at `current`.
    pub async fn replace(
        &self,
        current: &Path,
        staged: &Path,
    ) -> Result<InstalledBinary, ReplaceFailure> {
        ArtifactVerifier::check_artifact(staged, self.min_binary_size)
            .await
            .map_err(|e| ReplaceFailure::new(ReplaceErrorKind::InvalidArtifact, e.to_string(), true))?;

        let digest = ArtifactVerifier::compute_sha256(staged)
            .await
            .map_err(|e| ReplaceFailure::new(ReplaceErrorKind::InvalidArtifact, e.to_string(), true))?;

        self.platform
            .prepare_for_execution(staged, current)
            .await
            .map_err(|e| ReplaceFailure::new(ReplaceErrorKind::PrepareFailed, e.to_string(), true))?;

        let aside = if self.platform.locks_running_executable() {
            let aside = AsideManager::new(current.to_path_buf());
            aside
                .move_aside()
                .await
                .map_err(|e| ReplaceFailure::new(ReplaceErrorKind::AsideFailed, e.to_string(), true))?;
            Some(aside)
        } else {
            None
        };

        if let Err(e) = self.platform.swap_into(staged, current).await {
            warn!("Swap failed: {}", e);
            let restored = match &aside {
                Some(aside) => match aside.restore().await {
                    Ok(()) => true,
                    Err(restore_err) => {
                        error!(
                            "Previous executable could not be restored from {:?}: {}",
                            aside.aside_path(),
                            restore_err
                        );
                        false
                    }
                },
                // A failed rename leaves the target untouched
                None => current.exists(),
            };
            return Err(ReplaceFailure::new(ReplaceErrorKind::SwapFailed, e.to_string(), restored));
        }

        if let Err(e) = ArtifactVerifier::verify_checksum(current, &digest).await {
            error!("Installed executable does not match the download: {}", e);
            let restored = match &aside {
                Some(aside) => aside.restore().await.is_ok(),
                None => false,
            };
            return Err(ReplaceFailure::new(
                ReplaceErrorKind::DigestMismatch,
                e.to_string(),
                restored,
            ));
        }

        info!("Installed new executable at {:?} ({})", current, digest);
        Ok(InstalledBinary {
            path: current.to_path_buf(),
            digest,
            aside_path: aside.map(|aside| aside.aside_path().to_path_buf()),
        })
    }
}
