//! Self-update engine for Hopper.
//!
//! Hopper updates itself from the paginated release listing of its repository. There
//! is no API: listing pages are fetched as text and searched for tag links, the tag
//! for the requested channel is picked, the platform artifact is downloaded next to the
//! running executable, and the executable is swapped and relaunched.
//!
//! # Architecture Overview
//!
//! ```text
//! UpdateOrchestrator
//!   ├── ReleaseScanner ── ListingSource (HTTP) ── tag classifier
//!   ├── AssetResolver  ── AssetTable (config or built-in)
//!   ├── Downloader     ── staging file beside the executable
//!   └── SelfReplacer   ── ExecutablePlatform + AsideManager
//!                            └── ProcessLauncher (restart)
//! ```
//!
//! ## Channels
//!
//! - **Stable**: the first non-pre-release tag in listing order, scanning at most
//!   `upgrade.max_pages` pages.
//! - **Dev**: the newest dev build on the first page only. A failed dev switch falls
//!   back to stable before giving up.
//!
//! ## Safety Mechanisms
//!
//! - Only one switch runs at a time; a second request is rejected with
//!   [`UpdateError::UpdateInProgress`](crate::core::UpdateError::UpdateInProgress).
//! - Settings are written only after the new binary is in place.
//! - The swap is a same-directory rename. Where the running file is locked it is moved
//!   aside first and moved back if the swap fails.
//! - Replacement is never retried automatically and never interrupted by cancellation.
//!
//! # Usage
//!
//! ```bash
//! hopper channel dev        # switch to dev builds and restart
//! hopper check              # show what the configured channel would install
//! hopper status             # installed tag, channel and platform artifact
//! ```

/// Previous-executable handling during and after a swap.
pub mod aside;
/// Platform-to-artifact table and download locators.
pub mod asset;
/// `[upgrade]` configuration section.
pub mod config;
/// Artifact download and staging.
pub mod download;
/// Single-flight gate for switch attempts.
pub mod guard;
/// Listing page sources and tag extraction.
pub mod listing;
/// Channel-switch state machine.
pub mod orchestrator;
/// Per-platform swap and relaunch capabilities.
pub mod platform;
/// Channel-aware listing scan.
pub mod scanner;
/// Executable replacement.
pub mod self_replace;
/// Attempt phases, plans, results and status events.
pub mod state;
/// Tags, channels and pre-release classification.
pub mod tag;
/// Integrity checks on staged and installed artifacts.
pub mod verification;
/// Update availability checks without installing.
pub mod version_check;


use std::path::Path;
use tracing::{debug, warn};

use crate::core::UpdateError;
use crate::upgrade::aside::AsideManager;
use crate::upgrade::download::STAGING_MARKER;

pub use orchestrator::{SwitchTicket, UpdateOrchestrator};
pub use state::{ReplacementResult, StatusEvent, UpdateOutcome, UpdateState};
pub use tag::{Channel, ReleaseTag};
pub use version_check::VersionChecker;

/// Remove what a previous update left next to `current_exe`.
///
/// Deletes the aside copy of the previous executable (`<exe>.old`) and any staging
/// files (`.<exe>.update-*`) from interrupted downloads. Meant to run early at startup
/// of the relaunched process, when nothing holds those files any more. Individual
/// failures are logged and skipped.
///
/// Returns the number of files removed.
pub async fn cleanup_after_update(current_exe: &Path) -> Result<usize, UpdateError> {
    let mut removed = 0;

    match AsideManager::new(current_exe.to_path_buf()).cleanup().await {
        Ok(true) => removed += 1,
        Ok(false) => {}
        Err(e) => warn!("{}", e),
    }

    let Some(dir) = current_exe.parent() else {
        return Ok(removed);
    };
    let name = current_exe.file_name().unwrap_or_default().to_string_lossy();
    let staging_prefix = format!(".{name}{STAGING_MARKER}");

    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| UpdateError::io(format!("list {}", dir.display()), &e))?;
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| UpdateError::io(format!("list {}", dir.display()), &e))?
    {
        if !entry.file_name().to_string_lossy().starts_with(&staging_prefix) {
            continue;
        }
        let path = entry.path();
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!("Removed leftover staging file {:?}", path);
                removed += 1;
            }
            Err(e) => warn!("Could not remove leftover staging file {:?}: {}", path, e),
        }
    }

    Ok(removed)
}
