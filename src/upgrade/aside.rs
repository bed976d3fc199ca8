//! Moving the running executable aside during a swap, and putting it back.
//!
//! Only used on platforms that lock a running executable. The aside copy lives at
//! `<exe>.old` next to the canonical path and is removed by the relaunched process.

use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

use crate::core::UpdateError;

/// Keeps the previous executable next to the canonical path while a new one is swapped in.
///
/// On platforms that lock a running executable the file cannot be deleted or
/// overwritten, but it can be renamed. `AsideManager` renames it to `<exe>.old` in the
/// same directory, so the move never crosses a volume, and renames it back if the swap
/// fails. The relaunched process deletes the leftover with [`AsideManager::cleanup`].
///
/// ```rust,no_run
/// use hopper::upgrade::aside::AsideManager;
/// use std::path::PathBuf;
///
/// let aside = AsideManager::new(PathBuf::from("/opt/hopper/Hopper"));
/// assert_eq!(aside.aside_path(), std::path::Path::new("/opt/hopper/Hopper.old"));
/// ```
#[derive(Debug, Clone)]
pub struct AsideManager {
    original_path: PathBuf,
    aside_path: PathBuf,
}

impl AsideManager {
    /// Manager for the executable at `executable_path`.
    pub fn new(executable_path: PathBuf) -> Self {
        let mut aside_path = executable_path.clone();
        aside_path.set_file_name(format!(
            "{}.old",
            executable_path.file_name().unwrap_or_default().to_string_lossy()
        ));

        Self {
            original_path: executable_path,
            aside_path,
        }
    }

    /// Rename the executable to the aside path.
    ///
    /// A stale aside from an earlier update is removed first. If it is itself locked, the
    /// rename will fail and the original stays where it is.
    pub async fn move_aside(&self) -> Result<(), UpdateError> {
        if fs::try_exists(&self.aside_path).await.unwrap_or(false) {
            debug!("Removing stale aside at {:?}", self.aside_path);
            if let Err(e) = fs::remove_file(&self.aside_path).await {
                warn!("Could not remove stale aside {:?}: {}", self.aside_path, e);
            }
        }

        info!("Moving {:?} aside to {:?}", self.original_path, self.aside_path);
        fs::rename(&self.original_path, &self.aside_path)
            .await
            .map_err(|e| UpdateError::io("move running executable aside", &e))
    }

    /// Rename the aside back to the canonical path.
    ///
    /// Whatever occupies the canonical path is removed first. Retries a few times since a
    /// virus scanner or indexer may briefly hold the file open.
    pub async fn restore(&self) -> Result<(), UpdateError> {
        warn!("Restoring previous executable from {:?}", self.aside_path);

        const MAX_ATTEMPTS: u32 = 3;
        let mut attempts = 0;

        loop {
            match self.attempt_restore().await {
                Ok(()) => {
                    info!("Previous executable restored");
                    return Ok(());
                }
                Err(e) if attempts < MAX_ATTEMPTS - 1 => {
                    warn!("Restore attempt {} failed: {}. Retrying...", attempts + 1, e);
                    tokio::time::sleep(tokio::time::Duration::from_millis(250)).await;
                    attempts += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn attempt_restore(&self) -> Result<(), UpdateError> {
        if fs::symlink_metadata(&self.original_path).await.is_ok() {
            fs::remove_file(&self.original_path)
                .await
                .map_err(|e| UpdateError::io("remove partial executable", &e))?;
        }

        fs::rename(&self.aside_path, &self.original_path)
            .await
            .map_err(|e| UpdateError::io("restore previous executable", &e))
    }

    /// Delete the aside copy if one exists.
    ///
    /// Returns whether a file was removed.
    pub async fn cleanup(&self) -> Result<bool, UpdateError> {
        match fs::remove_file(&self.aside_path).await {
            Ok(()) => {
                debug!("Removed previous executable at {:?}", self.aside_path);
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(UpdateError::io("remove previous executable", &e)),
        }
    }

    /// Whether an aside copy is present.
    pub fn aside_exists(&self) -> bool {
        self.aside_path.exists()
    }

    /// Location of the aside copy.
    pub fn aside_path(&self) -> &Path {
        &self.aside_path
    }

    /// Canonical executable path.
    pub fn original_path(&self) -> &Path {
        &self.original_path
    }
}
