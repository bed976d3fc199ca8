//! Operating-system specific steps of replacing and relaunching an executable.
//!
//! Everything that differs per platform sits behind two small traits so that the
//! scanner and orchestrator never branch on the target OS:
//!
//! - [`ExecutablePlatform`] makes a staged file runnable and moves it into place.
//! - [`ProcessLauncher`] starts the replacement and ends the current process.
//!
//! | Platform | Running exe locked | Quarantine marker | Executable bit |
//! |----------|--------------------|-------------------|----------------|
//! | Linux    | no                 | none              | copied         |
//! | macOS    | no                 | `com.apple.quarantine` cleared | copied |
//! | Windows  | yes                | none              | n/a            |

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, info};

use crate::core::UpdateError;

/// Per-platform capability used by the self-replace primitive.
#[async_trait]
pub trait ExecutablePlatform: Send + Sync {
    /// Whether the running executable's file is locked against deletion and overwrite,
    /// so it must be renamed aside before the swap.
    fn locks_running_executable(&self) -> bool;

    /// Make `staged` runnable: clear untrusted-download markers and copy the permission
    /// bits of `current`.
    async fn prepare_for_execution(&self, staged: &Path, current: &Path)
    -> Result<(), UpdateError>;

    /// Move `staged` to `target` in one rename.
    async fn swap_into(&self, staged: &Path, target: &Path) -> Result<(), UpdateError>;
}

/// Linux and other Unix systems without download quarantine.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnixPlatform;

/// macOS: Unix semantics plus quarantine removal.
#[derive(Debug, Default, Clone, Copy)]
pub struct MacPlatform;

/// Windows: the running executable is locked and must be moved aside.
#[derive(Debug, Default, Clone, Copy)]
pub struct WindowsPlatform;

#[async_trait]
impl ExecutablePlatform for UnixPlatform {
    fn locks_running_executable(&self) -> bool {
        false
    }

    async fn prepare_for_execution(
        &self,
        staged: &Path,
        current: &Path,
    ) -> Result<(), UpdateError> {
        copy_executable_mode(staged, current).await
    }

    async fn swap_into(&self, staged: &Path, target: &Path) -> Result<(), UpdateError> {
        rename_into_place(staged, target).await
    }
}

#[async_trait]
impl ExecutablePlatform for MacPlatform {
    fn locks_running_executable(&self) -> bool {
        false
    }

    async fn prepare_for_execution(
        &self,
        staged: &Path,
        current: &Path,
    ) -> Result<(), UpdateError> {
        // Missing xattr binary or attribute is expected and harmless
        match tokio::process::Command::new("xattr")
            .args(["-d", "com.apple.quarantine"])
            .arg(staged)
            .output()
            .await
        {
            Ok(output) if output.status.success() => {
                debug!("Cleared quarantine attribute on {:?}", staged)
            }
            Ok(_) => debug!("No quarantine attribute on {:?}", staged),
            Err(e) => debug!("xattr unavailable: {}", e),
        }

        copy_executable_mode(staged, current).await
    }

    async fn swap_into(&self, staged: &Path, target: &Path) -> Result<(), UpdateError> {
        rename_into_place(staged, target).await
    }
}

#[async_trait]
impl ExecutablePlatform for WindowsPlatform {
    fn locks_running_executable(&self) -> bool {
        true
    }

    async fn prepare_for_execution(
        &self,
        _staged: &Path,
        _current: &Path,
    ) -> Result<(), UpdateError> {
        Ok(())
    }

    async fn swap_into(&self, staged: &Path, target: &Path) -> Result<(), UpdateError> {
        rename_into_place(staged, target).await
    }
}

/// The capability for the platform this binary was built for.
pub fn current_platform() -> Arc<dyn ExecutablePlatform> {
    if cfg!(windows) {
        Arc::new(WindowsPlatform)
    } else if cfg!(target_os = "macos") {
        Arc::new(MacPlatform)
    } else {
        Arc::new(UnixPlatform)
    }
}

async fn rename_into_place(staged: &Path, target: &Path) -> Result<(), UpdateError> {
    info!("Renaming {:?} into {:?}", staged, target);
    fs::rename(staged, target)
        .await
        .map_err(|e| UpdateError::io("rename new executable into place", &e))
}

#[cfg(unix)]
async fn copy_executable_mode(staged: &Path, current: &Path) -> Result<(), UpdateError> {
    use std::os::unix::fs::PermissionsExt;

    // Original may be gone if a previous attempt was interrupted
    let mode = match fs::metadata(current).await {
        Ok(metadata) => metadata.permissions().mode() & 0o7777,
        Err(_) => 0o755,
    };
    let mode = mode | 0o100;

    debug!("Setting mode {:o} on {:?}", mode, staged);
    fs::set_permissions(staged, std::fs::Permissions::from_mode(mode))
        .await
        .map_err(|e| UpdateError::io("set executable permissions", &e))
}

#[cfg(not(unix))]
async fn copy_executable_mode(_staged: &Path, _current: &Path) -> Result<(), UpdateError> {
    Ok(())
}

/// Starts the replacement process and ends this one.
pub trait ProcessLauncher: Send + Sync {
    /// Spawn `executable` with `args`, then terminate the current process.
    ///
    /// Returns on failure, or from launchers that leave the exit to their caller.
    fn restart_as(&self, executable: &Path, args: &[String]) -> Result<(), UpdateError>;
}

/// Launcher that spawns a detached child, then exits with status 0.
///
/// [`SystemLauncher::deferred_exit`] skips the exit and returns once the child is
/// running, leaving the caller to finish its own output and return from `main`.
#[derive(Debug, Clone, Copy)]
pub struct SystemLauncher {
    exit_after_spawn: bool,
}

impl Default for SystemLauncher {
    fn default() -> Self {
        Self {
            exit_after_spawn: true,
        }
    }
}

impl SystemLauncher {
    /// Launcher that ends the process right after the spawn.
    pub fn new() -> Self {
        Self::default()
    }

    /// Launcher that returns after the spawn instead of exiting.
    pub fn deferred_exit() -> Self {
        Self {
            exit_after_spawn: false,
        }
    }
}

impl ProcessLauncher for SystemLauncher {
    fn restart_as(&self, executable: &Path, args: &[String]) -> Result<(), UpdateError> {
        let mut command = std::process::Command::new(executable);
        command.args(args);

        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            const CREATE_NO_WINDOW: u32 = 0x0800_0000;
            command.creation_flags(CREATE_NO_WINDOW);
        }

        let child = command
            .spawn()
            .map_err(|e| UpdateError::io(format!("launch {}", executable.display()), &e))?;

        if !self.exit_after_spawn {
            info!("Started updated executable (pid {})", child.id());
            return Ok(());
        }
        info!("Started updated executable (pid {}), exiting", child.id());
        std::process::exit(0);
    }
}
