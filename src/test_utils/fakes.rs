//! In-memory collaborators for exercising the update engine without network or restarts.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{Notify, Semaphore};

use crate::config::SettingsStore;
use crate::core::UpdateError;
use crate::upgrade::download::Downloader;
use crate::upgrade::listing::ListingSource;
use crate::upgrade::platform::{ExecutablePlatform, ProcessLauncher};
use crate::upgrade::tag::{Channel, ReleaseTag};

/// Owner used by fixtures.
pub const TEST_OWNER: &str = "test-owner";
/// Repository used by fixtures.
pub const TEST_REPO: &str = "test-repo";

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Render a listing page linking `tags` in order, shaped like the real release page.
pub fn render_page(tags: &[&str]) -> String {
    let mut html = String::from("<html><body>\n");
    for tag in tags {
        html.push_str(&format!(
            "<div class=\"release-entry\">\n  <a href=\"/{TEST_OWNER}/{TEST_REPO}/releases/tag/{tag}\">\
             <span class=\"css-truncate-target\">{tag}</span></a>\n</div>\n"
        ));
    }
    html.push_str("</body></html>\n");
    html
}

/// Listing with fixed pages that counts fetches.
///
/// Pages past the end come back empty, as an exhausted real listing does.
pub struct StaticListing {
    pages: Vec<String>,
    fetched: Mutex<Vec<u32>>,
    fetch_count: AtomicU32,
}

impl StaticListing {
    /// Listing from raw page bodies.
    pub fn from_bodies(pages: Vec<String>) -> Self {
        Self {
            pages,
            fetched: Mutex::new(Vec::new()),
            fetch_count: AtomicU32::new(0),
        }
    }

    /// Listing whose page `n` links the tags in `pages[n - 1]`.
    pub fn from_tags(pages: &[&[&str]]) -> Self {
        Self::from_bodies(pages.iter().map(|tags| render_page(tags)).collect())
    }

    /// Total number of fetches.
    pub fn fetch_count(&self) -> u32 {
        self.fetch_count.load(Ordering::SeqCst)
    }

    /// Page numbers fetched, in order.
    pub fn fetched_pages(&self) -> Vec<u32> {
        lock(&self.fetched).clone()
    }
}

#[async_trait]
impl ListingSource for StaticListing {
    async fn fetch_page(&self, page: u32) -> Result<String, UpdateError> {
        self.fetch_count.fetch_add(1, Ordering::SeqCst);
        lock(&self.fetched).push(page);
        let index = page.checked_sub(1).map(|i| i as usize);
        Ok(index.and_then(|i| self.pages.get(i)).cloned().unwrap_or_default())
    }
}

/// Controls a gated [`ScriptedDownloader`].
#[derive(Clone)]
pub struct DownloadGate {
    started: Arc<Notify>,
    permits: Arc<Semaphore>,
}

impl DownloadGate {
    /// Wait until a download has reached the gate.
    pub async fn wait_started(&self) {
        self.started.notified().await;
    }

    /// Let one held download continue.
    pub fn open(&self) {
        self.permits.add_permits(1);
    }
}

/// Downloader serving canned responses keyed by URL.
pub struct ScriptedDownloader {
    responses: HashMap<String, Result<Vec<u8>, UpdateError>>,
    fallback: Option<Vec<u8>>,
    gate: Option<DownloadGate>,
    requests: Mutex<Vec<String>>,
}

impl Default for ScriptedDownloader {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedDownloader {
    /// Downloader that fails every URL as an HTTP 404 would.
    pub fn new() -> Self {
        Self {
            responses: HashMap::new(),
            fallback: None,
            gate: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Serve `bytes` for `url`.
    pub fn with_artifact(mut self, url: impl Into<String>, bytes: Vec<u8>) -> Self {
        self.responses.insert(url.into(), Ok(bytes));
        self
    }

    /// Fail `url` with `error`.
    pub fn with_failure(mut self, url: impl Into<String>, error: UpdateError) -> Self {
        self.responses.insert(url.into(), Err(error));
        self
    }

    /// Serve `bytes` for any URL without a scripted response.
    pub fn serving_any(mut self, bytes: Vec<u8>) -> Self {
        self.fallback = Some(bytes);
        self
    }

    /// Hold every download until the returned gate is opened.
    pub fn gated(mut self) -> (Self, DownloadGate) {
        let gate = DownloadGate {
            started: Arc::new(Notify::new()),
            permits: Arc::new(Semaphore::new(0)),
        };
        self.gate = Some(gate.clone());
        (self, gate)
    }

    /// URLs requested so far.
    pub fn requests(&self) -> Vec<String> {
        lock(&self.requests).clone()
    }
}

#[async_trait]
impl Downloader for ScriptedDownloader {
    async fn download(&self, url: &str, dest: &Path) -> Result<u64, UpdateError> {
        lock(&self.requests).push(url.to_string());

        if let Some(gate) = &self.gate {
            gate.started.notify_one();
            let permit = gate
                .permits
                .acquire()
                .await
                .map_err(|e| UpdateError::download(url, e))?;
            permit.forget();
        }

        let bytes = match self.responses.get(url) {
            Some(Ok(bytes)) => bytes.clone(),
            Some(Err(e)) => return Err(e.clone()),
            None => match &self.fallback {
                Some(bytes) => bytes.clone(),
                None => return Err(UpdateError::download(url, "HTTP 404 Not Found")),
            },
        };

        tokio::fs::write(dest, &bytes)
            .await
            .map_err(|e| UpdateError::io("write staging file", &e))?;
        Ok(bytes.len() as u64)
    }
}

/// Settings held in memory that record every setter call.
pub struct MemorySettings {
    channel: Mutex<Channel>,
    installed: Mutex<Option<ReleaseTag>>,
    channel_writes: Mutex<Vec<Channel>>,
    tag_writes: Mutex<Vec<ReleaseTag>>,
    fail_writes: bool,
}

impl MemorySettings {
    /// Settings starting on `channel` with no installed tag.
    pub fn new(channel: Channel) -> Self {
        Self {
            channel: Mutex::new(channel),
            installed: Mutex::new(None),
            channel_writes: Mutex::new(Vec::new()),
            tag_writes: Mutex::new(Vec::new()),
            fail_writes: false,
        }
    }

    /// Settings whose setters all fail, as on a full or read-only disk.
    pub fn failing_writes(channel: Channel) -> Self {
        Self {
            fail_writes: true,
            ..Self::new(channel)
        }
    }

    /// Every value passed to `set_channel_preference`.
    pub fn channel_writes(&self) -> Vec<Channel> {
        lock(&self.channel_writes).clone()
    }

    /// Every value passed to `set_installed_tag`.
    pub fn tag_writes(&self) -> Vec<ReleaseTag> {
        lock(&self.tag_writes).clone()
    }

    /// Current channel without going through the trait.
    pub fn channel(&self) -> Channel {
        *lock(&self.channel)
    }
}

#[async_trait]
impl SettingsStore for MemorySettings {
    async fn channel_preference(&self) -> Result<Channel, UpdateError> {
        Ok(*lock(&self.channel))
    }

    async fn set_channel_preference(&self, channel: Channel) -> Result<(), UpdateError> {
        if self.fail_writes {
            return Err(UpdateError::Settings("disk full".to_string()));
        }
        lock(&self.channel_writes).push(channel);
        *lock(&self.channel) = channel;
        Ok(())
    }

    async fn installed_tag(&self) -> Result<Option<ReleaseTag>, UpdateError> {
        Ok(lock(&self.installed).clone())
    }

    async fn set_installed_tag(&self, tag: &ReleaseTag) -> Result<(), UpdateError> {
        if self.fail_writes {
            return Err(UpdateError::Settings("disk full".to_string()));
        }
        lock(&self.tag_writes).push(tag.clone());
        *lock(&self.installed) = Some(tag.clone());
        Ok(())
    }
}

/// Launcher that records restart requests instead of exiting.
#[derive(Default)]
pub struct RecordingLauncher {
    restarts: Mutex<Vec<(PathBuf, Vec<String>)>>,
    fail: bool,
}

impl RecordingLauncher {
    /// Launcher whose every restart succeeds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Launcher whose every restart fails to spawn.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Restart requests received.
    pub fn restarts(&self) -> Vec<(PathBuf, Vec<String>)> {
        lock(&self.restarts).clone()
    }
}

impl ProcessLauncher for RecordingLauncher {
    fn restart_as(&self, executable: &Path, args: &[String]) -> Result<(), UpdateError> {
        lock(&self.restarts).push((executable.to_path_buf(), args.to_vec()));
        if self.fail {
            return Err(UpdateError::io(
                format!("launch {}", executable.display()),
                &std::io::Error::new(std::io::ErrorKind::PermissionDenied, "spawn refused"),
            ));
        }
        Ok(())
    }
}

/// Platform whose rename-into-place always fails.
///
/// When it claims to lock the running executable, the target path is free after the
/// aside move, and a truncated file is left there before failing to mimic a partial
/// write.
pub struct FailingSwapPlatform {
    locks: bool,
}

impl FailingSwapPlatform {
    /// Failing platform with the given lock semantics.
    pub fn new(locks_running_executable: bool) -> Self {
        Self {
            locks: locks_running_executable,
        }
    }
}

#[async_trait]
impl ExecutablePlatform for FailingSwapPlatform {
    fn locks_running_executable(&self) -> bool {
        self.locks
    }

    async fn prepare_for_execution(
        &self,
        _staged: &Path,
        _current: &Path,
    ) -> Result<(), UpdateError> {
        Ok(())
    }

    async fn swap_into(&self, _staged: &Path, target: &Path) -> Result<(), UpdateError> {
        if self.locks {
            tokio::fs::write(target, b"partial")
                .await
                .map_err(|e| UpdateError::io("write partial file", &e))?;
        }
        Err(UpdateError::io(
            "rename new executable into place",
            &std::io::Error::new(std::io::ErrorKind::PermissionDenied, "simulated swap failure"),
        ))
    }
}
