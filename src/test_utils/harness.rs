//! Ready-made orchestrator wired to in-memory collaborators and a temporary executable.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::config::SettingsStore;
use crate::test_utils::fakes::{
    MemorySettings, RecordingLauncher, ScriptedDownloader, StaticListing, TEST_OWNER, TEST_REPO,
};
use crate::upgrade::asset::{AssetResolver, AssetTable, DEFAULT_VARIANT, PlatformDescriptor};
use crate::upgrade::download::Downloader;
use crate::upgrade::listing::{ListingScope, ListingSource};
use crate::upgrade::platform::{ExecutablePlatform, UnixPlatform};
use crate::upgrade::scanner::ReleaseScanner;
use crate::upgrade::self_replace::SelfReplacer;
use crate::upgrade::state::{StatusEvent, StatusReporter};
use crate::upgrade::UpdateOrchestrator;

/// Contents of the executable the harness starts with.
pub const ORIGINAL_BINARY: &[u8] = &[0x7f; 4096];

/// A binary large enough to pass the default size check.
pub fn new_binary(fill: u8) -> Vec<u8> {
    vec![fill; 8192]
}

/// Locator the harness resolves for `tag`.
pub fn asset_url(tag: &str) -> String {
    format!("https://github.com/{TEST_OWNER}/{TEST_REPO}/releases/download/{tag}/Hopper-linux")
}

/// Temporary installation plus the fakes an orchestrator needs.
pub struct OrchestratorHarness {
    /// Directory holding the executable; removed on drop
    pub dir: TempDir,
    /// Canonical executable path
    pub exe: PathBuf,
    /// Listing served to the scanner
    pub listing: Arc<StaticListing>,
    /// Artifact source
    pub downloader: Arc<ScriptedDownloader>,
    /// Recorded settings
    pub settings: Arc<MemorySettings>,
    /// Recorded restarts
    pub launcher: Arc<RecordingLauncher>,
    platform: Arc<dyn ExecutablePlatform>,
    max_pages: u32,
}

impl OrchestratorHarness {
    /// Harness with an executable containing [`ORIGINAL_BINARY`].
    pub fn new(listing: StaticListing, downloader: ScriptedDownloader, settings: MemorySettings) -> Self {
        let dir = TempDir::new().unwrap_or_else(|e| panic!("failed to create temp dir: {e}"));
        let exe = dir.path().join("Hopper");
        std::fs::write(&exe, ORIGINAL_BINARY)
            .unwrap_or_else(|e| panic!("failed to write test executable: {e}"));

        Self {
            dir,
            exe,
            listing: Arc::new(listing),
            downloader: Arc::new(downloader),
            settings: Arc::new(settings),
            launcher: Arc::new(RecordingLauncher::new()),
            platform: Arc::new(UnixPlatform),
            max_pages: 10,
        }
    }

    /// Swap through `platform` instead of plain renames.
    pub fn with_platform(mut self, platform: Arc<dyn ExecutablePlatform>) -> Self {
        self.platform = platform;
        self
    }

    /// Relaunch through `launcher`.
    pub fn with_launcher(mut self, launcher: RecordingLauncher) -> Self {
        self.launcher = Arc::new(launcher);
        self
    }

    /// Bound stable scans to `max_pages`.
    pub fn with_max_pages(mut self, max_pages: u32) -> Self {
        self.max_pages = max_pages;
        self
    }

    /// Build an orchestrator and the receiving end of its status events.
    pub fn build(&self) -> (Arc<UpdateOrchestrator>, UnboundedReceiver<StatusEvent>) {
        let scope = ListingScope::new(TEST_OWNER, TEST_REPO)
            .unwrap_or_else(|e| panic!("invalid test scope: {e}"));
        let source: Arc<dyn ListingSource> = self.listing.clone();
        let scanner = ReleaseScanner::new(source, scope).with_max_pages(self.max_pages);
        let resolver = AssetResolver::new(TEST_OWNER, TEST_REPO, AssetTable::builtin("Hopper"));
        let downloader: Arc<dyn Downloader> = self.downloader.clone();
        let settings: Arc<dyn SettingsStore> = self.settings.clone();
        let (reporter, events) = StatusReporter::channel();

        let orchestrator = UpdateOrchestrator::new(
            scanner,
            resolver,
            downloader,
            SelfReplacer::new(self.platform.clone(), 1024),
            settings,
            self.exe.clone(),
        )
        .with_platform(PlatformDescriptor::new("linux", "x86_64", DEFAULT_VARIANT))
        .with_launcher(self.launcher.clone())
        .with_reporter(reporter);

        (Arc::new(orchestrator), events)
    }

    /// Current contents of the executable.
    pub fn exe_bytes(&self) -> Vec<u8> {
        std::fs::read(&self.exe).unwrap_or_default()
    }

    /// Directory holding the executable.
    pub fn install_dir(&self) -> &Path {
        self.dir.path()
    }
}

/// Drain every event currently buffered on `events`.
pub fn drain_events(events: &mut UnboundedReceiver<StatusEvent>) -> Vec<StatusEvent> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        drained.push(event);
    }
    drained
}
