//! Test utilities shared by unit tests and the integration suite.
//!
//! Available in `cfg(test)` builds and with the `test-utils` feature.

pub mod fakes;
pub mod harness;

pub use fakes::{
    DownloadGate, FailingSwapPlatform, MemorySettings, RecordingLauncher, ScriptedDownloader,
    StaticListing, TEST_OWNER, TEST_REPO, render_page,
};
pub use harness::{ORIGINAL_BINARY, OrchestratorHarness, asset_url, drain_events, new_binary};

use std::sync::Once;
use tracing::Level;
use tracing_subscriber::EnvFilter;

static INIT_LOGGING: Once = Once::new();

/// Install a tracing subscriber for tests, once per process.
///
/// With `level` set, logs at that level. Otherwise `RUST_LOG` is honoured if present,
/// and nothing is logged if it is not.
pub fn init_test_logging(level: Option<Level>) {
    INIT_LOGGING.call_once(|| {
        let filter = if let Some(level) = level {
            EnvFilter::new(level.to_string())
        } else if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            return;
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .with_thread_ids(false)
            .try_init();
    });
}
