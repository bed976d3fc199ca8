//! Executable replacement failure recovery, checked by content hash.

use anyhow::Result;
use hopper::core::UpdateError;
use hopper::test_utils::{
    FailingSwapPlatform, MemorySettings, ORIGINAL_BINARY, OrchestratorHarness, ScriptedDownloader,
    StaticListing, new_binary,
};
use hopper::upgrade::Channel;
use hopper::upgrade::self_replace::SelfReplacer;
use hopper::upgrade::state::ReplaceErrorKind;
use hopper::upgrade::verification::ArtifactVerifier;
use std::sync::Arc;
use tempfile::TempDir;

#[tokio::test]
async fn test_failed_swap_leaves_executable_identical() -> Result<()> {
    for locks in [false, true] {
        let temp_dir = TempDir::new()?;
        let current = temp_dir.path().join("Hopper");
        let staged = temp_dir.path().join(".Hopper.update-test");
        std::fs::write(&current, ORIGINAL_BINARY)?;
        std::fs::write(&staged, new_binary(0x42))?;
        let before = ArtifactVerifier::compute_sha256(&current).await?;

        let replacer = SelfReplacer::new(Arc::new(FailingSwapPlatform::new(locks)), 1024);
        let failure = replacer.replace(&current, &staged).await.unwrap_err();

        assert_eq!(failure.kind, ReplaceErrorKind::SwapFailed);
        assert!(matches!(failure.error, UpdateError::ReplaceFailed { restored: true, .. }));
        assert_eq!(ArtifactVerifier::compute_sha256(&current).await?, before, "locks={locks}");
        assert!(!temp_dir.path().join("Hopper.old").exists(), "locks={locks}");
    }
    Ok(())
}

#[tokio::test]
async fn test_undersized_staged_file_is_never_swapped() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let current = temp_dir.path().join("Hopper");
    let staged = temp_dir.path().join(".Hopper.update-small");
    std::fs::write(&current, ORIGINAL_BINARY)?;
    std::fs::write(&staged, b"tiny")?;

    let replacer = SelfReplacer::new(Arc::new(FailingSwapPlatform::new(true)), 1024);
    let failure = replacer.replace(&current, &staged).await.unwrap_err();

    assert_eq!(failure.kind, ReplaceErrorKind::InvalidArtifact);
    assert_eq!(std::fs::read(&current)?, ORIGINAL_BINARY);
    assert!(!temp_dir.path().join("Hopper.old").exists());
    Ok(())
}

#[tokio::test]
async fn test_orchestrated_swap_failure_keeps_settings() -> Result<()> {
    let listing = StaticListing::from_tags(&[&["v1.0.0"]]);
    let harness = OrchestratorHarness::new(
        listing,
        ScriptedDownloader::new().serving_any(new_binary(6)),
        MemorySettings::new(Channel::Dev),
    )
    .with_platform(Arc::new(FailingSwapPlatform::new(true)));
    let (orchestrator, _events) = harness.build();

    let err = orchestrator.switch_channel(Channel::Stable).await.unwrap_err();
    assert!(matches!(err, UpdateError::ReplaceFailed { restored: true, .. }));
    assert_eq!(harness.exe_bytes(), ORIGINAL_BINARY);
    assert!(harness.settings.channel_writes().is_empty());
    assert!(harness.settings.tag_writes().is_empty());
    assert!(harness.launcher.restarts().is_empty());

    // Staging leftovers are cleaned up with the attempt
    let leftovers: Vec<_> = std::fs::read_dir(harness.install_dir())?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name())
        .filter(|name| name != "Hopper")
        .collect();
    assert!(leftovers.is_empty(), "unexpected files: {leftovers:?}");
    Ok(())
}
