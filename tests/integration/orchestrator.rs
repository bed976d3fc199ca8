//! Channel switches driven end to end against in-memory collaborators.

use anyhow::Result;
use hopper::core::UpdateError;
use hopper::test_utils::{
    MemorySettings, ORIGINAL_BINARY, OrchestratorHarness, ScriptedDownloader, StaticListing,
    asset_url, drain_events, init_test_logging, new_binary,
};
use hopper::upgrade::{Channel, UpdateState};

#[tokio::test]
async fn test_switch_dev_to_stable_end_to_end() -> Result<()> {
    init_test_logging(None);
    let listing = StaticListing::from_tags(&[&["v1.2.0-dev.ab", "v1.1.9"]]);
    let downloader = ScriptedDownloader::new().with_artifact(asset_url("v1.1.9"), new_binary(3));
    let harness = OrchestratorHarness::new(listing, downloader, MemorySettings::new(Channel::Dev));
    let (orchestrator, mut events) = harness.build();

    let ticket = orchestrator.request_channel_switch(Channel::Stable)?;
    let outcome = ticket.wait().await?;

    assert_eq!(outcome.tag, "v1.1.9");
    assert_eq!(outcome.channel, Channel::Stable);
    assert!(!outcome.fell_back);
    assert!(outcome.replacement.success);
    assert!(outcome.replacement.restarted);
    assert!(outcome.replacement.digest.is_some_and(|d| d.starts_with("sha256:")));

    assert_eq!(orchestrator.current_resolved_version().await.as_ref().map(|t| t.as_str()), Some("v1.1.9"));
    assert_eq!(harness.settings.channel(), Channel::Stable);
    assert_eq!(harness.exe_bytes(), new_binary(3));
    assert_eq!(harness.downloader.requests(), vec![asset_url("v1.1.9")]);

    let restarts = harness.launcher.restarts();
    assert_eq!(restarts.len(), 1);
    assert_eq!(restarts[0].0, harness.exe);

    let events = drain_events(&mut events);
    let states: Vec<UpdateState> = events.iter().map(|e| e.state).collect();
    assert_eq!(
        states,
        vec![
            UpdateState::Validating,
            UpdateState::Downloading,
            UpdateState::Replacing,
            UpdateState::Restarted,
        ]
    );
    let last = events.last().map(|e| e.message.as_str()).unwrap_or_default();
    assert!(last.contains("v1.1.9"), "unexpected final message: {last}");
    assert!(last.contains("stable"), "unexpected final message: {last}");
    assert_eq!(orchestrator.state(), UpdateState::Restarted);
    assert!(!orchestrator.is_busy());
    Ok(())
}

#[tokio::test]
async fn test_stable_without_stable_release_leaves_preference_alone() -> Result<()> {
    let tags: Vec<String> = (0..12).map(|i| format!("v9.0.{i}-dev.{i:x}")).collect();
    let pages: Vec<[&str; 1]> = tags.iter().map(|tag| [tag.as_str()]).collect();
    let slices: Vec<&[&str]> = pages.iter().map(|page| page.as_slice()).collect();

    let harness = OrchestratorHarness::new(
        StaticListing::from_tags(&slices),
        ScriptedDownloader::new().serving_any(new_binary(5)),
        MemorySettings::new(Channel::Dev),
    );
    let (orchestrator, mut events) = harness.build();

    let err = orchestrator.switch_channel(Channel::Stable).await.unwrap_err();
    assert!(matches!(err, UpdateError::NoStableReleaseFound { pages_checked: 10 }));

    assert!(harness.settings.channel_writes().is_empty());
    assert!(harness.settings.tag_writes().is_empty());
    assert_eq!(harness.settings.channel(), Channel::Dev);
    assert!(harness.downloader.requests().is_empty());
    assert_eq!(harness.exe_bytes(), ORIGINAL_BINARY);
    assert!(harness.launcher.restarts().is_empty());
    assert_eq!(orchestrator.current_resolved_version().await, None);

    let last = drain_events(&mut events).pop().map(|e| e.message).unwrap_or_default();
    assert!(last.starts_with("Could not find an update"), "unexpected message: {last}");
    Ok(())
}

#[tokio::test]
async fn test_second_request_rejected_while_first_runs() -> Result<()> {
    let listing = StaticListing::from_tags(&[&["v1.0.0"]]);
    let (downloader, gate) = ScriptedDownloader::new().serving_any(new_binary(7)).gated();
    let harness = OrchestratorHarness::new(listing, downloader, MemorySettings::new(Channel::Stable));
    let (orchestrator, _events) = harness.build();

    let first = orchestrator.request_channel_switch(Channel::Stable)?;
    gate.wait_started().await;
    assert!(orchestrator.is_busy());
    assert_eq!(orchestrator.state(), UpdateState::Downloading);

    let second = orchestrator.request_channel_switch(Channel::Dev);
    assert!(matches!(second, Err(UpdateError::UpdateInProgress)));
    // The rejected request did not disturb the running one
    assert_eq!(orchestrator.state(), UpdateState::Downloading);
    assert_eq!(harness.downloader.requests().len(), 1);

    gate.open();
    let outcome = first.wait().await?;
    assert_eq!(outcome.tag, "v1.0.0");
    assert!(!orchestrator.is_busy());

    gate.open();
    let third = orchestrator.request_channel_switch(Channel::Stable)?;
    third.wait().await?;
    assert_eq!(harness.downloader.requests().len(), 2);
    assert_eq!(harness.launcher.restarts().len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_state_watch_follows_attempt() -> Result<()> {
    let listing = StaticListing::from_tags(&[&["v1.0.0"]]);
    let (downloader, gate) = ScriptedDownloader::new().serving_any(new_binary(8)).gated();
    let harness = OrchestratorHarness::new(listing, downloader, MemorySettings::new(Channel::Stable));
    let (orchestrator, _events) = harness.build();

    let mut watcher = orchestrator.subscribe_state();
    assert_eq!(*watcher.borrow(), UpdateState::Idle);

    let ticket = orchestrator.request_channel_switch(Channel::Stable)?;
    gate.wait_started().await;
    assert_eq!(*watcher.borrow_and_update(), UpdateState::Downloading);

    gate.open();
    ticket.wait().await?;
    assert_eq!(*watcher.borrow_and_update(), UpdateState::Restarted);
    assert!(watcher.borrow().is_terminal());
    Ok(())
}
