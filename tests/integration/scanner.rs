//! Release scanner behaviour over synthetic paginated listings.

use anyhow::Result;
use hopper::core::UpdateError;
use hopper::test_utils::{StaticListing, TEST_OWNER, TEST_REPO, init_test_logging};
use hopper::upgrade::Channel;
use hopper::upgrade::listing::ListingScope;
use hopper::upgrade::scanner::ReleaseScanner;
use std::sync::Arc;

fn scanner_over(listing: &Arc<StaticListing>) -> Result<ReleaseScanner> {
    let scope = ListingScope::new(TEST_OWNER, TEST_REPO)?;
    Ok(ReleaseScanner::new(listing.clone(), scope))
}

#[tokio::test]
async fn test_stable_found_on_second_page() -> Result<()> {
    init_test_logging(None);
    let listing = Arc::new(StaticListing::from_tags(&[
        &["v3.2.30-dev.adcb1ae", "v3.2.29-beta.1"],
        &["v3.2.28-dev.x", "v3.2.27"],
        &["v3.2.26"],
    ]));

    let result = scanner_over(&listing)?.scan(Channel::Stable).await?;
    assert_eq!(result.tag, "v3.2.27");
    assert_eq!(result.pages_checked, 2);
    assert_eq!(listing.fetched_pages(), vec![1, 2]);
    Ok(())
}

#[tokio::test]
async fn test_stable_exhausts_exactly_max_pages() -> Result<()> {
    let pages: Vec<Vec<String>> = (0..15)
        .map(|i| vec![format!("v4.0.{i}-dev.abc"), format!("v4.0.{i}-rc.1")])
        .collect();
    let refs: Vec<Vec<&str>> =
        pages.iter().map(|page| page.iter().map(String::as_str).collect()).collect();
    let slices: Vec<&[&str]> = refs.iter().map(Vec::as_slice).collect();
    let listing = Arc::new(StaticListing::from_tags(&slices));

    let err = scanner_over(&listing)?.scan(Channel::Stable).await.unwrap_err();
    assert!(matches!(err, UpdateError::NoStableReleaseFound { pages_checked: 10 }));
    assert_eq!(listing.fetch_count(), 10);
    assert_eq!(listing.fetched_pages(), (1..=10).collect::<Vec<u32>>());
    Ok(())
}

#[tokio::test]
async fn test_stable_survives_empty_and_garbage_pages() -> Result<()> {
    let listing = Arc::new(StaticListing::from_bodies(vec![
        String::new(),
        "<html><body>rate limited</body></html>".to_string(),
        "\u{0}\u{1}\u{2}".to_string(),
        hopper::test_utils::render_page(&["v1.0.1"]),
    ]));

    let result = scanner_over(&listing)?.scan(Channel::Stable).await?;
    assert_eq!(result.tag, "v1.0.1");
    assert_eq!(result.pages_checked, 4);
    Ok(())
}

#[tokio::test]
async fn test_dev_checks_exactly_one_page() -> Result<()> {
    let listing = Arc::new(StaticListing::from_tags(&[
        &["v3.2.29", "v3.2.28"],
        &["v3.2.30-dev.adcb1ae"],
        &["v3.2.27"],
    ]));

    // No dev build on page 1: the most recent entry is taken, later pages are never read
    let result = scanner_over(&listing)?.scan(Channel::Dev).await?;
    assert_eq!(result.tag, "v3.2.29");
    assert_eq!(result.pages_checked, 1);
    assert_eq!(listing.fetch_count(), 1);
    Ok(())
}

#[tokio::test]
async fn test_dev_empty_first_page_fails_without_paging() -> Result<()> {
    let listing = Arc::new(StaticListing::from_tags(&[&[], &["v3.2.30-dev.adcb1ae"]]));

    let err = scanner_over(&listing)?.scan(Channel::Dev).await.unwrap_err();
    assert!(matches!(err, UpdateError::NoTagsOnPage { page: 1 }));
    assert_eq!(listing.fetch_count(), 1);
    Ok(())
}

#[tokio::test]
async fn test_resolution_is_idempotent() -> Result<()> {
    let listing = Arc::new(StaticListing::from_tags(&[
        &["v2.1.0-dev.9f8e7d", "v2.0.0-rc.1"],
        &["v1.9.3", "v1.9.2"],
    ]));
    let scanner = scanner_over(&listing)?;

    for channel in [Channel::Stable, Channel::Dev] {
        let first = scanner.scan(channel).await?;
        let second = scanner.scan(channel).await?;
        assert_eq!(first, second, "{channel} resolution changed between scans");
    }
    Ok(())
}

#[tokio::test]
async fn test_stable_never_returns_prerelease() -> Result<()> {
    let listing = Arc::new(StaticListing::from_tags(&[&[
        "v5.0.0-ALPHA",
        "v5.0.0-Pre.1",
        "v4.9.0-Beta",
        "v4.8.0-RC2",
        "v4.7.0+build.456",
    ]]));

    let result = scanner_over(&listing)?.scan(Channel::Stable).await?;
    assert_eq!(result.tag, "v4.7.0+build.456");
    assert!(!result.tag.is_prerelease());
    Ok(())
}
