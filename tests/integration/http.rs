//! The reqwest-backed listing source and downloader against a local mock server.

use anyhow::Result;
use hopper::core::{UpdateError, user_friendly_error};
use hopper::upgrade::Channel;
use hopper::upgrade::config::UpgradeConfig;
use hopper::upgrade::download::{Downloader, HttpDownloader};
use hopper::upgrade::listing::{HttpListingSource, ListingScope, ListingSource, build_http_client};
use hopper::upgrade::scanner::ReleaseScanner;
use hopper::upgrade::verification::ArtifactVerifier;
use mockito::Server;
use std::io::Write;
use std::time::Duration;
use tempfile::TempDir;

const PAGE: &str = r#"
    <div class="release-entry">
        <a href="/test-owner/test-repo/releases/tag/v2.1.0-dev.9f3e2d1">v2.1.0-dev.9f3e2d1</a>
    </div>
    <div class="release-entry">
        <a href="/test-owner/test-repo/releases/tag/v2.0.4">v2.0.4</a>
    </div>
"#;

fn config(server: &Server) -> UpgradeConfig {
    UpgradeConfig {
        base_url: server.url(),
        owner: "test-owner".to_string(),
        repo: "test-repo".to_string(),
        timeout_secs: 1,
        ..Default::default()
    }
}

fn listing_source(config: &UpgradeConfig) -> Result<HttpListingSource> {
    Ok(HttpListingSource::new(build_http_client(config)?, ListingScope::from_config(config)?))
}

/// Body that arrives only after the one second client timeout.
fn slow_body(out: &mut dyn Write) -> std::io::Result<()> {
    std::thread::sleep(Duration::from_secs(3));
    out.write_all(b"late")
}

#[tokio::test]
async fn test_listing_page_sent_uncached() -> Result<()> {
    let mut server = Server::new_async().await;
    let page = server
        .mock("GET", "/test-owner/test-repo/releases?page=1")
        .match_header("cache-control", "no-cache")
        .match_header("pragma", "no-cache")
        .match_header("user-agent", mockito::Matcher::Regex("^hopper".to_string()))
        .with_status(200)
        .with_body(PAGE)
        .expect(2)
        .create_async()
        .await;

    let config = config(&server);
    let scanner = ReleaseScanner::over_http(&config, build_http_client(&config)?)?;
    let dev = scanner.scan(Channel::Dev).await?;
    let stable = scanner.scan(Channel::Stable).await?;

    assert_eq!(dev.tag.as_str(), "v2.1.0-dev.9f3e2d1");
    assert_eq!(stable.tag.as_str(), "v2.0.4");
    assert_eq!(stable.pages_checked, 1);
    page.assert_async().await;
    Ok(())
}

#[tokio::test]
async fn test_listing_not_found_is_network_error() -> Result<()> {
    let mut server = Server::new_async().await;
    let _page = server
        .mock("GET", "/test-owner/test-repo/releases?page=1")
        .with_status(404)
        .create_async()
        .await;

    let source = listing_source(&config(&server))?;
    let err = source.fetch_page(1).await.unwrap_err();
    assert!(matches!(err, UpdateError::Network { .. }), "{err:?}");
    assert!(err.to_string().contains("404"), "{err}");
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_slow_listing_times_out() -> Result<()> {
    let mut server = Server::new_async().await;
    let _page = server
        .mock("GET", "/test-owner/test-repo/releases?page=1")
        .with_status(200)
        .with_chunked_body(slow_body)
        .create_async()
        .await;

    let source = listing_source(&config(&server))?;
    let started = std::time::Instant::now();
    let err = source.fetch_page(1).await.unwrap_err();
    assert!(matches!(err, UpdateError::Network { .. }), "{err:?}");
    assert!(started.elapsed() < Duration::from_secs(3));
    Ok(())
}

#[tokio::test]
async fn test_artifact_not_found_is_download_failure() -> Result<()> {
    let mut server = Server::new_async().await;
    let _asset = server
        .mock("GET", "/test-owner/test-repo/releases/download/v2.0.4/hopper-linux-x86_64")
        .with_status(404)
        .create_async()
        .await;

    let temp_dir = TempDir::new()?;
    let dest = temp_dir.path().join(".Hopper.update-test");
    let url = format!("{}/test-owner/test-repo/releases/download/v2.0.4/hopper-linux-x86_64", server.url());
    let downloader = HttpDownloader::new(build_http_client(&config(&server))?);

    let err = downloader.download(&url, &dest).await.unwrap_err();
    assert!(matches!(err, UpdateError::DownloadVerificationFailed { .. }), "{err:?}");
    assert!(err.to_string().contains("404"), "{err}");
    assert!(!dest.exists());

    let context = user_friendly_error(err.into());
    let details = context.details.unwrap_or_default();
    assert!(details.starts_with("Found an update"), "{details}");
    Ok(())
}

#[tokio::test]
async fn test_empty_artifact_is_rejected_before_swap() -> Result<()> {
    let mut server = Server::new_async().await;
    let _asset = server
        .mock("GET", "/test-owner/test-repo/releases/download/v2.0.4/hopper-linux-x86_64")
        .with_status(200)
        .with_body("")
        .create_async()
        .await;

    let temp_dir = TempDir::new()?;
    let dest = temp_dir.path().join(".Hopper.update-test");
    let url = format!("{}/test-owner/test-repo/releases/download/v2.0.4/hopper-linux-x86_64", server.url());
    let downloader = HttpDownloader::new(build_http_client(&config(&server))?);

    assert_eq!(downloader.download(&url, &dest).await?, 0);
    let err = ArtifactVerifier::check_artifact(&dest, 1024).await.unwrap_err();
    assert!(matches!(err, UpdateError::DownloadVerificationFailed { .. }));
    assert!(err.to_string().contains("empty"), "{err}");
    Ok(())
}

#[tokio::test]
async fn test_artifact_body_is_written_to_staging_file() -> Result<()> {
    let body = vec![0x5a_u8; 64 * 1024];
    let mut server = Server::new_async().await;
    let _asset = server
        .mock("GET", "/test-owner/test-repo/releases/download/v2.0.4/hopper-linux-x86_64")
        .with_status(200)
        .with_body(&body)
        .create_async()
        .await;

    let temp_dir = TempDir::new()?;
    let dest = temp_dir.path().join(".Hopper.update-test");
    let url = format!("{}/test-owner/test-repo/releases/download/v2.0.4/hopper-linux-x86_64", server.url());
    let downloader = HttpDownloader::new(build_http_client(&config(&server))?);

    assert_eq!(downloader.download(&url, &dest).await?, body.len() as u64);
    assert_eq!(std::fs::read(&dest)?, body);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_slow_artifact_is_download_failure() -> Result<()> {
    let mut server = Server::new_async().await;
    let _asset = server
        .mock("GET", "/test-owner/test-repo/releases/download/v2.0.4/hopper-linux-x86_64")
        .with_status(200)
        .with_chunked_body(slow_body)
        .create_async()
        .await;

    let temp_dir = TempDir::new()?;
    let dest = temp_dir.path().join(".Hopper.update-test");
    let url = format!("{}/test-owner/test-repo/releases/download/v2.0.4/hopper-linux-x86_64", server.url());
    let downloader = HttpDownloader::new(build_http_client(&config(&server))?);

    let err = downloader.download(&url, &dest).await.unwrap_err();
    assert!(matches!(err, UpdateError::DownloadVerificationFailed { .. }), "{err:?}");
    Ok(())
}
