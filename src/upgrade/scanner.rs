//! Channel-aware scan of the paginated release listing.
//!
//! Pages are fetched strictly in order and each one is fully judged before the next is
//! requested:
//!
//! - **Dev**: page 1 only. The first explicit dev build wins; failing that, the first
//!   tag on the page. No tags on page 1 is fatal.
//! - **Stable**: pages `1..=max_pages`. The first stable tag in page order on the first
//!   page that has one wins. Empty, unreadable or unreachable pages are skipped.
//!
//! Tags are never sorted by version: listings are newest-first and the topmost stable
//! entry is taken as-is.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::core::UpdateError;
use crate::upgrade::config::UpgradeConfig;
use crate::upgrade::listing::{HttpListingSource, ListingScope, ListingSource};
use crate::upgrade::tag::{Channel, ReleaseTag};

/// Default bound on pages inspected by a stable scan.
pub const DEFAULT_MAX_PAGES: u32 = 10;

/// Outcome of a successful scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanResult {
    /// Tag selected for the channel
    pub tag: ReleaseTag,
    /// Number of listing pages fetched to find it
    pub pages_checked: u32,
}

/// Walks a [`ListingSource`] to find the release a channel should install.
pub struct ReleaseScanner {
    source: Arc<dyn ListingSource>,
    scope: ListingScope,
    max_pages: u32,
}

impl ReleaseScanner {
    /// Scanner over `source`, extracting tags linked within `scope`.
    pub fn new(source: Arc<dyn ListingSource>, scope: ListingScope) -> Self {
        Self {
            source,
            scope,
            max_pages: DEFAULT_MAX_PAGES,
        }
    }

    /// Scanner reading the live listing described by `config` through `client`.
    pub fn over_http(config: &UpgradeConfig, client: reqwest::Client) -> anyhow::Result<Self> {
        let scope = ListingScope::from_config(config)?;
        let source = Arc::new(HttpListingSource::new(client, scope.clone()));
        Ok(Self::new(source, scope).with_max_pages(config.max_pages))
    }

    /// Set the page bound for stable scans. Values below 1 are raised to 1.
    pub fn with_max_pages(mut self, max_pages: u32) -> Self {
        self.max_pages = max_pages.max(1);
        self
    }

    /// The page bound for stable scans.
    pub fn max_pages(&self) -> u32 {
        self.max_pages
    }

    /// Find the release `channel` should install.
    ///
    /// # Errors
    ///
    /// - Dev: [`UpdateError::NoTagsOnPage`] or [`UpdateError::Network`] from page 1
    /// - Stable: [`UpdateError::NoStableReleaseFound`] once `max_pages` pages were
    ///   inspected without a stable tag
    pub async fn scan(&self, channel: Channel) -> Result<ScanResult, UpdateError> {
        match channel {
            Channel::Dev => self.scan_dev().await,
            Channel::Stable => self.scan_stable().await,
        }
    }

    async fn scan_dev(&self) -> Result<ScanResult, UpdateError> {
        let body = self.source.fetch_page(1).await?;
        let tags = self.scope.extract_tags(1, &body)?;

        let tag = tags
            .iter()
            .find(|tag| tag.is_dev_build())
            .or_else(|| {
                debug!("No explicit dev build on page 1, using most recent entry");
                tags.first()
            })
            .cloned()
            .ok_or(UpdateError::NoTagsOnPage { page: 1 })?;

        info!("Resolved dev channel release {}", tag);
        Ok(ScanResult {
            tag,
            pages_checked: 1,
        })
    }

    async fn scan_stable(&self) -> Result<ScanResult, UpdateError> {
        for page in 1..=self.max_pages {
            let tags = match self.page_tags(page).await {
                Ok(tags) => tags,
                Err(e) => {
                    warn!("Skipping listing page {}: {}", page, e);
                    continue;
                }
            };

            if let Some(stable) = tags.into_iter().find(|tag| !tag.is_prerelease()) {
                info!("Resolved stable channel release {} on page {}", stable, page);
                return Ok(ScanResult {
                    tag: stable,
                    pages_checked: page,
                });
            }

            debug!("Listing page {} holds only pre-releases", page);
        }

        Err(UpdateError::NoStableReleaseFound {
            pages_checked: self.max_pages,
        })
    }

    async fn page_tags(&self, page: u32) -> Result<Vec<ReleaseTag>, UpdateError> {
        let body = self.source.fetch_page(page).await?;
        self.scope.extract_tags(page, &body)
    }
}
