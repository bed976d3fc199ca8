//! Paginated release listing: fetching pages and extracting tags from them.
//!
//! The listing is HTML meant for browsers, not an API. Each page is treated as opaque
//! text and searched for a single documented link shape,
//! `/{owner}/{repo}/releases/tag/<TAG>`. Anything else on the page is ignored, and a
//! page without such links is reported as [`UpdateError::NoTagsOnPage`] instead of
//! a parse failure.

use async_trait::async_trait;
use regex::Regex;
use std::time::Duration;
use tracing::debug;

use crate::core::UpdateError;
use crate::upgrade::config::UpgradeConfig;
use crate::upgrade::tag::ReleaseTag;

/// Host of the release listing unless configured otherwise.
pub const DEFAULT_BASE_URL: &str = "https://github.com";

/// Source of listing pages, indexed from 1.
///
/// Implementations must apply their own timeout; a timed-out fetch is reported as
/// [`UpdateError::Network`].
#[async_trait]
pub trait ListingSource: Send + Sync {
    /// Fetch the raw text of one listing page.
    async fn fetch_page(&self, page: u32) -> Result<String, UpdateError>;
}

/// Repository whose listing is scanned, and the tag-link pattern scoped to it.
#[derive(Debug, Clone)]
pub struct ListingScope {
    base_url: String,
    owner: String,
    repo: String,
    tag_link: Regex,
}

impl ListingScope {
    /// Build the scope for `owner/repo`.
    ///
    /// # Errors
    ///
    /// Fails only if the compiled pattern exceeds the regex size limit.
    pub fn new(owner: &str, repo: &str) -> anyhow::Result<Self> {
        let pattern = format!(
            r#"/{}/{}/releases/tag/([^"'<>\s?#]+)"#,
            regex::escape(owner),
            regex::escape(repo)
        );
        let tag_link = Regex::new(&pattern)?;
        Ok(Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            owner: owner.to_string(),
            repo: repo.to_string(),
            tag_link,
        })
    }

    /// Scope described by an [`UpgradeConfig`].
    pub fn from_config(config: &UpgradeConfig) -> anyhow::Result<Self> {
        Ok(Self::new(&config.owner, &config.repo)?.with_base_url(&config.base_url))
    }

    /// Fetch pages from `base_url` instead of github.com. A trailing slash is ignored.
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Repository owner.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Repository name.
    pub fn repo(&self) -> &str {
        &self.repo
    }

    /// URL of listing page `page`.
    pub fn page_url(&self, page: u32) -> String {
        format!("{}/{}/{}/releases?page={page}", self.base_url, self.owner, self.repo)
    }

    /// Extract every tag linked from `body`, in page order, without duplicates.
    ///
    /// A release usually links its tag more than once; only the first occurrence counts.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError::NoTagsOnPage`] when the body holds no tag links, which
    /// includes empty and non-HTML bodies.
    pub fn extract_tags(&self, page: u32, body: &str) -> Result<Vec<ReleaseTag>, UpdateError> {
        let mut tags: Vec<ReleaseTag> = Vec::new();
        for captures in self.tag_link.captures_iter(body) {
            let Some(raw) = captures.get(1) else {
                continue;
            };
            if tags.iter().any(|seen| seen.as_str() == raw.as_str()) {
                continue;
            }
            tags.push(ReleaseTag::new(raw.as_str()));
        }

        if tags.is_empty() {
            Err(UpdateError::NoTagsOnPage { page })
        } else {
            debug!("Listing page {} yielded {} tags", page, tags.len());
            Ok(tags)
        }
    }
}

/// [`ListingSource`] that fetches pages over HTTPS with `reqwest`.
pub struct HttpListingSource {
    client: reqwest::Client,
    scope: ListingScope,
}

impl HttpListingSource {
    /// Create a source for `scope` using the given client.
    ///
    /// The client is expected to carry the request timeout; see [`build_http_client`].
    pub fn new(client: reqwest::Client, scope: ListingScope) -> Self {
        Self { client, scope }
    }
}

#[async_trait]
impl ListingSource for HttpListingSource {
    async fn fetch_page(&self, page: u32) -> Result<String, UpdateError> {
        let url = self.scope.page_url(page);
        debug!("Fetching release listing page {}: {}", page, url);

        let response = self
            .client
            .get(&url)
            .header(reqwest::header::CACHE_CONTROL, "no-cache")
            .header(reqwest::header::PRAGMA, "no-cache")
            .send()
            .await
            .map_err(|e| UpdateError::network(&url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpdateError::network(&url, format!("HTTP {status}")));
        }

        response.text().await.map_err(|e| UpdateError::network(&url, e))
    }
}

/// Build the HTTP client shared by listing fetches and downloads.
///
/// # Errors
///
/// Fails only if the TLS backend cannot be initialised.
pub fn build_http_client(config: &UpgradeConfig) -> anyhow::Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .user_agent(&config.user_agent)
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?;
    Ok(client)
}
