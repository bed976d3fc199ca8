//! Release tags, update channels and the pre-release classifier.
//!
//! Tags are opaque strings scraped from the release listing (`v3.2.29`,
//! `v3.2.30-dev.adcb1ae`, `v3.2.27+build.456`). Nothing about their structure is
//! guaranteed, so every accessor here degrades gracefully on malformed input.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Substrings that mark a tag as a pre-release, matched case-insensitively anywhere in the tag.
pub const PRERELEASE_INDICATORS: &[&str] = &["-dev", "-beta", "-rc", "-alpha", "-pre"];

/// Decide whether a tag denotes a pre-release build.
///
/// The tag is lower-cased and searched for any of [`PRERELEASE_INDICATORS`]. Any string,
/// including the empty string, is valid input.
///
/// # Examples
///
/// ```rust
/// use hopper::upgrade::tag::is_prerelease;
///
/// assert!(is_prerelease("v3.2.30-dev.adcb1ae"));
/// assert!(is_prerelease("v3.2.22-Beta.1"));
/// assert!(!is_prerelease("v3.2.29"));
/// assert!(!is_prerelease("v3.2.27+build.456"));
/// assert!(!is_prerelease(""));
/// ```
pub fn is_prerelease(tag: &str) -> bool {
    let tag = tag.to_lowercase();
    PRERELEASE_INDICATORS.iter().any(|indicator| tag.contains(indicator))
}

/// Whether a tag is an explicit dev build (`-dev.` or `-dev-`, case-insensitive).
///
/// Narrower than [`is_prerelease`]: the dev channel prefers these over betas and
/// release candidates listed on the same page.
pub fn is_dev_build(tag: &str) -> bool {
    let tag = tag.to_lowercase();
    tag.contains("-dev.") || tag.contains("-dev-")
}

/// User-selected update track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    /// Official releases only.
    #[default]
    Stable,
    /// Most recent build, including pre-releases.
    Dev,
}

impl Channel {
    /// Lower-case name used in settings files and on the command line.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stable => "stable",
            Self::Dev => "dev",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "stable" => Ok(Self::Stable),
            "dev" => Ok(Self::Dev),
            other => Err(format!("unknown channel '{other}' (expected 'stable' or 'dev')")),
        }
    }
}

/// An immutable release tag observed on a listing page.
///
/// The classification is computed once at construction. [`ReleaseTag::base_version`]
/// and [`ReleaseTag::build_metadata`] are derived views over the raw string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct ReleaseTag {
    raw: String,
    prerelease: bool,
}

impl ReleaseTag {
    /// Wrap a raw tag string.
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let prerelease = is_prerelease(&raw);
        Self { raw, prerelease }
    }

    /// The tag exactly as it appeared in the listing.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Whether the classifier marks this tag as a pre-release.
    pub fn is_prerelease(&self) -> bool {
        self.prerelease
    }

    /// Whether this is an explicit dev build.
    pub fn is_dev_build(&self) -> bool {
        is_dev_build(&self.raw)
    }

    /// Version core with the leading `v` and any `-`/`+` suffix removed.
    ///
    /// `v3.2.30-dev.adcb1ae` becomes `3.2.30`; `v3.2.27+build.456` becomes `3.2.27`.
    pub fn base_version(&self) -> &str {
        let trimmed = self.raw.trim();
        let trimmed = trimmed
            .strip_prefix('v')
            .or_else(|| trimmed.strip_prefix('V'))
            .unwrap_or(trimmed);
        match trimmed.find(['-', '+']) {
            Some(idx) => &trimmed[..idx],
            None => trimmed,
        }
    }

    /// Build metadata after `+`, if any.
    pub fn build_metadata(&self) -> Option<&str> {
        self.raw.split_once('+').map(|(_, meta)| meta).filter(|meta| !meta.is_empty())
    }

    /// Compare base versions numerically as `major.minor.patch`.
    ///
    /// Missing or non-numeric components count as zero, so the comparison never fails.
    /// Pre-release and build suffixes are ignored.
    pub fn compare_base(&self, other: &Self) -> Ordering {
        base_triple(self.base_version()).cmp(&base_triple(other.base_version()))
    }
}

fn base_triple(base: &str) -> (u64, u64, u64) {
    if let Ok(version) = semver::Version::parse(base) {
        return (version.major, version.minor, version.patch);
    }
    let mut parts = base.split('.').map(|part| part.parse::<u64>().unwrap_or(0));
    (
        parts.next().unwrap_or(0),
        parts.next().unwrap_or(0),
        parts.next().unwrap_or(0),
    )
}

impl fmt::Display for ReleaseTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl From<String> for ReleaseTag {
    fn from(raw: String) -> Self {
        Self::new(raw)
    }
}

impl From<&str> for ReleaseTag {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<ReleaseTag> for String {
    fn from(tag: ReleaseTag) -> Self {
        tag.raw
    }
}

impl PartialEq<&str> for ReleaseTag {
    fn eq(&self, other: &&str) -> bool {
        self.raw == *other
    }
}
