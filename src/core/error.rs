//! Error handling for Hopper
//!
//! The update engine reports failures through a single strongly-typed enum,
//! [`UpdateError`], whose variants mirror the places an update attempt can stop:
//! scanning the release listing, resolving the platform artifact, downloading it,
//! and swapping it into place.
//!
//! CLI code works with `anyhow::Result` and converts whatever bubbles up into an
//! [`ErrorContext`] via [`user_friendly_error`], which adds details and a suggestion
//! before printing to stderr.
//!
//! # Error Categories
//!
//! - **Resolution**: [`UpdateError::NoTagsOnPage`], [`UpdateError::NoStableReleaseFound`],
//!   [`UpdateError::Network`], [`UpdateError::UnsupportedPlatform`]
//! - **Installation**: [`UpdateError::DownloadVerificationFailed`], [`UpdateError::ReplaceFailed`]
//! - **Coordination**: [`UpdateError::UpdateInProgress`], [`UpdateError::Cancelled`],
//!   [`UpdateError::FallbackFailed`]
//!
//! # Examples
//!
//! ```rust,no_run
//! use hopper::core::{UpdateError, user_friendly_error};
//!
//! let err = UpdateError::NoStableReleaseFound { pages_checked: 10 };
//! assert!(err.is_resolution_failure());
//!
//! let ctx = user_friendly_error(anyhow::Error::from(err));
//! ctx.display();
//! ```

use colored::Colorize;
use std::fmt;
use thiserror::Error;

/// The error type for every operation of the update engine.
///
/// Variants are cheap to clone so that a failed attempt can be reported both to the
/// status channel and to the caller awaiting the result.
#[derive(Error, Debug, Clone)]
pub enum UpdateError {
    /// A listing page yielded no tag links.
    ///
    /// Soft on the stable channel (the scanner moves on to the next page),
    /// fatal on the dev channel where only page 1 is consulted.
    #[error("No release tags found on listing page {page}")]
    NoTagsOnPage {
        /// 1-based page index
        page: u32,
    },

    /// Every page up to the configured bound was inspected without finding a stable tag.
    #[error("No stable releases found after checking {pages_checked} listing pages")]
    NoStableReleaseFound {
        /// Number of pages fetched before giving up
        pages_checked: u32,
    },

    /// Transport failure, timeout or non-success HTTP status while reading the listing.
    #[error("Network request to {url} failed: {reason}")]
    Network {
        /// Requested URL
        url: String,
        /// Underlying cause
        reason: String,
    },

    /// No artifact name is configured for the running platform.
    #[error("Unsupported platform: {os}/{arch} ({variant})")]
    UnsupportedPlatform {
        /// Operating system identifier
        os: String,
        /// CPU architecture identifier
        arch: String,
        /// Packaging variant
        variant: String,
    },

    /// The artifact could not be downloaded, or the download is unusable (empty,
    /// truncated or unreadable).
    #[error("Update download unusable: {reason}")]
    DownloadVerificationFailed {
        /// What was wrong with the artifact
        reason: String,
    },

    /// Swapping the new binary into place failed.
    ///
    /// Never retried automatically. `restored` reports whether the previous executable
    /// is back at its canonical path.
    #[error("Failed to replace executable: {reason}")]
    ReplaceFailed {
        /// What went wrong
        reason: String,
        /// Whether the previous executable was put back
        restored: bool,
    },

    /// Another channel switch is already running.
    #[error("An update is already in progress")]
    UpdateInProgress,

    /// A dev-channel attempt failed and the stable fallback failed too.
    #[error("Update to dev channel failed ({primary}); fallback to stable also failed ({fallback})")]
    FallbackFailed {
        /// Failure of the dev-channel attempt
        primary: Box<UpdateError>,
        /// Failure of the stable fallback attempt
        fallback: Box<UpdateError>,
    },

    /// The attempt was cancelled before the replacement started.
    #[error("Update cancelled")]
    Cancelled,

    /// Reading or writing persisted settings failed.
    #[error("Settings error: {0}")]
    Settings(String),

    /// Local filesystem failure outside of the swap itself.
    #[error("I/O error during {operation}: {reason}")]
    Io {
        /// Operation being performed
        operation: String,
        /// Underlying cause
        reason: String,
    },

    /// The background task driving an attempt died unexpectedly.
    #[error("Update task failed: {0}")]
    TaskFailed(String),
}

impl UpdateError {
    /// Build an [`UpdateError::Io`] from a [`std::io::Error`].
    pub fn io(operation: impl Into<String>, err: &std::io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            reason: err.to_string(),
        }
    }

    /// Build an [`UpdateError::Network`] for the given URL.
    pub fn network(url: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self::Network {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    /// Build an [`UpdateError::DownloadVerificationFailed`] for an artifact fetch that
    /// did not complete.
    pub fn download(url: &str, reason: impl fmt::Display) -> Self {
        Self::DownloadVerificationFailed {
            reason: format!("download of {url} failed: {reason}"),
        }
    }

    /// Whether this failure means no installable release could be found.
    ///
    /// Returns `false` for failures that happened after a release was found, so that
    /// status messages can tell "could not find an update" apart from "found an update
    /// but failed to install it".
    pub fn is_resolution_failure(&self) -> bool {
        match self {
            Self::NoTagsOnPage { .. }
            | Self::NoStableReleaseFound { .. }
            | Self::Network { .. }
            | Self::UnsupportedPlatform { .. } => true,
            Self::FallbackFailed { fallback, .. } => fallback.is_resolution_failure(),
            _ => false,
        }
    }

    /// Whether a dev-channel attempt failing with this error may fall back to stable.
    ///
    /// Replacement failures are excluded: a half-finished swap is surfaced, not retried.
    /// An unsupported platform is excluded too, since stable would resolve the same table.
    pub fn allows_fallback(&self) -> bool {
        !matches!(
            self,
            Self::ReplaceFailed { .. }
                | Self::UnsupportedPlatform { .. }
                | Self::UpdateInProgress
                | Self::Cancelled
        )
    }
}

impl From<std::io::Error> for UpdateError {
    fn from(err: std::io::Error) -> Self {
        Self::io("file operation", &err)
    }
}

/// Error wrapper carrying user-facing details and a suggestion.
///
/// Created by [`user_friendly_error`] and printed by the CLI with
/// [`ErrorContext::display`].
#[derive(Debug)]
pub struct ErrorContext {
    /// The underlying error message
    pub message: String,
    /// Optional suggestion for resolving the error
    pub suggestion: Option<String>,
    /// Optional additional details about the error
    pub details: Option<String>,
}

impl ErrorContext {
    /// Create a context with no details or suggestion.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            suggestion: None,
            details: None,
        }
    }

    /// Add a suggestion for resolving the error.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Add details explaining the error.
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Print the error to stderr with terminal colors.
    ///
    /// Error in red, details in yellow, suggestion in green.
    pub fn display(&self) {
        eprintln!("{}: {}", "error".red().bold(), self.message);

        if let Some(details) = &self.details {
            eprintln!("{}: {}", "details".yellow(), details);
        }

        if let Some(suggestion) = &self.suggestion {
            eprintln!("{}: {}", "suggestion".green(), suggestion);
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;

        if let Some(details) = &self.details {
            write!(f, "\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}

/// Convert any error into an [`ErrorContext`] with suggestions.
///
/// Walks the `anyhow` chain looking for an [`UpdateError`]; falls back to I/O and TOML
/// errors, and finally to the plain message.
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    for cause in error.chain() {
        if let Some(update_error) = cause.downcast_ref::<UpdateError>() {
            return create_error_context(update_error);
        }
    }

    if let Some(io_error) = error.downcast_ref::<std::io::Error>() {
        if io_error.kind() == std::io::ErrorKind::PermissionDenied {
            return ErrorContext::new(error.to_string()).with_suggestion(
                "Check that the launcher directory is writable by the current user",
            );
        }
    }

    if let Some(toml_error) = error.downcast_ref::<toml::de::Error>() {
        return ErrorContext::new(format!("Invalid configuration file: {toml_error}"))
            .with_suggestion("Fix the TOML syntax or delete the file to restore defaults");
    }

    ErrorContext::new(format!("{error:#}"))
}

fn create_error_context(error: &UpdateError) -> ErrorContext {
    let ctx = ErrorContext::new(error.to_string());
    match error {
        UpdateError::NoTagsOnPage { .. } | UpdateError::Network { .. } => ctx
            .with_details("Could not find an update: the release listing was unreachable or unreadable")
            .with_suggestion("Check your internet connection and try again"),
        UpdateError::NoStableReleaseFound { .. } => ctx
            .with_details("Could not find an update: only pre-release builds are listed")
            .with_suggestion("Increase --max-pages or stay on the dev channel"),
        UpdateError::UnsupportedPlatform { .. } => ctx
            .with_details("No release artifact is published for this operating system and architecture"),
        UpdateError::DownloadVerificationFailed { .. } => ctx
            .with_details("Found an update but the download failed or was unusable; nothing was changed")
            .with_suggestion("Try again later"),
        UpdateError::ReplaceFailed { restored, .. } => {
            let details = if *restored {
                "Found an update but failed to install it; the previous version was restored"
            } else {
                "Found an update but failed to install it; the executable may need manual recovery"
            };
            ctx.with_details(details).with_suggestion(
                "Check permissions on the launcher directory, or reinstall the launcher manually",
            )
        }
        UpdateError::UpdateInProgress => {
            ctx.with_suggestion("Wait for the running update to finish before switching again")
        }
        UpdateError::FallbackFailed { .. } => ctx
            .with_details("Your previous version and settings were left untouched")
            .with_suggestion("Check your internet connection and try again"),
        _ => ctx,
    }
}
