//! Hopper launcher: release resolution and self-update.
//!
//! Hopper follows one of two release channels. The stable channel installs the newest
//! release that is not a pre-release; the dev channel installs the newest dev build.
//! Releases are discovered by scraping the repository's paginated release listing, and
//! the launcher replaces its own executable and restarts into the new build.
//!
//! # Modules
//!
//! - [`upgrade`]: tag classification, listing scan, asset resolution, the channel-switch
//!   state machine and executable replacement
//! - [`config`]: the global configuration file and the settings store over it
//! - [`core`]: error types and user-facing error formatting
//! - [`cli`]: the `hopper` command line
//!
//! # Example
//!
//! ```rust,no_run
//! use hopper::config::{FileSettings, GlobalConfig};
//! use hopper::upgrade::{Channel, UpdateOrchestrator};
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = GlobalConfig::load().await?;
//! let settings = Arc::new(FileSettings::at_default_path()?);
//! let orchestrator = Arc::new(UpdateOrchestrator::from_config(&config.upgrade, settings)?);
//!
//! let ticket = orchestrator.request_channel_switch(Channel::Stable)?;
//! let outcome = ticket.wait().await?;
//! println!("installed {}", outcome.tag);
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod upgrade;

// test_utils module is available for both unit tests and integration tests
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
