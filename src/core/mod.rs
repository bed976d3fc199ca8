//! Core types shared across Hopper.
//!
//! Currently this is the error taxonomy of the update engine and the helpers the CLI
//! uses to present errors to users.

pub mod error;

pub use error::{ErrorContext, UpdateError, user_friendly_error};
