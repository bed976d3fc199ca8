//! Integration test suite for Hopper's update engine
//!
//! Runs the scanner, orchestrator and self-replace primitive against in-memory
//! listings and downloaders from `hopper::test_utils`, and the `hopper` binary
//! against temporary configuration files. HTTP paths run against a local mock
//! server; nothing here reaches the public network.
//!
//! ```bash
//! cargo test --test integration
//! ```
//!
//! # Test Organization
//!
//! - **scanner**: page-bounded stable scan, single-page dev scan, idempotence
//! - **orchestrator**: single-flight, validate-before-commit, end-to-end switch
//! - **self_replace**: swap failure recovery verified by content hash
//! - **cli**: command-line behaviour of the `hopper` binary, including the relaunch
//! - **http**: reqwest listing source and downloader: status codes, timeouts, headers

mod cli;
mod http;
mod orchestrator;
mod scanner;
mod self_replace;
