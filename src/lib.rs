//! # linkprobe
//!
//! A synthetic broken-link probe. Given an origin URL it renders the page in
//! headless Chrome, extracts the outbound links and checks that each one
//! answers with an acceptable HTTP status, within configurable concurrency,
//! retry, redirect and timeout budgets. Failing (or all) links can be
//! screenshotted into a Cloud Storage bucket. Every run yields one JSON
//! result describing every link checked.
//!
//! ## Pipeline
//!
//! | Stage | Module | Notes |
//! |-------|--------|-------|
//! | Options | [`config`] | JSON with per-field defaults, validated once |
//! | Origin check | [`verifier`] | Failure ends the run with one result |
//! | Link extraction | [`links`] | CSS selector + attribute list, `FIRST_N` or `RANDOM` |
//! | Follow-link checks | [`coordinator`] | One tab per link, bounded by `concurrency` |
//! | Screenshots | [`storage`] | `<folder>/<uptime>/<execution>/<name>.png` |
//! | Aggregation | [`result`] | Origin first, then links in selection order |
//!
//! The browser, storage and environment are consumed through traits
//! ([`BrowserLauncher`], [`StorageClient`], [`Environment`]); [`chromium`] and
//! [`gcp`] provide the production bindings.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use linkprobe::{ChromeConfig, ChromiumLauncher, CheckerOptions, GcpEnvironment, LinkChecker};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let checker = LinkChecker::new(
//!         Arc::new(ChromiumLauncher::new(ChromeConfig::default())),
//!         Arc::new(GcpEnvironment::from_env()),
//!     );
//!
//!     let options = CheckerOptions {
//!         link_limit: 10,
//!         ..CheckerOptions::for_origin("https://example.com")
//!     };
//!     let output = checker.run(options).await;
//!     println!("{}", serde_json::to_string_pretty(&output)?);
//!
//!     Ok(())
//! }
//! ```
//!
//! ## CLI Usage
//!
//! ```bash
//! linkprobe check --url https://example.com --link-limit 20 --capture failing
//! linkprobe check --options probe.json --output result.json
//! linkprobe validate --options probe.json
//! ```

/// Run options and Chrome launch settings
pub mod config;

/// Error types for the browser, storage and environment layers
pub mod error;

/// Link results, structured errors and the run result
pub mod result;

/// Expected-status matching and per-link policy resolution
pub mod policy;

/// Link extraction and selection
pub mod links;

/// Browser capability traits and tab ownership
pub mod browser;

/// Chromium binding for the browser traits
pub mod chromium;

/// Execution environment capability
pub mod environment;

/// Bucket resolution and screenshot upload
pub mod storage;

/// Google Cloud bindings for storage and environment
pub mod gcp;

/// Single-link verification
pub mod verifier;

/// Concurrent follow-link verification
pub mod coordinator;

/// Run orchestration
pub mod checker;

/// Command-line interface implementation
pub mod cli;

/// Probe metrics
pub mod metrics;

/// Utility functions and helpers
pub mod utils;

#[cfg(test)]
mod test_support;


pub use browser::*;
pub use checker::*;
pub use chromium::*;
pub use cli::*;
pub use config::*;
pub use coordinator::*;
pub use environment::*;
pub use error::*;
pub use gcp::*;
pub use links::*;
pub use policy::*;
pub use result::*;
pub use storage::*;
pub use utils::*;
pub use verifier::*;
