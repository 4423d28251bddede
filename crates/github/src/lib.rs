//! GitHub REST client for the test-run relay.
//!
//! Defines the [`GitPlatform`](platform::GitPlatform) trait (the downward
//! contract the pipeline is written against), its `reqwest`-backed
//! implementation [`GitHubClient`](client::GitHubClient), wire models, error
//! classification into the core taxonomy, and backoff/retry helpers.

pub mod backoff;
pub mod client;
pub mod error;
pub mod models;
pub mod platform;

pub use client::{GitHubClient, GitHubConfig};
pub use error::{GitHubError, Operation};
pub use platform::GitPlatform;
