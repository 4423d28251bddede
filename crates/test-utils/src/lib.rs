//! Shared test utilities for the relay crates.
//!
//! - [`FakePlatform`]: in-memory, content-addressed stand-in for GitHub
//!   with knobs for races, delays and injected failures
//! - fixtures for file sets and fast retry schedules

// Test support code; panicking on a poisoned lock is fine here.
#![allow(clippy::expect_used, clippy::unwrap_used)]

pub mod fake_platform;
pub mod fixtures;

pub use fake_platform::FakePlatform;
pub use fixtures::*;

/// Initialize test logging (call once per test module).
pub fn init_test_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("ghrun_pipeline=debug".parse().expect("valid directive")),
        )
        .with_test_writer()
        .try_init();
}
