//! Canned inputs for tests.

use std::time::Duration;

use ghrun_core::files::FileEntry;
use ghrun_core::workflow_template::default_files;
use ghrun_github::backoff::BackoffConfig;

/// A script that passes when run under the bundled workflow.
pub const PASSING_SCRIPT: &str = r#"from selenium import webdriver

driver = webdriver.Chrome()
driver.get("https://example.com")
assert "Example" in driver.title
driver.quit()
"#;

/// Script plus bundled workflow.
pub fn script_files() -> Vec<FileEntry> {
    default_files(PASSING_SCRIPT)
}

/// Two plain files with no workflow; dispatch against a workflow already
/// in the repository.
pub fn plain_files() -> Vec<FileEntry> {
    vec![
        FileEntry::new("tests/test_login.py", "def test_login():\n    assert True\n"),
        FileEntry::new("tests/conftest.py", "import pytest\n"),
    ]
}

/// Millisecond-scale schedule so retry and polling tests stay fast.
pub fn fast_backoff(max_attempts: u32) -> BackoffConfig {
    BackoffConfig::fixed(Duration::from_millis(2), max_attempts)
}
