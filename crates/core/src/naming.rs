//! Repository naming rules.

use crate::error::CoreError;

/// Prefix for repositories derived from a test name.
pub const REPO_NAME_PREFIX: &str = "selenium-test-";

/// GitHub's maximum repository name length.
pub const MAX_REPO_NAME_LEN: usize = 100;

/// Normalise a requested repository name.
///
/// Characters outside `[A-Za-z0-9._-]` become `-`, runs of `-` collapse,
/// and leading/trailing `-` or `.` are stripped. Fails if nothing usable
/// remains.
pub fn sanitize_repo_name(raw: &str) -> Result<String, CoreError> {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.trim().chars() {
        let ch = if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '-') {
            ch
        } else {
            '-'
        };
        if ch == '-' && out.ends_with('-') {
            continue;
        }
        out.push(ch);
    }

    let trimmed: String = out
        .trim_matches(|c| c == '-' || c == '.')
        .chars()
        .take(MAX_REPO_NAME_LEN)
        .collect();
    let trimmed = trimmed.trim_end_matches(|c| c == '-' || c == '.').to_string();

    if trimmed.is_empty() {
        return Err(CoreError::Validation(format!(
            "Repository name '{raw}' has no usable characters"
        )));
    }
    Ok(trimmed)
}

/// Derive the repository name for a test from its name.
pub fn repo_name_for_test(test_name: &str) -> Result<String, CoreError> {
    sanitize_repo_name(&format!("{REPO_NAME_PREFIX}{test_name}"))
}
