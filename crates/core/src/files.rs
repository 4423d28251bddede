//! Submitted file sets and their validation.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Upper bound on files per submission.
pub const MAX_FILES: usize = 100;

/// Upper bound on a single file's content (GitHub's blob API limit is far
/// higher, but test scripts and workflow files never need more).
pub const MAX_FILE_BYTES: usize = 5 * 1024 * 1024;

/// Git tree entry mode for a submitted file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FileMode {
    #[default]
    #[serde(rename = "100644")]
    Regular,
    #[serde(rename = "100755")]
    Executable,
}

impl FileMode {
    pub fn as_git_mode(self) -> &'static str {
        match self {
            FileMode::Regular => "100644",
            FileMode::Executable => "100755",
        }
    }
}

/// One file to be committed. Immutable once submitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Repository-relative path using `/` separators.
    pub path: String,
    pub content: String,
    #[serde(default)]
    pub mode: FileMode,
}

impl FileEntry {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
            mode: FileMode::Regular,
        }
    }

    pub fn executable(mut self) -> Self {
        self.mode = FileMode::Executable;
        self
    }
}

/// Validate a file set before any remote object is created.
///
/// Rejects empty sets, oversized sets or files, absolute paths, empty or
/// `.`/`..` segments, paths inside `.git/`, and duplicate paths.
pub fn validate_files(files: &[FileEntry]) -> Result<(), CoreError> {
    if files.is_empty() {
        return Err(CoreError::Validation(
            "At least one file is required".into(),
        ));
    }
    if files.len() > MAX_FILES {
        return Err(CoreError::Validation(format!(
            "Too many files: {} (max {MAX_FILES})",
            files.len()
        )));
    }

    let mut seen = HashSet::with_capacity(files.len());
    for file in files {
        validate_path(&file.path)?;
        if file.content.len() > MAX_FILE_BYTES {
            return Err(CoreError::Validation(format!(
                "File '{}' exceeds {MAX_FILE_BYTES} bytes",
                file.path
            )));
        }
        if !seen.insert(file.path.as_str()) {
            return Err(CoreError::Validation(format!(
                "Duplicate file path '{}'",
                file.path
            )));
        }
    }
    Ok(())
}

fn validate_path(path: &str) -> Result<(), CoreError> {
    if path.is_empty() {
        return Err(CoreError::Validation("File path must not be empty".into()));
    }
    if path.starts_with('/') || path.contains('\\') {
        return Err(CoreError::Validation(format!(
            "File path '{path}' must be relative and use '/' separators"
        )));
    }
    for segment in path.split('/') {
        if segment.is_empty() || segment == "." || segment == ".." {
            return Err(CoreError::Validation(format!(
                "File path '{path}' contains an invalid segment"
            )));
        }
    }
    if path == ".git" || path.starts_with(".git/") {
        return Err(CoreError::Validation(format!(
            "File path '{path}' may not target the .git directory"
        )));
    }
    Ok(())
}
