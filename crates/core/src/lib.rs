//! Domain types shared by the test-run relay crates.
//!
//! Holds the run lifecycle model, submitted file sets, repository naming
//! rules, the default workflow template, and the error taxonomy every other
//! layer converts into.

pub mod error;
pub mod files;
pub mod naming;
pub mod run;
pub mod types;
pub mod workflow_template;
