//! Default file set for a bare test script.
//!
//! When a caller submits only a Selenium script, it is committed next
//! to a generated `workflow_dispatch` workflow that installs Chrome and
//! Selenium, runs the script headless, and uploads whatever the
//! script writes to `test-results/` as an artifact.

use crate::files::FileEntry;

/// Where the submitted script lands in the repository.
pub const SCRIPT_PATH: &str = "tests/test_script.py";

/// File name of the generated workflow (also its dispatch identifier).
pub const WORKFLOW_FILE: &str = "run-tests.yml";

/// Directory GitHub Actions reads workflow definitions from.
pub const WORKFLOWS_DIR: &str = ".github/workflows";

/// Name of the workflow input carrying the internal run id.
pub const RUN_ID_INPUT: &str = "run_id";

/// Name of the uploaded results artifact.
pub const RESULTS_ARTIFACT: &str = "test-results";

const WORKFLOW_YAML: &str = r#"name: Run Selenium Tests

on:
  workflow_dispatch:
    inputs:
      run_id:
        description: "Relay run identifier"
        required: false
        default: ""

jobs:
  test:
    runs-on: ubuntu-latest
    timeout-minutes: 30
    steps:
      - name: Checkout
        uses: actions/checkout@v4

      - name: Set up Python
        uses: actions/setup-python@v5
        with:
          python-version: "3.11"

      - name: Set up Chrome
        uses: browser-actions/setup-chrome@v1

      - name: Install dependencies
        run: |
          python -m pip install --upgrade pip
          pip install selenium webdriver-manager

      - name: Run test script
        env:
          RELAY_RUN_ID: ${{ inputs.run_id }}
          HEADLESS: "true"
        run: |
          mkdir -p test-results
          python tests/test_script.py 2>&1 | tee test-results/output.log

      - name: Upload results
        if: always()
        uses: actions/upload-artifact@v4
        with:
          name: test-results
          path: test-results/
          if-no-files-found: ignore
"#;

/// Repository path of the generated workflow.
pub fn workflow_path() -> String {
    format!("{WORKFLOWS_DIR}/{WORKFLOW_FILE}")
}

/// Build the file set for a bare script: the script plus the workflow.
pub fn default_files(script: &str) -> Vec<FileEntry> {
    vec![
        FileEntry::new(SCRIPT_PATH, script),
        FileEntry::new(workflow_path(), WORKFLOW_YAML),
    ]
}
