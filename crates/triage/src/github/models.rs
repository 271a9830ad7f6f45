//! GitHub Actions API response models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One page of `GET /repos/{owner}/{repo}/actions/workflows/{id}/runs`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRunsPage {
    /// Total runs matching the query across all pages.
    pub total_count: u64,
    /// Runs on this page.
    #[serde(default)]
    pub workflow_runs: Vec<WorkflowRun>,
}

/// A workflow run, or one attempt of it.
///
/// The attempt endpoint (`.../runs/{id}/attempts/{n}`) returns the same shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRun {
    /// Run ID (shared by all attempts of the run)
    pub id: u64,
    /// Attempt ordinal, starting at 1
    #[serde(default = "default_run_attempt")]
    pub run_attempt: u32,
    /// Endpoint that redirects to the zipped logs of this attempt
    pub logs_url: String,
    /// Endpoint of the attempt before this one, if any
    #[serde(default)]
    pub previous_attempt_url: Option<String>,
    /// Web URL of the run
    #[serde(default)]
    pub html_url: String,
    /// When the run was created
    pub created_at: DateTime<Utc>,
}

fn default_run_attempt() -> u32 {
    1
}
