//! GitHub Actions access.
//!
//! The pipeline talks to the provider only through [`CiProvider`], so tests
//! can substitute an in-memory implementation.

pub mod client;
pub mod models;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TriageError;

pub use client::GitHubClient;
pub use models::{WorkflowRun, WorkflowRunsPage};

/// Which runs to list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RunStatusFilter {
    /// Only runs that concluded with `failure`
    #[default]
    Failure,
    /// Every run in the window
    All,
}

impl RunStatusFilter {
    /// Value for the `status` query parameter, if any.
    #[must_use]
    pub fn as_query(self) -> Option<&'static str> {
        match self {
            Self::Failure => Some("failure"),
            Self::All => None,
        }
    }
}

/// Parameters for listing workflow runs.
#[derive(Debug, Clone)]
pub struct RunQuery {
    /// Repository (owner/repo)
    pub repository: String,
    /// Workflow file name or numeric ID
    pub workflow: String,
    /// Only runs created at or after this instant
    pub created_since: DateTime<Utc>,
    /// Status filter
    pub status: RunStatusFilter,
    /// Page size
    pub per_page: u32,
}

/// The three provider calls the pipeline needs.
#[async_trait]
pub trait CiProvider: Send + Sync {
    /// Fetch one page (1-based) of workflow runs.
    async fn list_runs_page(
        &self,
        query: &RunQuery,
        page: u32,
    ) -> Result<WorkflowRunsPage, TriageError>;

    /// Resolve a run attempt from its API URL.
    async fn get_attempt(&self, attempt_url: &str) -> Result<WorkflowRun, TriageError>;

    /// Download the zipped logs behind `logs_url`.
    ///
    /// Expired or unavailable logs are reported as [`TriageError::NotFound`].
    async fn download_logs(&self, logs_url: &str) -> Result<Vec<u8>, TriageError>;
}
