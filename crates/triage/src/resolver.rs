//! Resolves workflow runs into the individual attempts to inspect.
//!
//! Re-run jobs keep their run ID and bump `run_attempt`; older attempts are
//! only reachable through the `previous_attempt_url` chain.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::TriageError;
use crate::github::{CiProvider, RunQuery, WorkflowRun};
use crate::retry::{with_retry, RetryPolicy};

/// Page size for run listings (GitHub maximum).
pub const RUNS_PER_PAGE: u32 = 100;

/// GitHub stops paginating search-backed listings after 1000 results.
const MAX_PAGES: u32 = 10;

/// One execution of a workflow run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Attempt {
    /// Run ID
    pub run_id: u64,
    /// Attempt ordinal (1-based)
    pub attempt: u32,
    /// Log archive locator
    pub logs_url: String,
    /// Locator of the preceding attempt of the same run
    pub previous_attempt_url: Option<String>,
    /// Web URL of the run
    pub html_url: String,
    /// When the attempt's run was created
    pub created_at: DateTime<Utc>,
}

impl From<&WorkflowRun> for Attempt {
    fn from(run: &WorkflowRun) -> Self {
        Self {
            run_id: run.id,
            attempt: run.run_attempt,
            logs_url: run.logs_url.clone(),
            previous_attempt_url: run.previous_attempt_url.clone(),
            html_url: run.html_url.clone(),
            created_at: run.created_at,
        }
    }
}

/// List every run matching `query`, following pagination.
///
/// # Errors
/// Returns [`TriageError::Config`] when the repository or workflow does not
/// exist, or the provider error once retries are exhausted.
pub async fn list_runs(
    provider: &dyn CiProvider,
    query: &RunQuery,
    policy: &RetryPolicy,
) -> Result<Vec<WorkflowRun>, TriageError> {
    let mut runs = Vec::new();

    for page in 1..=MAX_PAGES {
        let Some(batch) = with_retry(policy, "list workflow runs", || {
            provider.list_runs_page(query, page)
        })
        .await?
        else {
            return Err(TriageError::Config(format!(
                "workflow '{}' not found in {}",
                query.workflow, query.repository
            )));
        };

        let fetched = batch.workflow_runs.len();
        runs.extend(batch.workflow_runs);
        debug!(page, fetched, total = batch.total_count, "Fetched runs page");

        if fetched < query.per_page as usize || runs.len() as u64 >= batch.total_count {
            break;
        }
    }

    Ok(runs)
}

/// Walk the attempt chain of one run, newest first.
///
/// # Errors
/// Returns the provider error if a lookup keeps failing after retries.
pub async fn resolve_run_attempts(
    provider: &dyn CiProvider,
    run: &WorkflowRun,
    policy: &RetryPolicy,
) -> Result<Vec<Attempt>, TriageError> {
    let mut attempts = vec![Attempt::from(run)];
    let mut seen: HashSet<String> = HashSet::new();
    let mut next = run.previous_attempt_url.clone();

    while let Some(url) = next.take() {
        if !seen.insert(url.clone()) {
            warn!(run_id = run.id, url = %url, "Attempt chain loops, stopping");
            break;
        }

        let Some(previous) =
            with_retry(policy, "resolve previous attempt", || provider.get_attempt(&url)).await?
        else {
            debug!(run_id = run.id, url = %url, "Previous attempt not found");
            break;
        };

        next.clone_from(&previous.previous_attempt_url);
        attempts.push(Attempt::from(&previous));
    }

    Ok(attempts)
}

/// Resolve every attempt of every run matching `query`.
///
/// A run whose chain cannot be resolved is logged and skipped.
///
/// # Errors
/// Only listing failures are returned.
pub async fn resolve_attempts(
    provider: &dyn CiProvider,
    query: &RunQuery,
    policy: &RetryPolicy,
) -> Result<Vec<Attempt>, TriageError> {
    let runs = list_runs(provider, query, policy).await?;
    info!(
        runs = runs.len(),
        repository = %query.repository,
        workflow = %query.workflow,
        "Found workflow runs"
    );

    let mut attempts = Vec::new();
    for run in &runs {
        match resolve_run_attempts(provider, run, policy).await {
            Ok(found) => attempts.extend(found),
            Err(e) => {
                warn!(run_id = run.id, error = %e, "Failed to resolve run attempts, skipping run");
            }
        }
    }

    info!(attempts = attempts.len(), "Resolved run attempts");
    Ok(attempts)
}
