//! Pipeline configuration.
//!
//! Every knob has a serde default so a config file only needs the values it
//! changes. Command-line flags are applied on top in `main`.

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TriageError;
use crate::github::client::API_BASE_URL;
use crate::github::{RunQuery, RunStatusFilter};
use crate::resolver::RUNS_PER_PAGE;
use crate::retry::{RetryPolicy, DEFAULT_MAX_ATTEMPTS};

/// Configuration for one triage run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Repository to inspect (owner/repo)
    #[serde(default)]
    pub repository: String,
    /// Workflow file name (e.g., "ci.yml") or numeric ID
    #[serde(default)]
    pub workflow: String,
    /// How many days back to look for runs
    #[serde(default = "default_lookback_days")]
    pub lookback_days: u32,
    /// Which runs to include
    #[serde(default)]
    pub status: RunStatusFilter,
    /// Maximum attempts processed in parallel
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Attempts per provider call before giving up
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Backoff unit in milliseconds
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    /// GitHub API root
    #[serde(default = "default_api_url")]
    pub api_url: String,
}

fn default_lookback_days() -> u32 {
    7
}
fn default_concurrency() -> usize {
    5
}
fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}
fn default_backoff_base_ms() -> u64 {
    1000
}
fn default_api_url() -> String {
    API_BASE_URL.to_string()
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            repository: String::new(),
            workflow: String::new(),
            lookback_days: default_lookback_days(),
            status: RunStatusFilter::default(),
            concurrency: default_concurrency(),
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            api_url: default_api_url(),
        }
    }
}

impl PipelineConfig {
    /// Configuration for `repository` and `workflow` with default knobs.
    #[must_use]
    pub fn new(repository: impl Into<String>, workflow: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            workflow: workflow.into(),
            ..Self::default()
        }
    }

    /// Parse a TOML document.
    ///
    /// # Errors
    /// Returns [`TriageError::Config`] on malformed TOML.
    pub fn from_toml_str(content: &str) -> Result<Self, TriageError> {
        Ok(toml::from_str(content)?)
    }

    /// Load a TOML config file.
    ///
    /// # Errors
    /// Returns [`TriageError::Config`] if the file is unreadable or malformed.
    pub fn from_file(path: &Path) -> Result<Self, TriageError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            TriageError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    /// Check the configuration before any network work.
    ///
    /// # Errors
    /// Returns [`TriageError::Config`] describing the first problem found.
    pub fn validate(&self) -> Result<(), TriageError> {
        let valid_repository = self
            .repository
            .split_once('/')
            .is_some_and(|(owner, name)| {
                !owner.is_empty() && !name.is_empty() && !name.contains('/')
            });
        if !valid_repository {
            return Err(TriageError::Config(format!(
                "repository must be in owner/name form, got '{}'",
                self.repository
            )));
        }
        if self.workflow.trim().is_empty() {
            return Err(TriageError::Config("workflow is required".to_string()));
        }
        if self.lookback_days == 0 {
            return Err(TriageError::Config(
                "lookback_days must be at least 1".to_string(),
            ));
        }
        if self.concurrency == 0 {
            return Err(TriageError::Config(
                "concurrency must be at least 1".to_string(),
            ));
        }
        if self.max_attempts == 0 {
            return Err(TriageError::Config(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Retry policy for provider calls.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.backoff_base_ms),
        }
    }

    /// Start of the lookback window.
    #[must_use]
    pub fn window_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - chrono::Duration::days(i64::from(self.lookback_days))
    }

    /// Run listing query for the window ending at `now`.
    #[must_use]
    pub fn run_query(&self, now: DateTime<Utc>) -> RunQuery {
        RunQuery {
            repository: self.repository.clone(),
            workflow: self.workflow.clone(),
            created_since: self.window_start(now),
            status: self.status,
            per_page: RUNS_PER_PAGE,
        }
    }
}
