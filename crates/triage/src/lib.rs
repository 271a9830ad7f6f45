//! CI failure triage.
//!
//! Collects test failures from the recent runs of a GitHub Actions workflow,
//! including every retried attempt, and reports them ranked by frequency:
//!
//! - [`resolver`] lists runs in the lookback window and walks each run's
//!   attempt chain
//! - [`archive`] downloads an attempt's zipped logs into a temporary file
//! - [`extractor`] scans log text for numbered failure reports
//! - [`aggregate`] merges failures across attempts and collapses duplicates
//! - [`pipeline`] runs the per-attempt work with bounded concurrency
//! - [`report`] renders the result
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use triage::{GitHubClient, PipelineConfig};
//!
//! let config = PipelineConfig::new("octo/widgets", "ci.yml");
//! let client = Arc::new(GitHubClient::new(token)?);
//! let outcome = triage::run_pipeline(client, &config, chrono::Utc::now()).await?;
//! ```

pub mod aggregate;
pub mod archive;
pub mod config;
pub mod error;
pub mod extractor;
pub mod github;
pub mod pipeline;
pub mod report;
pub mod resolver;
pub mod retry;

pub use aggregate::{AggregationState, FailureGroup, FailureRecord, MergedDetail};
pub use config::PipelineConfig;
pub use error::{ErrorKind, TriageError};
pub use extractor::{Extraction, FailureExtractor};
pub use github::{CiProvider, GitHubClient, RunQuery, RunStatusFilter};
pub use pipeline::{run_pipeline, FailedAttempt, PipelineOutcome, PipelineStats};
pub use report::{render_json, render_text, Report};
pub use resolver::Attempt;
pub use retry::{with_retry, RetryPolicy};
