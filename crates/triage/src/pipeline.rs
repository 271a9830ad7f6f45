//! Concurrent fetch-and-extract over resolved attempts.
//!
//! One task per attempt, at most `concurrency` running at once. Each task
//! downloads its archive, scans it on the blocking pool, and merges the
//! result into the shared [`AggregationState`]. A failing task is logged and
//! counted; it never stops the others.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, info_span, Instrument};

use crate::aggregate::{AggregationState, FailureGroup};
use crate::archive::fetch_archive;
use crate::config::PipelineConfig;
use crate::error::TriageError;
use crate::extractor::FailureExtractor;
use crate::github::CiProvider;
use crate::resolver::{resolve_attempts, Attempt};
use crate::retry::RetryPolicy;

/// Per-unit bookkeeping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    /// Attempts resolved from the provider
    pub resolved: usize,
    /// Attempts whose logs were scanned
    pub processed: usize,
    /// Attempts without logs
    pub skipped: usize,
    /// Attempts that failed to process
    pub failed: usize,
}

/// An attempt whose logs could not be processed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedAttempt {
    pub run_id: u64,
    pub attempt: u32,
    /// Web URL of the run, for following up by hand
    pub html_url: String,
    pub created_at: DateTime<Utc>,
    pub error: String,
}

impl FailedAttempt {
    fn new(attempt: &Attempt, error: &TriageError) -> Self {
        Self {
            run_id: attempt.run_id,
            attempt: attempt.attempt,
            html_url: attempt.html_url.clone(),
            created_at: attempt.created_at,
            error: error.to_string(),
        }
    }
}

/// Output of the worker pool.
#[derive(Debug, Clone, Default)]
pub struct PoolSummary {
    /// Unit counts
    pub stats: PipelineStats,
    /// Units that errored, ordered by run and attempt
    pub failed_attempts: Vec<FailedAttempt>,
}

/// Result of a full pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    /// Unit counts
    pub stats: PipelineStats,
    /// Ranked failures
    pub failures: Vec<FailureGroup>,
    /// Attempts that could not be processed
    pub failed_attempts: Vec<FailedAttempt>,
}

/// What one unit of work produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UnitOutcome {
    /// Logs scanned; number of distinct titles found
    Processed(usize),
    /// Provider had no logs for the attempt
    NoLogs,
}

/// Settings shared by every unit.
#[derive(Debug, Clone)]
pub struct WorkerOptions {
    /// Maximum units in flight
    pub concurrency: usize,
    /// Retry policy for downloads
    pub retry: RetryPolicy,
    /// Scanner applied to every entry
    pub extractor: Arc<FailureExtractor>,
}

impl WorkerOptions {
    /// Options derived from a pipeline configuration.
    #[must_use]
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            concurrency: config.concurrency,
            retry: config.retry_policy(),
            extractor: Arc::new(FailureExtractor::new()),
        }
    }
}

/// Fetch, scan and merge one attempt.
async fn process_attempt(
    provider: &dyn CiProvider,
    attempt: &Attempt,
    options: &WorkerOptions,
    state: &AggregationState,
) -> Result<UnitOutcome, TriageError> {
    let Some(mut archive) = fetch_archive(provider, attempt, &options.retry).await? else {
        return Ok(UnitOutcome::NoLogs);
    };

    let extractor = Arc::clone(&options.extractor);
    let extraction = tokio::task::spawn_blocking(move || archive.extract(&extractor))
        .await
        .map_err(|e| TriageError::Worker(e.to_string()))??;

    let titles = extraction.len();
    state.merge(extraction).await;
    Ok(UnitOutcome::Processed(titles))
}

/// Process every attempt with bounded parallelism.
///
/// Waits for all units before returning.
pub async fn process_attempts(
    provider: Arc<dyn CiProvider>,
    attempts: Vec<Attempt>,
    options: &WorkerOptions,
    state: &AggregationState,
) -> PoolSummary {
    let mut stats = PipelineStats {
        resolved: attempts.len(),
        ..PipelineStats::default()
    };
    let mut failed_attempts = Vec::new();
    let semaphore = Arc::new(Semaphore::new(options.concurrency.max(1)));
    let mut set = JoinSet::new();

    for attempt in attempts {
        let provider = Arc::clone(&provider);
        let semaphore = Arc::clone(&semaphore);
        let options = options.clone();
        let state = state.clone();
        let span = info_span!("attempt", run_id = attempt.run_id, attempt = attempt.attempt);

        set.spawn(
            async move {
                let result = match semaphore.acquire_owned().await {
                    Ok(_permit) => {
                        debug!("Processing attempt");
                        process_attempt(provider.as_ref(), &attempt, &options, &state).await
                    }
                    Err(e) => Err(TriageError::Worker(e.to_string())),
                };
                (attempt, result)
            }
            .instrument(span),
        );
    }

    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((attempt, Ok(UnitOutcome::Processed(titles)))) => {
                debug!(
                    run_id = attempt.run_id,
                    attempt = attempt.attempt,
                    titles,
                    "Attempt processed"
                );
                stats.processed += 1;
            }
            Ok((attempt, Ok(UnitOutcome::NoLogs))) => {
                info!(
                    run_id = attempt.run_id,
                    attempt = attempt.attempt,
                    "No logs for attempt, skipping"
                );
                stats.skipped += 1;
            }
            Ok((attempt, Err(e))) => {
                error!(
                    run_id = attempt.run_id,
                    attempt = attempt.attempt,
                    logs_url = %attempt.logs_url,
                    html_url = %attempt.html_url,
                    kind = ?e.kind(),
                    error = %e,
                    "Failed to process attempt"
                );
                failed_attempts.push(FailedAttempt::new(&attempt, &e));
                stats.failed += 1;
            }
            Err(e) => {
                error!(error = %e, "Attempt worker panicked");
                stats.failed += 1;
            }
        }
    }

    failed_attempts.sort_by_key(|f| (f.run_id, f.attempt));
    PoolSummary {
        stats,
        failed_attempts,
    }
}

/// Resolve, fetch, extract and aggregate for `config`.
///
/// # Errors
/// Returns an error only if the run listing itself fails.
pub async fn run_pipeline(
    provider: Arc<dyn CiProvider>,
    config: &PipelineConfig,
    now: DateTime<Utc>,
) -> Result<PipelineOutcome, TriageError> {
    let options = WorkerOptions::from_config(config);
    let query = config.run_query(now);

    let attempts = resolve_attempts(provider.as_ref(), &query, &options.retry).await?;

    let state = AggregationState::new();
    let PoolSummary {
        stats,
        failed_attempts,
    } = process_attempts(provider, attempts, &options, &state).await;
    let failures = state.finalize().await;

    info!(
        resolved = stats.resolved,
        processed = stats.processed,
        skipped = stats.skipped,
        failed = stats.failed,
        titles = failures.len(),
        "Pipeline finished"
    );

    Ok(PipelineOutcome {
        stats,
        failures,
        failed_attempts,
    })
}
