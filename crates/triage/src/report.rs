//! Report rendering.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::aggregate::{FailureGroup, MergedDetail};
use crate::error::TriageError;
use crate::pipeline::{FailedAttempt, PipelineStats};

/// Line printed when nothing failed.
pub const NO_FAILURES: &str = "No test failures detected.";

/// Everything the reporter needs.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    /// Repository (owner/repo)
    pub repository: String,
    /// Workflow file name or ID
    pub workflow: String,
    /// Start of the lookback window
    pub since: DateTime<Utc>,
    /// Unit counts; `stats.resolved` is the headline run count
    pub stats: PipelineStats,
    /// Ranked failures
    pub failures: Vec<FailureGroup>,
    /// Attempts whose logs could not be processed
    pub failed_attempts: Vec<FailedAttempt>,
}

/// Render the human-readable report.
///
/// ```text
/// Test failures across 12 workflow run attempts
///
/// widget renders correctly (3)
///   [2x] expected true, got false
///        # ./spec/widget_spec.rb:12
///   [1x] Timeout::Error
/// ```
#[must_use]
pub fn render_text(report: &Report) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Test failures across {} workflow run attempts",
        report.stats.resolved
    );

    if report.failures.is_empty() {
        let _ = writeln!(out, "\n{NO_FAILURES}");
    }

    for group in &report.failures {
        let _ = writeln!(out, "\n{} ({})", group.title, group.count);
        for detail in &group.details {
            render_detail(&mut out, detail);
        }
    }

    if !report.failed_attempts.is_empty() {
        let _ = writeln!(
            out,
            "\nCould not process {} attempts:",
            report.failed_attempts.len()
        );
        for failed in &report.failed_attempts {
            let _ = writeln!(
                out,
                "  run {} attempt {} ({}): {}\n    {}",
                failed.run_id,
                failed.attempt,
                failed.created_at.format("%Y-%m-%d %H:%M UTC"),
                failed.error,
                failed.html_url
            );
        }
    }

    out
}

fn render_detail(out: &mut String, detail: &MergedDetail) {
    let marker = format!("[{}x] ", detail.occurrences);
    let indent = " ".repeat(marker.len());

    let mut lines = detail.lines.iter();
    match lines.next() {
        Some(first) => {
            let _ = writeln!(out, "  {marker}{first}");
        }
        None => {
            let _ = writeln!(out, "  {}", marker.trim_end());
        }
    }
    for line in lines {
        let _ = writeln!(out, "  {indent}{line}");
    }
}

/// Render the report as pretty-printed JSON.
///
/// # Errors
/// Returns [`TriageError::Serialization`] if encoding fails.
pub fn render_json(report: &Report) -> Result<String, TriageError> {
    Ok(serde_json::to_string_pretty(report)?)
}
