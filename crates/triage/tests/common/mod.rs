//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::io::{Cursor, Write};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use triage::github::{CiProvider, RunQuery, WorkflowRun, WorkflowRunsPage};
use triage::TriageError;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

pub const API: &str = "https://api.test/repos/octo/widgets/actions";

/// What the fake serves for a logs URL.
#[derive(Debug, Clone)]
pub enum Logs {
    /// A valid archive
    Zip(Vec<u8>),
    /// Expired logs
    Missing,
    /// Bytes that are not a zip
    Garbage,
    /// Fails with a transient error this many times, then serves the archive
    Flaky(u32, Vec<u8>),
    /// Always fails with a transient error
    Down,
}

/// In-memory provider.
#[derive(Default)]
pub struct FakeProvider {
    runs: Vec<WorkflowRun>,
    attempts: HashMap<String, WorkflowRun>,
    logs: HashMap<String, Logs>,
    broken_lookups: HashSet<String>,
    workflow_missing: bool,
    calls: Mutex<HashMap<String, u32>>,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a run whose latest attempt is `attempts`, with the full chain.
    pub fn with_run(mut self, run_id: u64, attempts: u32) -> Self {
        for n in 1..attempts {
            self.attempts
                .insert(attempt_url(run_id, n), workflow_run(run_id, n));
        }
        self.runs.push(workflow_run(run_id, attempts));
        self
    }

    pub fn with_logs(mut self, run_id: u64, attempt: u32, logs: Logs) -> Self {
        self.logs.insert(logs_url(run_id, attempt), logs);
        self
    }

    /// Make the lookup of `attempt` of `run_id` fail transiently forever.
    pub fn with_broken_lookup(mut self, run_id: u64, attempt: u32) -> Self {
        self.broken_lookups.insert(attempt_url(run_id, attempt));
        self
    }

    /// Drop `attempt` of `run_id` so its lookup is not found.
    pub fn without_attempt(mut self, run_id: u64, attempt: u32) -> Self {
        self.attempts.remove(&attempt_url(run_id, attempt));
        self
    }

    pub fn with_missing_workflow(mut self) -> Self {
        self.workflow_missing = true;
        self
    }

    pub fn calls(&self, url: &str) -> u32 {
        self.calls.lock().unwrap().get(url).copied().unwrap_or(0)
    }

    fn record(&self, url: &str) -> u32 {
        let mut calls = self.calls.lock().unwrap();
        let count = calls.entry(url.to_string()).or_insert(0);
        *count += 1;
        *count
    }
}

fn transient(url: &str) -> TriageError {
    TriageError::Api {
        status: 502,
        message: format!("bad gateway for {url}"),
    }
}

#[async_trait]
impl CiProvider for FakeProvider {
    async fn list_runs_page(
        &self,
        query: &RunQuery,
        page: u32,
    ) -> Result<WorkflowRunsPage, TriageError> {
        if self.workflow_missing {
            return Err(TriageError::NotFound(query.workflow.clone()));
        }
        let per_page = query.per_page as usize;
        let start = (page as usize - 1) * per_page;
        let workflow_runs = self
            .runs
            .iter()
            .skip(start)
            .take(per_page)
            .cloned()
            .collect();
        Ok(WorkflowRunsPage {
            total_count: self.runs.len() as u64,
            workflow_runs,
        })
    }

    async fn get_attempt(&self, attempt_url: &str) -> Result<WorkflowRun, TriageError> {
        self.record(attempt_url);
        if self.broken_lookups.contains(attempt_url) {
            return Err(transient(attempt_url));
        }
        self.attempts
            .get(attempt_url)
            .cloned()
            .ok_or_else(|| TriageError::NotFound(attempt_url.to_string()))
    }

    async fn download_logs(&self, logs_url: &str) -> Result<Vec<u8>, TriageError> {
        let call = self.record(logs_url);
        match self.logs.get(logs_url) {
            Some(Logs::Zip(bytes)) => Ok(bytes.clone()),
            Some(Logs::Garbage) => Ok(b"<html>not a zip</html>".to_vec()),
            Some(Logs::Flaky(failures, bytes)) if call > *failures => Ok(bytes.clone()),
            Some(Logs::Flaky(..) | Logs::Down) => Err(transient(logs_url)),
            Some(Logs::Missing) | None => Err(TriageError::NotFound(logs_url.to_string())),
        }
    }
}

pub fn attempt_url(run_id: u64, attempt: u32) -> String {
    format!("{API}/runs/{run_id}/attempts/{attempt}")
}

pub fn logs_url(run_id: u64, attempt: u32) -> String {
    format!("{API}/runs/{run_id}/attempts/{attempt}/logs")
}

pub fn workflow_run(run_id: u64, attempt: u32) -> WorkflowRun {
    WorkflowRun {
        id: run_id,
        run_attempt: attempt,
        logs_url: logs_url(run_id, attempt),
        previous_attempt_url: (attempt > 1).then(|| attempt_url(run_id, attempt - 1)),
        html_url: format!("https://github.test/octo/widgets/actions/runs/{run_id}"),
        created_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
    }
}

/// Timestamped RSpec output with a failures section.
pub fn rspec_log(failures: &[(&str, &[&str])]) -> String {
    let mut lines = vec!["Failures:".to_string(), String::new()];
    for (i, (title, details)) in failures.iter().enumerate() {
        lines.push(format!("  {}) {title}", i + 1));
        for detail in *details {
            lines.push(format!("     {detail}"));
        }
        lines.push(String::new());
    }
    lines.push("Finished in 12.3 seconds (files took 2.1 seconds to load)".to_string());
    lines.push(format!("{} examples, {} failures", 10, failures.len()));
    timestamped(&lines.iter().map(String::as_str).collect::<Vec<_>>())
}

pub fn timestamped(lines: &[&str]) -> String {
    lines
        .iter()
        .map(|l| format!("2024-05-01T12:03:04.5678901Z {l}\n"))
        .collect()
}

/// Zip with `job` at the top level and a nested per-step copy.
pub fn job_archive(job: &str) -> Vec<u8> {
    zip_entries(&[("0_test.txt", job), ("test/5_Run specs.txt", job)])
}

pub fn zip_entries(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, content) in entries {
        writer
            .start_file(*name, SimpleFileOptions::default())
            .unwrap();
        writer.write_all(content.as_bytes()).unwrap();
    }
    writer.finish().unwrap().into_inner()
}
