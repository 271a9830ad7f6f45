//! Cross-attempt aggregation and deduplication of failures.
//!
//! Workers merge their extractions into one [`AggregationState`]; once every
//! worker has finished, [`AggregationState::finalize`] collapses detail groups
//! that differ only in backtrace lines and ranks the result.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;

use crate::extractor::{DetailGroup, Extraction};

/// Prefix of backtrace frames, ignored when comparing detail groups.
const TRACE_MARKER: char = '#';

/// Every occurrence of one failure title.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FailureRecord {
    /// Number of detail groups seen
    pub count: usize,
    /// Detail groups in arrival order
    pub details: Vec<DetailGroup>,
}

/// Detail groups with identical normalized content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergedDetail {
    /// Representative lines
    pub lines: Vec<String>,
    /// Number of groups collapsed into this one
    pub occurrences: usize,
}

/// Finalized failure, ready for reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureGroup {
    /// Failure title
    pub title: String,
    /// Total occurrences across all attempts
    pub count: usize,
    /// Distinct detail bodies, most frequent first
    pub details: Vec<MergedDetail>,
}

/// Normalized form of a detail group: non-trace lines joined by newlines.
#[must_use]
pub fn normalize(group: &[String]) -> String {
    group
        .iter()
        .filter(|line| !line.trim_start().starts_with(TRACE_MARKER))
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Collapse detail groups with identical normalized content.
///
/// The representative of each bucket is its smallest original group, so the
/// result does not depend on arrival order. Buckets are sorted by descending
/// occurrences, then by normalized content.
#[must_use]
pub fn dedup_details(groups: &[DetailGroup]) -> Vec<MergedDetail> {
    let mut buckets: HashMap<String, (DetailGroup, usize)> = HashMap::new();

    for group in groups {
        let key = normalize(group);
        let bucket = buckets.entry(key).or_insert_with(|| (group.clone(), 0));
        if *group < bucket.0 {
            bucket.0.clone_from(group);
        }
        bucket.1 += 1;
    }

    let mut merged: Vec<(String, MergedDetail)> = buckets
        .into_iter()
        .map(|(key, (lines, occurrences))| (key, MergedDetail { lines, occurrences }))
        .collect();
    merged.sort_by(|(ka, a), (kb, b)| b.occurrences.cmp(&a.occurrences).then_with(|| ka.cmp(kb)));
    merged.into_iter().map(|(_, detail)| detail).collect()
}

/// Rank records: most frequent title first, ties by title.
#[must_use]
pub fn finalize_records(records: HashMap<String, FailureRecord>) -> Vec<FailureGroup> {
    let mut groups: Vec<FailureGroup> = records
        .into_iter()
        .map(|(title, record)| FailureGroup {
            details: dedup_details(&record.details),
            count: record.count,
            title,
        })
        .collect();
    groups.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.title.cmp(&b.title)));
    groups
}

/// Failure records shared by all workers.
///
/// Cloning is cheap and yields a handle to the same state.
#[derive(Debug, Clone, Default)]
pub struct AggregationState {
    records: Arc<Mutex<HashMap<String, FailureRecord>>>,
}

impl AggregationState {
    /// Empty state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one extraction in. Holds the lock for the whole extraction.
    pub async fn merge(&self, extraction: Extraction) {
        let mut records = self.records.lock().await;
        for (title, groups) in extraction {
            let record = records.entry(title).or_default();
            record.count += groups.len();
            record.details.extend(groups);
        }
    }

    /// Copy of the raw records.
    pub async fn snapshot(&self) -> HashMap<String, FailureRecord> {
        self.records.lock().await.clone()
    }

    /// Take the records out and rank them. The state is left empty.
    pub async fn finalize(&self) -> Vec<FailureGroup> {
        let records = std::mem::take(&mut *self.records.lock().await);
        finalize_records(records)
    }
}
