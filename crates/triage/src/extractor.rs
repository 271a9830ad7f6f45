//! Failure extraction from test-runner log output.
//!
//! Reconstructs RSpec-style failure reports from raw job logs:
//!
//! ```text
//! 2024-05-01T12:00:00.1234567Z Failures:
//! 2024-05-01T12:00:00.1234567Z
//! 2024-05-01T12:00:00.1234567Z   1) Widget renders correctly
//! 2024-05-01T12:00:00.1234567Z      Failure/Error: expect(widget).to be_visible
//! 2024-05-01T12:00:00.1234567Z        expected true, got false
//! 2024-05-01T12:00:00.1234567Z      # ./spec/widget_spec.rb:12:in `block (2 levels)'
//! 2024-05-01T12:00:00.1234567Z
//! 2024-05-01T12:00:00.1234567Z Finished in 3 minutes 2 seconds
//! ```
//!
//! The scanner is a small state machine over lines. Pending examples are
//! numbered the same way as failures, so everything between the pending
//! banner and the failures banner is ignored.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

/// Banner that opens the pending-examples section.
pub const PENDING_BANNER: &str = "Pending:";

/// Banner that opens the failures section.
pub const FAILURES_BANNER: &str = "Failures:";

/// Summary marker after which nothing is captured.
pub const FINISHED_MARKER: &str = "Finished in";

/// Provider timestamp prefixed to every log line.
static TIMESTAMP_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(?:\.\d+)?Z ?").expect("valid regex")
});

/// `  12) description`
static FAILURE_START: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*\d+\) (.*)$").expect("valid regex"));

/// Lines describing one occurrence of a failure.
pub type DetailGroup = Vec<String>;

/// Predicate deciding whether a detail line is noise.
///
/// Receives the line with leading and trailing whitespace removed.
pub type NoisePredicate = fn(&str) -> bool;

/// Scanner state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    /// Between sections; waiting for a banner or a failure.
    Outside,
    /// Inside the pending section; nothing is captured.
    InPending,
    /// Collecting detail lines for the current failure.
    InFailureDetails,
}

/// Failures found in one log entry, keyed by title.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extraction {
    /// Titles in the order they were first seen.
    order: Vec<String>,
    groups: HashMap<String, Vec<DetailGroup>>,
}

impl Extraction {
    /// Register a title without adding details.
    fn touch(&mut self, title: &str) {
        if !self.groups.contains_key(title) {
            self.order.push(title.to_string());
            self.groups.insert(title.to_string(), Vec::new());
        }
    }

    /// Append a completed detail group to `title`.
    pub fn push(&mut self, title: &str, group: DetailGroup) {
        self.touch(title);
        if let Some(groups) = self.groups.get_mut(title) {
            groups.push(group);
        }
    }

    /// Number of distinct titles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether no failure was seen.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Detail groups recorded for `title`.
    #[must_use]
    pub fn get(&self, title: &str) -> Option<&[DetailGroup]> {
        self.groups.get(title).map(Vec::as_slice)
    }

    /// Titles in first-seen order.
    pub fn titles(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    /// Fold another extraction into this one.
    pub fn extend(&mut self, other: Extraction) {
        for (title, groups) in other {
            self.touch(&title);
            if let Some(existing) = self.groups.get_mut(&title) {
                existing.extend(groups);
            }
        }
    }
}

impl IntoIterator for Extraction {
    type Item = (String, Vec<DetailGroup>);
    type IntoIter = std::vec::IntoIter<(String, Vec<DetailGroup>)>;

    fn into_iter(mut self) -> Self::IntoIter {
        self.order
            .into_iter()
            .map(|title| {
                let groups = self.groups.remove(&title).unwrap_or_default();
                (title, groups)
            })
            .collect::<Vec<_>>()
            .into_iter()
    }
}

/// Strip the byte-order mark, the provider timestamp and trailing whitespace.
#[must_use]
pub fn clean_line(raw: &str) -> &str {
    let line = raw.trim_start_matches('\u{feff}').trim_end();
    match TIMESTAMP_PREFIX.find(line) {
        Some(m) => &line[m.end()..],
        None => line,
    }
}

/// Title of a failure-start line, if `line` is one.
#[must_use]
pub fn failure_title(line: &str) -> Option<&str> {
    FAILURE_START
        .captures(line)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
}

/// `Pending: (Failures listed here are expected ...)`
#[must_use]
pub fn is_pending_banner(line: &str) -> bool {
    line.trim_start().starts_with(PENDING_BANNER)
}

/// Exactly `Failures:`.
#[must_use]
pub fn is_failures_banner(line: &str) -> bool {
    line.trim() == FAILURES_BANNER
}

/// `Finished in 1 minute 3 seconds (files took ...)`
#[must_use]
pub fn is_finished_marker(line: &str) -> bool {
    line.trim_start().starts_with(FINISHED_MARKER)
}

/// Blank line.
#[must_use]
pub fn is_blank(line: &str) -> bool {
    line.is_empty()
}

/// Backtrace frame inside installed gems, with or without the `#` marker.
#[must_use]
pub fn is_vendor_frame(line: &str) -> bool {
    let path = frame_path(line);
    path.starts_with("./vendor/")
        || path.starts_with("vendor/")
        || path.contains("/vendor/bundle/")
}

/// Backtrace frame inside the runner's toolchain cache.
#[must_use]
pub fn is_toolchain_frame(line: &str) -> bool {
    frame_path(line).contains("/hostedtoolcache/")
}

/// `[Screenshot Image]: /tmp/capybara/...png`
#[must_use]
pub fn is_screenshot_reference(line: &str) -> bool {
    line.starts_with("[Screenshot")
}

/// Frame whose location could not be resolved.
#[must_use]
pub fn is_unknown_placeholder(line: &str) -> bool {
    line.ends_with("<unknown>") || line.ends_with("<unknown>'")
}

/// Location of a backtrace frame, `# path:line` or bare `path:line`.
fn frame_path(line: &str) -> &str {
    line.strip_prefix('#').map_or(line, str::trim_start)
}

/// Noise predicates applied by [`FailureExtractor::default`].
pub const DEFAULT_NOISE: &[NoisePredicate] = &[
    is_blank,
    is_vendor_frame,
    is_toolchain_frame,
    is_screenshot_reference,
    is_unknown_placeholder,
];

/// Single-pass failure scanner.
#[derive(Debug, Clone)]
pub struct FailureExtractor {
    noise: Vec<NoisePredicate>,
}

impl Default for FailureExtractor {
    fn default() -> Self {
        Self {
            noise: DEFAULT_NOISE.to_vec(),
        }
    }
}

impl FailureExtractor {
    /// Extractor with the default noise predicates.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Extractor that keeps every detail line except blanks.
    #[must_use]
    pub fn without_noise_filters() -> Self {
        Self {
            noise: vec![is_blank],
        }
    }

    /// Add a noise predicate.
    #[must_use]
    pub fn with_noise_predicate(mut self, predicate: NoisePredicate) -> Self {
        self.noise.push(predicate);
        self
    }

    /// Whether a detail line should be dropped.
    fn is_noise(&self, line: &str) -> bool {
        self.noise.iter().any(|predicate| predicate(line))
    }

    /// Scan one log entry.
    #[must_use]
    pub fn extract(&self, text: &str) -> Extraction {
        let mut scan = Scan::new(self);
        for raw in text.lines() {
            if !scan.feed(clean_line(raw)) {
                break;
            }
        }
        scan.finish()
    }
}

/// In-progress scan over one entry.
struct Scan<'a> {
    extractor: &'a FailureExtractor,
    state: ScanState,
    current_title: Option<String>,
    current_group: DetailGroup,
    out: Extraction,
}

impl<'a> Scan<'a> {
    fn new(extractor: &'a FailureExtractor) -> Self {
        Self {
            extractor,
            state: ScanState::Outside,
            current_title: None,
            current_group: Vec::new(),
            out: Extraction::default(),
        }
    }

    /// Consume one cleaned line. Returns `false` once scanning is over.
    fn feed(&mut self, line: &str) -> bool {
        if is_finished_marker(line) {
            self.flush();
            self.current_title = None;
            self.state = ScanState::Outside;
            return false;
        }

        match self.state {
            ScanState::InPending => {
                if is_failures_banner(line) {
                    self.state = ScanState::Outside;
                }
            }
            ScanState::Outside | ScanState::InFailureDetails => {
                if is_pending_banner(line) {
                    self.flush();
                    self.current_title = None;
                    self.state = ScanState::InPending;
                } else if let Some(title) = failure_title(line) {
                    self.flush();
                    self.out.touch(title);
                    self.current_title = Some(title.to_string());
                    self.state = ScanState::InFailureDetails;
                } else if self.state == ScanState::InFailureDetails {
                    let detail = line.trim();
                    if !self.extractor.is_noise(detail) {
                        self.current_group.push(detail.to_string());
                    }
                }
            }
        }

        true
    }

    /// Close the open detail group, if it has content.
    fn flush(&mut self) {
        let group = std::mem::take(&mut self.current_group);
        if group.is_empty() {
            return;
        }
        if let Some(title) = &self.current_title {
            self.out.push(title, group);
        }
    }

    fn finish(mut self) -> Extraction {
        self.flush();
        self.out
    }
}
