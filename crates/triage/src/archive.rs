//! Log archive download and decoding.
//!
//! GitHub serves an attempt's logs as a zip with one `N_job.txt` file per job
//! at the top level and the same content split per step under `job/`
//! directories. Only the top-level files are read so nothing is counted twice.

use std::fs::File;
use std::io::{Read, Seek, Write};

use tracing::debug;
use zip::ZipArchive;

use crate::error::TriageError;
use crate::extractor::{Extraction, FailureExtractor};
use crate::github::CiProvider;
use crate::resolver::Attempt;
use crate::retry::{with_retry, RetryPolicy};

/// Whether a zip entry sits at the root of the archive.
#[must_use]
pub fn is_top_level(name: &str) -> bool {
    !name.trim_end_matches('/').contains('/')
}

/// A downloaded log archive backed by an anonymous temporary file.
///
/// The file has no directory entry and is reclaimed when this value drops.
pub struct LogArchive {
    zip: ZipArchive<File>,
}

impl std::fmt::Debug for LogArchive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogArchive")
            .field("entries", &self.zip.len())
            .finish()
    }
}

impl LogArchive {
    /// Spool `bytes` to a temporary file and open it as a zip.
    ///
    /// # Errors
    /// Returns [`TriageError::Io`] if the temporary file cannot be written and
    /// [`TriageError::MalformedArchive`] if the bytes are not a zip.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TriageError> {
        let mut file = tempfile::tempfile()?;
        file.write_all(bytes)?;
        file.flush()?;
        file.rewind()?;

        let zip = ZipArchive::new(file)?;
        Ok(Self { zip })
    }

    /// Names of the top-level text entries.
    #[must_use]
    pub fn top_level_entries(&self) -> Vec<String> {
        self.zip
            .file_names()
            .filter(|name| !name.ends_with('/') && is_top_level(name))
            .map(str::to_string)
            .collect()
    }

    /// Run `extractor` over every top-level entry and merge the results.
    ///
    /// # Errors
    /// Returns [`TriageError::MalformedArchive`] if an entry cannot be read.
    pub fn extract(&mut self, extractor: &FailureExtractor) -> Result<Extraction, TriageError> {
        let mut merged = Extraction::default();

        for name in self.top_level_entries() {
            let mut entry = self.zip.by_name(&name)?;
            let mut raw = Vec::new();
            entry
                .read_to_end(&mut raw)
                .map_err(|e| TriageError::MalformedArchive(format!("{name}: {e}")))?;
            let text = String::from_utf8_lossy(&raw);

            let found = extractor.extract(&text);
            debug!(entry = %name, failures = found.len(), "Scanned log entry");
            merged.extend(found);
        }

        Ok(merged)
    }
}

/// Download the log archive of `attempt`.
///
/// Returns `Ok(None)` when the provider has no logs for it.
///
/// # Errors
/// Returns the download error after retries, or a decoding error.
pub async fn fetch_archive(
    provider: &dyn CiProvider,
    attempt: &Attempt,
    policy: &RetryPolicy,
) -> Result<Option<LogArchive>, TriageError> {
    let Some(bytes) = with_retry(policy, "download logs", || {
        provider.download_logs(&attempt.logs_url)
    })
    .await?
    else {
        debug!(
            run_id = attempt.run_id,
            attempt = attempt.attempt,
            "No logs available for attempt"
        );
        return Ok(None);
    };

    LogArchive::from_bytes(&bytes).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    fn build_zip(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, content) in entries {
            if name.ends_with('/') {
                writer
                    .add_directory(*name, SimpleFileOptions::default())
                    .unwrap();
            } else {
                writer.start_file(*name, SimpleFileOptions::default()).unwrap();
                writer.write_all(content.as_bytes()).unwrap();
            }
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_is_top_level() {
        assert!(is_top_level("1_build.txt"));
        assert!(is_top_level("build/"));
        assert!(!is_top_level("build/3_Run tests.txt"));
    }

    #[test]
    fn test_only_top_level_entries_are_scanned() {
        let job = "  1) widget renders correctly\n     expected true, got false\n";
        let bytes = build_zip(&[
            ("0_test.txt", job),
            ("test/", ""),
            ("test/4_Run specs.txt", job),
        ]);

        let mut archive = LogArchive::from_bytes(&bytes).unwrap();
        assert_eq!(archive.top_level_entries(), vec!["0_test.txt".to_string()]);

        let extraction = archive.extract(&FailureExtractor::new()).unwrap();
        assert_eq!(
            extraction.get("widget renders correctly").unwrap().len(),
            1
        );
    }

    #[test]
    fn test_garbage_is_malformed() {
        let result = LogArchive::from_bytes(b"definitely not a zip file");
        assert!(matches!(result, Err(TriageError::MalformedArchive(_))));
    }
}
