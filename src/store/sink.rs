//! Durable, write-once storage for finalized results.

use crate::error::PersistError;
use crate::models::{DurableRecord, FinalizedResult};
use chrono::Utc;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Destination for finalized results. Written once per job and never
/// read back by the query path.
pub trait ResultSink: Send + Sync {
    /// Write the record for `result.job_id`.
    fn persist(&self, result: &FinalizedResult) -> Result<(), PersistError>;

    /// Whether a record for `job_id` has been written.
    fn contains(&self, job_id: &str) -> bool;
}

/// One pretty-printed JSON document per job under a results directory.
#[derive(Debug, Clone)]
pub struct FsResultSink {
    dir: PathBuf,
}

impl FsResultSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the record for `job_id`. Only the empty id has none.
    pub fn record_path(&self, job_id: &str) -> Option<PathBuf> {
        if job_id.is_empty() {
            return None;
        }
        Some(self.dir.join(format!("{}.json", encode_key(job_id))))
    }
}

/// Percent-encode every byte outside `[A-Za-z0-9_-]`. `.` and `%` are
/// encoded too, so distinct ids never share a file name and no id can
/// name a parent or hidden path.
fn encode_key(job_id: &str) -> String {
    let mut encoded = String::with_capacity(job_id.len());
    for byte in job_id.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_') {
            encoded.push(char::from(byte));
        } else {
            encoded.push_str(&format!("%{:02X}", byte));
        }
    }
    encoded
}

impl ResultSink for FsResultSink {
    fn persist(&self, result: &FinalizedResult) -> Result<(), PersistError> {
        let path = self
            .record_path(&result.job_id)
            .ok_or_else(|| PersistError::InvalidKey(result.job_id.clone()))?;

        std::fs::create_dir_all(&self.dir)?;

        let record = DurableRecord {
            persisted_at: Utc::now(),
            result: result.clone(),
        };
        let content = serde_json::to_string_pretty(&record)?;

        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(PersistError::AlreadyExists(result.job_id.clone()));
            }
            Err(e) => return Err(e.into()),
        };
        file.write_all(content.as_bytes())?;
        file.sync_all()?;

        debug!("Persisted job {} to {}", result.job_id, path.display());
        Ok(())
    }

    fn contains(&self, job_id: &str) -> bool {
        self.record_path(job_id).is_some_and(|path| path.exists())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn result(job_id: &str) -> FinalizedResult {
        FinalizedResult {
            job_id: job_id.to_string(),
            total_sections: 1,
            total_word_count: 2,
            top_words: Vec::new(),
            average_sentiment: 0.25,
            anonymized_text: "hello [NAME]".to_string(),
            sorted_sentences: vec!["hello [NAME]".to_string()],
        }
    }

    #[test]
    fn test_persist_writes_one_document() {
        let temp = TempDir::new().unwrap();
        let sink = FsResultSink::new(temp.path().join("results"));

        assert!(!sink.contains("job-1"));
        sink.persist(&result("job-1")).unwrap();
        assert!(sink.contains("job-1"));

        let path = sink.record_path("job-1").unwrap();
        let content = std::fs::read_to_string(path).unwrap();
        let record: DurableRecord = serde_json::from_str(&content).unwrap();
        assert_eq!(record.result, result("job-1"));
        assert!(content.contains("\"persistedAt\""));
        assert!(content.contains("\"averageSentiment\""));
    }

    #[test]
    fn test_persist_is_write_once() {
        let temp = TempDir::new().unwrap();
        let sink = FsResultSink::new(temp.path());

        sink.persist(&result("job-1")).unwrap();
        let err = sink.persist(&result("job-1")).unwrap_err();
        assert!(matches!(err, PersistError::AlreadyExists(id) if id == "job-1"));
    }

    #[test]
    fn test_any_job_id_gets_a_record_inside_dir() {
        let temp = TempDir::new().unwrap();
        let sink = FsResultSink::new(temp.path());

        let ids = ["job:1", "a b", "../escape", "a/b", ".", "..", "%2E", "é"];
        for id in ids {
            sink.persist(&result(id)).unwrap();
            assert!(sink.contains(id), "{}", id);
            let path = sink.record_path(id).unwrap();
            assert_eq!(path.parent(), Some(temp.path()), "{}", id);
        }

        let files = std::fs::read_dir(temp.path()).unwrap().count();
        assert_eq!(files, ids.len());
        assert_eq!(
            sink.record_path("job:1").unwrap(),
            temp.path().join("job%3A1.json")
        );
        assert_eq!(
            sink.record_path("3f2a9c1e-uuid_v4").unwrap(),
            temp.path().join("3f2a9c1e-uuid_v4.json")
        );
    }

    #[test]
    fn test_empty_job_id_is_refused() {
        let temp = TempDir::new().unwrap();
        let sink = FsResultSink::new(temp.path());

        let err = sink.persist(&result("")).unwrap_err();
        assert!(matches!(err, PersistError::InvalidKey(_)));
        assert!(!sink.contains(""));
    }
}
