//! Error types for the aggregation core.
//!
//! Message-level and persistence-level failures are typed here so the
//! engine can log and count them without aborting unrelated jobs. The
//! binary wraps everything else in `anyhow`.

use thiserror::Error;

/// A partial result that fails validation before it reaches any aggregate.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MalformedPartial {
    #[error("jobId is empty")]
    EmptyJobId,

    #[error("totalSections must be at least 1")]
    ZeroTotalSections,

    #[error("topN must be at least 1")]
    ZeroTopN,

    #[error("sectionId {section_id} is out of range for {total_sections} sections")]
    SectionOutOfRange {
        section_id: usize,
        total_sections: usize,
    },

    #[error("wordFreq entry '{word}' has a count of 0")]
    ZeroWordFrequency { word: String },

    #[error("sentimentScore is not a finite number")]
    NonFiniteSentiment,
}

/// Failure to write a finalized result to durable storage.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("job id '{0}' cannot be used as a record key")]
    InvalidKey(String),

    #[error("a durable record for job '{0}' already exists")]
    AlreadyExists(String),

    #[error("I/O error writing record: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize record: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_messages_name_the_field() {
        let err = MalformedPartial::SectionOutOfRange {
            section_id: 4,
            total_sections: 3,
        };
        assert_eq!(
            err.to_string(),
            "sectionId 4 is out of range for 3 sections"
        );

        let err = MalformedPartial::ZeroWordFrequency {
            word: "the".to_string(),
        };
        assert!(err.to_string().contains("'the'"));
    }

    #[test]
    fn test_persist_error_from_io() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: PersistError = io.into();
        assert!(matches!(err, PersistError::Io(_)));
        assert!(err.to_string().contains("denied"));
    }
}
