//! Data models for the aggregation pipeline.
//!
//! This module contains the wire schema consumed from section workers
//! and the job-level results exposed to queries and durable storage.

use crate::error::MalformedPartial;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Per-section analytics emitted by a worker.
///
/// Delivery is at-least-once and unordered, so the same section may be
/// seen several times. Extra keys on the wire (such as a per-section
/// `topWords` list) are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartialResult {
    /// Job this section belongs to.
    pub job_id: String,
    /// 0-based section index.
    pub section_id: usize,
    /// Number of sections the producer split the job into.
    pub total_sections: usize,
    /// Size of the requested top-words ranking.
    pub top_n: usize,
    /// Number of words in the section.
    pub word_count: u64,
    /// Word frequencies for the section.
    #[serde(default)]
    pub word_freq: HashMap<String, u64>,
    /// Sentiment score for the section.
    pub sentiment_score: f64,
    /// Section text with names replaced.
    #[serde(default)]
    pub anonymized_text: String,
    /// Section sentences in the worker's order.
    #[serde(default)]
    pub sorted_sentences: Vec<String>,
}

impl PartialResult {
    /// Check the fields a merge relies on.
    pub fn validate(&self) -> Result<(), MalformedPartial> {
        if self.job_id.trim().is_empty() {
            return Err(MalformedPartial::EmptyJobId);
        }
        if self.total_sections == 0 {
            return Err(MalformedPartial::ZeroTotalSections);
        }
        if self.top_n == 0 {
            return Err(MalformedPartial::ZeroTopN);
        }
        if self.section_id >= self.total_sections {
            return Err(MalformedPartial::SectionOutOfRange {
                section_id: self.section_id,
                total_sections: self.total_sections,
            });
        }
        if let Some((word, _)) = self.word_freq.iter().find(|(_, count)| **count == 0) {
            return Err(MalformedPartial::ZeroWordFrequency { word: word.clone() });
        }
        if !self.sentiment_score.is_finite() {
            return Err(MalformedPartial::NonFiniteSentiment);
        }
        Ok(())
    }
}

/// A ranked word and its merged count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordCount {
    pub word: String,
    pub count: u64,
}

impl WordCount {
    pub fn new(word: impl Into<String>, count: u64) -> Self {
        Self {
            word: word.into(),
            count,
        }
    }
}

/// The authoritative job-level result, produced once per job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizedResult {
    pub job_id: String,
    pub total_sections: usize,
    pub total_word_count: u64,
    /// Count descending, then word ascending.
    pub top_words: Vec<WordCount>,
    pub average_sentiment: f64,
    /// Section texts in ascending section order, separated by a blank line.
    pub anonymized_text: String,
    /// All sentences, stably sorted by length.
    pub sorted_sentences: Vec<String>,
}

/// Non-authoritative view of a job that is still accumulating sections.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveSnapshot {
    pub received_sections: usize,
    pub expected_sections: usize,
    #[serde(flatten)]
    pub result: FinalizedResult,
}

/// What a query can observe for a job id.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobView {
    Finalized(Arc<FinalizedResult>),
    InProgress(LiveSnapshot),
}

impl JobView {
    /// The result fields, whether final or partial.
    pub fn result(&self) -> &FinalizedResult {
        match self {
            JobView::Finalized(result) => result,
            JobView::InProgress(snapshot) => &snapshot.result,
        }
    }

    pub fn is_finalized(&self) -> bool {
        matches!(self, JobView::Finalized(_))
    }
}

/// Document written to durable storage at finalize time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DurableRecord {
    pub persisted_at: DateTime<Utc>,
    #[serde(flatten)]
    pub result: FinalizedResult,
}
