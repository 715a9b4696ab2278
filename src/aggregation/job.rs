//! Per-job accumulation of section results.
//!
//! A `JobAggregate` owns the idempotent merge and the completion
//! predicate for one job. It is not synchronized; the engine serializes
//! access to it.

use crate::models::{FinalizedResult, PartialResult, WordCount};
use std::collections::{BTreeMap, HashMap};
use std::time::Instant;

/// Result of offering one partial to an aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// New section merged; more sections are still missing.
    Accepted,
    /// New section merged and it was the last missing one. The caller
    /// that receives this is the only one allowed to finalize.
    AcceptedAndComplete,
    /// Section already merged; nothing changed.
    DuplicateIgnored,
    /// Reported section total disagrees with the job's fixed total.
    Inconsistent { expected: usize, reported: usize },
}

/// Retained per-section data needed at finalize time.
#[derive(Debug, Clone)]
struct SectionContribution {
    word_count: u64,
    sentiment_score: f64,
    anonymized_text: String,
    sentences: Vec<String>,
}

#[derive(Debug)]
pub struct JobAggregate {
    job_id: String,
    expected_sections: usize,
    top_n: usize,
    /// Keyed by section id, so iteration is in section order.
    sections: BTreeMap<usize, SectionContribution>,
    word_freq: HashMap<String, u64>,
    total_word_count: u64,
    inconsistent_deliveries: u64,
    last_update: Instant,
}

impl JobAggregate {
    /// Create an empty aggregate whose section total and ranking size
    /// are fixed by the first partial seen for the job.
    pub fn new(first: &PartialResult) -> Self {
        Self {
            job_id: first.job_id.clone(),
            expected_sections: first.total_sections,
            top_n: first.top_n,
            sections: BTreeMap::new(),
            word_freq: HashMap::new(),
            total_word_count: 0,
            inconsistent_deliveries: 0,
            last_update: Instant::now(),
        }
    }

    pub fn expected_sections(&self) -> usize {
        self.expected_sections
    }

    pub fn received_sections(&self) -> usize {
        self.sections.len()
    }

    /// Ranking size recorded from the first partial.
    pub fn top_n(&self) -> usize {
        self.top_n
    }

    pub fn inconsistent_deliveries(&self) -> u64 {
        self.inconsistent_deliveries
    }

    pub fn last_update(&self) -> Instant {
        self.last_update
    }

    pub fn is_complete(&self) -> bool {
        self.sections.len() == self.expected_sections
    }

    /// Merge one section, at most once per section id.
    pub fn add_partial(&mut self, partial: PartialResult) -> MergeOutcome {
        debug_assert_eq!(partial.job_id, self.job_id);

        if partial.total_sections != self.expected_sections {
            self.inconsistent_deliveries += 1;
            return MergeOutcome::Inconsistent {
                expected: self.expected_sections,
                reported: partial.total_sections,
            };
        }
        if self.sections.contains_key(&partial.section_id) {
            return MergeOutcome::DuplicateIgnored;
        }

        for (word, count) in partial.word_freq {
            let total = self.word_freq.entry(word).or_insert(0);
            *total = total.saturating_add(count);
        }
        self.total_word_count = self.total_word_count.saturating_add(partial.word_count);
        self.sections.insert(
            partial.section_id,
            SectionContribution {
                word_count: partial.word_count,
                sentiment_score: partial.sentiment_score,
                anonymized_text: partial.anonymized_text,
                sentences: partial.sorted_sentences,
            },
        );
        self.last_update = Instant::now();

        if self.is_complete() {
            MergeOutcome::AcceptedAndComplete
        } else {
            MergeOutcome::Accepted
        }
    }

    /// Σ(sentiment × wordCount), summed in section order so the result
    /// does not depend on arrival order.
    pub fn sentiment_weighted_sum(&self) -> f64 {
        self.sections
            .values()
            .map(|s| s.sentiment_score * s.word_count as f64)
            .sum()
    }

    /// Compute the job-level result from everything merged so far.
    pub fn finalize(&self, top_n: usize) -> FinalizedResult {
        let average_sentiment = if self.total_word_count == 0 {
            0.0
        } else {
            self.sentiment_weighted_sum() / self.total_word_count as f64
        };

        let anonymized_text = self
            .sections
            .values()
            .map(|s| s.anonymized_text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        let mut sorted_sentences: Vec<String> = self
            .sections
            .values()
            .flat_map(|s| s.sentences.iter().cloned())
            .collect();
        // Stable: equal lengths keep section order, then in-section order.
        sorted_sentences.sort_by_key(|s| s.chars().count());

        FinalizedResult {
            job_id: self.job_id.clone(),
            total_sections: self.expected_sections,
            total_word_count: self.total_word_count,
            top_words: rank_words(&self.word_freq, top_n),
            average_sentiment,
            anonymized_text,
            sorted_sentences,
        }
    }
}

/// Count descending, ties by word ascending, truncated to `n`.
pub fn rank_words(freq: &HashMap<String, u64>, n: usize) -> Vec<WordCount> {
    let mut ranked: Vec<(&String, &u64)> = freq.iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
    ranked
        .into_iter()
        .take(n)
        .map(|(word, count)| WordCount::new(word.clone(), *count))
        .collect()
}
