//! Markdown and JSON rendering of job views.

use crate::aggregation::StatsSnapshot;
use crate::models::{FinalizedResult, JobView};
use anyhow::Result;
use serde::Serialize;

/// One queried job and what the engine returned for it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobEntry {
    pub job_id: String,
    /// `None` when the job was not found.
    pub view: Option<JobView>,
}

/// Everything the report shows.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub stats: StatsSnapshot,
    pub jobs: Vec<JobEntry>,
}

/// Generate a complete Markdown report.
pub fn generate_markdown_report(report: &Report) -> String {
    let mut output = String::new();

    output.push_str("# Job Report\n\n");
    output.push_str(&generate_stats_section(&report.stats));

    if report.jobs.is_empty() {
        output.push_str("No jobs to report.\n\n");
    }

    for entry in &report.jobs {
        output.push_str(&generate_job_section(entry));
    }

    output
}

/// Generate the delivery statistics table.
fn generate_stats_section(stats: &StatsSnapshot) -> String {
    let mut section = String::new();

    section.push_str("## Delivery Statistics\n\n");
    section.push_str("| Accepted | Duplicates | Inconsistent | Rejected | Late | Finalized | Expired |\n");
    section.push_str("|:---:|:---:|:---:|:---:|:---:|:---:|:---:|\n");
    section.push_str(&format!(
        "| {} | {} | {} | {} | {} | {} | {} |\n\n",
        stats.accepted,
        stats.duplicates,
        stats.inconsistent,
        stats.rejected,
        stats.late,
        stats.finalized,
        stats.expired
    ));

    section
}

/// Generate the section for a single job.
fn generate_job_section(entry: &JobEntry) -> String {
    let mut section = String::new();

    section.push_str(&format!("## Job `{}`\n\n", entry.job_id));

    let Some(ref view) = entry.view else {
        section.push_str("*Status: not found*\n\n");
        return section;
    };

    match view {
        JobView::Finalized(_) => section.push_str("*Status: finalized*\n\n"),
        JobView::InProgress(snapshot) => section.push_str(&format!(
            "*Status: in progress ({}/{} sections received, snapshot only)*\n\n",
            snapshot.received_sections, snapshot.expected_sections
        )),
    }

    section.push_str(&generate_result_body(view.result()));
    section
}

fn generate_result_body(result: &FinalizedResult) -> String {
    let mut body = String::new();

    body.push_str(&format!("- **Sections:** {}\n", result.total_sections));
    body.push_str(&format!("- **Total Words:** {}\n", result.total_word_count));
    body.push_str(&format!(
        "- **Average Sentiment:** {:.4}\n\n",
        result.average_sentiment
    ));

    body.push_str("### Top Words\n\n");
    if result.top_words.is_empty() {
        body.push_str("No words recorded.\n\n");
    } else {
        body.push_str("| Rank | Word | Count |\n");
        body.push_str("|:---:|:---|:---:|\n");
        for (i, wc) in result.top_words.iter().enumerate() {
            body.push_str(&format!(
                "| {} | {} | {} |\n",
                i + 1,
                inline(&wc.word),
                wc.count
            ));
        }
        body.push('\n');
    }

    if !result.sorted_sentences.is_empty() {
        body.push_str("### Sentences by Length\n\n");
        for sentence in &result.sorted_sentences {
            body.push_str(&format!("1. {}\n", inline(sentence)));
        }
        body.push('\n');
    }

    if !result.anonymized_text.is_empty() {
        body.push_str("### Anonymized Text\n\n");
        for line in result.anonymized_text.lines() {
            body.push_str("> ");
            body.push_str(line);
            body.push('\n');
        }
        body.push('\n');
    }

    body
}

/// Flatten text for a single Markdown line or table cell.
fn inline(text: &str) -> String {
    text.split(['\r', '\n'])
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
        .replace('|', "\\|")
}

/// Generate a JSON report.
pub fn generate_json_report(report: &Report) -> Result<String> {
    serde_json::to_string_pretty(report).map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LiveSnapshot, WordCount};
    use std::sync::Arc;

    fn result() -> FinalizedResult {
        FinalizedResult {
            job_id: "J1".to_string(),
            total_sections: 2,
            total_word_count: 7,
            top_words: vec![WordCount::new("a", 4), WordCount::new("c", 2)],
            average_sentiment: 0.2,
            anonymized_text: "zero\n\none".to_string(),
            sorted_sentences: vec!["hi".to_string(), "ok".to_string()],
        }
    }

    fn create_test_report() -> Report {
        Report {
            stats: StatsSnapshot {
                accepted: 3,
                finalized: 1,
                duplicates: 2,
                ..StatsSnapshot::default()
            },
            jobs: vec![
                JobEntry {
                    job_id: "J1".to_string(),
                    view: Some(JobView::Finalized(Arc::new(result()))),
                },
                JobEntry {
                    job_id: "J2".to_string(),
                    view: Some(JobView::InProgress(LiveSnapshot {
                        received_sections: 1,
                        expected_sections: 3,
                        result: FinalizedResult {
                            job_id: "J2".to_string(),
                            top_words: Vec::new(),
                            ..result()
                        },
                    })),
                },
                JobEntry {
                    job_id: "gone".to_string(),
                    view: None,
                },
            ],
        }
    }

    #[test]
    fn test_generate_markdown_report() {
        let markdown = generate_markdown_report(&create_test_report());

        assert!(markdown.contains("# Job Report"));
        assert!(markdown.contains("## Delivery Statistics"));
        assert!(markdown.contains("| 3 | 2 | 0 | 0 | 0 | 1 | 0 |"));
        assert!(markdown.contains("## Job `J1`"));
        assert!(markdown.contains("*Status: finalized*"));
        assert!(markdown.contains("| 1 | a | 4 |"));
        assert!(markdown.contains("1/3 sections received"));
        assert!(markdown.contains("No words recorded."));
        assert!(markdown.contains("*Status: not found*"));
        assert!(markdown.contains("> zero\n>"));
    }

    #[test]
    fn test_multiline_sentences_stay_on_one_line() {
        let report = Report {
            stats: StatsSnapshot::default(),
            jobs: vec![JobEntry {
                job_id: "J3".to_string(),
                view: Some(JobView::Finalized(Arc::new(FinalizedResult {
                    job_id: "J3".to_string(),
                    top_words: vec![WordCount::new("a|b", 1)],
                    sorted_sentences: vec!["first line\r\nsecond | part".to_string()],
                    ..result()
                }))),
            }],
        };
        let markdown = generate_markdown_report(&report);

        assert!(markdown.contains("1. first line second \\| part\n"));
        assert!(markdown.contains("| 1 | a\\|b | 1 |"));
        assert!(!markdown.contains("\nsecond"));
    }

    #[test]
    fn test_empty_report() {
        let report = Report {
            stats: StatsSnapshot::default(),
            jobs: Vec::new(),
        };
        assert!(generate_markdown_report(&report).contains("No jobs to report."));
    }

    #[test]
    fn test_generate_json_report() {
        let json = generate_json_report(&create_test_report()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["stats"]["finalized"], 1);
        assert_eq!(value["jobs"][0]["jobId"], "J1");
        assert_eq!(value["jobs"][0]["view"]["status"], "finalized");
        assert_eq!(value["jobs"][1]["view"]["status"], "in_progress");
        assert!(value["jobs"][2]["view"].is_null());
    }
}
