//! Newline-delimited JSON transport for partial results.
//!
//! A reader task decodes one `PartialResult` per line and feeds a
//! bounded channel; a pool of consumer tasks drains it concurrently
//! into the engine. Delivery order across consumers is arbitrary, which
//! the engine tolerates.

use crate::aggregation::engine::SubmitOutcome;
use crate::aggregation::AggregationEngine;
use crate::models::PartialResult;
use anyhow::{Context, Result};
use indicatif::ProgressBar;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

/// Counts from one ingest run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestSummary {
    /// Non-blank lines read.
    pub lines: u64,
    /// Lines decoded into a partial result.
    pub decoded: u64,
    /// Lines that were not a valid partial result.
    pub undecodable: u64,
}

/// Read every line from `reader` and submit it with `consumers`
/// concurrent tasks.
pub async fn ingest<R>(
    reader: R,
    engine: Arc<AggregationEngine>,
    consumers: usize,
    progress: Option<ProgressBar>,
) -> Result<IngestSummary>
where
    R: AsyncBufRead + Unpin,
{
    let consumers = consumers.max(1);
    let (sender, receiver) = mpsc::channel::<PartialResult>(consumers * 64);
    let receiver = Arc::new(Mutex::new(receiver));

    let handles: Vec<_> = (0..consumers)
        .map(|id| {
            let receiver = Arc::clone(&receiver);
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { consume(id, receiver, engine).await })
        })
        .collect();

    let mut summary = IngestSummary::default();
    let mut lines = reader.lines();
    while let Some(line) = lines
        .next_line()
        .await
        .context("Failed to read partial results")?
    {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        summary.lines += 1;
        if let Some(ref pb) = progress {
            pb.inc(1);
        }

        match serde_json::from_str::<PartialResult>(line) {
            Ok(partial) => {
                summary.decoded += 1;
                if sender.send(partial).await.is_err() {
                    anyhow::bail!("All consumers stopped before input was drained");
                }
            }
            Err(e) => {
                summary.undecodable += 1;
                warn!("Skipping undecodable line {}: {}", summary.lines, e);
            }
        }
    }
    drop(sender);

    for result in futures::future::join_all(handles).await {
        result.context("Consumer task panicked")?;
    }

    if let Some(pb) = progress {
        pb.finish_and_clear();
    }

    Ok(summary)
}

async fn consume(
    id: usize,
    receiver: Arc<Mutex<mpsc::Receiver<PartialResult>>>,
    engine: Arc<AggregationEngine>,
) {
    let mut handled = 0u64;
    loop {
        let next = receiver.lock().await.recv().await;
        let Some(partial) = next else {
            break;
        };
        // Submitting may block on the durable write of a finalized job.
        let submitter = Arc::clone(&engine);
        let submitted = tokio::task::spawn_blocking(move || submitter.submit(partial)).await;
        handled += 1;
        match submitted {
            Ok(Ok(SubmitOutcome::Finalized)) => {
                debug!("Consumer {} finalized a job", id);
            }
            // Rejections and late deliveries are logged and counted by the engine.
            Ok(Ok(_)) | Ok(Err(_)) => {}
            Err(e) => warn!("Consumer {} lost a partial: {}", id, e),
        }
    }
    debug!("Consumer {} finished after {} partials", id, handled);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::JobView;
    use crate::store::tests::MemorySink;
    use crate::store::ResultStore;

    fn engine() -> Arc<AggregationEngine> {
        Arc::new(AggregationEngine::new(ResultStore::new(
            10,
            Box::new(MemorySink::default()),
        )))
    }

    fn line(job: &str, section: usize, total: usize) -> String {
        format!(
            r#"{{"jobId":"{}","sectionId":{},"totalSections":{},"topN":2,"wordCount":2,"wordFreq":{{"w":2}},"sentimentScore":0.5,"anonymizedText":"t{}","sortedSentences":["s{}"]}}"#,
            job, section, total, section, section
        )
    }

    #[tokio::test]
    async fn test_ingest_with_duplicates_and_noise() {
        let input = [
            line("A", 1, 2),
            String::new(),
            "not json".to_string(),
            line("A", 1, 2),
            line("B", 0, 1),
            line("A", 0, 2),
            line("C", 0, 3),
        ]
        .join("\n");

        let engine = engine();
        let summary = ingest(input.as_bytes(), Arc::clone(&engine), 4, None)
            .await
            .unwrap();

        assert_eq!(
            summary,
            IngestSummary {
                lines: 6,
                decoded: 5,
                undecodable: 1
            }
        );
        assert_eq!(engine.stats().finalized, 2);

        match engine.get("A", 10) {
            Some(JobView::Finalized(result)) => {
                assert_eq!(result.total_word_count, 4);
                assert_eq!(result.anonymized_text, "t0\n\nt1");
            }
            other => panic!("expected finalized A, got {:?}", other),
        }
        assert!(matches!(engine.get("C", 10), Some(JobView::InProgress(_))));
    }

    #[test]
    fn test_ingest_single_consumer() {
        let input = (0..3).map(|i| line("Z", i, 3)).collect::<Vec<_>>().join("\n");
        let engine = engine();

        let summary =
            tokio_test::block_on(ingest(input.as_bytes(), Arc::clone(&engine), 1, None)).unwrap();

        assert_eq!(summary.decoded, 3);
        assert!(engine.get("Z", 10).is_some_and(|v| v.is_finalized()));
    }

    #[test]
    fn test_ingest_empty_input() {
        let engine = engine();
        let summary =
            tokio_test::block_on(ingest(&b"\n\n"[..], Arc::clone(&engine), 2, None)).unwrap();

        assert_eq!(summary, IngestSummary::default());
        assert!(engine.live_jobs().is_empty());
    }
}
