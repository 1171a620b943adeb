//! Run counters, the passing-result set, and checkpoint triggering.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::{EvaluationOutcome, PassedRecord, ScanSummary};

/// Receives the full passing-result snapshot after every update. Implemented
/// over an atomically-replaced JSON file in production and by counting fakes
/// in tests.
#[async_trait]
pub trait CheckpointSink: Send + Sync {
    async fn checkpoint(&self, results: &[PassedRecord]) -> anyhow::Result<()>;
}

/// Sink for callers that do not persist results.
pub struct NullCheckpointSink;

#[async_trait]
impl CheckpointSink for NullCheckpointSink {
    async fn checkpoint(&self, _results: &[PassedRecord]) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Accumulates worker outcomes. Runs as the single consumer of the outcome
/// channel, so the result set needs no lock.
pub struct ResultAggregator {
    processed: u64,
    passed: u64,
    results: Vec<PassedRecord>,
    sink: Arc<dyn CheckpointSink>,
}

impl ResultAggregator {
    /// `seed` is the result set loaded from storage at startup; new passes
    /// are appended to it and every checkpoint rewrites the merged set.
    pub fn new(sink: Arc<dyn CheckpointSink>, seed: Vec<PassedRecord>) -> Self {
        Self {
            processed: 0,
            passed: 0,
            results: seed,
            sink,
        }
    }

    pub async fn record_outcome(&mut self, outcome: &EvaluationOutcome) {
        self.processed += 1;
        if let EvaluationOutcome::Passed {
            wallet,
            win_rate,
            realized_pnl,
        } = outcome
        {
            self.passed += 1;
            info!(
                "PASS {} (win rate {:.1}%, realized pnl {:.1}%) — {} result(s) so far",
                wallet,
                win_rate,
                realized_pnl,
                self.results.len() + 1
            );
            self.results
                .push(PassedRecord::from_metrics(wallet.clone(), *win_rate, *realized_pnl));
            self.checkpoint().await;
        }
    }

    /// Hand the current snapshot to the sink. A failed write costs at most
    /// the results since the previous successful checkpoint, so it is logged
    /// and swallowed.
    pub async fn checkpoint(&self) {
        if let Err(e) = self.sink.checkpoint(&self.results).await {
            warn!("Result checkpoint failed, continuing: {e}");
        }
    }

    pub fn processed(&self) -> u64 {
        self.processed
    }

    pub fn passed(&self) -> u64 {
        self.passed
    }

    pub fn summary(self) -> ScanSummary {
        ScanSummary {
            processed: self.processed,
            passed: self.passed,
            results: self.results,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::Mutex;

    /// Records every snapshot it is handed.
    pub(crate) struct RecordingSink {
        pub snapshots: Mutex<Vec<Vec<PassedRecord>>>,
    }

    impl RecordingSink {
        pub(crate) fn new() -> Self {
            Self {
                snapshots: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl CheckpointSink for RecordingSink {
        async fn checkpoint(&self, results: &[PassedRecord]) -> anyhow::Result<()> {
            self.snapshots.lock().await.push(results.to_vec());
            Ok(())
        }
    }

    struct FailingSink;

    #[async_trait]
    impl CheckpointSink for FailingSink {
        async fn checkpoint(&self, _results: &[PassedRecord]) -> anyhow::Result<()> {
            anyhow::bail!("disk full")
        }
    }

    fn passed(wallet: &str) -> EvaluationOutcome {
        EvaluationOutcome::Passed {
            wallet: wallet.to_string(),
            win_rate: 80.0,
            realized_pnl: 200.0,
        }
    }

    #[tokio::test]
    async fn pass_triggers_checkpoint_with_full_snapshot() {
        let sink = Arc::new(RecordingSink::new());
        let mut aggregator = ResultAggregator::new(sink.clone(), Vec::new());

        aggregator.record_outcome(&passed("w1")).await;
        aggregator
            .record_outcome(&EvaluationOutcome::NoData {
                wallet: "w2".to_string(),
            })
            .await;
        aggregator.record_outcome(&passed("w3")).await;

        let snapshots = sink.snapshots.lock().await;
        assert_eq!(snapshots.len(), 2);
        assert_eq!(snapshots[0].len(), 1);
        assert_eq!(snapshots[1].len(), 2);
        assert_eq!(snapshots[1][1].wallet, "w3");
    }

    #[tokio::test]
    async fn non_passing_outcomes_only_bump_processed() {
        let sink = Arc::new(RecordingSink::new());
        let mut aggregator = ResultAggregator::new(sink.clone(), Vec::new());

        aggregator
            .record_outcome(&EvaluationOutcome::FailedCriteria {
                wallet: "w1".to_string(),
                win_rate: 10.0,
                realized_pnl: 5.0,
            })
            .await;
        aggregator
            .record_outcome(&EvaluationOutcome::ExtractionFailed {
                wallet: "w2".to_string(),
            })
            .await;

        assert_eq!(aggregator.processed(), 2);
        assert_eq!(aggregator.passed(), 0);
        assert!(sink.snapshots.lock().await.is_empty());
    }

    #[tokio::test]
    async fn seed_results_are_kept_in_snapshots_and_summary() {
        let sink = Arc::new(RecordingSink::new());
        let seed = vec![PassedRecord::from_metrics("old", 90.0, 400.0)];
        let mut aggregator = ResultAggregator::new(sink.clone(), seed);

        aggregator.record_outcome(&passed("new")).await;

        let summary = aggregator.summary();
        assert_eq!(summary.processed, 1);
        assert_eq!(summary.passed, 1);
        assert_eq!(summary.results.len(), 2);
        assert_eq!(summary.results[0].wallet, "old");
        assert_eq!(summary.results[1].wallet, "new");
    }

    #[tokio::test]
    async fn sink_failure_is_swallowed() {
        let mut aggregator = ResultAggregator::new(Arc::new(FailingSink), Vec::new());
        aggregator.record_outcome(&passed("w1")).await;
        assert_eq!(aggregator.passed(), 1);
        assert_eq!(aggregator.summary().results.len(), 1);
    }
}
