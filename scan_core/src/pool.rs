//! The fixed pool of page workers and the outcome aggregation loop.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::aggregator::ResultAggregator;
use crate::distributor::distribute;
use crate::evaluator::WalletEvaluator;
use crate::ledger::ScanLedger;
use crate::session::RenderSession;
use crate::{CancelFlag, EvaluationOutcome, ProgressEvent, ScanSummary, WalletAddress};

pub type ProgressCallback = Arc<dyn Fn(ProgressEvent) + Send + Sync>;

/// Drives one `RenderSession` per worker over disjoint wallet shards and
/// funnels every outcome through a single aggregation task.
pub struct PageWorkerPool {
    evaluator: Arc<WalletEvaluator>,
    ledger: Arc<dyn ScanLedger>,
    /// Pause between wallets on the same worker.
    pacing_delay: Duration,
}

impl PageWorkerPool {
    pub fn new(evaluator: WalletEvaluator, ledger: Arc<dyn ScanLedger>, pacing_delay: Duration) -> Self {
        Self {
            evaluator: Arc::new(evaluator),
            ledger,
            pacing_delay,
        }
    }

    /// Evaluate `wallets` across the given sessions. Already-scanned wallets
    /// are filtered out first; the rest are claimed in the ledger the moment a
    /// worker picks them up. Per-wallet failures never abort the pool.
    pub async fn run_evaluation(
        &self,
        sessions: Vec<Box<dyn RenderSession>>,
        wallets: Vec<WalletAddress>,
        mut aggregator: ResultAggregator,
        progress: Option<ProgressCallback>,
        cancel: CancelFlag,
    ) -> ScanSummary {
        let total = wallets.len();
        let mut unscanned = Vec::with_capacity(total);
        for wallet in wallets {
            if !self.ledger.contains(&wallet).await {
                unscanned.push(wallet);
            }
        }
        if unscanned.len() < total {
            info!(
                "Skipping {} already-scanned wallets, {} left to evaluate",
                total - unscanned.len(),
                unscanned.len()
            );
        }
        if unscanned.is_empty() {
            info!("Nothing to scan: every candidate wallet has been seen before");
            aggregator.checkpoint().await;
            return aggregator.summary();
        }

        let shards = distribute(unscanned, sessions.len());
        info!("Evaluating across {} worker(s)", shards.len());

        let (tx, mut rx) = mpsc::unbounded_channel::<(usize, EvaluationOutcome)>();
        let mut handles = Vec::with_capacity(shards.len());
        for (worker_id, (mut session, shard)) in sessions.into_iter().zip(shards).enumerate() {
            let evaluator = Arc::clone(&self.evaluator);
            let ledger = Arc::clone(&self.ledger);
            let tx = tx.clone();
            let cancel = cancel.clone();
            let pacing = self.pacing_delay;
            handles.push(tokio::spawn(async move {
                let shard_len = shard.len();
                let mut completed = 0usize;
                for wallet in shard {
                    if cancel.is_cancelled() {
                        info!(
                            "Worker {} stopping early after {}/{} wallets",
                            worker_id, completed, shard_len
                        );
                        break;
                    }
                    // Claim before evaluating so a crash mid-scan never
                    // causes a rescan on the next run.
                    if let Err(e) = ledger.record(&wallet).await {
                        warn!("Worker {}: ledger write for {} failed: {}", worker_id, wallet, e);
                    }
                    let outcome = evaluator.evaluate(session.as_mut(), &wallet).await;
                    completed += 1;
                    if tx.send((worker_id, outcome)).is_err() {
                        break;
                    }
                    tokio::time::sleep(pacing).await;
                }
                debug!("Worker {} done ({} wallets)", worker_id, completed);
            }));
        }
        drop(tx);

        let aggregate = async {
            while let Some((worker_id, outcome)) = rx.recv().await {
                let wallet = outcome.wallet().to_string();
                let kind = outcome.kind();
                aggregator.record_outcome(&outcome).await;
                if let Some(callback) = &progress {
                    callback(ProgressEvent {
                        worker_id,
                        wallet,
                        kind,
                        processed: aggregator.processed(),
                    });
                }
            }
        };
        let (worker_results, ()) = tokio::join!(join_all(handles), aggregate);
        for result in worker_results {
            if let Err(e) = result {
                warn!("Worker task aborted: {e}");
            }
        }

        // Final flush so an interrupted run still leaves a complete snapshot.
        aggregator.checkpoint().await;
        let summary = aggregator.summary();
        info!(
            "Evaluation finished: {} processed, {} passed",
            summary.processed, summary.passed
        );
        summary
    }
}
