//! Concurrent wallet-evaluation engine.
//!
//! A fixed pool of page workers drives [`RenderSession`]s against a per-wallet
//! analytics URL, waits for the asynchronously rendered metrics, extracts win
//! rate and realized PnL, and aggregates passing wallets into an
//! incrementally-checkpointed result set. Browser integration lives behind the
//! [`RenderSession`] trait so the engine is testable without Chrome.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod aggregator;
pub mod distributor;
pub mod evaluator;
pub mod extractor;
pub mod ledger;
pub mod pool;
pub mod session;

#[cfg(test)]
pub(crate) mod test_support;

pub use aggregator::{CheckpointSink, NullCheckpointSink, ResultAggregator};
pub use distributor::distribute;
pub use evaluator::{EvaluatorConfig, WalletEvaluator};
pub use extractor::MetricExtractor;
pub use ledger::{MemoryScanLedger, ScanLedger};
pub use pool::{PageWorkerPool, ProgressCallback};
pub use session::{MarkerSpec, MarkerWait, RenderSession, SessionError};

/// Opaque wallet identifier. The engine never inspects its contents.
pub type WalletAddress = String;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("invalid metric pattern: {0}")]
    Pattern(#[from] regex::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;

/// Pass criteria for a run. Both bounds are inclusive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub min_win_rate: f64,
    pub min_realized_pnl: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            min_win_rate: 70.0,
            min_realized_pnl: 100.0,
        }
    }
}

/// Terminal result of evaluating a single wallet.
#[derive(Debug, Clone, PartialEq)]
pub enum EvaluationOutcome {
    /// Both metrics extracted and both thresholds met.
    Passed {
        wallet: WalletAddress,
        win_rate: f64,
        realized_pnl: f64,
    },
    /// Both metrics extracted, at least one threshold missed. Carries the
    /// values so callers can log how close the wallet came.
    FailedCriteria {
        wallet: WalletAddress,
        win_rate: f64,
        realized_pnl: f64,
    },
    /// The page rendered an authoritative "nothing here" response.
    NoData { wallet: WalletAddress },
    /// The page rendered but the metrics stayed unreadable across all
    /// attempts.
    ExtractionFailed { wallet: WalletAddress },
    /// Navigation or the session itself kept failing across all attempts.
    TransientError { wallet: WalletAddress, cause: String },
}

impl EvaluationOutcome {
    pub fn wallet(&self) -> &str {
        match self {
            Self::Passed { wallet, .. }
            | Self::FailedCriteria { wallet, .. }
            | Self::NoData { wallet }
            | Self::ExtractionFailed { wallet }
            | Self::TransientError { wallet, .. } => wallet,
        }
    }

    pub fn kind(&self) -> OutcomeKind {
        match self {
            Self::Passed { .. } => OutcomeKind::Passed,
            Self::FailedCriteria { .. } => OutcomeKind::FailedCriteria,
            Self::NoData { .. } => OutcomeKind::NoData,
            Self::ExtractionFailed { .. } => OutcomeKind::ExtractionFailed,
            Self::TransientError { .. } => OutcomeKind::TransientError,
        }
    }
}

/// Discriminant of [`EvaluationOutcome`], used in progress reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Passed,
    FailedCriteria,
    NoData,
    ExtractionFailed,
    TransientError,
}

impl fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Passed => "passed",
            Self::FailedCriteria => "failed criteria",
            Self::NoData => "no data",
            Self::ExtractionFailed => "extraction failed",
            Self::TransientError => "transient error",
        };
        f.write_str(label)
    }
}

/// One entry of the persisted result set.
///
/// Metrics are formatted as `"NN.N%"` at classification time so the in-memory
/// set and the checkpoint file round-trip exactly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassedRecord {
    pub wallet: WalletAddress,
    #[serde(rename = "winRate")]
    pub win_rate: String,
    #[serde(rename = "realizedPnl")]
    pub realized_pnl: String,
}

impl PassedRecord {
    pub fn from_metrics(wallet: impl Into<WalletAddress>, win_rate: f64, realized_pnl: f64) -> Self {
        Self {
            wallet: wallet.into(),
            win_rate: format!("{win_rate:.1}%"),
            realized_pnl: format!("{realized_pnl:.1}%"),
        }
    }
}

/// Counters for one run plus the accumulated passing set (including results
/// merged from earlier runs).
#[derive(Debug, Clone, Serialize)]
pub struct ScanSummary {
    pub processed: u64,
    pub passed: u64,
    pub results: Vec<PassedRecord>,
}

/// Emitted once per completed wallet.
#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub worker_id: usize,
    pub wallet: WalletAddress,
    pub kind: OutcomeKind,
    pub processed: u64,
}

/// Cooperative cancellation shared between the signal handler and the worker
/// pool. Checked between wallets, so the in-flight evaluation always finishes.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
