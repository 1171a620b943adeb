//! The persistent "already scanned" set.

use std::collections::HashSet;

use async_trait::async_trait;
use tokio::sync::Mutex;

/// Deduplication ledger consulted before a wallet is handed to a worker and
/// written the instant a worker claims one. Membership means "ever scanned",
/// regardless of outcome.
#[async_trait]
pub trait ScanLedger: Send + Sync {
    async fn contains(&self, wallet: &str) -> bool;

    /// Record that `wallet` has been claimed. Durability is best-effort:
    /// callers log a failure and keep going.
    async fn record(&self, wallet: &str) -> anyhow::Result<()>;
}

/// In-memory ledger for tests and ephemeral runs.
#[derive(Debug, Default)]
pub struct MemoryScanLedger {
    seen: Mutex<HashSet<String>>,
}

impl MemoryScanLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.seen.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.seen.lock().await.is_empty()
    }
}

#[async_trait]
impl ScanLedger for MemoryScanLedger {
    async fn contains(&self, wallet: &str) -> bool {
        self.seen.lock().await.contains(wallet)
    }

    async fn record(&self, wallet: &str) -> anyhow::Result<()> {
        self.seen.lock().await.insert(wallet.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_and_reports_membership() {
        let ledger = MemoryScanLedger::new();
        assert!(!ledger.contains("w1").await);
        ledger.record("w1").await.unwrap();
        assert!(ledger.contains("w1").await);
        assert!(!ledger.contains("w2").await);
        assert_eq!(ledger.len().await, 1);
    }

    #[tokio::test]
    async fn recording_twice_is_harmless() {
        let ledger = MemoryScanLedger::new();
        ledger.record("w1").await.unwrap();
        ledger.record("w1").await.unwrap();
        assert_eq!(ledger.len().await, 1);
    }
}
