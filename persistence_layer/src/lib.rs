//! File-backed persistence: the scan ledger, the checkpointed result set,
//! and the token/holder collection files.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use scan_core::{CheckpointSink, PassedRecord, ScanLedger};
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PersistenceError>;

/// Well-known file locations under the data directory.
#[derive(Debug, Clone)]
pub struct DataPaths {
    root: PathBuf,
}

impl DataPaths {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self { root: data_dir.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn tokens_json(&self) -> PathBuf {
        self.root.join("tokens.json")
    }

    pub fn tokens_txt(&self) -> PathBuf {
        self.root.join("tokens.txt")
    }

    pub fn holders_json(&self) -> PathBuf {
        self.root.join("holders.json")
    }

    pub fn holders_txt(&self) -> PathBuf {
        self.root.join("holders.txt")
    }

    pub fn owner_addresses(&self) -> PathBuf {
        self.root.join("owner_addresses.txt")
    }

    pub fn good_wallets_json(&self) -> PathBuf {
        self.root.join("good_wallets.json")
    }

    pub fn good_wallets_txt(&self) -> PathBuf {
        self.root.join("good_wallets.txt")
    }

    pub fn scanned_wallets(&self) -> PathBuf {
        self.root.join("scanned_wallets.txt")
    }

    pub async fn ensure_exists(&self) -> Result<()> {
        fs::create_dir_all(&self.root).await?;
        Ok(())
    }

    /// Delete every known data file. Used by the clean-restart flag.
    pub async fn clean_restart(&self) -> Result<()> {
        let files = [
            self.tokens_json(),
            self.tokens_txt(),
            self.holders_json(),
            self.holders_txt(),
            self.owner_addresses(),
            self.good_wallets_json(),
            self.good_wallets_txt(),
            self.scanned_wallets(),
        ];
        for file in files {
            match fs::remove_file(&file).await {
                Ok(()) => info!("Removed {}", file.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

/// Read a JSON file into `T`. A missing file yields `None`.
pub async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match fs::read_to_string(path).await {
        Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Write `value` as pretty JSON via a temp file and atomic rename, so a
/// crash mid-write never leaves a partial document behind.
pub async fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json.as_bytes()).await?;
    fs::rename(&tmp, path).await?;
    Ok(())
}

/// Read non-empty lines from a text file. A missing file yields an empty list.
pub async fn read_lines(path: &Path) -> Result<Vec<String>> {
    match fs::read_to_string(path).await {
        Ok(content) => Ok(content
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e.into()),
    }
}

pub async fn write_lines(path: &Path, lines: &[String]) -> Result<()> {
    let mut content = lines.join("\n");
    if !content.is_empty() {
        content.push('\n');
    }
    fs::write(path, content.as_bytes()).await?;
    Ok(())
}

/// The persistent "already scanned" set: one `wallet|unixSeconds` line per
/// claimed wallet, appended and flushed the moment a worker picks the wallet
/// up. Timestamps are informational; membership is what matters.
pub struct FileScanLedger {
    path: PathBuf,
    seen: Mutex<HashSet<String>>,
}

impl FileScanLedger {
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let mut seen = HashSet::new();
        for line in read_lines(&path).await? {
            // Tolerate bare addresses from hand-edited files.
            let wallet = line.split('|').next().unwrap_or(&line).trim();
            if !wallet.is_empty() {
                seen.insert(wallet.to_string());
            }
        }
        info!("Scan ledger {}: {} wallets", path.display(), seen.len());
        Ok(Self {
            path,
            seen: Mutex::new(seen),
        })
    }

    pub async fn len(&self) -> usize {
        self.seen.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.seen.lock().await.is_empty()
    }

    async fn append(&self, wallet: &str) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        let line = format!("{}|{}\n", wallet, Utc::now().timestamp());
        file.write_all(line.as_bytes()).await?;
        file.sync_data().await?;
        Ok(())
    }
}

#[async_trait]
impl ScanLedger for FileScanLedger {
    async fn contains(&self, wallet: &str) -> bool {
        self.seen.lock().await.contains(wallet)
    }

    async fn record(&self, wallet: &str) -> anyhow::Result<()> {
        {
            let mut seen = self.seen.lock().await;
            if !seen.insert(wallet.to_string()) {
                return Ok(());
            }
        }
        self.append(wallet).await?;
        Ok(())
    }
}

/// The checkpointed passing-wallet result set: a JSON array of records in
/// `good_wallets.json`, rewritten atomically on every checkpoint, plus the
/// companion plain-address list in `good_wallets.txt`.
pub struct JsonResultStore {
    json_path: PathBuf,
    txt_path: PathBuf,
}

impl JsonResultStore {
    pub fn new(json_path: impl Into<PathBuf>, txt_path: impl Into<PathBuf>) -> Self {
        Self {
            json_path: json_path.into(),
            txt_path: txt_path.into(),
        }
    }

    pub fn at(paths: &DataPaths) -> Self {
        Self::new(paths.good_wallets_json(), paths.good_wallets_txt())
    }

    /// Load the existing result set. A corrupt file is logged and treated as
    /// empty rather than aborting the run.
    pub async fn load(&self) -> Result<Vec<PassedRecord>> {
        match read_json::<Vec<PassedRecord>>(&self.json_path).await {
            Ok(Some(records)) => {
                info!(
                    "Loaded {} existing result(s) from {}",
                    records.len(),
                    self.json_path.display()
                );
                Ok(records)
            }
            Ok(None) => {
                debug!("No existing result file at {}", self.json_path.display());
                Ok(Vec::new())
            }
            Err(PersistenceError::Serialization(e)) => {
                warn!(
                    "Result file {} is corrupt ({}), starting from an empty set",
                    self.json_path.display(),
                    e
                );
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }

    pub async fn write(&self, results: &[PassedRecord]) -> Result<()> {
        write_json_atomic(&self.json_path, &results).await?;
        let addresses: Vec<String> = results.iter().map(|r| r.wallet.clone()).collect();
        write_lines(&self.txt_path, &addresses).await?;
        Ok(())
    }
}

#[async_trait]
impl CheckpointSink for JsonResultStore {
    async fn checkpoint(&self, results: &[PassedRecord]) -> anyhow::Result<()> {
        self.write(results).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn temp_paths() -> (TempDir, DataPaths) {
        let dir = TempDir::new().unwrap();
        let paths = DataPaths::new(dir.path());
        (dir, paths)
    }

    #[tokio::test]
    async fn ledger_starts_empty_for_missing_file() {
        let (_dir, paths) = temp_paths();
        let ledger = FileScanLedger::load(paths.scanned_wallets()).await.unwrap();
        assert!(ledger.is_empty().await);
        assert!(!ledger.contains("w1").await);
    }

    #[tokio::test]
    async fn ledger_record_appends_timestamped_line() {
        let (_dir, paths) = temp_paths();
        let ledger = FileScanLedger::load(paths.scanned_wallets()).await.unwrap();
        ledger.record("wallet1").await.unwrap();
        ledger.record("wallet2").await.unwrap();

        let lines = read_lines(&paths.scanned_wallets()).await.unwrap();
        assert_eq!(lines.len(), 2);
        let (wallet, timestamp) = lines[0].split_once('|').unwrap();
        assert_eq!(wallet, "wallet1");
        assert!(timestamp.parse::<i64>().unwrap() > 0);
    }

    #[tokio::test]
    async fn ledger_survives_reload() {
        let (_dir, paths) = temp_paths();
        {
            let ledger = FileScanLedger::load(paths.scanned_wallets()).await.unwrap();
            ledger.record("wallet1").await.unwrap();
        }
        let reloaded = FileScanLedger::load(paths.scanned_wallets()).await.unwrap();
        assert!(reloaded.contains("wallet1").await);
        assert!(!reloaded.contains("wallet2").await);
        assert_eq!(reloaded.len().await, 1);
    }

    #[tokio::test]
    async fn ledger_deduplicates_repeat_records() {
        let (_dir, paths) = temp_paths();
        let ledger = FileScanLedger::load(paths.scanned_wallets()).await.unwrap();
        ledger.record("wallet1").await.unwrap();
        ledger.record("wallet1").await.unwrap();
        let lines = read_lines(&paths.scanned_wallets()).await.unwrap();
        assert_eq!(lines.len(), 1);
    }

    #[tokio::test]
    async fn ledger_tolerates_bare_addresses() {
        let (_dir, paths) = temp_paths();
        tokio::fs::write(paths.scanned_wallets(), "walletA\nwalletB|1714000000\n")
            .await
            .unwrap();
        let ledger = FileScanLedger::load(paths.scanned_wallets()).await.unwrap();
        assert!(ledger.contains("walletA").await);
        assert!(ledger.contains("walletB").await);
    }

    #[tokio::test]
    async fn result_store_round_trips() {
        let (_dir, paths) = temp_paths();
        let store = JsonResultStore::at(&paths);
        let records = vec![
            PassedRecord::from_metrics("w1", 75.0, 150.0),
            PassedRecord::from_metrics("w2", 88.8, 420.5),
        ];
        store.write(&records).await.unwrap();

        let reloaded = store.load().await.unwrap();
        assert_eq!(reloaded, records);

        let addresses = read_lines(&paths.good_wallets_txt()).await.unwrap();
        assert_eq!(addresses, vec!["w1", "w2"]);
    }

    #[tokio::test]
    async fn result_store_missing_file_is_empty() {
        let (_dir, paths) = temp_paths();
        let store = JsonResultStore::at(&paths);
        assert!(store.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn result_store_corrupt_file_is_empty() {
        let (_dir, paths) = temp_paths();
        tokio::fs::write(paths.good_wallets_json(), "{not json")
            .await
            .unwrap();
        let store = JsonResultStore::at(&paths);
        assert!(store.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn checkpoint_leaves_no_temp_file() {
        let (_dir, paths) = temp_paths();
        let store = JsonResultStore::at(&paths);
        store
            .checkpoint(&[PassedRecord::from_metrics("w1", 90.0, 300.0)])
            .await
            .unwrap();
        assert!(paths.good_wallets_json().exists());
        assert!(!paths.good_wallets_json().with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn clean_restart_removes_data_files() {
        let (_dir, paths) = temp_paths();
        tokio::fs::write(paths.tokens_txt(), "t1\n").await.unwrap();
        tokio::fs::write(paths.scanned_wallets(), "w1|1\n").await.unwrap();
        paths.clean_restart().await.unwrap();
        assert!(!paths.tokens_txt().exists());
        assert!(!paths.scanned_wallets().exists());
        // Missing files are fine on a second pass.
        paths.clean_restart().await.unwrap();
    }

    #[tokio::test]
    async fn line_helpers_round_trip() {
        let (_dir, paths) = temp_paths();
        let lines = vec!["a".to_string(), "b".to_string()];
        write_lines(&paths.owner_addresses(), &lines).await.unwrap();
        assert_eq!(read_lines(&paths.owner_addresses()).await.unwrap(), lines);
    }
}
