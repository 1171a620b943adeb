//! End-to-end workflow: collect tokens, collect candidate wallets per token,
//! then run the browser evaluation engine over the candidates.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use browser_session::{BrowserError, HeadlessBrowser};
use config_manager::{SystemConfig, TokenSource};
use persistence_layer::{
    read_json, write_json_atomic, write_lines, DataPaths, FileScanLedger, JsonResultStore,
    PersistenceError,
};
use rand::Rng;
use scan_core::{
    CancelFlag, EngineError, EvaluatorConfig, PageWorkerPool, ProgressCallback, RenderSession,
    ResultAggregator, ScanSummary, Thresholds, WalletEvaluator,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use token_api::{ApiError, BirdEyeClient, MoralisClient};
use tokio::time::sleep;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("Persistence error: {0}")]
    Persistence(String),
    #[error("API error: {0}")]
    Api(String),
    #[error("Browser error: {0}")]
    Browser(String),
    #[error("Engine error: {0}")]
    Engine(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Anyhow error: {0}")]
    Anyhow(String),
}

impl From<PersistenceError> for OrchestratorError {
    fn from(err: PersistenceError) -> Self {
        OrchestratorError::Persistence(err.to_string())
    }
}

impl From<ApiError> for OrchestratorError {
    fn from(err: ApiError) -> Self {
        OrchestratorError::Api(err.to_string())
    }
}

impl From<BrowserError> for OrchestratorError {
    fn from(err: BrowserError) -> Self {
        OrchestratorError::Browser(err.to_string())
    }
}

impl From<EngineError> for OrchestratorError {
    fn from(err: EngineError) -> Self {
        OrchestratorError::Engine(err.to_string())
    }
}

impl From<anyhow::Error> for OrchestratorError {
    fn from(err: anyhow::Error) -> Self {
        OrchestratorError::Anyhow(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// Per-run overrides on top of the loaded configuration.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Override the configured token source.
    pub token_source: Option<TokenSource>,
    /// Override the configured top-trader collection toggle.
    pub fetch_top_traders: Option<bool>,
    /// Reuse the token list already on disk instead of re-fetching it, then
    /// continue wallet collection where the last run stopped.
    pub resume: bool,
    /// Skip collection and evaluate the existing candidate file.
    pub scan_only: bool,
    /// Cap on candidate wallets handed to the scanner.
    pub wallet_limit: Option<usize>,
}

/// Candidate wallets collected for one token. `holders.json` is a list of
/// these, appended token by token so an interrupted collection resumes where
/// it stopped.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenWallets {
    pub token: String,
    pub wallets: Vec<String>,
}

pub struct ScanOrchestrator {
    config: SystemConfig,
    paths: DataPaths,
}

impl ScanOrchestrator {
    pub fn new(config: SystemConfig) -> Self {
        let paths = DataPaths::new(config.storage.data_dir.clone());
        Self { config, paths }
    }

    pub fn data_paths(&self) -> &DataPaths {
        &self.paths
    }

    /// Run collection (unless `scan_only`) followed by the evaluation phase.
    /// Returns the evaluation summary; collection state is on disk either way.
    pub async fn run_complete_workflow(
        &self,
        options: &RunOptions,
        cancel: CancelFlag,
        progress: Option<ProgressCallback>,
    ) -> Result<ScanSummary> {
        self.paths.ensure_exists().await?;

        if !options.scan_only {
            let source = options.token_source.unwrap_or(self.config.system.token_source);
            let existing = persistence_layer::read_lines(&self.paths.tokens_txt()).await?;
            let tokens = if options.resume && !existing.is_empty() {
                info!("Resuming with {} token(s) from the previous run", existing.len());
                existing
            } else {
                self.collect_tokens(source).await?
            };
            if cancel.is_cancelled() {
                info!("Cancelled after token collection");
                return Ok(empty_summary());
            }
            self.collect_wallets(source, &tokens, options, &cancel).await?;
        }

        if cancel.is_cancelled() {
            info!("Cancelled before the evaluation phase");
            return Ok(empty_summary());
        }
        self.run_evaluation_phase(options, cancel, progress).await
    }

    /// Phase 1: fetch the token list from the chosen source and persist it.
    async fn collect_tokens(&self, source: TokenSource) -> Result<Vec<String>> {
        info!("Collecting tokens from {}", source);
        let addresses: Vec<String> = match source {
            TokenSource::Birdeye => {
                let client = BirdEyeClient::new(self.config.birdeye.clone())?;
                let tokens = client.get_token_list().await?;
                write_json_atomic(&self.paths.tokens_json(), &tokens).await?;
                tokens.into_iter().map(|t| t.address).collect()
            }
            TokenSource::Moralis => {
                let client = MoralisClient::new(self.config.moralis.clone())?;
                let tokens = client.get_graduated_tokens().await?;
                write_json_atomic(&self.paths.tokens_json(), &tokens).await?;
                tokens.into_iter().map(|t| t.token_address).collect()
            }
        };
        write_lines(&self.paths.tokens_txt(), &addresses).await?;
        info!("Collected {} tokens", addresses.len());
        Ok(addresses)
    }

    /// Phase 2: fetch candidate wallets per token, resuming past progress and
    /// pacing requests with a jittered delay. A failed token is logged and
    /// skipped, never fatal.
    async fn collect_wallets(
        &self,
        source: TokenSource,
        tokens: &[String],
        options: &RunOptions,
        cancel: &CancelFlag,
    ) -> Result<()> {
        let mut collected: Vec<TokenWallets> =
            read_json(&self.paths.holders_json()).await?.unwrap_or_default();
        let remaining = tokens_to_collect(tokens, &collected);
        info!(
            "Collecting wallets for {} token(s) ({} already collected)",
            remaining.len(),
            collected.len()
        );

        let fetch_traders = options
            .fetch_top_traders
            .unwrap_or(self.config.system.fetch_top_traders);
        let birdeye = match source {
            TokenSource::Birdeye => Some(BirdEyeClient::new(self.config.birdeye.clone())?),
            TokenSource::Moralis if fetch_traders => {
                Some(BirdEyeClient::new(self.config.birdeye.clone())?)
            }
            TokenSource::Moralis => None,
        };
        let moralis = match source {
            TokenSource::Moralis => Some(MoralisClient::new(self.config.moralis.clone())?),
            TokenSource::Birdeye => None,
        };

        for (i, token) in remaining.iter().enumerate() {
            if cancel.is_cancelled() {
                info!("Cancelled during wallet collection ({}/{})", i, remaining.len());
                break;
            }

            let mut wallets = Vec::new();
            if let Some(ref moralis) = moralis {
                match moralis.get_top_holders(token).await {
                    Ok(holders) => {
                        wallets.extend(holders.into_iter().map(|h| h.owner_address));
                    }
                    Err(e) => {
                        warn!("Skipping holders for {}: {}", token, e);
                    }
                }
            }
            if let Some(ref birdeye) = birdeye {
                match birdeye.get_top_traders(token).await {
                    Ok(traders) => {
                        wallets.extend(traders.into_iter().map(|t| t.owner));
                    }
                    Err(e) => {
                        warn!("Skipping traders for {}: {}", token, e);
                    }
                }
            }

            let wallets = dedupe_preserving_order(wallets);
            info!(
                "Token {}/{} {}: {} candidate wallet(s)",
                i + 1,
                remaining.len(),
                token,
                wallets.len()
            );
            collected.push(TokenWallets {
                token: token.clone(),
                wallets,
            });
            // Incremental save, so a crash costs at most one token.
            self.save_collection(&collected).await?;

            if i + 1 < remaining.len() {
                let delay = rand::thread_rng().gen_range(1500..3000);
                sleep(Duration::from_millis(delay)).await;
            }
        }

        self.save_collection(&collected).await?;
        Ok(())
    }

    async fn save_collection(&self, collected: &[TokenWallets]) -> Result<()> {
        write_json_atomic(&self.paths.holders_json(), &collected).await?;
        let all: Vec<String> = collected.iter().flat_map(|t| t.wallets.clone()).collect();
        write_lines(&self.paths.holders_txt(), &all).await?;
        let candidates = dedupe_preserving_order(all);
        write_lines(&self.paths.owner_addresses(), &candidates).await?;
        Ok(())
    }

    /// Phase 3: evaluate the candidate wallets in the browser pool.
    async fn run_evaluation_phase(
        &self,
        options: &RunOptions,
        cancel: CancelFlag,
        progress: Option<ProgressCallback>,
    ) -> Result<ScanSummary> {
        let mut candidates =
            persistence_layer::read_lines(&self.paths.owner_addresses()).await?;
        if let Some(limit) = options.wallet_limit {
            candidates.truncate(limit);
        }
        if candidates.is_empty() {
            warn!("No candidate wallets to evaluate");
            return Ok(empty_summary());
        }
        info!("Evaluating {} candidate wallet(s)", candidates.len());

        let scanner = &self.config.scanner;
        let thresholds = Thresholds {
            min_win_rate: scanner.min_win_rate,
            min_realized_pnl: scanner.min_realized_pnl,
        };
        let evaluator_config = EvaluatorConfig {
            analyzer_url_template: scanner.analyzer_url_template.clone(),
            max_retries: scanner.max_retries,
            nav_timeout: Duration::from_secs(self.config.browser.nav_timeout_seconds),
            render_timeout: Duration::from_secs(scanner.render_timeout_seconds),
            settle_delay: Duration::from_secs(scanner.settle_delay_seconds),
            retry_pause: Duration::from_secs(scanner.retry_pause_seconds),
        };
        let evaluator = WalletEvaluator::new(thresholds, evaluator_config)?;

        let ledger = Arc::new(FileScanLedger::load(self.paths.scanned_wallets()).await?);
        let store = Arc::new(JsonResultStore::at(&self.paths));
        let seed = store.load().await?;

        // The one fatal setup error of a run.
        let browser = HeadlessBrowser::launch(self.config.browser.clone()).await?;
        let worker_count = scanner.worker_count.min(candidates.len()).max(1);
        let mut sessions: Vec<Box<dyn RenderSession>> = Vec::with_capacity(worker_count);
        for _ in 0..worker_count {
            sessions.push(Box::new(browser.new_session().await?));
        }

        let pool = PageWorkerPool::new(
            evaluator,
            ledger,
            Duration::from_millis(scanner.pacing_delay_ms),
        );
        let aggregator = ResultAggregator::new(store, seed);
        let summary = pool
            .run_evaluation(sessions, candidates, aggregator, progress, cancel)
            .await;

        browser.close().await;
        info!(
            "Run complete: {} processed, {} passed, {} total result(s)",
            summary.processed,
            summary.passed,
            summary.results.len()
        );
        Ok(summary)
    }
}

fn empty_summary() -> ScanSummary {
    ScanSummary {
        processed: 0,
        passed: 0,
        results: Vec::new(),
    }
}

/// Tokens that still need wallet collection, preserving input order.
fn tokens_to_collect(tokens: &[String], collected: &[TokenWallets]) -> Vec<String> {
    let done: HashSet<&str> = collected.iter().map(|t| t.token.as_str()).collect();
    tokens
        .iter()
        .filter(|t| !done.contains(t.as_str()))
        .cloned()
        .collect()
}

fn dedupe_preserving_order(items: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    items.into_iter().filter(|w| seen.insert(w.clone())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(token: &str, wallets: &[&str]) -> TokenWallets {
        TokenWallets {
            token: token.to_string(),
            wallets: wallets.iter().map(|w| w.to_string()).collect(),
        }
    }

    #[test]
    fn resume_skips_collected_tokens() {
        let tokens = vec!["t1".to_string(), "t2".to_string(), "t3".to_string()];
        let collected = vec![entry("t2", &["w1"])];
        assert_eq!(tokens_to_collect(&tokens, &collected), vec!["t1", "t3"]);
    }

    #[test]
    fn nothing_collected_means_everything_remains() {
        let tokens = vec!["t1".to_string(), "t2".to_string()];
        assert_eq!(tokens_to_collect(&tokens, &[]), tokens);
    }

    #[test]
    fn dedupe_keeps_first_occurrence_order() {
        let input = vec![
            "w2".to_string(),
            "w1".to_string(),
            "w2".to_string(),
            "w3".to_string(),
            "w1".to_string(),
        ];
        assert_eq!(dedupe_preserving_order(input), vec!["w2", "w1", "w3"]);
    }

    #[test]
    fn token_wallets_round_trips_through_json() {
        let collected = vec![entry("t1", &["w1", "w2"]), entry("t2", &[])];
        let json = serde_json::to_string(&collected).unwrap();
        let reloaded: Vec<TokenWallets> = serde_json::from_str(&json).unwrap();
        assert_eq!(reloaded, collected);
    }
}
