//! wallet_scout CLI: collect candidate wallets and evaluate them in a pool
//! of headless-browser pages.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use config_manager::{SystemConfig, TokenSource};
use scan_core::{CancelFlag, OutcomeKind, ProgressCallback, ProgressEvent};
use scan_orchestrator::{RunOptions, ScanOrchestrator};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "wallet_scout",
    about = "Discover and evaluate profitable trader wallets",
    version
)]
struct Cli {
    /// Path to the configuration file
    #[arg(long, default_value = "config.toml")]
    config: String,

    /// Number of concurrent browser pages
    #[arg(long)]
    pages: Option<usize>,

    /// Minimum win rate percentage for a wallet to pass
    #[arg(long)]
    min_winrate: Option<f64>,

    /// Minimum realized PnL percentage for a wallet to pass
    #[arg(long)]
    min_pnl: Option<f64>,

    /// Cap on candidate wallets to evaluate this run
    #[arg(long)]
    limit: Option<usize>,

    /// Token source for collection (birdeye or moralis)
    #[arg(long, value_enum)]
    token_source: Option<TokenSourceArg>,

    /// Also collect top traders per token
    #[arg(long)]
    fetch_traders: bool,

    /// Reuse the token list from the previous run instead of re-fetching
    #[arg(long)]
    resume: bool,

    /// Skip collection and evaluate the existing candidate file
    #[arg(long)]
    scan_only: bool,

    /// Delete all data files before starting
    #[arg(long)]
    clean: bool,

    /// Re-run the whole workflow every N minutes until interrupted
    #[arg(long, value_name = "MINUTES")]
    r#loop: Option<u64>,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum TokenSourceArg {
    Birdeye,
    Moralis,
}

impl From<TokenSourceArg> for TokenSource {
    fn from(arg: TokenSourceArg) -> Self {
        match arg {
            TokenSourceArg::Birdeye => TokenSource::Birdeye,
            TokenSourceArg::Moralis => TokenSource::Moralis,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config =
        SystemConfig::load_from_path(&cli.config).context("failed to load configuration")?;
    apply_overrides(&mut config, &cli);
    config.validate().context("invalid configuration")?;

    let orchestrator = ScanOrchestrator::new(config);
    if cli.clean {
        info!("Clean restart: removing existing data files");
        orchestrator.data_paths().clean_restart().await?;
    }

    let cancel = CancelFlag::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, finishing in-flight wallets and flushing results");
                cancel.cancel();
            }
        });
    }

    let options = RunOptions {
        token_source: cli.token_source.map(Into::into),
        fetch_top_traders: if cli.fetch_traders { Some(true) } else { None },
        resume: cli.resume,
        scan_only: cli.scan_only,
        wallet_limit: cli.limit,
    };
    let progress = progress_printer();

    loop {
        let summary = orchestrator
            .run_complete_workflow(&options, cancel.clone(), Some(progress.clone()))
            .await?;
        println!();
        println!(
            "Processed {} wallet(s), {} passed this run, {} result(s) on file",
            summary.processed,
            summary.passed,
            summary.results.len()
        );

        if cancel.is_cancelled() {
            break;
        }
        match cli.r#loop {
            Some(minutes) => {
                info!("Next run in {} minute(s)", minutes);
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_secs(minutes * 60)) => {}
                    _ = wait_for_cancel(cancel.clone()) => break,
                }
            }
            None => break,
        }
    }
    Ok(())
}

fn apply_overrides(config: &mut SystemConfig, cli: &Cli) {
    if let Some(pages) = cli.pages {
        config.scanner.worker_count = pages;
    }
    if let Some(min_winrate) = cli.min_winrate {
        config.scanner.min_win_rate = min_winrate;
    }
    if let Some(min_pnl) = cli.min_pnl {
        config.scanner.min_realized_pnl = min_pnl;
    }
    if let Some(source) = cli.token_source {
        config.system.token_source = source.into();
    }
    if cli.fetch_traders {
        config.system.fetch_top_traders = true;
    }
}

/// Single-line progress output, rewritten in place per completed wallet.
fn progress_printer() -> ProgressCallback {
    Arc::new(|event: ProgressEvent| {
        let mark = match event.kind {
            OutcomeKind::Passed => "PASS",
            OutcomeKind::FailedCriteria => "fail",
            OutcomeKind::NoData => "none",
            OutcomeKind::ExtractionFailed => "unreadable",
            OutcomeKind::TransientError => "error",
        };
        print!(
            "\r[{} processed] worker {} -> {} ({})        ",
            event.processed, event.worker_id, event.wallet, mark
        );
        let _ = std::io::stdout().flush();
    })
}

async fn wait_for_cancel(cancel: CancelFlag) {
    while !cancel.is_cancelled() {
        tokio::time::sleep(Duration::from_millis(250)).await;
    }
}
