//! Per-wallet evaluation state machine: navigate, wait, settle, extract,
//! classify, with a bounded retry loop around the retryable steps.

use std::time::Duration;

use tracing::{debug, warn};

use crate::extractor::MetricExtractor;
use crate::session::{MarkerSpec, MarkerWait, RenderSession};
use crate::{EvaluationOutcome, Thresholds};

/// Phrases the analytics page renders next to the metrics region.
const METRIC_MARKERS: [&str; 2] = ["Win Rate", "Gross Profit"];

/// Authoritative negative responses. Terminal, never retried.
const NO_DATA_MARKERS: [&str; 2] = ["no data for this wallet", "not a wallet address"];

#[derive(Debug, Clone)]
pub struct EvaluatorConfig {
    /// Per-wallet page URL with a `{wallet}` placeholder.
    pub analyzer_url_template: String,
    /// Total attempts per wallet, not extra retries.
    pub max_retries: u32,
    pub nav_timeout: Duration,
    /// How long to wait for either a metrics or a no-data marker.
    pub render_timeout: Duration,
    /// Pause after the marker appears so the metric values finish filling in.
    pub settle_delay: Duration,
    /// Fixed pause between attempts.
    pub retry_pause: Duration,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            analyzer_url_template: "https://dexcheck.ai/app/wallet-analyzer/{wallet}".to_string(),
            max_retries: 3,
            nav_timeout: Duration::from_secs(60),
            render_timeout: Duration::from_secs(30),
            settle_delay: Duration::from_secs(10),
            retry_pause: Duration::from_secs(2),
        }
    }
}

/// Why a single attempt failed. Decides which terminal outcome is reported
/// once all attempts are spent.
enum AttemptFailure {
    Transient(String),
    Extraction,
}

pub struct WalletEvaluator {
    thresholds: Thresholds,
    config: EvaluatorConfig,
    extractor: MetricExtractor,
    render_marker: MarkerSpec,
}

impl WalletEvaluator {
    pub fn new(thresholds: Thresholds, config: EvaluatorConfig) -> crate::Result<Self> {
        let extractor = MetricExtractor::new()?;
        // One combined wait: whichever of the two page states renders first
        // ends the wait, and the text tells us which one it was.
        let render_marker = MarkerSpec::text_any(
            METRIC_MARKERS.iter().chain(NO_DATA_MARKERS.iter()).copied(),
        );
        Ok(Self {
            thresholds,
            config,
            extractor,
            render_marker,
        })
    }

    pub fn analyzer_url(&self, wallet: &str) -> String {
        self.config.analyzer_url_template.replace("{wallet}", wallet)
    }

    /// Evaluate one wallet on the given session. Always returns an outcome;
    /// failures are folded into the terminal variants, never propagated.
    pub async fn evaluate(&self, session: &mut dyn RenderSession, wallet: &str) -> EvaluationOutcome {
        let url = self.analyzer_url(wallet);
        let mut last_failure = AttemptFailure::Extraction;

        for attempt in 1..=self.config.max_retries.max(1) {
            if attempt > 1 {
                tokio::time::sleep(self.config.retry_pause).await;
            }
            match self.attempt(session, wallet, &url).await {
                Ok(outcome) => return outcome,
                Err(failure) => {
                    match &failure {
                        AttemptFailure::Transient(cause) => {
                            warn!(
                                "Attempt {}/{} for {} hit a transient error: {}",
                                attempt, self.config.max_retries, wallet, cause
                            );
                        }
                        AttemptFailure::Extraction => {
                            warn!(
                                "Attempt {}/{} for {} could not read the metrics",
                                attempt, self.config.max_retries, wallet
                            );
                        }
                    }
                    last_failure = failure;
                }
            }
        }

        match last_failure {
            AttemptFailure::Transient(cause) => EvaluationOutcome::TransientError {
                wallet: wallet.to_string(),
                cause,
            },
            AttemptFailure::Extraction => EvaluationOutcome::ExtractionFailed {
                wallet: wallet.to_string(),
            },
        }
    }

    async fn attempt(
        &self,
        session: &mut dyn RenderSession,
        wallet: &str,
        url: &str,
    ) -> Result<EvaluationOutcome, AttemptFailure> {
        session
            .navigate(url, self.config.nav_timeout)
            .await
            .map_err(|e| AttemptFailure::Transient(format!("navigation: {e}")))?;

        let wait = session
            .wait_for_marker(&self.render_marker, self.config.render_timeout)
            .await
            .map_err(|e| AttemptFailure::Transient(format!("render wait: {e}")))?;
        if wait == MarkerWait::TimedOut {
            debug!("No marker rendered for {} within {:?}", wallet, self.config.render_timeout);
            return Err(AttemptFailure::Extraction);
        }

        let text = session
            .full_text()
            .await
            .map_err(|e| AttemptFailure::Transient(format!("page read: {e}")))?;
        let lower = text.to_lowercase();
        if NO_DATA_MARKERS.iter().any(|m| lower.contains(m)) {
            debug!("Analytics page reports no data for {}", wallet);
            return Ok(EvaluationOutcome::NoData {
                wallet: wallet.to_string(),
            });
        }

        // The metrics marker appeared; the values fill in asynchronously.
        tokio::time::sleep(self.config.settle_delay).await;
        let text = session
            .full_text()
            .await
            .map_err(|e| AttemptFailure::Transient(format!("page read: {e}")))?;

        let win_rate = self.extractor.extract_win_rate(&text);
        let realized_pnl = self.extractor.extract_realized_pnl(&text);
        match (win_rate, realized_pnl) {
            (Some(win_rate), Some(realized_pnl)) => {
                Ok(self.classify(wallet, win_rate, realized_pnl))
            }
            (win, pnl) => {
                debug!(
                    "Metrics unreadable for {} (win rate: {}, realized pnl: {})",
                    wallet,
                    win.map_or("missing".to_string(), |v| v.to_string()),
                    pnl.map_or("missing".to_string(), |v| v.to_string()),
                );
                Err(AttemptFailure::Extraction)
            }
        }
    }

    fn classify(&self, wallet: &str, win_rate: f64, realized_pnl: f64) -> EvaluationOutcome {
        let wallet = wallet.to_string();
        if win_rate >= self.thresholds.min_win_rate
            && realized_pnl >= self.thresholds.min_realized_pnl
        {
            EvaluationOutcome::Passed {
                wallet,
                win_rate,
                realized_pnl,
            }
        } else {
            EvaluationOutcome::FailedCriteria {
                wallet,
                win_rate,
                realized_pnl,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{metrics_page, no_data_page, FakeAttempt, FakeSession};

    fn fast_config() -> EvaluatorConfig {
        EvaluatorConfig {
            analyzer_url_template: "https://analytics.example/wallet/{wallet}".to_string(),
            max_retries: 3,
            nav_timeout: Duration::from_millis(50),
            render_timeout: Duration::from_millis(50),
            settle_delay: Duration::from_millis(0),
            retry_pause: Duration::from_millis(0),
        }
    }

    fn evaluator() -> WalletEvaluator {
        WalletEvaluator::new(Thresholds::default(), fast_config()).unwrap()
    }

    #[test]
    fn url_template_substitution() {
        assert_eq!(
            evaluator().analyzer_url("abc123"),
            "https://analytics.example/wallet/abc123"
        );
    }

    #[tokio::test]
    async fn clean_pass_on_first_attempt() {
        let mut session = FakeSession::new([FakeAttempt::Render(metrics_page(82.0, 250.0))]);
        let outcome = evaluator().evaluate(&mut session, "w1").await;
        assert_eq!(
            outcome,
            EvaluationOutcome::Passed {
                wallet: "w1".to_string(),
                win_rate: 82.0,
                realized_pnl: 250.0,
            }
        );
        assert_eq!(session.navigations(), 1);
    }

    #[tokio::test]
    async fn below_threshold_fails_criteria_with_values() {
        let mut session = FakeSession::new([FakeAttempt::Render(metrics_page(55.0, 300.0))]);
        let outcome = evaluator().evaluate(&mut session, "w1").await;
        assert_eq!(
            outcome,
            EvaluationOutcome::FailedCriteria {
                wallet: "w1".to_string(),
                win_rate: 55.0,
                realized_pnl: 300.0,
            }
        );
    }

    #[tokio::test]
    async fn exact_threshold_values_pass() {
        let mut session = FakeSession::new([FakeAttempt::Render(metrics_page(70.0, 100.0))]);
        let outcome = evaluator().evaluate(&mut session, "w1").await;
        assert!(matches!(outcome, EvaluationOutcome::Passed { .. }));
    }

    #[tokio::test]
    async fn no_data_is_terminal_without_retry() {
        let mut session = FakeSession::new([
            FakeAttempt::Render(no_data_page()),
            FakeAttempt::Render(metrics_page(90.0, 500.0)),
        ]);
        let outcome = evaluator().evaluate(&mut session, "w1").await;
        assert_eq!(
            outcome,
            EvaluationOutcome::NoData {
                wallet: "w1".to_string()
            }
        );
        assert_eq!(session.navigations(), 1);
    }

    #[tokio::test]
    async fn render_timeout_on_every_attempt_is_extraction_failure() {
        let mut session = FakeSession::new([
            FakeAttempt::Timeout,
            FakeAttempt::Timeout,
            FakeAttempt::Timeout,
        ]);
        let outcome = evaluator().evaluate(&mut session, "w1").await;
        assert_eq!(
            outcome,
            EvaluationOutcome::ExtractionFailed {
                wallet: "w1".to_string()
            }
        );
        assert_eq!(session.navigations(), 3);
    }

    #[tokio::test]
    async fn navigation_failure_on_every_attempt_is_transient_error() {
        let mut session = FakeSession::new([
            FakeAttempt::NavError("connection reset".to_string()),
            FakeAttempt::NavError("connection reset".to_string()),
            FakeAttempt::NavError("connection reset".to_string()),
        ]);
        let outcome = evaluator().evaluate(&mut session, "w1").await;
        match outcome {
            EvaluationOutcome::TransientError { wallet, cause } => {
                assert_eq!(wallet, "w1");
                assert!(cause.contains("navigation"), "cause: {cause}");
            }
            other => panic!("expected TransientError, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unreadable_metrics_recover_on_retry() {
        let mut session = FakeSession::new([
            FakeAttempt::Render("<div>Win Rate</div><div>still loading</div>".to_string()),
            FakeAttempt::Render(metrics_page(75.0, 180.0)),
        ]);
        let outcome = evaluator().evaluate(&mut session, "w1").await;
        assert!(matches!(outcome, EvaluationOutcome::Passed { .. }));
        assert_eq!(session.navigations(), 2);
    }

    #[tokio::test]
    async fn navigation_failure_then_success_recovers() {
        let mut session = FakeSession::new([
            FakeAttempt::NavError("tab crashed".to_string()),
            FakeAttempt::Render(metrics_page(10.0, 5.0)),
        ]);
        let outcome = evaluator().evaluate(&mut session, "w1").await;
        assert!(matches!(outcome, EvaluationOutcome::FailedCriteria { .. }));
        assert_eq!(session.navigations(), 2);
    }
}
