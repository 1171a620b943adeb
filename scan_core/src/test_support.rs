//! Scripted fake render session shared by the engine tests.

use std::time::Duration;

use async_trait::async_trait;

use crate::session::{MarkerSpec, MarkerWait, RenderSession, SessionError};

/// What one navigation attempt should do.
#[derive(Debug, Clone)]
pub(crate) enum FakeAttempt {
    /// Navigation itself fails.
    NavError(String),
    /// Navigation succeeds but no marker ever renders.
    Timeout,
    /// Navigation succeeds and the page renders this text.
    Render(String),
}

pub(crate) struct FakeSession {
    script: Vec<FakeAttempt>,
    /// Replayed once the script is exhausted.
    fallback: FakeAttempt,
    navigations: usize,
}

impl FakeSession {
    pub(crate) fn new(script: impl IntoIterator<Item = FakeAttempt>) -> Self {
        Self {
            script: script.into_iter().collect(),
            fallback: FakeAttempt::Timeout,
            navigations: 0,
        }
    }

    /// A session that renders the same page for every wallet.
    pub(crate) fn always(text: String) -> Self {
        Self {
            script: Vec::new(),
            fallback: FakeAttempt::Render(text),
            navigations: 0,
        }
    }

    pub(crate) fn navigations(&self) -> usize {
        self.navigations
    }

    fn current(&self) -> &FakeAttempt {
        self.script
            .get(self.navigations.saturating_sub(1))
            .unwrap_or(&self.fallback)
    }
}

#[async_trait]
impl RenderSession for FakeSession {
    async fn navigate(&mut self, _url: &str, _timeout: Duration) -> Result<(), SessionError> {
        self.navigations += 1;
        match self.current() {
            FakeAttempt::NavError(cause) => Err(SessionError::Navigation(cause.clone())),
            _ => Ok(()),
        }
    }

    async fn wait_for_marker(
        &mut self,
        marker: &MarkerSpec,
        _timeout: Duration,
    ) -> Result<MarkerWait, SessionError> {
        match self.current() {
            FakeAttempt::Render(text) if marker.matches_text(text) => Ok(MarkerWait::Found),
            _ => Ok(MarkerWait::TimedOut),
        }
    }

    async fn full_text(&mut self) -> Result<String, SessionError> {
        match self.current() {
            FakeAttempt::Render(text) => Ok(text.clone()),
            _ => Err(SessionError::Read("no page loaded".to_string())),
        }
    }
}

/// Page markup in the shape the metric extractor understands.
pub(crate) fn metrics_page(win_rate: f64, realized_pnl: f64) -> String {
    format!(
        concat!(
            r#"<h3 class="label">Win Rate</h3><p class="chakra-text text-2xl">{win:.1}%</p>"#,
            r#"<p>Realized</p><p class="num">$1,234.00 <span class="pct">({pnl:.1}%)</span></p>"#,
        ),
        win = win_rate,
        pnl = realized_pnl,
    )
}

pub(crate) fn no_data_page() -> String {
    "<div class=\"empty-state\">No data for this wallet</div>".to_string()
}
