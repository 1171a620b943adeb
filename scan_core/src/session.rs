//! The rendering contract the engine needs from a browser page.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("navigation failed: {0}")]
    Navigation(String),
    #[error("page read failed: {0}")]
    Read(String),
    #[error("browser protocol error: {0}")]
    Protocol(String),
}

/// What a render wait is looking for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkerSpec {
    /// A CSS selector resolving to at least one element.
    Css(String),
    /// Any of these phrases present in the rendered text, case-insensitive.
    TextContainsAny(Vec<String>),
}

impl MarkerSpec {
    pub fn text_any<I, S>(phrases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::TextContainsAny(phrases.into_iter().map(Into::into).collect())
    }

    /// Whether this marker is satisfied by the given rendered text. CSS
    /// markers cannot be answered from text alone and always return false.
    pub fn matches_text(&self, text: &str) -> bool {
        match self {
            Self::Css(_) => false,
            Self::TextContainsAny(phrases) => {
                let lower = text.to_lowercase();
                phrases.iter().any(|p| lower.contains(&p.to_lowercase()))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerWait {
    Found,
    TimedOut,
}

/// One navigable browser page. Each pool worker owns exactly one session and
/// drives it strictly sequentially.
#[async_trait]
pub trait RenderSession: Send {
    /// Load `url`, bounded by `timeout`. Returning an error marks the attempt
    /// as transient (retryable).
    async fn navigate(&mut self, url: &str, timeout: Duration) -> Result<(), SessionError>;

    /// Poll until `marker` appears in the rendered page or `timeout` elapses.
    async fn wait_for_marker(
        &mut self,
        marker: &MarkerSpec,
        timeout: Duration,
    ) -> Result<MarkerWait, SessionError>;

    /// The full rendered content of the current page.
    async fn full_text(&mut self) -> Result<String, SessionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_marker_matches_case_insensitively() {
        let marker = MarkerSpec::text_any(["Win Rate", "no data for this wallet"]);
        assert!(marker.matches_text("<h3>WIN RATE</h3>"));
        assert!(marker.matches_text("No Data For This Wallet"));
        assert!(!marker.matches_text("<div>loading...</div>"));
    }

    #[test]
    fn css_marker_never_matches_text() {
        let marker = MarkerSpec::Css("h3.metric".to_string());
        assert!(!marker.matches_text("h3.metric"));
    }
}
