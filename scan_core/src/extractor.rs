//! Layered extraction of the two wallet metrics from rendered page text.

use regex::Regex;

/// Pulls win rate and realized PnL out of the analytics page markup.
///
/// Matchers are ordered most-specific first; the first one that yields a sane
/// value wins. The page is a React app whose markup drifts between deploys,
/// so the fallbacks are deliberately loose.
pub struct MetricExtractor {
    win_rate_patterns: Vec<Regex>,
    realized_pnl_patterns: Vec<Regex>,
}

impl MetricExtractor {
    pub fn new() -> crate::Result<Self> {
        let win_rate_patterns = vec![
            // Current layout: heading followed by the large percentage text.
            Regex::new(r"(?i)Win Rate</h3><p[^>]*text-2xl[^>]*>([0-9.]+)%")?,
            // Loose: first percentage within reach of the label.
            Regex::new(r"(?is)Win Rate.{0,120}?([0-9.]+)%")?,
        ];
        let realized_pnl_patterns = vec![
            // Dollar figure with the percentage in a trailing span.
            Regex::new(r"(?i)Realized</p><p[^>]*>\$[0-9,.]+\s*<span[^>]*>\((-?[0-9.]+)%\)</span>")?,
            // Loose: label, a dollar amount, then the first parenthesised percentage.
            Regex::new(r"(?i)Realized[^$]*\$[0-9,.]+[^(]*\((-?[0-9.]+)%\)")?,
        ];
        Ok(Self {
            win_rate_patterns,
            realized_pnl_patterns,
        })
    }

    /// Win rate in percent, or `None` if no matcher produced a value in
    /// [0, 100]. An out-of-range capture falls through to the next matcher.
    pub fn extract_win_rate(&self, text: &str) -> Option<f64> {
        first_sane(&self.win_rate_patterns, text, |v| (0.0..=100.0).contains(&v))
    }

    /// Realized PnL in percent. Signed and unbounded.
    pub fn extract_realized_pnl(&self, text: &str) -> Option<f64> {
        first_sane(&self.realized_pnl_patterns, text, |_| true)
    }
}

fn first_sane(patterns: &[Regex], text: &str, sane: impl Fn(f64) -> bool) -> Option<f64> {
    for pattern in patterns {
        if let Some(captures) = pattern.captures(text) {
            if let Ok(value) = captures[1].parse::<f64>() {
                if sane(value) {
                    return Some(value);
                }
            }
        }
    }
    None
}
