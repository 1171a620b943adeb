use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("Configuration loading error: {0}")]
    ConfigLoad(#[from] ConfigError),
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

pub type Result<T> = std::result::Result<T, ConfigurationError>;

/// Which upstream API supplies the candidate token list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenSource {
    /// BirdEye liquidity-window token list
    Birdeye,
    /// Moralis PumpFun graduated tokens
    Moralis,
}

impl std::fmt::Display for TokenSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenSource::Birdeye => write!(f, "birdeye"),
            TokenSource::Moralis => write!(f, "moralis"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfig {
    /// General system settings
    pub system: SystemSettings,

    /// BirdEye API configuration (token list and top traders)
    pub birdeye: BirdEyeConfig,

    /// Moralis API configuration (graduated tokens and top holders)
    pub moralis: MoralisConfig,

    /// Wallet scanner configuration (worker pool, thresholds, timing)
    pub scanner: ScannerConfig,

    /// Headless Chrome configuration
    pub browser: ChromeConfig,

    /// On-disk data directory configuration
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemSettings {
    /// Enable debug mode (extra per-item logging)
    pub debug_mode: bool,

    /// Which API the token collection step uses by default
    pub token_source: TokenSource,

    /// Also collect top traders per token and merge them into the
    /// candidate wallet set
    pub fetch_top_traders: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BirdEyeConfig {
    /// BirdEye API key
    pub api_key: String,

    /// BirdEye API base URL
    pub api_base_url: String,

    /// Request timeout in seconds
    pub request_timeout_seconds: u64,

    /// Maximum number of tokens to fetch from the token list
    pub token_limit: u32,

    /// Liquidity window for token discovery (USD)
    pub min_liquidity: f64,
    pub max_liquidity: f64,

    /// Maximum traders to request per token
    pub max_traders_per_token: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoralisConfig {
    /// Moralis API key
    pub api_key: String,

    /// Moralis Solana gateway base URL
    pub api_base_url: String,

    /// Request timeout in seconds
    pub request_timeout_seconds: u64,

    /// Maximum number of graduated tokens to fetch
    pub token_limit: u32,

    /// Maximum holders to request per token
    pub max_holders_per_token: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerConfig {
    /// Number of concurrent browser pages (soft cap advisory: 10)
    pub worker_count: usize,

    /// Minimum win rate percentage for a wallet to pass
    pub min_win_rate: f64,

    /// Minimum realized PnL (return percentage, not dollars) to pass
    pub min_realized_pnl: f64,

    /// Attempts per wallet for retryable failures
    pub max_retries: u32,

    /// How long to wait for the analytics page to render its data
    pub render_timeout_seconds: u64,

    /// Settle delay after the metrics region appears, letting the
    /// async value-fill finish before reading the page
    pub settle_delay_seconds: u64,

    /// Pause between retry attempts on the same wallet
    pub retry_pause_seconds: u64,

    /// Pacing delay between successive wallets on the same worker
    pub pacing_delay_ms: u64,

    /// Analytics URL template; `{wallet}` is replaced per wallet
    pub analyzer_url_template: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChromeConfig {
    /// Chrome executable path (None = system default)
    pub chrome_executable_path: Option<String>,

    /// Run the browser headless
    pub headless_mode: bool,

    /// Apply stealth arguments and scripts
    pub anti_detection_enabled: bool,

    /// Navigation timeout in seconds
    pub nav_timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding the scan ledger, result set and collection files
    pub data_dir: String,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            system: SystemSettings {
                debug_mode: false,
                token_source: TokenSource::Birdeye,
                fetch_top_traders: false,
            },
            birdeye: BirdEyeConfig {
                api_key: "".to_string(), // Must be set in .env or config file
                api_base_url: "https://public-api.birdeye.so".to_string(),
                request_timeout_seconds: 30,
                token_limit: 100,
                min_liquidity: 100_000.0,
                max_liquidity: 500_000.0,
                max_traders_per_token: 100,
            },
            moralis: MoralisConfig {
                api_key: "".to_string(), // Must be set in .env or config file
                api_base_url: "https://solana-gateway.moralis.io".to_string(),
                request_timeout_seconds: 30,
                token_limit: 100,
                max_holders_per_token: 100,
            },
            scanner: ScannerConfig {
                worker_count: 3,
                min_win_rate: 70.0,
                min_realized_pnl: 100.0,
                max_retries: 3,
                render_timeout_seconds: 30,
                settle_delay_seconds: 10,
                retry_pause_seconds: 2,
                pacing_delay_ms: 1000,
                analyzer_url_template: "https://dexcheck.ai/app/wallet-analyzer/{wallet}"
                    .to_string(),
            },
            browser: ChromeConfig {
                chrome_executable_path: None,
                headless_mode: true,
                anti_detection_enabled: true,
                nav_timeout_seconds: 60,
            },
            storage: StorageConfig {
                data_dir: "data".to_string(),
            },
        }
    }
}

impl BirdEyeConfig {
    pub fn validate(&self) -> Result<()> {
        if self.api_key.is_empty() {
            return Err(ConfigurationError::InvalidValue(
                "BirdEye API key is required".to_string(),
            ));
        }
        if self.request_timeout_seconds == 0 {
            return Err(ConfigurationError::InvalidValue(
                "BirdEye request timeout must be greater than 0".to_string(),
            ));
        }
        if self.min_liquidity > self.max_liquidity {
            return Err(ConfigurationError::InvalidValue(
                "BirdEye min_liquidity cannot exceed max_liquidity".to_string(),
            ));
        }
        Ok(())
    }
}

impl MoralisConfig {
    pub fn validate(&self) -> Result<()> {
        if self.api_key.is_empty() {
            return Err(ConfigurationError::InvalidValue(
                "Moralis API key is required".to_string(),
            ));
        }
        if self.request_timeout_seconds == 0 {
            return Err(ConfigurationError::InvalidValue(
                "Moralis request timeout must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

impl ScannerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.worker_count == 0 {
            return Err(ConfigurationError::InvalidValue(
                "Scanner worker_count must be at least 1".to_string(),
            ));
        }
        if self.worker_count > 10 {
            warn!(
                "Scanner worker_count {} exceeds the advisory cap of 10; \
                 expect high memory use",
                self.worker_count
            );
        }
        if !(0.0..=100.0).contains(&self.min_win_rate) {
            return Err(ConfigurationError::InvalidValue(
                "Scanner min_win_rate must be between 0 and 100".to_string(),
            ));
        }
        if self.render_timeout_seconds == 0 {
            return Err(ConfigurationError::InvalidValue(
                "Scanner render_timeout_seconds must be greater than 0".to_string(),
            ));
        }
        if !(8..=30).contains(&self.render_timeout_seconds) {
            warn!(
                "Scanner render_timeout_seconds {} is outside the intended 8-30s range",
                self.render_timeout_seconds
            );
        }
        if self.max_retries == 0 {
            return Err(ConfigurationError::InvalidValue(
                "Scanner max_retries must be at least 1".to_string(),
            ));
        }
        if !self.analyzer_url_template.contains("{wallet}") {
            return Err(ConfigurationError::InvalidValue(
                "Scanner analyzer_url_template must contain a {wallet} placeholder"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

impl SystemConfig {
    /// Load configuration from file and environment variables
    pub fn load() -> Result<Self> {
        Self::load_from_path("config.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_path<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let mut config_builder = Config::builder()
            // Start with defaults
            .add_source(Config::try_from(&SystemConfig::default())?);

        if config_path.as_ref().exists() {
            info!(
                "Loading configuration from: {}",
                config_path.as_ref().display()
            );
            config_builder = config_builder.add_source(File::from(config_path.as_ref()));
        } else {
            debug!("Config file not found, using defaults and environment variables");
        }

        config_builder = config_builder.add_source(
            Environment::with_prefix("WALLET_SCOUT")
                .try_parsing(true)
                .separator("__")
                .list_separator(","),
        );

        let config = config_builder.build()?;
        let system_config: SystemConfig = config.try_deserialize()?;

        system_config.validate()?;
        Ok(system_config)
    }

    /// Validate configuration values. Only the configured token source's
    /// API key is required; the top-trader option additionally needs BirdEye.
    pub fn validate(&self) -> Result<()> {
        match self.system.token_source {
            TokenSource::Birdeye => self.birdeye.validate()?,
            TokenSource::Moralis => {
                self.moralis.validate()?;
                if self.system.fetch_top_traders {
                    self.birdeye.validate()?;
                }
            }
        }
        self.scanner.validate()?;

        if self.browser.nav_timeout_seconds == 0 {
            return Err(ConfigurationError::InvalidValue(
                "Browser nav_timeout_seconds must be greater than 0".to_string(),
            ));
        }
        if self.storage.data_dir.is_empty() {
            return Err(ConfigurationError::InvalidValue(
                "Storage data_dir cannot be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Get configuration as a JSON value for diagnostics
    pub fn to_json_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> SystemConfig {
        let mut config = SystemConfig::default();
        config.birdeye.api_key = "test-key".to_string();
        config.moralis.api_key = "test-key".to_string();
        config
    }

    #[test]
    fn default_config_rejects_missing_api_key() {
        let config = SystemConfig::default();
        assert!(config.validate().is_err());
    }

    #[test]
    fn valid_config_passes_validation() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn moralis_source_does_not_require_birdeye_key() {
        let mut config = SystemConfig::default();
        config.system.token_source = TokenSource::Moralis;
        config.moralis.api_key = "test-key".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn top_traders_with_moralis_source_requires_birdeye_key() {
        let mut config = SystemConfig::default();
        config.system.token_source = TokenSource::Moralis;
        config.moralis.api_key = "test-key".to_string();
        config.system.fetch_top_traders = true;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_workers_is_rejected() {
        let mut config = valid_config();
        config.scanner.worker_count = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn win_rate_threshold_must_be_a_percentage() {
        let mut config = valid_config();
        config.scanner.min_win_rate = 150.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn url_template_requires_wallet_placeholder() {
        let mut config = valid_config();
        config.scanner.analyzer_url_template = "https://example.com/analyzer".to_string();
        assert!(config.validate().is_err());
    }
}
