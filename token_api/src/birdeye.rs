//! BirdEye API client: liquidity-window token discovery and per-token
//! top traders.

use std::collections::HashSet;
use std::time::Duration;

use config_manager::BirdEyeConfig;
use reqwest::Client;
use retry_utils::{retry_with_backoff, BackoffPolicy};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{ApiError, Result};

#[derive(Debug, Clone, Deserialize)]
struct TokenListResponse {
    success: bool,
    data: TokenListData,
}

#[derive(Debug, Clone, Deserialize)]
struct TokenListData {
    #[serde(default)]
    tokens: Vec<DiscoveredToken>,
}

/// One token from the `/defi/tokenlist` discovery window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveredToken {
    pub address: String,
    pub symbol: Option<String>,
    pub liquidity: Option<f64>,
    #[serde(rename = "v24hUSD")]
    pub volume_24h_usd: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
struct TopTradersResponse {
    success: bool,
    data: TopTradersData,
}

#[derive(Debug, Clone, Deserialize)]
struct TopTradersData {
    #[serde(default)]
    items: Vec<TopTrader>,
}

/// One trader row from `/defi/v2/tokens/top_traders`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopTrader {
    pub owner: String,
    pub volume: Option<f64>,
    pub trade: Option<u32>,
    #[serde(rename = "tradeBuy")]
    pub trade_buy: Option<u32>,
    #[serde(rename = "tradeSell")]
    pub trade_sell: Option<u32>,
    #[serde(rename = "volumeBuy")]
    pub volume_buy: Option<f64>,
    #[serde(rename = "volumeSell")]
    pub volume_sell: Option<f64>,
}

pub struct BirdEyeClient {
    client: Client,
    config: BirdEyeConfig,
    backoff: BackoffPolicy,
}

impl BirdEyeClient {
    pub fn new(config: BirdEyeConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()?;
        Ok(Self {
            client,
            config,
            backoff: BackoffPolicy::default(),
        })
    }

    /// Tokens inside the configured liquidity window, sorted by liquidity
    /// descending, capped at `token_limit`.
    pub async fn get_token_list(&self) -> Result<Vec<DiscoveredToken>> {
        let tokens = retry_with_backoff(
            &self.backoff,
            ApiError::retry_class,
            || self.fetch_token_list(),
        )
        .await?;
        info!(
            "BirdEye token list: {} tokens in the {}..{} USD liquidity window",
            tokens.len(),
            self.config.min_liquidity,
            self.config.max_liquidity
        );
        Ok(tokens)
    }

    async fn fetch_token_list(&self) -> Result<Vec<DiscoveredToken>> {
        let url = format!("{}/defi/tokenlist", self.config.api_base_url);
        debug!("GET {}", url);

        let response = self
            .client
            .get(&url)
            .header("X-API-KEY", &self.config.api_key)
            .header("x-chain", "solana")
            .header("accept", "application/json")
            .query(&[
                ("sort_by", "liquidity".to_string()),
                ("sort_type", "desc".to_string()),
                ("min_liquidity", self.config.min_liquidity.to_string()),
                ("max_liquidity", self.config.max_liquidity.to_string()),
                ("offset", "0".to_string()),
                ("limit", self.config.token_limit.to_string()),
            ])
            .send()
            .await?;

        let body: TokenListResponse = check_status(response).await?.json().await?;
        if !body.success {
            return Err(ApiError::InvalidResponse(
                "token list response marked unsuccessful".to_string(),
            ));
        }
        Ok(body.data.tokens)
    }

    /// Top traders of `token_address` by 24h volume, deduplicated by owner.
    pub async fn get_top_traders(&self, token_address: &str) -> Result<Vec<TopTrader>> {
        let traders = retry_with_backoff(&self.backoff, ApiError::retry_class, || {
            self.fetch_top_traders(token_address)
        })
        .await?;

        let mut seen = HashSet::new();
        let mut unique = Vec::with_capacity(traders.len());
        for trader in traders {
            if seen.insert(trader.owner.clone()) {
                unique.push(trader);
            } else {
                debug!("Duplicate trader {} for {}", trader.owner, token_address);
            }
        }
        info!("BirdEye top traders for {}: {} unique", token_address, unique.len());
        Ok(unique)
    }

    async fn fetch_top_traders(&self, token_address: &str) -> Result<Vec<TopTrader>> {
        let url = format!("{}/defi/v2/tokens/top_traders", self.config.api_base_url);
        debug!("GET {} for {}", url, token_address);

        let response = self
            .client
            .get(&url)
            .header("X-API-KEY", &self.config.api_key)
            .header("x-chain", "solana")
            .header("accept", "application/json")
            .query(&[
                ("address", token_address.to_string()),
                ("time_frame", "24h".to_string()),
                ("sort_type", "desc".to_string()),
                ("sort_by", "volume".to_string()),
                ("offset", "0".to_string()),
                ("limit", self.config.max_traders_per_token.to_string()),
            ])
            .send()
            .await?;

        let body: TopTradersResponse = check_status(response).await?.json().await?;
        if !body.success {
            warn!("BirdEye reported failure for top traders of {}", token_address);
            return Err(ApiError::InvalidResponse(
                "top traders response marked unsuccessful".to_string(),
            ));
        }
        Ok(body.data.items)
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.as_u16() == 429 {
        return Err(ApiError::RateLimit);
    }
    if !status.is_success() {
        let message = response.text().await.unwrap_or_default();
        return Err(ApiError::Api {
            status: status.as_u16(),
            message,
        });
    }
    Ok(response)
}
