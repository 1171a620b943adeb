//! Moralis Solana gateway client: PumpFun graduated tokens and per-token
//! top holders.

use std::collections::HashSet;
use std::time::Duration;

use config_manager::MoralisConfig;
use reqwest::Client;
use retry_utils::{retry_with_backoff, BackoffPolicy};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{ApiError, Result};

#[derive(Debug, Clone, Deserialize)]
struct GraduatedTokensResponse {
    #[serde(default)]
    result: Vec<GraduatedToken>,
}

/// One token that completed its PumpFun bonding curve.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraduatedToken {
    #[serde(rename = "tokenAddress")]
    pub token_address: String,
    pub name: Option<String>,
    pub symbol: Option<String>,
    pub liquidity: Option<String>,
    #[serde(rename = "fullyDilutedValuation")]
    pub fully_diluted_valuation: Option<String>,
    #[serde(rename = "graduatedAt")]
    pub graduated_at: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct TopHoldersResponse {
    #[serde(default)]
    result: Vec<TokenHolder>,
}

/// One holder row from the top-holders endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenHolder {
    #[serde(rename = "ownerAddress")]
    pub owner_address: String,
    pub balance: Option<String>,
    #[serde(rename = "usdValue")]
    pub usd_value: Option<String>,
    #[serde(rename = "percentageRelativeToTotalSupply")]
    pub percentage_relative_to_total_supply: Option<f64>,
}

pub struct MoralisClient {
    client: Client,
    config: MoralisConfig,
    backoff: BackoffPolicy,
}

impl MoralisClient {
    pub fn new(config: MoralisConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()?;
        Ok(Self {
            client,
            config,
            backoff: BackoffPolicy::default(),
        })
    }

    /// Recently graduated PumpFun tokens, capped at `token_limit`.
    pub async fn get_graduated_tokens(&self) -> Result<Vec<GraduatedToken>> {
        let tokens = retry_with_backoff(&self.backoff, ApiError::retry_class, || {
            self.fetch_graduated_tokens()
        })
        .await?;
        info!("Moralis graduated tokens: {} fetched", tokens.len());
        Ok(tokens)
    }

    async fn fetch_graduated_tokens(&self) -> Result<Vec<GraduatedToken>> {
        let url = format!(
            "{}/token/mainnet/exchange/pumpfun/graduated",
            self.config.api_base_url
        );
        debug!("GET {}", url);

        let response = self
            .client
            .get(&url)
            .header("X-API-Key", &self.config.api_key)
            .header("accept", "application/json")
            .query(&[("limit", self.config.token_limit.to_string())])
            .send()
            .await?;

        let body: GraduatedTokensResponse = check_status(response).await?.json().await?;
        Ok(body.result)
    }

    /// Top holders of `token_address`, deduplicated by owner address.
    pub async fn get_top_holders(&self, token_address: &str) -> Result<Vec<TokenHolder>> {
        let holders = retry_with_backoff(&self.backoff, ApiError::retry_class, || {
            self.fetch_top_holders(token_address)
        })
        .await?;

        let mut seen = HashSet::new();
        let mut unique = Vec::with_capacity(holders.len());
        for holder in holders {
            if seen.insert(holder.owner_address.clone()) {
                unique.push(holder);
            } else {
                debug!("Duplicate holder {} for {}", holder.owner_address, token_address);
            }
        }
        info!("Moralis top holders for {}: {} unique", token_address, unique.len());
        Ok(unique)
    }

    async fn fetch_top_holders(&self, token_address: &str) -> Result<Vec<TokenHolder>> {
        let url = format!(
            "{}/token/mainnet/{}/top-holders",
            self.config.api_base_url, token_address
        );
        debug!("GET {}", url);

        let response = self
            .client
            .get(&url)
            .header("X-API-Key", &self.config.api_key)
            .header("accept", "application/json")
            .query(&[("limit", self.config.max_holders_per_token.to_string())])
            .send()
            .await?;

        let body: TopHoldersResponse = check_status(response).await?.json().await?;
        Ok(body.result)
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
