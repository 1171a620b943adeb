//! HTTP clients for the upstream token/holder APIs.
//!
//! Two sources feed the candidate-wallet pipeline: BirdEye (liquidity-window
//! token list plus per-token top traders) and Moralis (PumpFun graduated
//! tokens plus per-token top holders). All calls run through the shared
//! retry helper with 429-aware backoff.

use thiserror::Error;

pub mod birdeye;
pub mod moralis;

pub use birdeye::{BirdEyeClient, DiscoveredToken, TopTrader};
pub use moralis::{GraduatedToken, MoralisClient, TokenHolder};

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },
    #[error("Rate limit exceeded")]
    RateLimit,
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl ApiError {
    /// Classification for the shared retry loop: 429 backs off hardest,
    /// timeouts and server errors retry, everything else fails fast.
    pub fn retry_class(&self) -> retry_utils::RetryClass {
        match self {
            ApiError::RateLimit => retry_utils::RetryClass::RateLimited,
            ApiError::Http(e) if e.is_timeout() || e.is_connect() => {
                retry_utils::RetryClass::Transient
            }
            ApiError::Api { status, .. } if *status >= 500 => retry_utils::RetryClass::Transient,
            _ => retry_utils::RetryClass::Fatal,
        }
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use retry_utils::RetryClass;

    #[test]
    fn rate_limit_classifies_as_rate_limited() {
        assert_eq!(ApiError::RateLimit.retry_class(), RetryClass::RateLimited);
    }

    #[test]
    fn server_errors_are_transient() {
        let err = ApiError::Api {
            status: 503,
            message: "unavailable".to_string(),
        };
        assert_eq!(err.retry_class(), RetryClass::Transient);
    }

    #[test]
    fn client_errors_are_fatal() {
        let err = ApiError::Api {
            status: 401,
            message: "bad key".to_string(),
        };
        assert_eq!(err.retry_class(), RetryClass::Fatal);
        let err = ApiError::InvalidResponse("not json".to_string());
        assert_eq!(err.retry_class(), RetryClass::Fatal);
    }
}
