//! Client configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `MARKET_API_URL` - Backend project URL (e.g., `https://xyz.backend.example`)
//! - `MARKET_ANON_KEY` - Public anonymous API key
//!
//! ## Optional
//! - `MARKET_HTTP_TIMEOUT_SECS` - Per-request timeout (default: 10)
//! - `MARKET_CACHE_TTL_SECS` - Product cache TTL (default: 300)
//! - `MARKET_REALTIME_RETRY_SECS` - Delay before resubscribing after a channel error (default: 5)
//! - `MARKET_SERVICE_FEE_PERCENT` - Service fee fraction of the subtotal (default: 0.05)
//! - `MARKET_SERVICE_FEE_FIXED` - Flat service fee per order (default: 10.00)
//! - `MARKET_MIN_PAYOUT` - Smallest payout a seller may request (default: 100.00)

use std::str::FromStr;
use std::time::Duration;

use hwmarket_core::ServiceFee;
use rust_decimal::Decimal;
use secrecy::SecretString;
use thiserror::Error;
use url::Url;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Backend client configuration.
///
/// Implements `Debug` manually to redact the API key.
#[derive(Clone)]
pub struct ClientConfig {
    /// Backend project URL, without a trailing slash.
    pub api_url: Url,
    /// Public anonymous key sent as `apikey` on every request.
    pub anon_key: SecretString,
    /// Per-request HTTP timeout.
    pub http_timeout: Duration,
    /// Product cache TTL.
    pub cache_ttl: Duration,
    /// Delay before the wallet subscription reconnects.
    pub realtime_retry: Duration,
    /// Fee schedule applied at checkout.
    pub service_fee: ServiceFee,
    /// Smallest payout accepted client-side.
    pub min_payout: Decimal,
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("api_url", &self.api_url.as_str())
            .field("anon_key", &"[REDACTED]")
            .field("http_timeout", &self.http_timeout)
            .field("cache_ttl", &self.cache_ttl)
            .field("realtime_retry", &self.realtime_retry)
            .field("service_fee", &self.service_fee)
            .field("min_payout", &self.min_payout)
            .finish()
    }
}

impl ClientConfig {
    /// Default timeout for backend requests.
    pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);
    /// Default product cache TTL.
    pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);
    /// Default realtime reconnect delay.
    pub const DEFAULT_REALTIME_RETRY: Duration = Duration::from_secs(5);

    /// Build a configuration with defaults for everything but the endpoint.
    #[must_use]
    pub fn new(api_url: Url, anon_key: SecretString) -> Self {
        Self {
            api_url,
            anon_key,
            http_timeout: Self::DEFAULT_HTTP_TIMEOUT,
            cache_ttl: Self::DEFAULT_CACHE_TTL,
            realtime_retry: Self::DEFAULT_REALTIME_RETRY,
            service_fee: ServiceFee::default(),
            min_payout: Decimal::new(10_000, 2),
        }
    }

    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let api_url = parse_api_url(&get_required_env("MARKET_API_URL")?)?;
        let anon_key = SecretString::from(get_required_env("MARKET_ANON_KEY")?);

        let http_timeout = Duration::from_secs(parse_env_or("MARKET_HTTP_TIMEOUT_SECS", 10)?);
        let cache_ttl = Duration::from_secs(parse_env_or("MARKET_CACHE_TTL_SECS", 300)?);
        let realtime_retry = Duration::from_secs(parse_env_or("MARKET_REALTIME_RETRY_SECS", 5)?);

        let service_fee = ServiceFee::new(
            parse_env_or("MARKET_SERVICE_FEE_PERCENT", Decimal::new(5, 2))?,
            parse_env_or("MARKET_SERVICE_FEE_FIXED", Decimal::new(1000, 2))?,
        );
        if service_fee.percentage.is_sign_negative() || service_fee.fixed.is_sign_negative() {
            return Err(ConfigError::InvalidEnvVar(
                "MARKET_SERVICE_FEE_PERCENT".to_string(),
                "service fee cannot be negative".to_string(),
            ));
        }

        let min_payout = parse_env_or("MARKET_MIN_PAYOUT", Decimal::new(10_000, 2))?;

        Ok(Self {
            api_url,
            anon_key,
            http_timeout,
            cache_ttl,
            realtime_retry,
            service_fee,
            min_payout,
        })
    }

    /// `{api_url}/{path}` with exactly one slash in between.
    #[must_use]
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.api_url.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Parse an optional environment variable, falling back to a default.
fn parse_env_or<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string())),
        Err(_) => Ok(default),
    }
}

/// Parse and sanity-check the backend URL.
fn parse_api_url(raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw.trim())
        .map_err(|e| ConfigError::InvalidEnvVar("MARKET_API_URL".to_string(), e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidEnvVar(
            "MARKET_API_URL".to_string(),
            format!("unsupported scheme '{}'", url.scheme()),
        ));
    }
    Ok(url)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn config() -> ClientConfig {
        ClientConfig::new(
            Url::parse("https://market.example.com/").unwrap(),
            SecretString::from("anon-key-value"),
        )
    }

    #[test]
    fn test_endpoint_joins_single_slash() {
        let config = config();
        assert_eq!(
            config.endpoint("/rest/v1/wallets"),
            "https://market.example.com/rest/v1/wallets"
        );
        assert_eq!(
            config.endpoint("functions/v1/get-shipping-quote"),
            "https://market.example.com/functions/v1/get-shipping-quote"
        );
    }

    #[test]
    fn test_defaults() {
        let config = config();
        assert_eq!(config.realtime_retry, Duration::from_secs(5));
        assert_eq!(config.service_fee, ServiceFee::default());
        assert_eq!(config.min_payout, Decimal::new(10_000, 2));
    }

    #[test]
    fn test_debug_redacts_key() {
        let debug_output = format!("{:?}", config());
        assert!(debug_output.contains("market.example.com"));
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("anon-key-value"));
    }

    #[test]
    fn test_parse_api_url_rejects_other_schemes() {
        assert!(parse_api_url("ftp://market.example.com").is_err());
        assert!(parse_api_url("not a url").is_err());
        assert!(parse_api_url("https://market.example.com").is_ok());
    }
}
