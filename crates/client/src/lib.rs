//! Hardware Market Client - backend access and client-side state.
//!
//! # Architecture
//!
//! - [`backend`] - the [`Backend`](backend::Backend) seam, its REST
//!   implementation, queries, and hosted auth
//! - [`repositories`] - typed reads and writes per table or function
//! - [`stores`] - wallet, checkout, cart and sell state with optimistic updates
//! - [`realtime`] - live wallet updates and the subscription handle
//! - [`cache`] - `moka` caches for products and shipping quotes
//! - [`config`] / [`error`] - environment configuration and the error taxonomy
//!
//! # Example
//!
//! ```rust,ignore
//! use hwmarket_client::MarketClient;
//!
//! let client = MarketClient::from_env()?;
//! client.auth().sign_in_with_password(&email, &password).await?;
//! let wallet = client.wallet_store();
//! wallet.load(user_id).await?;
//! println!("{}", wallet.available_balance());
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod backend;
pub mod cache;
pub mod config;
pub mod error;
pub mod realtime;
pub mod repositories;
pub mod stores;

use std::sync::Arc;

pub use backend::{AuthClient, Backend, RestBackend};
pub use cache::ClientCache;
pub use config::{ClientConfig, ConfigError};
pub use error::{ClientError, GENERIC_NETWORK_MESSAGE, Result};
pub use realtime::{PollingFeed, RealtimeFeed, WalletFeed, WalletSubscription};
pub use stores::{CheckoutStore, PayoutRequest, WalletSnapshot, WalletStore};

use stores::CartLine;

/// Everything needed to talk to the marketplace backend.
///
/// Cheaply cloneable; clones share the HTTP pool, session and caches.
#[derive(Clone)]
pub struct MarketClient {
    rest: RestBackend,
    cache: ClientCache,
}

impl MarketClient {
    /// Build a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let cache = ClientCache::new(config.cache_ttl);
        let rest = RestBackend::new(config)?;
        Ok(Self { rest, cache })
    }

    /// Build a client from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration is missing or invalid.
    pub fn from_env() -> std::result::Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let config = ClientConfig::from_env()?;
        Ok(Self::new(config)?)
    }

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        self.rest.config()
    }

    /// Backend as the trait object repositories and stores use.
    #[must_use]
    pub fn backend(&self) -> Arc<dyn Backend> {
        Arc::new(self.rest.clone())
    }

    #[must_use]
    pub const fn cache(&self) -> &ClientCache {
        &self.cache
    }

    #[must_use]
    pub fn auth(&self) -> AuthClient {
        AuthClient::new(self.rest.clone())
    }

    /// Websocket feed for wallet updates.
    #[must_use]
    pub fn realtime(&self) -> Arc<dyn WalletFeed> {
        Arc::new(RealtimeFeed::new(self.rest.clone()))
    }

    /// A wallet store using the configured payout minimum and retry delay.
    #[must_use]
    pub fn wallet_store(&self) -> WalletStore {
        let config = self.config();
        WalletStore::new(self.backend(), config.min_payout, config.realtime_retry)
    }

    /// A checkout over the given cart lines.
    #[must_use]
    pub fn checkout(&self, buyer_id: hwmarket_core::UserId, lines: Vec<CartLine>) -> CheckoutStore {
        CheckoutStore::new(
            self.backend(),
            self.cache.clone(),
            self.config().service_fee,
            buyer_id,
            lines,
        )
    }
}
