//! Application state shared across handlers.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::auth::{BackendAuth, TokenVerifier};
use crate::config::PaymentsConfig;
use crate::stripe::{PaymentProcessor, StripeClient};

const HTTP_TIMEOUT: Duration = Duration::from_secs(15);

/// Error building application state.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("http client: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid MARKET_API_URL: {0}")]
    Url(#[from] url::ParseError),
}

/// Application state shared across all handlers.
///
/// Cheaply cloneable; the processor and token verifier sit behind traits so
/// handlers can be exercised without network access.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    processor: Arc<dyn PaymentProcessor>,
    verifier: Arc<dyn TokenVerifier>,
}

impl AppState {
    #[must_use]
    pub fn new(processor: Arc<dyn PaymentProcessor>, verifier: Arc<dyn TokenVerifier>) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                processor,
                verifier,
            }),
        }
    }

    /// Wire the Stripe client and backend auth from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built or the backend
    /// URL is unusable.
    pub fn from_config(config: &PaymentsConfig) -> Result<Self, StateError> {
        let client = reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?;
        let processor = StripeClient::new(client.clone(), &config.stripe);
        let verifier = BackendAuth::new(client, &config.api_url, config.anon_key.clone())?;
        Ok(Self::new(Arc::new(processor), Arc::new(verifier)))
    }

    #[must_use]
    pub fn processor(&self) -> &dyn PaymentProcessor {
        self.inner.processor.as_ref()
    }

    #[must_use]
    pub fn verifier(&self) -> &dyn TokenVerifier {
        self.inner.verifier.as_ref()
    }
}
