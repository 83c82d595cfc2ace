//! Shipping quotes from the quote functions.

use hwmarket_core::validation::validate_postal_code;
use hwmarket_core::{Address, ProductId, ShippingQuote};
use serde_json::{Value, json};
use tracing::{debug, instrument};

use crate::backend::{Backend, functions, reject_on_failure};
use crate::cache::ClientCache;
use crate::error::Result;

/// Repository for shipping quotes. Quotes are cached for a minute.
pub struct ShippingRepository<'a> {
    backend: &'a dyn Backend,
    cache: &'a ClientCache,
}

impl<'a> ShippingRepository<'a> {
    /// Create a new shipping repository.
    #[must_use]
    pub const fn new(backend: &'a dyn Backend, cache: &'a ClientCache) -> Self {
        Self { backend, cache }
    }

    /// Quote shipping a product to a buyer's address.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Rejected` if the carrier cannot serve the route.
    #[instrument(skip(self, address), fields(postal_code = %address.postal_code))]
    pub async fn quote(&self, product_id: ProductId, address: &Address) -> Result<ShippingQuote> {
        let key = format!("buyer:{product_id}:{}", address.postal_code);
        let body = json!({
            "product_id": product_id,
            "address_id": address.id,
            "destination_postal_code": address.postal_code,
        });
        self.cached(key, functions::SHIPPING_QUOTE, body).await
    }

    /// Quote shipping for a seller preparing a parcel.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Validation` for a malformed postal code.
    #[instrument(skip(self))]
    pub async fn seller_quote(
        &self,
        product_id: ProductId,
        destination_postal_code: &str,
    ) -> Result<ShippingQuote> {
        validate_postal_code(destination_postal_code)?;
        let postal_code = destination_postal_code.trim();
        let key = format!("seller:{product_id}:{postal_code}");
        let body = json!({
            "product_id": product_id,
            "destination_postal_code": postal_code,
        });
        self.cached(key, functions::SHIPPING_QUOTE_SELLER, body).await
    }

    async fn cached(&self, key: String, function: &str, body: Value) -> Result<ShippingQuote> {
        if let Some(quote) = self.cache.get_quote(&key).await {
            debug!("Cache hit");
            return Ok(quote);
        }
        let response = reject_on_failure(self.backend.invoke(function, body).await?)?;
        let quote_value = response.get("quote").cloned().unwrap_or(response);
        let quote: ShippingQuote = serde_json::from_value(quote_value)?;
        self.cache.put_quote(key, quote.clone()).await;
        Ok(quote)
    }
}
