//! Local response caches.
//!
//! Products are cached for the configured TTL (5 minutes by default) and
//! shipping quotes for 60 seconds. Nothing here outlives the process.

use std::time::Duration;

use hwmarket_core::{Product, ShippingQuote};
use moka::future::Cache;
use tracing::warn;

/// Shipping quotes go stale quickly.
pub const SHIPPING_QUOTE_TTL: Duration = Duration::from_secs(60);

/// Cached value types.
#[derive(Debug, Clone)]
pub enum CacheValue {
    Product(Box<Product>),
    Products(Vec<Product>),
}

/// Caches shared by the repositories.
///
/// Cheaply cloneable; clones share entries.
#[derive(Clone)]
pub struct ClientCache {
    products: Cache<String, CacheValue>,
    quotes: Cache<String, ShippingQuote>,
}

impl ClientCache {
    /// Create caches with the given product TTL.
    #[must_use]
    pub fn new(product_ttl: Duration) -> Self {
        let products = Cache::builder()
            .max_capacity(1000)
            .time_to_live(product_ttl)
            .support_invalidation_closures()
            .build();
        let quotes = Cache::builder()
            .max_capacity(500)
            .time_to_live(SHIPPING_QUOTE_TTL)
            .build();
        Self { products, quotes }
    }

    pub(crate) async fn get_product(&self, key: &str) -> Option<Product> {
        match self.products.get(key).await {
            Some(CacheValue::Product(product)) => Some(*product),
            _ => None,
        }
    }

    pub(crate) async fn get_products(&self, key: &str) -> Option<Vec<Product>> {
        match self.products.get(key).await {
            Some(CacheValue::Products(products)) => Some(products),
            _ => None,
        }
    }

    pub(crate) async fn put(&self, key: String, value: CacheValue) {
        self.products.insert(key, value).await;
    }

    pub(crate) async fn get_quote(&self, key: &str) -> Option<ShippingQuote> {
        self.quotes.get(key).await
    }

    pub(crate) async fn put_quote(&self, key: String, quote: ShippingQuote) {
        self.quotes.insert(key, quote).await;
    }

    /// Drop a cached product and every cached product list.
    ///
    /// Lists are dropped too because any of them may contain the product.
    pub async fn invalidate_product(&self, key: &str) {
        self.products.invalidate(key).await;
        if let Err(e) = self
            .products
            .invalidate_entries_if(|_, value| matches!(value, CacheValue::Products(_)))
        {
            warn!(key, error = %e, "Failed to drop cached product lists");
        }
        self.products.run_pending_tasks().await;
    }

    /// Invalidate all cached data.
    pub async fn invalidate_all(&self) {
        self.products.invalidate_all();
        self.quotes.invalidate_all();
        self.products.run_pending_tasks().await;
        self.quotes.run_pending_tasks().await;
    }
}

impl Default for ClientCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(300))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_invalidate_product_drops_lists() {
        let cache = ClientCache::new(Duration::from_secs(300));
        cache.put("products:active".to_string(), CacheValue::Products(Vec::new())).await;
        cache.put("products:seller".to_string(), CacheValue::Products(Vec::new())).await;

        assert!(cache.get_products("products:active").await.is_some());
        cache.invalidate_product("product:unknown").await;
        assert!(cache.get_products("products:active").await.is_none());
        assert!(cache.get_products("products:seller").await.is_none());
    }
}
