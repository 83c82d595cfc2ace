//! Product repository with local caching.
//!
//! Single products and browse results are cached; seller listings and the
//! stock re-check at payment time always go to the backend.

use hwmarket_core::{
    NewProduct, Product, ProductCondition, ProductId, ProductStatus, UserId, canonical_key,
};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, instrument};

use crate::backend::{Backend, Direction, Query, Table, fetch_all, fetch_optional, insert_as, update_as};
use crate::cache::{CacheValue, ClientCache};
use crate::error::{ClientError, Result};

/// Default page size for browse queries.
pub const PAGE_SIZE: usize = 20;

/// Browse filter. Only active listings are returned.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProductFilter {
    pub search: Option<String>,
    pub category: Option<String>,
    pub condition: Option<ProductCondition>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl ProductFilter {
    fn cache_key(&self) -> String {
        // Unset fields serialize as null and are dropped by normalization,
        // so equivalent filters share one entry.
        let value = serde_json::to_value(self).unwrap_or_default();
        format!("products:{}", canonical_key(&value))
    }

    fn to_query(&self) -> Query {
        let mut query = Query::table(Table::Products).eq("status", ProductStatus::Active.as_str());
        if let Some(term) = self.search.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            query = query.search("title", term);
        }
        if let Some(category) = &self.category {
            query = query.eq("category", category);
        }
        if let Some(condition) = self.condition {
            query = query.eq("condition", condition);
        }
        if let Some(min) = self.min_price {
            query = query.gte("price", min);
        }
        if let Some(max) = self.max_price {
            query = query.lte("price", max);
        }
        query
            .order("created_at", Direction::Desc)
            .limit(self.limit.unwrap_or(PAGE_SIZE))
            .offset(self.offset.unwrap_or(0))
    }
}

/// Repository for the `products` table.
pub struct ProductRepository<'a> {
    backend: &'a dyn Backend,
    cache: &'a ClientCache,
}

impl<'a> ProductRepository<'a> {
    /// Create a new product repository.
    #[must_use]
    pub const fn new(backend: &'a dyn Backend, cache: &'a ClientCache) -> Self {
        Self { backend, cache }
    }

    /// Get a product by ID, from cache when fresh.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::NotFound` if the product does not exist.
    #[instrument(skip(self))]
    pub async fn get(&self, id: ProductId) -> Result<Product> {
        let key = product_key(id);
        if let Some(product) = self.cache.get_product(&key).await {
            debug!("Cache hit");
            return Ok(product);
        }

        let product = self.get_fresh(id).await?;
        self.cache
            .put(key, CacheValue::Product(Box::new(product.clone())))
            .await;
        Ok(product)
    }

    /// Get a product by ID, bypassing the cache.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::NotFound` if the product does not exist.
    pub async fn get_fresh(&self, id: ProductId) -> Result<Product> {
        fetch_optional(self.backend, Query::table(Table::Products).eq("id", id))
            .await?
            .ok_or_else(|| ClientError::NotFound(format!("product {id}")))
    }

    /// Current rows for several products, bypassing the cache.
    ///
    /// Missing products are simply absent from the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn get_many_fresh(&self, ids: &[ProductId]) -> Result<Vec<Product>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let query = Query::table(Table::Products).in_list("id", ids.iter());
        fetch_all(self.backend, &query).await
    }

    /// Browse active listings.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self))]
    pub async fn list(&self, filter: &ProductFilter) -> Result<Vec<Product>> {
        let key = filter.cache_key();
        if let Some(products) = self.cache.get_products(&key).await {
            debug!("Cache hit");
            return Ok(products);
        }

        let products: Vec<Product> = fetch_all(self.backend, &filter.to_query()).await?;
        self.cache
            .put(key, CacheValue::Products(products.clone()))
            .await;
        Ok(products)
    }

    /// Every listing of one seller, any status.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn list_by_seller(&self, seller_id: UserId) -> Result<Vec<Product>> {
        let query = Query::table(Table::Products)
            .eq("seller_id", seller_id)
            .order("created_at", Direction::Desc);
        fetch_all(self.backend, &query).await
    }

    /// Insert a listing.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self, product), fields(seller_id = %product.seller_id))]
    pub async fn create(&self, product: &NewProduct) -> Result<Product> {
        let created: Product = insert_as(self.backend, Table::Products, product).await?;
        self.cache.invalidate_product(&product_key(created.id)).await;
        Ok(created)
    }

    /// Change a listing's status.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::NotFound` if the product does not exist.
    #[instrument(skip(self))]
    pub async fn update_status(&self, id: ProductId, status: ProductStatus) -> Result<Product> {
        let query = Query::table(Table::Products).eq("id", id);
        let updated = update_as(self.backend, &query, &json!({ "status": status }))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ClientError::NotFound(format!("product {id}")))?;
        self.cache.invalidate_product(&product_key(id)).await;
        Ok(updated)
    }
}

pub(crate) fn product_key(id: ProductId) -> String {
    format!("product:{id}")
}
