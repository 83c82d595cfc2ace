//! Saved products.

use hwmarket_core::{Favorite, ProductId, UserId};
use serde_json::json;
use tracing::instrument;

use crate::backend::{Backend, Direction, Query, Table, fetch_all};
use crate::error::Result;

/// Repository for the `favorites` table.
pub struct FavoriteRepository<'a> {
    backend: &'a dyn Backend,
}

impl<'a> FavoriteRepository<'a> {
    #[must_use]
    pub const fn new(backend: &'a dyn Backend) -> Self {
        Self { backend }
    }

    /// A user's favorites, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn list(&self, user_id: UserId) -> Result<Vec<Favorite>> {
        let query = Query::table(Table::Favorites)
            .eq("user_id", user_id)
            .order("created_at", Direction::Desc);
        fetch_all(self.backend, &query).await
    }

    /// Save or unsave a product. Returns `true` if it is now a favorite.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self))]
    pub async fn toggle(&self, user_id: UserId, product_id: ProductId) -> Result<bool> {
        let query = Query::table(Table::Favorites)
            .eq("user_id", user_id)
            .eq("product_id", product_id);

        if self.backend.select(&query).await?.is_empty() {
            self.backend
                .insert(
                    Table::Favorites,
                    json!({ "user_id": user_id, "product_id": product_id }),
                )
                .await?;
            Ok(true)
        } else {
            self.backend.delete(&query).await?;
            Ok(false)
        }
    }
}
