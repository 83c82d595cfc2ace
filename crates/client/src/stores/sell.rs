//! New listing form.

use std::path::PathBuf;

use hwmarket_core::validation::{validate_listing, validate_postal_code};
use hwmarket_core::{
    NewProduct, Product, ProductCondition, ProductStatus, UserId, ValidationError, canonical_key,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::backend::Backend;
use crate::cache::ClientCache;
use crate::error::{ClientError, Result};
use crate::repositories::{ProductRepository, StorageClient};

/// Form state for a listing that has not been published yet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SellDraft {
    pub title: String,
    pub description: Option<String>,
    pub price: Option<Decimal>,
    pub condition: Option<ProductCondition>,
    pub category: Option<String>,
    /// Local photo files, cover first.
    pub images: Vec<PathBuf>,
    pub postal_code: Option<String>,
}

impl SellDraft {
    /// Check the form without touching the network.
    ///
    /// # Errors
    ///
    /// Returns the first invalid field.
    pub fn validate(&self) -> std::result::Result<(), ValidationError> {
        let price = self.price.ok_or(ValidationError::Required { field: "price" })?;
        if self.condition.is_none() {
            return Err(ValidationError::Required { field: "condition" });
        }
        validate_listing(
            &self.title,
            self.description.as_deref(),
            price,
            self.images.len(),
        )?;
        if let Some(code) = &self.postal_code {
            validate_postal_code(code)?;
        }
        Ok(())
    }

    /// Canonical rendering of the form, for unsaved-changes checks.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        serde_json::to_value(self)
            .map(|v| canonical_key(&v))
            .unwrap_or_default()
    }

    /// Returns `true` if the form differs from a saved fingerprint.
    #[must_use]
    pub fn is_dirty(&self, saved: &str) -> bool {
        self.fingerprint() != saved
    }

    /// Upload the photos and create an active listing.
    ///
    /// # Errors
    ///
    /// Returns a validation error before any upload, or the first failed
    /// upload or insert.
    #[instrument(skip(self, backend, cache), fields(title = %self.title))]
    pub async fn publish(
        &self,
        backend: &dyn Backend,
        cache: &ClientCache,
        seller_id: UserId,
    ) -> Result<Product> {
        self.validate()?;
        let (Some(price), Some(condition)) = (self.price, self.condition) else {
            return Err(ValidationError::Required { field: "price" }.into());
        };

        let storage = StorageClient::new(backend);
        let mut urls = Vec::with_capacity(self.images.len());
        for path in &self.images {
            let bytes = tokio::fs::read(path).await.map_err(|e| {
                ClientError::Validation(ValidationError::Invalid {
                    field: "images",
                    message: format!("cannot read {}: {e}", path.display()),
                })
            })?;
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            urls.push(storage.upload_product_image(seller_id, &file_name, bytes).await?);
        }

        let product = NewProduct {
            seller_id,
            title: self.title.trim().to_string(),
            description: self
                .description
                .as_deref()
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(ToString::to_string),
            price,
            category: self.category.clone(),
            condition,
            status: ProductStatus::Active,
            images: urls,
            postal_code: self.postal_code.as_deref().map(|c| c.trim().to_string()),
        };
        let created = ProductRepository::new(backend, cache).create(&product).await?;
        info!(product_id = %created.id, "Listing published");
        Ok(created)
    }
}
