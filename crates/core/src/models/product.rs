//! Product listings (`products` table).

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::{ProductCondition, ProductId, ProductStatus, UserId};

/// A hardware listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub seller_id: UserId,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Asking price in MXN.
    pub price: Decimal,
    #[serde(default)]
    pub category: Option<String>,
    pub condition: ProductCondition,
    pub status: ProductStatus,
    /// Public storage URLs, first one is the cover.
    #[serde(default)]
    pub images: Vec<String>,
    /// Origin postal code used for shipping quotes.
    #[serde(default)]
    pub postal_code: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Product {
    /// Cover image URL, if any images were uploaded.
    #[must_use]
    pub fn cover_image(&self) -> Option<&str> {
        self.images.first().map(String::as_str)
    }
}

/// Insert payload for a new listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewProduct {
    pub seller_id: UserId,
    pub title: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub category: Option<String>,
    pub condition: ProductCondition,
    pub status: ProductStatus,
    pub images: Vec<String>,
    pub postal_code: Option<String>,
}
