//! Shopping cart.
//!
//! Hardware listings are single items, so the cart keeps one line per
//! product. The cart is saved to a JSON file after every change.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use hwmarket_core::{OrderItem, Product, ProductId, UserId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Cart errors.
#[derive(Debug, Error)]
pub enum CartError {
    #[error("you cannot buy your own listing")]
    OwnListing,

    #[error("{0} is no longer available")]
    NotAvailable(String),

    #[error("cart file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cart encoding error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// One product in the cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: ProductId,
    pub seller_id: UserId,
    pub title: String,
    pub unit_price: Decimal,
    pub quantity: u32,
    #[serde(default)]
    pub image: Option<String>,
    pub added_at: DateTime<Utc>,
}

impl CartLine {
    /// Line as an order item.
    #[must_use]
    pub const fn item(&self) -> OrderItem {
        OrderItem {
            product_id: self.product_id,
            unit_price: self.unit_price,
            quantity: self.quantity,
        }
    }
}

/// Cart contents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    pub lines: Vec<CartLine>,
}

impl Cart {
    /// Add a product for `buyer_id`. Adding a product twice keeps one line.
    ///
    /// # Errors
    ///
    /// Returns `CartError::OwnListing` for the buyer's own product and
    /// `CartError::NotAvailable` for anything not on sale.
    pub fn add(&mut self, product: &Product, buyer_id: UserId) -> Result<(), CartError> {
        if product.seller_id == buyer_id {
            return Err(CartError::OwnListing);
        }
        if !product.status.is_purchasable() {
            return Err(CartError::NotAvailable(product.title.clone()));
        }
        if self.contains(product.id) {
            return Ok(());
        }
        self.lines.push(CartLine {
            product_id: product.id,
            seller_id: product.seller_id,
            title: product.title.clone(),
            unit_price: product.price,
            quantity: 1,
            image: product.cover_image().map(ToString::to_string),
            added_at: Utc::now(),
        });
        Ok(())
    }

    /// Remove a product. Returns `true` if it was in the cart.
    pub fn remove(&mut self, product_id: ProductId) -> bool {
        let before = self.lines.len();
        self.lines.retain(|line| line.product_id != product_id);
        self.lines.len() != before
    }

    #[must_use]
    pub fn contains(&self, product_id: ProductId) -> bool {
        self.lines.iter().any(|line| line.product_id == product_id)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Lines as order items.
    #[must_use]
    pub fn items(&self) -> Vec<OrderItem> {
        self.lines.iter().map(CartLine::item).collect()
    }

    /// Sum of line totals.
    #[must_use]
    pub fn subtotal(&self) -> Decimal {
        self.lines.iter().map(|l| l.item().line_total()).sum()
    }

    /// Read a saved cart. A missing or unreadable file yields an empty cart.
    pub async fn load(path: &Path) -> Self {
        match tokio::fs::read(path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "Discarding unreadable cart file");
                Self::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Could not read cart file");
                Self::default()
            }
        }
    }

    /// Write the cart, replacing the file atomically.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub async fn save(&self, path: &Path) -> Result<(), CartError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(self)?).await?;
        tokio::fs::rename(&tmp, path).await?;
        debug!(path = %path.display(), lines = self.lines.len(), "Cart saved");
        Ok(())
    }
}

/// Cart bound to a file.
pub struct CartStore {
    path: PathBuf,
    cart: Mutex<Cart>,
}

impl CartStore {
    /// Load the cart saved at `path`.
    pub async fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let cart = Cart::load(&path).await;
        Self {
            path,
            cart: Mutex::new(cart),
        }
    }

    /// Current contents.
    pub async fn snapshot(&self) -> Cart {
        self.cart.lock().await.clone()
    }

    /// Add a product and save.
    ///
    /// # Errors
    ///
    /// Returns the rule the product breaks, or a file error.
    pub async fn add(&self, product: &Product, buyer_id: UserId) -> Result<Cart, CartError> {
        let mut cart = self.cart.lock().await;
        cart.add(product, buyer_id)?;
        cart.save(&self.path).await?;
        Ok(cart.clone())
    }

    /// Remove a product and save.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub async fn remove(&self, product_id: ProductId) -> Result<Cart, CartError> {
        let mut cart = self.cart.lock().await;
        if cart.remove(product_id) {
            cart.save(&self.path).await?;
        }
        Ok(cart.clone())
    }

    /// Empty the cart and save.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub async fn clear(&self) -> Result<(), CartError> {
        let mut cart = self.cart.lock().await;
        cart.lines.clear();
        cart.save(&self.path).await
    }
}
