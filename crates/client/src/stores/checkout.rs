//! Checkout state machine.
//!
//! ```text
//! Cart -> AddressSelected -> Quoted -> ReadyToPay -> Processing -> Completed
//!                                          ^              |
//!                                          +--------------+ payment failed
//! ```
//!
//! `Failed` is terminal: every item became unavailable at payment time.
//! The store holds its lock only between remote calls, and `Processing`
//! rejects every other operation, so a payment cannot be submitted twice.

use std::sync::Arc;

use chrono::{Datelike, Utc};
use hwmarket_core::order::missing_quotes;
use hwmarket_core::{
    Address, IdempotencyKey, OrderItem, OrderTotals, PaymentMethod, ProductId, ServiceFee,
    ShippingCosts, UserId, ValidationError, calculate_order,
};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

use super::cart::CartLine;
use crate::backend::{Backend, functions, reject_on_failure};
use crate::cache::ClientCache;
use crate::error::ClientError;
use crate::repositories::{ProductRepository, ShippingRepository, product_key};

/// Where a checkout is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckoutStage {
    Cart,
    AddressSelected,
    Quoted,
    ReadyToPay,
    Processing,
    Completed,
    Failed,
}

/// Checkout errors.
#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("cannot {action} while checkout is {stage:?}")]
    InvalidStage {
        action: &'static str,
        stage: CheckoutStage,
    },

    #[error("your cart is empty")]
    EmptyCart,

    #[error("no shipping quote for product {0}")]
    MissingQuote(ProductId),

    #[error("no longer available: {}", .titles.join(", "))]
    StockChanged {
        products: Vec<ProductId>,
        titles: Vec<String>,
    },

    #[error(transparent)]
    Client(#[from] ClientError),
}

impl CheckoutError {
    /// Text a screen would show for this error.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Client(e) => e.user_message(),
            other => other.to_string(),
        }
    }
}

impl From<ValidationError> for CheckoutError {
    fn from(err: ValidationError) -> Self {
        Self::Client(ClientError::Validation(err))
    }
}

/// Result of `create-payment-intent`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PaymentConfirmation {
    pub payment_intent_id: String,
    pub status: String,
    #[serde(default)]
    pub order_ids: Vec<String>,
}

/// Everything a checkout screen shows.
#[derive(Debug, Clone)]
pub struct CheckoutState {
    pub stage: CheckoutStage,
    pub buyer_id: UserId,
    pub lines: Vec<CartLine>,
    pub address: Option<Address>,
    pub quotes: ShippingCosts,
    pub payment_method: Option<PaymentMethod>,
    /// Sent with the payment; changes whenever the order contents change.
    pub idempotency_key: IdempotencyKey,
    /// Message from the last failed operation.
    pub last_error: Option<String>,
    pub confirmation: Option<PaymentConfirmation>,
}

impl CheckoutState {
    fn items(&self) -> Vec<OrderItem> {
        self.lines.iter().map(CartLine::item).collect()
    }

    fn require(&self, action: &'static str, allowed: &[CheckoutStage]) -> Result<(), CheckoutError> {
        if allowed.contains(&self.stage) {
            Ok(())
        } else {
            Err(CheckoutError::InvalidStage {
                action,
                stage: self.stage,
            })
        }
    }

    const fn stage_after_quotes(&self) -> CheckoutStage {
        if self.payment_method.is_some() {
            CheckoutStage::ReadyToPay
        } else {
            CheckoutStage::Quoted
        }
    }
}

/// Drives one checkout from cart to payment.
pub struct CheckoutStore {
    backend: Arc<dyn Backend>,
    cache: ClientCache,
    fee: ServiceFee,
    state: Mutex<CheckoutState>,
}

const EDITABLE: [CheckoutStage; 4] = [
    CheckoutStage::Cart,
    CheckoutStage::AddressSelected,
    CheckoutStage::Quoted,
    CheckoutStage::ReadyToPay,
];

impl CheckoutStore {
    /// Start a checkout for the given cart lines.
    #[must_use]
    pub fn new(
        backend: Arc<dyn Backend>,
        cache: ClientCache,
        fee: ServiceFee,
        buyer_id: UserId,
        lines: Vec<CartLine>,
    ) -> Self {
        Self {
            backend,
            cache,
            fee,
            state: Mutex::new(CheckoutState {
                stage: CheckoutStage::Cart,
                buyer_id,
                lines,
                address: None,
                quotes: ShippingCosts::new(),
                payment_method: None,
                idempotency_key: IdempotencyKey::generate(),
                last_error: None,
                confirmation: None,
            }),
        }
    }

    /// Current state.
    pub async fn state(&self) -> CheckoutState {
        self.state.lock().await.clone()
    }

    /// Totals for the current lines, quotes and fee.
    pub async fn totals(&self) -> OrderTotals {
        let state = self.state.lock().await;
        calculate_order(&state.items(), &state.quotes, &self.fee)
    }

    /// Choose the shipping address. Any existing quotes are discarded.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::InvalidStage` during or after payment.
    pub async fn select_address(&self, address: Address) -> Result<(), CheckoutError> {
        let mut state = self.state.lock().await;
        state.require("select an address", &EDITABLE)?;
        if state.lines.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }
        if address.user_id != state.buyer_id {
            return Err(ValidationError::Invalid {
                field: "address",
                message: "address belongs to another user".to_string(),
            }
            .into());
        }
        state.address = Some(address);
        state.quotes.clear();
        state.idempotency_key = IdempotencyKey::generate();
        state.last_error = None;
        state.stage = CheckoutStage::AddressSelected;
        Ok(())
    }

    /// Quote shipping for every line to the selected address.
    ///
    /// Quotes are applied only if the address did not change meanwhile.
    ///
    /// # Errors
    ///
    /// Returns the first failed quote; the stage is left unchanged.
    #[instrument(skip(self))]
    pub async fn fetch_shipping_quotes(&self) -> Result<OrderTotals, CheckoutError> {
        let (address, product_ids) = {
            let state = self.state.lock().await;
            state.require(
                "quote shipping",
                &[
                    CheckoutStage::AddressSelected,
                    CheckoutStage::Quoted,
                    CheckoutStage::ReadyToPay,
                ],
            )?;
            let address = state.address.clone().ok_or(CheckoutError::InvalidStage {
                action: "quote shipping",
                stage: state.stage,
            })?;
            let ids: Vec<ProductId> = state.lines.iter().map(|l| l.product_id).collect();
            (address, ids)
        };

        let shipping = ShippingRepository::new(self.backend.as_ref(), &self.cache);
        let mut quotes = ShippingCosts::new();
        for product_id in product_ids {
            let quote = shipping.quote(product_id, &address).await.inspect_err(|e| {
                warn!(product_id = %product_id, error = %e, "Shipping quote failed");
            })?;
            quotes.insert(product_id, quote.cost);
        }

        let mut state = self.state.lock().await;
        if state.address.as_ref().map(|a| a.id) != Some(address.id) {
            info!("Address changed while quoting; discarding quotes");
            return Err(CheckoutError::InvalidStage {
                action: "apply quotes",
                stage: state.stage,
            });
        }
        if let Some(missing) = missing_quotes(&state.items(), &quotes).into_iter().next() {
            return Err(CheckoutError::MissingQuote(missing));
        }
        state.quotes = quotes;
        state.stage = state.stage_after_quotes();
        Ok(calculate_order(&state.items(), &state.quotes, &self.fee))
    }

    /// Choose the card to charge.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::InvalidStage` before shipping is quoted, and a
    /// validation error for expired cards or cards of another user.
    pub async fn select_payment_method(&self, method: PaymentMethod) -> Result<(), CheckoutError> {
        let mut state = self.state.lock().await;
        state.require(
            "select a payment method",
            &[CheckoutStage::Quoted, CheckoutStage::ReadyToPay],
        )?;
        if method.user_id != state.buyer_id {
            return Err(ValidationError::Invalid {
                field: "payment_method",
                message: "card belongs to another user".to_string(),
            }
            .into());
        }
        let today = Utc::now().date_naive();
        let year = u16::try_from(today.year()).unwrap_or(u16::MAX);
        let month = u8::try_from(today.month()).unwrap_or(12);
        if method.is_expired(year, month) {
            return Err(ValidationError::Invalid {
                field: "payment_method",
                message: format!("{} has expired", method.label()),
            }
            .into());
        }
        state.payment_method = Some(method);
        state.last_error = None;
        state.stage = CheckoutStage::ReadyToPay;
        Ok(())
    }

    /// Re-check stock and pay.
    ///
    /// Unavailable products (no longer active, or listed by the buyer) are
    /// removed from the checkout and reported as `StockChanged`. A failed
    /// payment returns to `ReadyToPay`; retrying reuses the same idempotency
    /// key.
    ///
    /// # Errors
    ///
    /// Returns `StockChanged`, `MissingQuote`, or the payment error.
    #[instrument(skip(self))]
    pub async fn pay(&self) -> Result<PaymentConfirmation, CheckoutError> {
        let snapshot = {
            let mut state = self.state.lock().await;
            state.require("pay", &[CheckoutStage::ReadyToPay])?;
            if let Some(missing) = missing_quotes(&state.items(), &state.quotes).into_iter().next() {
                return Err(CheckoutError::MissingQuote(missing));
            }
            state.stage = CheckoutStage::Processing;
            state.last_error = None;
            state.clone()
        };

        match self.revalidate_and_pay(&snapshot).await {
            Ok(confirmation) => {
                let mut state = self.state.lock().await;
                state.stage = CheckoutStage::Completed;
                state.confirmation = Some(confirmation.clone());
                drop(state);
                for line in &snapshot.lines {
                    self.cache.invalidate_product(&product_key(line.product_id)).await;
                }
                info!(payment_intent_id = %confirmation.payment_intent_id, "Checkout completed");
                Ok(confirmation)
            }
            Err(err) => {
                let mut state = self.state.lock().await;
                if let CheckoutError::StockChanged { products, .. } = &err {
                    state.lines.retain(|l| !products.contains(&l.product_id));
                    for id in products {
                        state.quotes.remove(id);
                    }
                    state.idempotency_key = IdempotencyKey::generate();
                }
                state.stage = if state.lines.is_empty() {
                    CheckoutStage::Failed
                } else {
                    CheckoutStage::ReadyToPay
                };
                state.last_error = Some(err.user_message());
                warn!(error = %err, "Payment failed");
                Err(err)
            }
        }
    }

    async fn revalidate_and_pay(
        &self,
        snapshot: &CheckoutState,
    ) -> Result<PaymentConfirmation, CheckoutError> {
        let ids: Vec<ProductId> = snapshot.lines.iter().map(|l| l.product_id).collect();
        let fresh = ProductRepository::new(self.backend.as_ref(), &self.cache)
            .get_many_fresh(&ids)
            .await?;

        let mut unavailable = Vec::new();
        let mut titles = Vec::new();
        for line in &snapshot.lines {
            let current = fresh.iter().find(|p| p.id == line.product_id);
            let ok = current.is_some_and(|p| {
                p.status.is_purchasable() && p.seller_id != snapshot.buyer_id
            });
            if !ok {
                unavailable.push(line.product_id);
                titles.push(line.title.clone());
            }
        }
        if !unavailable.is_empty() {
            return Err(CheckoutError::StockChanged {
                products: unavailable,
                titles,
            });
        }

        let totals = calculate_order(&snapshot.items(), &snapshot.quotes, &self.fee);
        let (Some(address), Some(method)) = (&snapshot.address, &snapshot.payment_method) else {
            return Err(CheckoutError::InvalidStage {
                action: "pay",
                stage: snapshot.stage,
            });
        };

        let items: Vec<_> = snapshot
            .lines
            .iter()
            .map(|l| {
                json!({
                    "product_id": l.product_id,
                    "seller_id": l.seller_id,
                    "quantity": l.quantity,
                    "unit_price": l.unit_price,
                    "shipping_cost": snapshot.quotes.get(&l.product_id),
                })
            })
            .collect();
        let body = json!({
            "buyer_id": snapshot.buyer_id,
            "address_id": address.id,
            "payment_method_id": method.stripe_payment_method_id,
            "items": items,
            "subtotal": totals.subtotal,
            "shipping_cost": totals.shipping_cost,
            "service_fee": totals.service_fee,
            "total": totals.total,
            "currency": "MXN",
            "idempotency_key": snapshot.idempotency_key,
        });

        let response = self
            .backend
            .invoke(functions::CREATE_PAYMENT_INTENT, body)
            .await
            .and_then(reject_on_failure)?;
        let confirmation: PaymentConfirmation =
            serde_json::from_value(response).map_err(ClientError::from)?;

        if matches!(
            confirmation.status.as_str(),
            "requires_payment_method" | "canceled"
        ) {
            return Err(ClientError::Rejected("Your card was declined.".to_string()).into());
        }
        Ok(confirmation)
    }
}
