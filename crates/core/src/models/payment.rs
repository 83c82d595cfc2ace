//! Saved cards and shipping quotes.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::{PaymentMethodId, ProductId, UserId};

/// A card saved with the payment processor, mirrored in `payment_methods`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentMethod {
    pub id: PaymentMethodId,
    pub user_id: UserId,
    /// Processor-side identifier (`pm_...`).
    pub stripe_payment_method_id: String,
    pub brand: String,
    pub last4: String,
    pub exp_month: u8,
    pub exp_year: u16,
    #[serde(default)]
    pub is_default: bool,
}

impl PaymentMethod {
    /// Returns `true` if the card expired before the given month.
    #[must_use]
    pub fn is_expired(&self, year: u16, month: u8) -> bool {
        (self.exp_year, self.exp_month) < (year, month)
    }

    /// e.g. "visa •••• 4242".
    #[must_use]
    pub fn label(&self) -> String {
        format!("{} •••• {}", self.brand, self.last4)
    }
}

/// Shipping price returned by the quote functions for one product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingQuote {
    pub product_id: ProductId,
    pub cost: Decimal,
    pub carrier: String,
    #[serde(default)]
    pub service: Option<String>,
    #[serde(default)]
    pub estimated_days: Option<u32>,
}

/// Request body of the `manage-payment-methods` function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum PaymentMethodAction {
    /// Cards saved on the caller's processor customer.
    List,
    /// Start saving a new card.
    CreateSetupIntent {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        idempotency_key: Option<String>,
    },
    /// Remove a saved card.
    Detach { payment_method_id: String },
    /// Make a saved card the default for future payments.
    SetDefault { payment_method_id: String },
}

/// A card as reported by the processor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardSummary {
    /// Processor-side identifier (`pm_...`).
    pub id: String,
    pub brand: String,
    pub last4: String,
    pub exp_month: u8,
    pub exp_year: u16,
    #[serde(default)]
    pub is_default: bool,
}

/// Response to `create_setup_intent`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetupIntentSecret {
    pub setup_intent_id: String,
    /// Handed to the payment sheet; never logged.
    pub client_secret: String,
    pub customer_id: String,
}
