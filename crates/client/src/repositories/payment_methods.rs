//! Saved cards.
//!
//! Reads come from the `payment_methods` mirror table. Changes go through
//! the `manage-payment-methods` function, which owns the processor customer.

use hwmarket_core::{
    CardSummary, IdempotencyKey, PaymentMethod, PaymentMethodAction, SetupIntentSecret, UserId,
};
use serde_json::Value;
use tracing::instrument;

use crate::backend::{Backend, Direction, Query, Table, fetch_all, functions, reject_on_failure};
use crate::error::Result;

/// Repository for payment methods.
pub struct PaymentMethodRepository<'a> {
    backend: &'a dyn Backend,
}

impl<'a> PaymentMethodRepository<'a> {
    /// Create a new payment method repository.
    #[must_use]
    pub const fn new(backend: &'a dyn Backend) -> Self {
        Self { backend }
    }

    /// Cards mirrored for a user, default first.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn list(&self, user_id: UserId) -> Result<Vec<PaymentMethod>> {
        let query = Query::table(Table::PaymentMethods)
            .eq("user_id", user_id)
            .order("is_default", Direction::Desc);
        fetch_all(self.backend, &query).await
    }

    /// Cards as the processor currently sees them.
    ///
    /// # Errors
    ///
    /// Returns an error if the function fails.
    #[instrument(skip(self))]
    pub async fn list_remote(&self) -> Result<Vec<CardSummary>> {
        let response = self.call(&PaymentMethodAction::List).await?;
        let cards = response.get("payment_methods").cloned().unwrap_or(response);
        Ok(serde_json::from_value(cards)?)
    }

    /// Start saving a card.
    ///
    /// Reusing `key` on retry returns the same setup intent.
    ///
    /// # Errors
    ///
    /// Returns an error if the function fails.
    #[instrument(skip(self))]
    pub async fn create_setup_intent(&self, key: IdempotencyKey) -> Result<SetupIntentSecret> {
        let action = PaymentMethodAction::CreateSetupIntent {
            idempotency_key: Some(key.to_string()),
        };
        Ok(serde_json::from_value(self.call(&action).await?)?)
    }

    /// Remove a saved card.
    ///
    /// # Errors
    ///
    /// Returns an error if the function refuses or fails.
    #[instrument(skip(self))]
    pub async fn detach(&self, stripe_payment_method_id: &str) -> Result<()> {
        let action = PaymentMethodAction::Detach {
            payment_method_id: stripe_payment_method_id.to_string(),
        };
        self.call(&action).await?;
        Ok(())
    }

    /// Make a card the default.
    ///
    /// # Errors
    ///
    /// Returns an error if the function refuses or fails.
    #[instrument(skip(self))]
    pub async fn set_default(&self, stripe_payment_method_id: &str) -> Result<()> {
        let action = PaymentMethodAction::SetDefault {
            payment_method_id: stripe_payment_method_id.to_string(),
        };
        self.call(&action).await?;
        Ok(())
    }

    async fn call(&self, action: &PaymentMethodAction) -> Result<Value> {
        let body = serde_json::to_value(action)?;
        let response = self
            .backend
            .invoke(functions::MANAGE_PAYMENT_METHODS, body)
            .await?;
        reject_on_failure(response)
    }
}
