//! Address repository.

use hwmarket_core::validation::{validate_address, validate_phone, validate_postal_code};
use hwmarket_core::{Address, AddressId, AddressPatch, NewAddress, UserId};
use serde_json::json;
use tracing::instrument;

use crate::backend::{Backend, Direction, Query, Table, fetch_all, insert_as, update_as};
use crate::error::{ClientError, Result};

/// Repository for the `addresses` table.
pub struct AddressRepository<'a> {
    backend: &'a dyn Backend,
}

impl<'a> AddressRepository<'a> {
    /// Create a new address repository.
    #[must_use]
    pub const fn new(backend: &'a dyn Backend) -> Self {
        Self { backend }
    }

    /// A user's addresses, default first.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn list(&self, user_id: UserId) -> Result<Vec<Address>> {
        let query = Query::table(Table::Addresses)
            .eq("user_id", user_id)
            .order("is_default", Direction::Desc)
            .order("created_at", Direction::Desc);
        fetch_all(self.backend, &query).await
    }

    /// Save a new address. A default address replaces the previous default.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Validation` for invalid fields, or the request error.
    #[instrument(skip(self, address), fields(user_id = %address.user_id))]
    pub async fn create(&self, address: &NewAddress) -> Result<Address> {
        validate_address(address)?;
        if address.is_default {
            self.clear_default(address.user_id).await?;
        }
        insert_as(self.backend, Table::Addresses, address).await
    }

    /// Apply a partial update.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::NotFound` if the address does not exist.
    #[instrument(skip(self, patch))]
    pub async fn update(&self, id: AddressId, patch: &AddressPatch) -> Result<Address> {
        if let Some(code) = &patch.postal_code {
            validate_postal_code(code)?;
        }
        if let Some(phone) = &patch.phone {
            validate_phone(phone)?;
        }
        let query = Query::table(Table::Addresses).eq("id", id);
        update_as(self.backend, &query, patch)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ClientError::NotFound(format!("address {id}")))
    }

    /// Delete an address.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: AddressId) -> Result<()> {
        self.backend
            .delete(&Query::table(Table::Addresses).eq("id", id))
            .await
    }

    /// Make one address the default, clearing the previous default first.
    ///
    /// The caller's current default is left alone if `id` is not theirs.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::NotFound` if the address does not belong to the user.
    #[instrument(skip(self))]
    pub async fn set_default(&self, user_id: UserId, id: AddressId) -> Result<Address> {
        let query = Query::table(Table::Addresses)
            .eq("id", id)
            .eq("user_id", user_id);
        if self.backend.select(&query.clone().limit(1)).await?.is_empty() {
            return Err(ClientError::NotFound(format!("address {id}")));
        }
        self.clear_default(user_id).await?;
        update_as(self.backend, &query, &json!({ "is_default": true }))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ClientError::NotFound(format!("address {id}")))
    }

    async fn clear_default(&self, user_id: UserId) -> Result<()> {
        let query = Query::table(Table::Addresses)
            .eq("user_id", user_id)
            .eq("is_default", true);
        self.backend
            .update(&query, json!({ "is_default": false }))
            .await?;
        Ok(())
    }
}
