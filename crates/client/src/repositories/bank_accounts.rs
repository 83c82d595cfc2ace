//! Payout bank accounts.

use hwmarket_core::validation::validate_bank_account;
use hwmarket_core::{BankAccountId, NewBankAccount, SellerBankAccount, UserId};
use serde_json::json;
use tracing::{info, instrument};

use crate::backend::{Backend, Direction, Query, Table, fetch_all, insert_as, update_as};
use crate::error::{ClientError, Result};

/// Repository for the `seller_bank_accounts` table.
pub struct BankAccountRepository<'a> {
    backend: &'a dyn Backend,
}

impl<'a> BankAccountRepository<'a> {
    /// Create a new bank account repository.
    #[must_use]
    pub const fn new(backend: &'a dyn Backend) -> Self {
        Self { backend }
    }

    /// A seller's accounts, default first.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn list(&self, user_id: UserId) -> Result<Vec<SellerBankAccount>> {
        let query = Query::table(Table::SellerBankAccounts)
            .eq("user_id", user_id)
            .order("is_default", Direction::Desc)
            .order("created_at", Direction::Desc);
        fetch_all(self.backend, &query).await
    }

    /// Register an account after validating the CLABE.
    ///
    /// The bank name comes from the CLABE prefix, not the caller. The first
    /// account is always the default.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Validation` for a bad CLABE, an unknown bank or
    /// a blank holder name.
    #[instrument(skip(self, clabe, account_holder))]
    pub async fn add(
        &self,
        user_id: UserId,
        clabe: &str,
        account_holder: &str,
        make_default: bool,
    ) -> Result<SellerBankAccount> {
        let valid = validate_bank_account(clabe, account_holder)?;

        let existing = self.list(user_id).await?;
        let is_default = make_default || existing.is_empty();
        if is_default && existing.iter().any(|a| a.is_default) {
            self.clear_default(user_id).await?;
        }

        let account = NewBankAccount {
            user_id,
            clabe: valid.clabe.as_str().to_string(),
            bank_name: valid.bank_name.to_string(),
            account_holder: valid.account_holder,
            is_default,
        };
        let created: SellerBankAccount =
            insert_as(self.backend, Table::SellerBankAccounts, &account).await?;
        info!(bank = %created.bank_name, is_default, "Bank account added");
        Ok(created)
    }

    /// Remove an account.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: BankAccountId) -> Result<()> {
        self.backend
            .delete(&Query::table(Table::SellerBankAccounts).eq("id", id))
            .await
    }

    /// Make one account the payout default.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::NotFound` if the account does not belong to the user.
    #[instrument(skip(self))]
    pub async fn set_default(&self, user_id: UserId, id: BankAccountId) -> Result<SellerBankAccount> {
        let query = Query::table(Table::SellerBankAccounts)
            .eq("id", id)
            .eq("user_id", user_id);
        if self.backend.select(&query.clone().limit(1)).await?.is_empty() {
            return Err(ClientError::NotFound(format!("bank account {id}")));
        }
        self.clear_default(user_id).await?;
        update_as(self.backend, &query, &json!({ "is_default": true }))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ClientError::NotFound(format!("bank account {id}")))
    }

    async fn clear_default(&self, user_id: UserId) -> Result<()> {
        let query = Query::table(Table::SellerBankAccounts)
            .eq("user_id", user_id)
            .eq("is_default", true);
        self.backend
            .update(&query, json!({ "is_default": false }))
            .await?;
        Ok(())
    }
}
