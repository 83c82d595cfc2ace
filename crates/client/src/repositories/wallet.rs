//! Wallet rows, the ledger, and the payout procedure.

use hwmarket_core::{
    BankAccountId, IdempotencyKey, TransactionId, UserId, Wallet, WalletId, WalletTransaction,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::instrument;

use crate::backend::{
    Backend, Direction, Query, RPC_REQUEST_PAYOUT, Table, fetch_all, fetch_optional,
    reject_on_failure,
};
use crate::error::Result;

/// Ledger page size.
pub const TRANSACTIONS_PAGE: usize = 50;

/// Arguments of `fn_request_payout`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PayoutArgs {
    pub p_wallet_id: WalletId,
    pub p_amount: Decimal,
    pub p_bank_account_id: BankAccountId,
    pub p_idempotency_key: IdempotencyKey,
}

/// Successful result of `fn_request_payout`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PayoutReceipt {
    #[serde(default)]
    pub transaction_id: Option<TransactionId>,
    /// Balance after the debit, when the procedure reports it.
    #[serde(default)]
    pub new_available_balance: Option<Decimal>,
}

/// Repository for wallets and their transactions.
pub struct WalletRepository<'a> {
    backend: &'a dyn Backend,
}

impl<'a> WalletRepository<'a> {
    /// Create a new wallet repository.
    #[must_use]
    pub const fn new(backend: &'a dyn Backend) -> Self {
        Self { backend }
    }

    /// The user's wallet, if one has been opened.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn by_user(&self, user_id: UserId) -> Result<Option<Wallet>> {
        fetch_optional(self.backend, Query::table(Table::Wallets).eq("user_id", user_id)).await
    }

    /// A wallet by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn get(&self, wallet_id: WalletId) -> Result<Option<Wallet>> {
        fetch_optional(self.backend, Query::table(Table::Wallets).eq("id", wallet_id)).await
    }

    /// Latest ledger entries, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn transactions(&self, wallet_id: WalletId) -> Result<Vec<WalletTransaction>> {
        let query = Query::table(Table::WalletTransactions)
            .eq("wallet_id", wallet_id)
            .order("created_at", Direction::Desc)
            .limit(TRANSACTIONS_PAGE);
        fetch_all(self.backend, &query).await
    }

    /// Call `fn_request_payout`.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Rejected` with the procedure's message when it
    /// refuses, or the transport error.
    #[instrument(skip(self, args), fields(wallet_id = %args.p_wallet_id, amount = %args.p_amount))]
    pub async fn request_payout(&self, args: &PayoutArgs) -> Result<PayoutReceipt> {
        let response = self
            .backend
            .rpc(RPC_REQUEST_PAYOUT, serde_json::to_value(args)?)
            .await?;
        // Set-returning procedures answer with a one-element array.
        let response = match response {
            Value::Array(rows) => rows.into_iter().next().unwrap_or(Value::Null),
            other => other,
        };
        let response = reject_on_failure(response)?;
        if response.is_null() {
            return Ok(PayoutReceipt {
                transaction_id: None,
                new_available_balance: None,
            });
        }
        Ok(serde_json::from_value(response)?)
    }
}
