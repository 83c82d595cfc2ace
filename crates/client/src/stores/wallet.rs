//! Wallet balance reconciliation.
//!
//! The wallet row on the backend is the only authority on money. This store
//! keeps the last row it saw plus an optimistic debit for a payout that is
//! in flight. The balance shown to the seller is the server balance minus
//! that debit, so a realtime update arriving mid-payout never undoes the
//! rollback and vice versa.
//!
//! Payout flow:
//!
//! 1. validate locally (amount, precision, minimum, displayed balance)
//! 2. record the optimistic debit
//! 3. call `fn_request_payout` with the request's idempotency key
//! 4. on failure drop the debit and report the error
//! 5. on success drop the debit, apply the reported balance and refetch

use std::sync::{Arc, Mutex};
use std::time::Duration;

use hwmarket_core::validation::validate_payout_amount;
use hwmarket_core::{
    BankAccountId, IdempotencyKey, UserId, ValidationError, Wallet, WalletId, WalletTransaction,
};
use rust_decimal::Decimal;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use crate::backend::Backend;
use crate::error::{ClientError, Result};
use crate::realtime::{WalletFeed, WalletSubscription};
use crate::repositories::{PayoutArgs, PayoutReceipt, WalletRepository};

/// What a wallet screen shows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WalletSnapshot {
    /// Last wallet row received from the backend.
    pub wallet: Option<Wallet>,
    /// Latest ledger entries, newest first.
    pub transactions: Vec<WalletTransaction>,
    /// Sum of payouts sent but not yet settled.
    pub optimistic_debit: Decimal,
    pub loading: bool,
    pub payout_in_flight: bool,
    /// Message from the last failed operation.
    pub error: Option<String>,
}

impl WalletSnapshot {
    /// Balance the seller can withdraw right now.
    #[must_use]
    pub fn available_balance(&self) -> Decimal {
        self.wallet
            .as_ref()
            .map_or(Decimal::ZERO, |w| w.available_balance - self.optimistic_debit)
    }

    /// Funds held in escrow.
    #[must_use]
    pub fn pending_balance(&self) -> Decimal {
        self.wallet
            .as_ref()
            .map_or(Decimal::ZERO, |w| w.pending_balance)
    }

    fn wallet_id(&self) -> Option<WalletId> {
        self.wallet.as_ref().map(|w| w.id)
    }

    /// Release a payout's optimistic debit once the request finishes.
    ///
    /// A no-op if another wallet was loaded meanwhile, since loading it
    /// already reset the debit.
    fn settle_debit(&mut self, wallet_id: WalletId, amount: Decimal) {
        if self.wallet_id() != Some(wallet_id) {
            return;
        }
        self.optimistic_debit -= amount;
        self.payout_in_flight = false;
    }
}

/// One logical payout.
///
/// The idempotency key is fixed at construction, so passing the same request
/// to [`WalletStore::request_payout`] again after a failure lets the backend
/// recognize the retry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayoutRequest {
    pub amount: Decimal,
    pub bank_account_id: BankAccountId,
    idempotency_key: IdempotencyKey,
}

impl PayoutRequest {
    #[must_use]
    pub fn new(amount: Decimal, bank_account_id: BankAccountId) -> Self {
        Self {
            amount,
            bank_account_id,
            idempotency_key: IdempotencyKey::generate(),
        }
    }

    #[must_use]
    pub const fn idempotency_key(&self) -> IdempotencyKey {
        self.idempotency_key
    }
}

/// Wallet state for the signed-in seller.
pub struct WalletStore {
    backend: Arc<dyn Backend>,
    min_payout: Decimal,
    realtime_retry: Duration,
    state: Arc<watch::Sender<WalletSnapshot>>,
    subscription: Mutex<Option<WalletSubscription>>,
}

impl WalletStore {
    /// Create an empty store.
    #[must_use]
    pub fn new(backend: Arc<dyn Backend>, min_payout: Decimal, realtime_retry: Duration) -> Self {
        let (state, _) = watch::channel(WalletSnapshot::default());
        Self {
            backend,
            min_payout,
            realtime_retry,
            state: Arc::new(state),
            subscription: Mutex::new(None),
        }
    }

    /// Current state.
    #[must_use]
    pub fn snapshot(&self) -> WalletSnapshot {
        self.state.borrow().clone()
    }

    /// Receive every state change.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<WalletSnapshot> {
        self.state.subscribe()
    }

    /// Displayed available balance.
    #[must_use]
    pub fn available_balance(&self) -> Decimal {
        self.state.borrow().available_balance()
    }

    /// Displayed escrow balance.
    #[must_use]
    pub fn pending_balance(&self) -> Decimal {
        self.state.borrow().pending_balance()
    }

    /// Fetch the user's wallet and its latest transactions.
    ///
    /// Transactions are applied only if the store still shows the wallet
    /// they were fetched for.
    ///
    /// # Errors
    ///
    /// Returns the request error; the message is also kept in the snapshot.
    #[instrument(skip(self))]
    pub async fn load(&self, user_id: UserId) -> Result<Option<Wallet>> {
        self.state.send_modify(|s| {
            s.loading = true;
            s.error = None;
        });

        let repo = WalletRepository::new(self.backend.as_ref());
        let wallet = match repo.by_user(user_id).await {
            Ok(wallet) => wallet,
            Err(e) => {
                self.fail(&e);
                return Err(e);
            }
        };

        let Some(wallet) = wallet else {
            self.state.send_modify(|s| {
                s.wallet = None;
                s.transactions.clear();
                s.loading = false;
            });
            return Ok(None);
        };

        self.apply_wallet(wallet.clone(), true);
        if let Err(e) = self.load_transactions(wallet.id).await {
            self.fail(&e);
            return Err(e);
        }
        self.state.send_modify(|s| s.loading = false);
        Ok(Some(wallet))
    }

    /// Refetch the wallet currently shown.
    ///
    /// # Errors
    ///
    /// Returns the request error.
    pub async fn refresh(&self) -> Result<()> {
        let Some(wallet_id) = self.state.borrow().wallet_id() else {
            return Ok(());
        };
        let repo = WalletRepository::new(self.backend.as_ref());
        if let Some(wallet) = repo.get(wallet_id).await? {
            self.apply_wallet(wallet, false);
        }
        self.load_transactions(wallet_id).await
    }

    /// Request a payout with optimistic bookkeeping.
    ///
    /// # Errors
    ///
    /// - `ClientError::Validation` before any request is made
    /// - a transport error (generic message, balance restored)
    /// - `ClientError::Rejected`/`Api` with the backend's message (balance restored)
    #[instrument(skip(self, request), fields(amount = %request.amount, idempotency_key = %request.idempotency_key))]
    pub async fn request_payout(&self, request: &PayoutRequest) -> Result<PayoutReceipt> {
        let wallet_id = self.reserve(request.amount)?;

        let args = PayoutArgs {
            p_wallet_id: wallet_id,
            p_amount: request.amount,
            p_bank_account_id: request.bank_account_id,
            p_idempotency_key: request.idempotency_key,
        };
        let result = WalletRepository::new(self.backend.as_ref())
            .request_payout(&args)
            .await;

        match result {
            Err(e) => {
                self.state.send_modify(|s| {
                    s.settle_debit(wallet_id, request.amount);
                    s.error = Some(e.user_message());
                });
                if e.is_transport() {
                    warn!(wallet_id = %wallet_id, error = %e, "Payout request did not complete");
                } else {
                    info!(wallet_id = %wallet_id, error = %e, "Payout rejected");
                }
                Err(e)
            }
            Ok(receipt) => {
                self.state.send_modify(|s| {
                    s.settle_debit(wallet_id, request.amount);
                    if let (Some(balance), Some(wallet)) =
                        (receipt.new_available_balance, s.wallet.as_mut())
                        && wallet.id == wallet_id
                    {
                        wallet.available_balance = balance;
                    }
                });
                info!(wallet_id = %wallet_id, transaction_id = ?receipt.transaction_id, "Payout requested");

                if let Err(e) = self.refresh().await {
                    warn!(wallet_id = %wallet_id, error = %e, "Refetch after payout failed");
                }
                Ok(receipt)
            }
        }
    }

    /// Follow live updates of the loaded wallet.
    ///
    /// Replaces any previous subscription.
    ///
    /// # Errors
    ///
    /// Returns a validation error if no wallet is loaded.
    pub fn subscribe(&self, feed: Arc<dyn WalletFeed>) -> Result<()> {
        let wallet_id = self
            .state
            .borrow()
            .wallet_id()
            .ok_or(ValidationError::Required { field: "wallet" })?;

        let state = Arc::clone(&self.state);
        let handle = WalletSubscription::spawn(feed, wallet_id, self.realtime_retry, move |wallet| {
            state.send_if_modified(|s| {
                if s.wallet_id() == Some(wallet.id) && s.wallet.as_ref() != Some(&wallet) {
                    s.wallet = Some(wallet);
                    true
                } else {
                    false
                }
            });
        });

        if let Ok(mut slot) = self.subscription.lock() {
            // Replacing the handle drops, and so aborts, the previous task.
            *slot = Some(handle);
        }
        debug!(wallet_id = %wallet_id, "Subscribed to wallet updates");
        Ok(())
    }

    /// Stop live updates.
    pub fn unsubscribe(&self) {
        if let Ok(mut slot) = self.subscription.lock() {
            slot.take();
        }
    }

    /// Returns `true` while a live subscription is running.
    #[must_use]
    pub fn is_subscribed(&self) -> bool {
        self.subscription
            .lock()
            .is_ok_and(|slot| slot.as_ref().is_some_and(WalletSubscription::is_active))
    }

    /// Validate a payout and record its optimistic debit atomically.
    fn reserve(&self, amount: Decimal) -> Result<WalletId> {
        let mut outcome: Result<WalletId> = Err(ValidationError::Required { field: "wallet" }.into());
        self.state.send_if_modified(|s| {
            let Some(wallet_id) = s.wallet_id() else {
                return false;
            };
            if s.payout_in_flight {
                outcome = Err(ClientError::Validation(ValidationError::Invalid {
                    field: "amount",
                    message: "a payout is already being processed".to_string(),
                }));
                return false;
            }
            if let Err(e) = validate_payout_amount(amount, s.available_balance(), self.min_payout) {
                outcome = Err(e.into());
                return false;
            }
            s.optimistic_debit += amount;
            s.payout_in_flight = true;
            s.error = None;
            outcome = Ok(wallet_id);
            true
        });
        outcome
    }

    /// Install a wallet row. A different wallet resets the ledger.
    fn apply_wallet(&self, wallet: Wallet, reset_on_change: bool) {
        self.state.send_modify(|s| {
            if reset_on_change && s.wallet_id() != Some(wallet.id) {
                s.transactions.clear();
                s.optimistic_debit = Decimal::ZERO;
                s.payout_in_flight = false;
            }
            s.wallet = Some(wallet);
        });
    }

    async fn load_transactions(&self, wallet_id: WalletId) -> Result<()> {
        let transactions = WalletRepository::new(self.backend.as_ref())
            .transactions(wallet_id)
            .await?;
        let applied = self.state.send_if_modified(|s| {
            if s.wallet_id() == Some(wallet_id) {
                s.transactions = transactions;
                true
            } else {
                false
            }
        });
        if !applied {
            debug!(wallet_id = %wallet_id, "Discarding transactions for a wallet no longer shown");
        }
        Ok(())
    }

    fn fail(&self, err: &ClientError) {
        let message = err.user_message();
        self.state.send_modify(|s| {
            s.loading = false;
            s.error = Some(message);
        });
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn snapshot(available: Decimal, debit: Decimal) -> WalletSnapshot {
        WalletSnapshot {
            wallet: Some(Wallet {
                id: WalletId::random(),
                user_id: UserId::random(),
                available_balance: available,
                pending_balance: Decimal::new(300, 0),
                currency: hwmarket_core::CurrencyCode::MXN,
                updated_at: None,
            }),
            optimistic_debit: debit,
            ..WalletSnapshot::default()
        }
    }

    #[test]
    fn test_displayed_balance_subtracts_debit() {
        let s = snapshot(Decimal::new(1_000, 0), Decimal::new(250, 0));
        assert_eq!(s.available_balance(), Decimal::new(750, 0));
        assert_eq!(s.pending_balance(), Decimal::new(300, 0));
        assert_eq!(WalletSnapshot::default().available_balance(), Decimal::ZERO);
    }

    #[test]
    fn test_settle_debit_ignores_replaced_wallet() {
        let mut s = snapshot(Decimal::new(1_000, 0), Decimal::new(250, 0));
        s.payout_in_flight = true;
        s.settle_debit(WalletId::random(), Decimal::new(250, 0));
        assert_eq!(s.optimistic_debit, Decimal::new(250, 0));
        assert!(s.payout_in_flight);

        let id = s.wallet_id().unwrap();
        s.settle_debit(id, Decimal::new(250, 0));
        assert_eq!(s.optimistic_debit, Decimal::ZERO);
        assert!(!s.payout_in_flight);
    }

    #[test]
    fn test_payout_request_key_is_stable() {
        let request = PayoutRequest::new(Decimal::new(150, 0), BankAccountId::random());
        let retry = request.clone();
        assert_eq!(request.idempotency_key(), retry.idempotency_key());
        assert_ne!(
            request.idempotency_key(),
            PayoutRequest::new(Decimal::new(150, 0), request.bank_account_id).idempotency_key()
        );
    }
}
