//! Wallet commands.

use std::time::Duration;

use hwmarket_client::repositories::BankAccountRepository;
use hwmarket_client::{MarketClient, PayoutRequest, WalletSnapshot, WalletStore};
use hwmarket_core::{BankAccountId, UserId};
use rust_decimal::Decimal;
use tracing::{info, warn};

use super::{CliError, mxn};

/// Pause before retrying a payout whose request may not have arrived.
const PAYOUT_RETRY_DELAY: Duration = Duration::from_secs(1);

async fn load(client: &MarketClient, user_id: UserId) -> Result<WalletStore, CliError> {
    let store = client.wallet_store();
    if store.load(user_id).await?.is_none() {
        return Err(CliError::NoWallet);
    }
    Ok(store)
}

#[allow(clippy::print_stdout)]
fn print_balances(snapshot: &WalletSnapshot) {
    println!("Available  {}", mxn(snapshot.available_balance()));
    println!("Pending    {}", mxn(snapshot.pending_balance()));
}

/// Print balances and the latest transactions.
///
/// # Errors
///
/// Returns an error if the wallet cannot be loaded.
#[allow(clippy::print_stdout)]
pub async fn show(client: &MarketClient, user_id: UserId, limit: usize) -> Result<(), CliError> {
    let store = load(client, user_id).await?;
    let snapshot = store.snapshot();
    print_balances(&snapshot);

    if snapshot.transactions.is_empty() {
        return Ok(());
    }
    println!();
    for tx in snapshot.transactions.iter().take(limit) {
        println!(
            "{}  {:<10} {:<9} {:>16}  {}",
            tx.created_at.format("%Y-%m-%d %H:%M"),
            tx.kind.to_string(),
            tx.status.to_string(),
            mxn(tx.amount),
            tx.description.as_deref().unwrap_or(""),
        );
    }
    Ok(())
}

/// Request a payout, retrying transport failures with the same key.
///
/// # Errors
///
/// Returns the validation error, the backend's rejection, or the last
/// transport error once retries run out.
#[allow(clippy::print_stdout)]
pub async fn payout(
    client: &MarketClient,
    user_id: UserId,
    amount: Decimal,
    bank_account: Option<BankAccountId>,
    retries: u32,
) -> Result<(), CliError> {
    let store = load(client, user_id).await?;
    let bank_account_id = match bank_account {
        Some(id) => id,
        None => default_bank_account(client, user_id).await?,
    };

    let request = PayoutRequest::new(amount, bank_account_id);
    let mut attempt = 0;
    let receipt = loop {
        match store.request_payout(&request).await {
            Ok(receipt) => break receipt,
            Err(e) if e.is_transport() && attempt < retries => {
                attempt += 1;
                warn!(attempt, error = %e, "Payout request failed, retrying with the same key");
                tokio::time::sleep(PAYOUT_RETRY_DELAY).await;
            }
            Err(e) => return Err(e.into()),
        }
    };

    info!(transaction_id = ?receipt.transaction_id, "Payout requested");
    println!("Payout of {} requested", mxn(amount));
    print_balances(&store.snapshot());
    Ok(())
}

async fn default_bank_account(
    client: &MarketClient,
    user_id: UserId,
) -> Result<BankAccountId, CliError> {
    let backend = client.backend();
    BankAccountRepository::new(backend.as_ref())
        .list(user_id)
        .await?
        .into_iter()
        .find(|a| a.is_default)
        .map(|a| a.id)
        .ok_or(CliError::NoDefaultBankAccount)
}

/// Follow the wallet live until Ctrl+C.
///
/// # Errors
///
/// Returns an error if the wallet cannot be loaded.
pub async fn watch(client: &MarketClient, user_id: UserId) -> Result<(), CliError> {
    let store = load(client, user_id).await?;
    let mut updates = store.watch();
    print_balances(&updates.borrow_and_update());

    store.subscribe(client.realtime())?;
    info!("Watching wallet, press Ctrl+C to stop");

    loop {
        let changed = tokio::select! {
            changed = updates.changed() => changed.is_ok(),
            _ = tokio::signal::ctrl_c() => false,
        };
        if !changed {
            break;
        }
        print_balances(&updates.borrow_and_update());
    }

    store.unsubscribe();
    Ok(())
}
