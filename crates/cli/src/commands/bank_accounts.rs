//! Payout bank account commands.

use hwmarket_client::MarketClient;
use hwmarket_client::repositories::BankAccountRepository;
use hwmarket_core::UserId;

use super::CliError;

/// List the user's payout accounts, default first.
///
/// # Errors
///
/// Returns an error if the request fails.
#[allow(clippy::print_stdout)]
pub async fn list(client: &MarketClient, user_id: UserId) -> Result<(), CliError> {
    let backend = client.backend();
    let accounts = BankAccountRepository::new(backend.as_ref())
        .list(user_id)
        .await?;
    if accounts.is_empty() {
        println!("No bank accounts registered");
    }
    for account in accounts {
        println!(
            "{} {}  {:<20} {}  {}",
            if account.is_default { "*" } else { " " },
            account.id,
            account.bank_name,
            account.masked_clabe(),
            account.account_holder,
        );
    }
    Ok(())
}

/// Validate and register a payout account.
///
/// # Errors
///
/// Returns a validation error for a bad CLABE, unknown bank or blank holder,
/// or the request error.
#[allow(clippy::print_stdout)]
pub async fn add(
    client: &MarketClient,
    user_id: UserId,
    clabe: &str,
    holder: &str,
    make_default: bool,
) -> Result<(), CliError> {
    let backend = client.backend();
    let account = BankAccountRepository::new(backend.as_ref())
        .add(user_id, clabe, holder, make_default)
        .await?;
    println!(
        "Added {} {}{}",
        account.bank_name,
        account.masked_clabe(),
        if account.is_default { " (default)" } else { "" }
    );
    Ok(())
}
