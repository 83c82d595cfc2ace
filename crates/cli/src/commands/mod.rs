//! Command implementations.

pub mod bank_accounts;
pub mod clabe;
pub mod order;
pub mod session;
pub mod wallet;

use hwmarket_client::{ClientError, ConfigError};
use hwmarket_core::Price;
use rust_decimal::Decimal;
use thiserror::Error;

/// Errors a command can end with.
#[derive(Debug, Error)]
pub enum CliError {
    /// No email or password was given.
    #[error("Sign-in required: pass --email/--password or set MARKET_EMAIL and MARKET_PASSWORD")]
    MissingCredentials,

    /// Environment configuration is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The backend refused or the request failed.
    #[error("{}", .0.user_message())]
    Client(#[from] ClientError),

    /// The signed-in user has no wallet yet.
    #[error("No wallet found for this account; wallets are created with the first sale")]
    NoWallet,

    /// No destination was given and no default account exists.
    #[error("No default bank account; pass --bank-account or add one with `hwm bank-accounts add`")]
    NoDefaultBankAccount,

    /// The CLABE did not validate.
    #[error("Invalid CLABE: {0}")]
    InvalidClabe(String),
}

/// "$1,299.00 MXN".
pub fn mxn(amount: Decimal) -> String {
    Price::mxn(amount).display()
}
