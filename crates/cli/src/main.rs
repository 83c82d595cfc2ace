//! Hardware Market CLI - wallet, payouts and marketplace tools.
//!
//! # Usage
//!
//! ```bash
//! # Check a CLABE before registering it
//! hwm clabe validate 002010077777777771
//!
//! # Price an order: two items, the first with shipping quoted
//! hwm order quote --item 4500+180 --item 1200x2
//!
//! # Wallet (signs in with MARKET_EMAIL / MARKET_PASSWORD)
//! hwm wallet show
//! hwm wallet payout --amount 1500.00
//! hwm wallet watch
//!
//! # Payout destinations
//! hwm bank-accounts list
//! hwm bank-accounts add --clabe 002010077777777771 --holder "Ana López" --default
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};
use hwmarket_core::BankAccountId;
use rust_decimal::Decimal;

mod commands;

use commands::order::{OrderLine, parse_order_line};
use commands::session::Credentials;

#[derive(Parser)]
#[command(name = "hwm")]
#[command(author, version, about = "Hardware Market command-line tools")]
struct Cli {
    #[command(flatten)]
    credentials: Credentials,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// CLABE (bank account) tools
    Clabe {
        #[command(subcommand)]
        action: ClabeAction,
    },
    /// Order pricing
    Order {
        #[command(subcommand)]
        action: OrderAction,
    },
    /// Seller wallet and payouts
    Wallet {
        #[command(subcommand)]
        action: WalletAction,
    },
    /// Payout bank accounts
    BankAccounts {
        #[command(subcommand)]
        action: BankAccountAction,
    },
}

#[derive(Subcommand)]
enum ClabeAction {
    /// Check length, digits and check digit, and name the bank
    Validate {
        /// 18-digit CLABE; spaces and dashes are ignored
        clabe: String,
    },
}

#[derive(Subcommand)]
enum OrderAction {
    /// Compute subtotal, shipping, service fee and total
    Quote {
        /// Line as PRICE[xQTY][+SHIPPING], e.g. 4500, 1200x2, 4500+180
        #[arg(short, long = "item", required = true, value_parser = parse_order_line)]
        items: Vec<OrderLine>,

        /// Service fee as a fraction of the subtotal
        #[arg(long, env = "MARKET_SERVICE_FEE_PERCENT", default_value = "0.05")]
        fee_percent: Decimal,

        /// Flat service fee per order
        #[arg(long, env = "MARKET_SERVICE_FEE_FIXED", default_value = "10.00")]
        fee_fixed: Decimal,
    },
}

#[derive(Subcommand)]
enum WalletAction {
    /// Show balances and recent transactions
    Show {
        /// Number of transactions to list
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },
    /// Withdraw available funds to a bank account
    Payout {
        /// Amount in MXN, at most two decimals
        #[arg(short, long)]
        amount: Decimal,

        /// Destination account; the default account when omitted
        #[arg(short, long)]
        bank_account: Option<BankAccountId>,

        /// Extra attempts after a network failure, reusing the same idempotency key
        #[arg(long, default_value_t = 2)]
        retries: u32,
    },
    /// Print balance changes as they happen until Ctrl+C
    Watch,
}

#[derive(Subcommand)]
enum BankAccountAction {
    /// List payout accounts
    List,
    /// Register a payout account
    Add {
        #[arg(long)]
        clabe: String,

        /// Account holder name as the bank has it
        #[arg(long)]
        holder: String,

        /// Make this the default payout account
        #[arg(long)]
        default: bool,
    },
}

#[tokio::main]
async fn main() {
    // Load .env before clap reads env-backed arguments
    let _ = dotenvy::dotenv();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "hwmarket_cli=info".into());
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let credentials = cli.credentials;
    match cli.command {
        Commands::Clabe { action } => match action {
            ClabeAction::Validate { clabe } => commands::clabe::validate(&clabe)?,
        },
        Commands::Order { action } => match action {
            OrderAction::Quote {
                items,
                fee_percent,
                fee_fixed,
            } => commands::order::quote(&items, fee_percent, fee_fixed),
        },
        Commands::Wallet { action } => {
            let (client, user_id) = commands::session::sign_in(&credentials).await?;
            match action {
                WalletAction::Show { limit } => {
                    commands::wallet::show(&client, user_id, limit).await?;
                }
                WalletAction::Payout {
                    amount,
                    bank_account,
                    retries,
                } => {
                    commands::wallet::payout(&client, user_id, amount, bank_account, retries)
                        .await?;
                }
                WalletAction::Watch => commands::wallet::watch(&client, user_id).await?,
            }
        }
        Commands::BankAccounts { action } => {
            let (client, user_id) = commands::session::sign_in(&credentials).await?;
            match action {
                BankAccountAction::List => commands::bank_accounts::list(&client, user_id).await?,
                BankAccountAction::Add {
                    clabe,
                    holder,
                    default,
                } => {
                    commands::bank_accounts::add(&client, user_id, &clabe, &holder, default)
                        .await?;
                }
            }
        }
    }
    Ok(())
}
