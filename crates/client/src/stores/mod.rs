//! Client-side state stores.
//!
//! Stores hold what a screen shows and apply optimistic updates that are
//! reconciled with, or rolled back from, backend responses.
//!
//! - [`WalletStore`] - balances, ledger, payouts, live updates
//! - [`CheckoutStore`] - address, quotes, payment method, payment
//! - [`CartStore`] - cart lines persisted to a JSON file
//! - [`SellDraft`] - new listing form and publishing

mod cart;
mod checkout;
mod sell;
mod wallet;

pub use cart::{Cart, CartError, CartLine, CartStore};
pub use checkout::{CheckoutError, CheckoutStage, CheckoutState, CheckoutStore, PaymentConfirmation};
pub use sell::SellDraft;
pub use wallet::{PayoutRequest, WalletSnapshot, WalletStore};
