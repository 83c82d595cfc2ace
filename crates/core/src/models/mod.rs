//! Records mirrored from the backend schema.
//!
//! Each struct maps one row of a backend table. Insert payloads (`New*`)
//! omit server-assigned columns such as `id` and `created_at`.

pub mod address;
pub mod notification;
pub mod payment;
pub mod product;
pub mod social;
pub mod wallet;

pub use address::{Address, AddressPatch, NewAddress};
pub use notification::Notification;
pub use payment::{
    CardSummary, PaymentMethod, PaymentMethodAction, SetupIntentSecret, ShippingQuote,
};
pub use product::{NewProduct, Product};
pub use social::{BlockedUser, Favorite, NewReport, Report};
pub use wallet::{NewBankAccount, SellerBankAccount, Wallet, WalletTransaction};
