//! Typed data access over the backend tables, functions and procedures.
//!
//! Each repository borrows a [`Backend`](crate::backend::Backend) (and, where
//! it caches, the shared [`ClientCache`](crate::cache::ClientCache)) and is
//! cheap to construct per call site.

mod addresses;
mod bank_accounts;
mod blocks;
mod favorites;
mod notifications;
mod payment_methods;
mod products;
mod reports;
mod shipping;
mod storage;
mod wallet;

pub use addresses::AddressRepository;
pub use bank_accounts::BankAccountRepository;
pub use blocks::BlockRepository;
pub use favorites::FavoriteRepository;
pub use notifications::NotificationRepository;
pub use payment_methods::PaymentMethodRepository;
pub use products::{ProductFilter, ProductRepository};
pub(crate) use products::product_key;
pub use reports::ReportRepository;
pub use shipping::ShippingRepository;
pub use storage::StorageClient;
pub use wallet::{PayoutArgs, PayoutReceipt, WalletRepository};
