//! Rows for seeding [`MemoryBackend`](crate::MemoryBackend).

use std::str::FromStr;
use std::time::Duration;

use chrono::Utc;
use hwmarket_client::backend::Table;
use hwmarket_client::stores::CartLine;
use hwmarket_client::{ClientCache, WalletStore};
use hwmarket_core::{
    Address, AddressId, CurrencyCode, NewAddress, PaymentMethod, PaymentMethodId, Product,
    ProductCondition, ProductId, ProductStatus, TransactionId, TransactionKind,
    TransactionStatus, UserId, Wallet, WalletId, WalletTransaction,
};
use rust_decimal::Decimal;

use crate::MemoryBackend;

/// CLABEs with valid check digits.
pub const BANAMEX_CLABE: &str = "002010077777777771";
pub const SANTANDER_CLABE: &str = "014180655091234560";

/// Minimum payout used by [`wallet_store`].
pub const MIN_PAYOUT: &str = "100.00";

/// Delay before a failed wallet subscription reconnects.
pub const REALTIME_RETRY: Duration = Duration::from_secs(5);

/// Parse a money literal.
///
/// # Panics
///
/// Panics on a malformed literal.
#[must_use]
#[allow(clippy::unwrap_used)]
pub fn mxn(amount: &str) -> Decimal {
    Decimal::from_str(amount).unwrap()
}

/// A wallet store over `backend` with the usual limits.
#[must_use]
pub fn wallet_store(backend: &MemoryBackend) -> WalletStore {
    WalletStore::new(backend.shared(), mxn(MIN_PAYOUT), REALTIME_RETRY)
}

#[must_use]
pub fn cache() -> ClientCache {
    ClientCache::new(Duration::from_secs(300))
}

/// Seed a wallet for `user_id`.
pub fn seed_wallet(backend: &MemoryBackend, user_id: UserId, available: &str, pending: &str) -> Wallet {
    let wallet = Wallet {
        id: WalletId::random(),
        user_id,
        available_balance: mxn(available),
        pending_balance: mxn(pending),
        currency: CurrencyCode::default(),
        updated_at: Some(Utc::now()),
    };
    backend.seed(Table::Wallets, &wallet);
    wallet
}

/// Seed a completed sale credited `minutes_ago`.
pub fn seed_sale(
    backend: &MemoryBackend,
    wallet_id: WalletId,
    amount: &str,
    minutes_ago: i64,
) -> WalletTransaction {
    let tx = WalletTransaction {
        id: TransactionId::random(),
        wallet_id,
        kind: TransactionKind::Sale,
        status: TransactionStatus::Completed,
        amount: mxn(amount),
        description: Some("Venta".to_string()),
        reference_id: None,
        created_at: Utc::now() - chrono::Duration::minutes(minutes_ago),
    };
    backend.seed(Table::WalletTransactions, &tx);
    tx
}

/// Seed an active listing.
pub fn seed_product(backend: &MemoryBackend, seller_id: UserId, title: &str, price: &str) -> Product {
    let product = Product {
        id: ProductId::random(),
        seller_id,
        title: title.to_string(),
        description: None,
        price: mxn(price),
        category: Some("gpu".to_string()),
        condition: ProductCondition::Good,
        status: ProductStatus::Active,
        images: vec![format!("memory://product-images/{title}.jpg")],
        postal_code: Some("64000".to_string()),
        created_at: Utc::now(),
        updated_at: None,
    };
    backend.seed(Table::Products, &product);
    product
}

/// Cart line for a listing.
#[must_use]
pub fn cart_line(product: &Product) -> CartLine {
    CartLine {
        product_id: product.id,
        seller_id: product.seller_id,
        title: product.title.clone(),
        unit_price: product.price,
        quantity: 1,
        image: product.cover_image().map(ToString::to_string),
        added_at: Utc::now(),
    }
}

/// A complete, valid address form.
#[must_use]
pub fn new_address(user_id: UserId, label: &str) -> NewAddress {
    NewAddress {
        user_id,
        label: Some(label.to_string()),
        recipient_name: "Ana López".to_string(),
        phone: "55 1234 5678".to_string(),
        street: "Av. Insurgentes Sur".to_string(),
        exterior_number: "1602".to_string(),
        interior_number: None,
        neighborhood: "Crédito Constructor".to_string(),
        city: "Ciudad de México".to_string(),
        state: "CDMX".to_string(),
        postal_code: "03940".to_string(),
        country: "MX".to_string(),
        is_default: false,
    }
}

/// A stored address, as checkout receives it.
#[must_use]
pub fn address(user_id: UserId) -> Address {
    let form = new_address(user_id, "Casa");
    Address {
        id: AddressId::random(),
        user_id,
        label: form.label,
        recipient_name: form.recipient_name,
        phone: form.phone,
        street: form.street,
        exterior_number: form.exterior_number,
        interior_number: form.interior_number,
        neighborhood: form.neighborhood,
        city: form.city,
        state: form.state,
        postal_code: form.postal_code,
        country: form.country,
        is_default: true,
        created_at: Utc::now(),
    }
}

/// A card that expires well in the future.
#[must_use]
pub fn card(user_id: UserId) -> PaymentMethod {
    PaymentMethod {
        id: PaymentMethodId::random(),
        user_id,
        stripe_payment_method_id: "pm_card_visa".to_string(),
        brand: "visa".to_string(),
        last4: "4242".to_string(),
        exp_month: 12,
        exp_year: 2099,
        is_default: true,
    }
}
