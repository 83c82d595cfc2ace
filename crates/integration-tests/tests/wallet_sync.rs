//! Integration tests for keeping the wallet screen in sync.
//!
//! Covers the stale-response guard on the ledger and live balance updates
//! through a polling feed, including the reconnect delay.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use hwmarket_client::backend::{Query, Table};
use hwmarket_client::PollingFeed;
use hwmarket_core::UserId;
use hwmarket_integration_tests::fixtures::{mxn, seed_sale, seed_wallet, wallet_store};
use hwmarket_integration_tests::{MemoryBackend, Op};
use serde_json::json;

const POLL: Duration = Duration::from_secs(1);

// =============================================================================
// Loading
// =============================================================================

#[tokio::test]
async fn test_load_orders_transactions_newest_first() {
    let backend = MemoryBackend::new();
    let user = UserId::random();
    let wallet = seed_wallet(&backend, user, "1200.00", "300.00");
    let older = seed_sale(&backend, wallet.id, "700.00", 120);
    let newer = seed_sale(&backend, wallet.id, "500.00", 5);
    let other = seed_wallet(&backend, UserId::random(), "50.00", "0.00");
    seed_sale(&backend, other.id, "50.00", 1);

    let store = wallet_store(&backend);
    let loaded = store.load(user).await.unwrap().unwrap();
    assert_eq!(loaded.id, wallet.id);

    let snapshot = store.snapshot();
    assert!(!snapshot.loading);
    let ids: Vec<_> = snapshot.transactions.iter().map(|t| t.id).collect();
    assert_eq!(ids, vec![newer.id, older.id]);
}

#[tokio::test]
async fn test_load_failure_keeps_message() {
    let backend = MemoryBackend::new();
    let user = UserId::random();
    seed_wallet(&backend, user, "10.00", "0.00");
    backend.fail_next(Op::Select(Table::Wallets), 1);

    let store = wallet_store(&backend);
    assert!(store.load(user).await.is_err());
    let snapshot = store.snapshot();
    assert!(!snapshot.loading);
    assert!(snapshot.error.is_some());

    store.load(user).await.unwrap();
    assert!(store.snapshot().error.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_stale_transactions_are_discarded() {
    let backend = MemoryBackend::new();
    backend.delay(Op::Select(Table::WalletTransactions), Duration::from_secs(1));

    let first_user = UserId::random();
    let first = seed_wallet(&backend, first_user, "100.00", "0.00");
    seed_sale(&backend, first.id, "100.00", 10);

    let second_user = UserId::random();
    let second = seed_wallet(&backend, second_user, "900.00", "0.00");
    let sale = seed_sale(&backend, second.id, "900.00", 10);

    let store = Arc::new(wallet_store(&backend));
    let first_load = {
        let store = Arc::clone(&store);
        tokio::spawn(async move { store.load(first_user).await })
    };
    tokio::time::sleep(Duration::from_millis(500)).await;
    let second_load = {
        let store = Arc::clone(&store);
        tokio::spawn(async move { store.load(second_user).await })
    };

    first_load.await.unwrap().unwrap();
    // The first wallet's ledger arrived after the second wallet was shown.
    let snapshot = store.snapshot();
    assert_eq!(snapshot.wallet.as_ref().map(|w| w.id), Some(second.id));
    assert!(snapshot.transactions.is_empty());

    second_load.await.unwrap().unwrap();
    let snapshot = store.snapshot();
    let ids: Vec<_> = snapshot.transactions.iter().map(|t| t.id).collect();
    assert_eq!(ids, vec![sale.id]);
    assert_eq!(snapshot.available_balance(), mxn("900.00"));
}

// =============================================================================
// Live Updates
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_polling_subscription_applies_server_changes() {
    let backend = MemoryBackend::new();
    let user = UserId::random();
    let wallet = seed_wallet(&backend, user, "1000.00", "0.00");

    let store = wallet_store(&backend);
    store.load(user).await.unwrap();
    store
        .subscribe(Arc::new(PollingFeed::new(backend.shared(), POLL)))
        .unwrap();
    assert!(store.is_subscribed());

    let mut updates = store.watch();
    updates.borrow_and_update();

    backend.patch(
        &Query::table(Table::Wallets).eq("id", wallet.id),
        &json!({ "available_balance": "1500.00", "pending_balance": "250.00" }),
    );
    tokio::time::sleep(Duration::from_millis(1_500)).await;

    assert!(updates.has_changed().unwrap());
    assert_eq!(store.available_balance(), mxn("1500.00"));
    assert_eq!(store.pending_balance(), mxn("250.00"));

    store.unsubscribe();
    assert!(!store.is_subscribed());
    backend.patch(
        &Query::table(Table::Wallets).eq("id", wallet.id),
        &json!({ "available_balance": "1.00" }),
    );
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(store.available_balance(), mxn("1500.00"));
}

#[tokio::test(start_paused = true)]
async fn test_subscription_reconnects_after_five_seconds() {
    let backend = MemoryBackend::new();
    let user = UserId::random();
    let wallet = seed_wallet(&backend, user, "1000.00", "0.00");

    let store = wallet_store(&backend);
    store.load(user).await.unwrap();
    backend.fail_next(Op::Select(Table::Wallets), 1);
    store
        .subscribe(Arc::new(PollingFeed::new(backend.shared(), POLL)))
        .unwrap();

    backend.patch(
        &Query::table(Table::Wallets).eq("id", wallet.id),
        &json!({ "available_balance": "640.00" }),
    );

    // First poll at 1s fails; the feed is reopened at 6s and polls at 7s.
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(store.available_balance(), mxn("1000.00"));
    assert!(store.is_subscribed());

    tokio::time::sleep(Duration::from_millis(2_500)).await;
    assert_eq!(store.available_balance(), mxn("1000.00"));

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(store.available_balance(), mxn("640.00"));
}

#[tokio::test]
async fn test_subscribe_requires_loaded_wallet() {
    let backend = MemoryBackend::new();
    let store = wallet_store(&backend);
    let feed = Arc::new(PollingFeed::new(backend.shared(), POLL));
    assert!(store.subscribe(feed).is_err());
    assert!(!store.is_subscribed());
}
