//! Integration tests for the checkout state machine.
//!
//! Shipping quotes and payment are answered by function handlers registered
//! on the in-memory backend.

#![allow(clippy::unwrap_used)]

use std::sync::atomic::{AtomicUsize, Ordering};

use hwmarket_client::backend::{Query, Table, functions};
use hwmarket_client::stores::{CheckoutError, CheckoutStage};
use hwmarket_client::CheckoutStore;
use hwmarket_core::{Product, ServiceFee, UserId};
use hwmarket_integration_tests::fixtures::{address, cache, card, cart_line, mxn, seed_product};
use hwmarket_integration_tests::{MemoryBackend, Op};
use serde_json::json;

struct Market {
    backend: MemoryBackend,
    buyer: UserId,
    gpu: Product,
    cpu: Product,
}

/// Two listings from one seller, flat-rate shipping and an accepting processor.
fn market() -> Market {
    let backend = MemoryBackend::new();
    let seller = UserId::random();
    let gpu = seed_product(&backend, seller, "RTX 4070", "5000.00");
    let cpu = seed_product(&backend, seller, "Ryzen 7 7700X", "3000.00");

    backend.on_function(functions::SHIPPING_QUOTE, |_, body| {
        Ok(json!({
            "success": true,
            "quote": {
                "product_id": body["product_id"],
                "cost": "150.00",
                "carrier": "Estafeta",
                "service": "Terrestre",
                "estimated_days": 3,
            }
        }))
    });
    backend.on_function(functions::CREATE_PAYMENT_INTENT, |_, body| {
        let orders: Vec<String> = body["items"]
            .as_array()
            .unwrap()
            .iter()
            .map(|_| uuid::Uuid::new_v4().to_string())
            .collect();
        Ok(json!({
            "payment_intent_id": "pi_3Pq2mX",
            "status": "succeeded",
            "order_ids": orders,
        }))
    });

    Market {
        backend,
        buyer: UserId::random(),
        gpu,
        cpu,
    }
}

impl Market {
    fn checkout(&self) -> CheckoutStore {
        CheckoutStore::new(
            self.backend.shared(),
            cache(),
            ServiceFee::default(),
            self.buyer,
            vec![cart_line(&self.gpu), cart_line(&self.cpu)],
        )
    }

    /// A checkout with address, quotes and card in place.
    async fn ready_checkout(&self) -> CheckoutStore {
        let checkout = self.checkout();
        checkout.select_address(address(self.buyer)).await.unwrap();
        checkout.fetch_shipping_quotes().await.unwrap();
        checkout.select_payment_method(card(self.buyer)).await.unwrap();
        checkout
    }

    fn mark_sold(&self, product: &Product) {
        self.backend.patch(
            &Query::table(Table::Products).eq("id", product.id),
            &json!({ "status": "sold" }),
        );
    }
}

// =============================================================================
// Happy Path
// =============================================================================

#[tokio::test]
async fn test_checkout_from_cart_to_completed() {
    let market = market();
    let checkout = market.checkout();
    assert_eq!(checkout.state().await.stage, CheckoutStage::Cart);

    checkout.select_address(address(market.buyer)).await.unwrap();
    assert_eq!(checkout.state().await.stage, CheckoutStage::AddressSelected);

    let totals = checkout.fetch_shipping_quotes().await.unwrap();
    assert_eq!(totals.subtotal, mxn("8000.00"));
    assert_eq!(totals.shipping_cost, mxn("300.00"));
    assert_eq!(totals.service_fee, mxn("410.00"));
    assert_eq!(totals.total, mxn("8710.00"));
    assert_eq!(checkout.state().await.stage, CheckoutStage::Quoted);

    checkout.select_payment_method(card(market.buyer)).await.unwrap();
    let state = checkout.state().await;
    assert_eq!(state.stage, CheckoutStage::ReadyToPay);

    let confirmation = checkout.pay().await.unwrap();
    assert_eq!(confirmation.payment_intent_id, "pi_3Pq2mX");
    assert_eq!(confirmation.order_ids.len(), 2);

    let done = checkout.state().await;
    assert_eq!(done.stage, CheckoutStage::Completed);
    assert_eq!(done.confirmation, Some(confirmation));

    let payments = market.backend.calls(&Op::invoke(functions::CREATE_PAYMENT_INTENT));
    assert_eq!(payments.len(), 1);
    let body = &payments[0];
    assert_eq!(mxn(body["total"].as_str().unwrap()), mxn("8710.00"));
    assert_eq!(body["payment_method_id"], "pm_card_visa");
    assert_eq!(body["idempotency_key"], json!(state.idempotency_key.to_string()));
    assert_eq!(body["items"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_quote_requests_carry_destination() {
    let market = market();
    let checkout = market.checkout();
    let destination = address(market.buyer);
    checkout.select_address(destination.clone()).await.unwrap();
    checkout.fetch_shipping_quotes().await.unwrap();

    let quotes = market.backend.calls(&Op::invoke(functions::SHIPPING_QUOTE));
    assert_eq!(quotes.len(), 2);
    for body in &quotes {
        assert_eq!(body["destination_postal_code"], "03940");
        assert_eq!(body["address_id"], json!(destination.id.to_string()));
    }

    // Quotes are cached per product and postal code.
    checkout.fetch_shipping_quotes().await.unwrap();
    assert_eq!(market.backend.calls(&Op::invoke(functions::SHIPPING_QUOTE)).len(), 2);
}

// =============================================================================
// Stage Guards
// =============================================================================

#[tokio::test]
async fn test_operations_out_of_order_are_refused() {
    let market = market();
    let checkout = market.checkout();

    let err = checkout.pay().await.unwrap_err();
    assert!(matches!(err, CheckoutError::InvalidStage { stage: CheckoutStage::Cart, .. }));

    let err = checkout.fetch_shipping_quotes().await.unwrap_err();
    assert!(matches!(err, CheckoutError::InvalidStage { .. }));

    let err = checkout
        .select_payment_method(card(market.buyer))
        .await
        .unwrap_err();
    assert!(matches!(err, CheckoutError::InvalidStage { .. }));
}

#[tokio::test]
async fn test_foreign_address_and_expired_card_are_refused() {
    let market = market();
    let checkout = market.checkout();

    let err = checkout
        .select_address(address(UserId::random()))
        .await
        .unwrap_err();
    assert!(matches!(err, CheckoutError::Client(_)));
    assert_eq!(checkout.state().await.stage, CheckoutStage::Cart);

    checkout.select_address(address(market.buyer)).await.unwrap();
    checkout.fetch_shipping_quotes().await.unwrap();

    let mut expired = card(market.buyer);
    expired.exp_year = 2020;
    let err = checkout.select_payment_method(expired).await.unwrap_err();
    assert!(err.user_message().contains("has expired"));
    assert_eq!(checkout.state().await.stage, CheckoutStage::Quoted);
}

#[tokio::test]
async fn test_changing_address_discards_quotes_and_key() {
    let market = market();
    let checkout = market.ready_checkout().await;
    let before = checkout.state().await;

    checkout.select_address(address(market.buyer)).await.unwrap();
    let after = checkout.state().await;
    assert_eq!(after.stage, CheckoutStage::AddressSelected);
    assert!(after.quotes.is_empty());
    assert_ne!(after.idempotency_key, before.idempotency_key);
    assert_eq!(checkout.totals().await.shipping_cost, mxn("0"));
}

#[tokio::test]
async fn test_failed_quote_leaves_stage_unchanged() {
    let market = market();
    let checkout = market.checkout();
    checkout.select_address(address(market.buyer)).await.unwrap();
    market
        .backend
        .fail_next(Op::invoke(functions::SHIPPING_QUOTE), 1);

    let err = checkout.fetch_shipping_quotes().await.unwrap_err();
    assert!(matches!(err, CheckoutError::Client(ref e) if e.is_transport()));
    assert_eq!(checkout.state().await.stage, CheckoutStage::AddressSelected);

    checkout.fetch_shipping_quotes().await.unwrap();
    assert_eq!(checkout.state().await.stage, CheckoutStage::Quoted);
}

// =============================================================================
// Payment Outcomes
// =============================================================================

#[tokio::test]
async fn test_sold_item_is_removed_before_charging() {
    let market = market();
    let checkout = market.ready_checkout().await;
    let original_key = checkout.state().await.idempotency_key;

    market.mark_sold(&market.gpu);
    let err = checkout.pay().await.unwrap_err();
    match &err {
        CheckoutError::StockChanged { products, titles } => {
            assert_eq!(products, &vec![market.gpu.id]);
            assert_eq!(titles, &vec!["RTX 4070".to_string()]);
        }
        other => panic!("expected StockChanged, got {other:?}"),
    }
    assert!(market
        .backend
        .calls(&Op::invoke(functions::CREATE_PAYMENT_INTENT))
        .is_empty());

    let state = checkout.state().await;
    assert_eq!(state.stage, CheckoutStage::ReadyToPay);
    assert_eq!(state.lines.len(), 1);
    assert!(!state.quotes.contains_key(&market.gpu.id));
    assert_ne!(state.idempotency_key, original_key);
    assert!(state.last_error.unwrap().contains("RTX 4070"));

    let totals = checkout.totals().await;
    assert_eq!(totals.subtotal, mxn("3000.00"));
    assert_eq!(totals.total, mxn("3310.00"));

    checkout.pay().await.unwrap();
    let payments = market.backend.calls(&Op::invoke(functions::CREATE_PAYMENT_INTENT));
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0]["items"].as_array().unwrap().len(), 1);
    assert_eq!(
        payments[0]["idempotency_key"],
        json!(state.idempotency_key.to_string())
    );
}

#[tokio::test]
async fn test_everything_sold_fails_checkout() {
    let market = market();
    let checkout = market.ready_checkout().await;
    market.mark_sold(&market.gpu);
    market.mark_sold(&market.cpu);

    assert!(matches!(
        checkout.pay().await.unwrap_err(),
        CheckoutError::StockChanged { .. }
    ));
    let state = checkout.state().await;
    assert_eq!(state.stage, CheckoutStage::Failed);
    assert!(state.lines.is_empty());

    assert!(matches!(
        checkout.pay().await.unwrap_err(),
        CheckoutError::InvalidStage { stage: CheckoutStage::Failed, .. }
    ));
}

#[tokio::test]
async fn test_declined_payment_can_be_retried_with_same_key() {
    let market = market();
    let attempts = AtomicUsize::new(0);
    market
        .backend
        .on_function(functions::CREATE_PAYMENT_INTENT, move |_, _| {
            if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok(json!({ "success": false, "error": "Tu tarjeta fue rechazada" }))
            } else {
                Ok(json!({ "payment_intent_id": "pi_retry", "status": "succeeded" }))
            }
        });
    let checkout = market.ready_checkout().await;

    let err = checkout.pay().await.unwrap_err();
    assert_eq!(err.user_message(), "Tu tarjeta fue rechazada");
    let state = checkout.state().await;
    assert_eq!(state.stage, CheckoutStage::ReadyToPay);
    assert_eq!(state.lines.len(), 2);
    assert_eq!(state.last_error.as_deref(), Some("Tu tarjeta fue rechazada"));

    let confirmation = checkout.pay().await.unwrap();
    assert_eq!(confirmation.payment_intent_id, "pi_retry");
    assert!(confirmation.order_ids.is_empty());

    let keys: Vec<_> = market
        .backend
        .calls(&Op::invoke(functions::CREATE_PAYMENT_INTENT))
        .into_iter()
        .map(|body| body["idempotency_key"].clone())
        .collect();
    assert_eq!(keys.len(), 2);
    assert_eq!(keys[0], keys[1]);
}

#[tokio::test]
async fn test_requires_payment_method_status_is_a_decline() {
    let market = market();
    market
        .backend
        .on_function(functions::CREATE_PAYMENT_INTENT, |_, _| {
            Ok(json!({ "payment_intent_id": "pi_declined", "status": "requires_payment_method" }))
        });
    let checkout = market.ready_checkout().await;

    let err = checkout.pay().await.unwrap_err();
    assert_eq!(err.user_message(), "Your card was declined.");
    assert_eq!(checkout.state().await.stage, CheckoutStage::ReadyToPay);
}
