//! `manage-payment-methods` function.

use axum::body::Bytes;
use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use hwmarket_core::PaymentMethodAction;
use serde_json::{Value, json};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::error::{AppError, Result, set_sentry_user};
use crate::state::AppState;
use crate::stripe::{Customer, PaymentProcessor, is_payment_method_id};

/// Longest idempotency key Stripe accepts.
const MAX_IDEMPOTENCY_KEY_LEN: usize = 255;

pub fn routes() -> Router<AppState> {
    Router::new().route(
        "/functions/v1/manage-payment-methods",
        post(manage_payment_methods),
    )
}

/// Dispatch one payment-method action for the caller.
///
/// The body is parsed by hand so a malformed action is a `400` with the
/// standard error body rather than the extractor's plain-text rejection.
#[instrument(skip_all, fields(user_id = %user.id))]
async fn manage_payment_methods(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    body: Bytes,
) -> Result<Json<Value>> {
    let action: PaymentMethodAction = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(format!("Invalid request: {e}")))?;
    set_sentry_user(&user.id, user.email.as_deref());

    let processor = state.processor();
    let customer = processor
        .find_or_create_customer(user.id, user.email.as_deref())
        .await?;

    match action {
        PaymentMethodAction::List => {
            let cards = processor.list_cards(&customer).await?;
            Ok(Json(json!({ "payment_methods": cards })))
        }
        PaymentMethodAction::CreateSetupIntent { idempotency_key } => {
            let key = idempotency_key_or_new(idempotency_key)?;
            let secret = processor.create_setup_intent(&customer.id, &key).await?;
            let body = serde_json::to_value(secret).map_err(|e| AppError::Internal(e.to_string()))?;
            Ok(Json(body))
        }
        PaymentMethodAction::Detach { payment_method_id } => {
            ensure_owned(processor, &customer, &payment_method_id).await?;
            processor.detach(&payment_method_id).await?;
            info!(payment_method_id = %payment_method_id, "Card removed");
            Ok(Json(json!({ "success": true })))
        }
        PaymentMethodAction::SetDefault { payment_method_id } => {
            ensure_owned(processor, &customer, &payment_method_id).await?;
            processor
                .set_default(&customer.id, &payment_method_id)
                .await?;
            info!(payment_method_id = %payment_method_id, "Default card changed");
            Ok(Json(json!({ "success": true })))
        }
    }
}

fn idempotency_key_or_new(key: Option<String>) -> Result<String> {
    match key.map(|k| k.trim().to_string()).filter(|k| !k.is_empty()) {
        Some(key) if key.len() > MAX_IDEMPOTENCY_KEY_LEN => Err(AppError::BadRequest(format!(
            "idempotency_key must be at most {MAX_IDEMPOTENCY_KEY_LEN} characters"
        ))),
        Some(key) => Ok(key),
        None => Ok(Uuid::new_v4().to_string()),
    }
}

/// Refuse payment methods that are not attached to `customer`.
async fn ensure_owned(
    processor: &dyn PaymentProcessor,
    customer: &Customer,
    payment_method_id: &str,
) -> Result<()> {
    if payment_method_id.trim().is_empty() {
        return Err(AppError::BadRequest(
            "payment_method_id is required".to_string(),
        ));
    }
    if !is_payment_method_id(payment_method_id) {
        return Err(AppError::BadRequest(
            "payment_method_id is not a valid payment method".to_string(),
        ));
    }

    let foreign = || AppError::Forbidden("Payment method does not belong to this account".to_string());
    match processor.payment_method_owner(payment_method_id).await {
        Ok(Some(owner)) if owner == customer.id => Ok(()),
        Ok(_) => Err(foreign()),
        Err(e) if e.is_not_found() => Err(foreign()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use hwmarket_core::{CardSummary, SetupIntentSecret, UserId};
    use tower::ServiceExt;

    use super::*;
    use crate::auth::TokenVerifier;
    use crate::stripe::StripeError;

    const TOKEN: &str = "valid-token";

    struct FakeVerifier {
        user: AuthenticatedUser,
    }

    #[async_trait]
    impl TokenVerifier for FakeVerifier {
        async fn verify(&self, token: &str) -> std::result::Result<AuthenticatedUser, AppError> {
            if token == TOKEN {
                Ok(self.user.clone())
            } else {
                Err(AppError::Unauthorized("Invalid or expired token".to_string()))
            }
        }
    }

    /// In-memory processor: one customer, cards keyed by id with their owner.
    #[derive(Default)]
    struct FakeProcessor {
        owners: Mutex<HashMap<String, String>>,
        default: Mutex<Option<String>>,
        setup_keys: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl PaymentProcessor for FakeProcessor {
        async fn find_or_create_customer(
            &self,
            _user_id: UserId,
            _email: Option<&str>,
        ) -> std::result::Result<Customer, StripeError> {
            if self.fail {
                return Err(StripeError::Parse("boom".to_string()));
            }
            Ok(Customer {
                id: "cus_me".to_string(),
                default_payment_method: self.default.lock().unwrap().clone(),
            })
        }

        async fn list_cards(
            &self,
            customer: &Customer,
        ) -> std::result::Result<Vec<CardSummary>, StripeError> {
            let owners = self.owners.lock().unwrap();
            let mut cards: Vec<CardSummary> = owners
                .iter()
                .filter(|(_, owner)| **owner == customer.id)
                .map(|(id, _)| CardSummary {
                    id: id.clone(),
                    brand: "visa".to_string(),
                    last4: "4242".to_string(),
                    exp_month: 12,
                    exp_year: 2030,
                    is_default: customer.default_payment_method.as_deref() == Some(id.as_str()),
                })
                .collect();
            cards.sort_by(|a, b| a.id.cmp(&b.id));
            Ok(cards)
        }

        async fn create_setup_intent(
            &self,
            customer_id: &str,
            idempotency_key: &str,
        ) -> std::result::Result<SetupIntentSecret, StripeError> {
            self.setup_keys
                .lock()
                .unwrap()
                .push(idempotency_key.to_string());
            Ok(SetupIntentSecret {
                setup_intent_id: "seti_1".to_string(),
                client_secret: "seti_1_secret_abc".to_string(),
                customer_id: customer_id.to_string(),
            })
        }

        async fn payment_method_owner(
            &self,
            payment_method_id: &str,
        ) -> std::result::Result<Option<String>, StripeError> {
            self.owners
                .lock()
                .unwrap()
                .get(payment_method_id)
                .cloned()
                .map(Some)
                .ok_or(StripeError::Api {
                    status: 404,
                    error_type: "invalid_request_error".to_string(),
                    code: Some("resource_missing".to_string()),
                    message: "No such PaymentMethod".to_string(),
                })
        }

        async fn detach(&self, payment_method_id: &str) -> std::result::Result<(), StripeError> {
            self.owners.lock().unwrap().remove(payment_method_id);
            Ok(())
        }

        async fn set_default(
            &self,
            _customer_id: &str,
            payment_method_id: &str,
        ) -> std::result::Result<(), StripeError> {
            *self.default.lock().unwrap() = Some(payment_method_id.to_string());
            Ok(())
        }
    }

    fn processor() -> Arc<FakeProcessor> {
        let fake = FakeProcessor::default();
        {
            let mut owners = fake.owners.lock().unwrap();
            owners.insert("pm_mine1".to_string(), "cus_me".to_string());
            owners.insert("pm_mine2".to_string(), "cus_me".to_string());
            owners.insert("pm_theirs".to_string(), "cus_other".to_string());
        }
        Arc::new(fake)
    }

    fn app(processor: Arc<FakeProcessor>) -> Router {
        let verifier = Arc::new(FakeVerifier {
            user: AuthenticatedUser {
                id: UserId::random(),
                email: Some("seller@hwmarket.test".to_string()),
            },
        });
        crate::app(AppState::new(processor, verifier))
    }

    async fn call(app: Router, token: Option<&str>, body: &str) -> (StatusCode, Value) {
        let mut request = Request::builder()
            .method("POST")
            .uri("/functions/v1/manage-payment-methods")
            .header("content-type", "application/json");
        if let Some(token) = token {
            request = request.header("authorization", format!("Bearer {token}"));
        }
        let response = app
            .oneshot(request.body(Body::from(body.to_string())).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024)
            .await
            .unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn test_health() {
        let response = app(processor())
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_missing_or_bad_token_is_unauthorized() {
        let (status, body) = call(app(processor()), None, r#"{"action":"list"}"#).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Missing bearer token");

        let (status, _) = call(app(processor()), Some("stolen"), r#"{"action":"list"}"#).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_unknown_action_and_missing_field_are_bad_requests() {
        let (status, body) = call(app(processor()), Some(TOKEN), r#"{"action":"refund"}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().starts_with("Invalid request"));

        let (status, _) = call(app(processor()), Some(TOKEN), r#"{"action":"detach"}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(
            app(processor()),
            Some(TOKEN),
            r#"{"action":"detach","payment_method_id":"../customers"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_list_flags_default() {
        let fake = processor();
        *fake.default.lock().unwrap() = Some("pm_mine2".to_string());
        let (status, body) = call(app(fake), Some(TOKEN), r#"{"action":"list"}"#).await;
        assert_eq!(status, StatusCode::OK);

        let cards: Vec<CardSummary> =
            serde_json::from_value(body["payment_methods"].clone()).unwrap();
        assert_eq!(cards.len(), 2);
        assert!(cards.iter().any(|c| c.id == "pm_mine2" && c.is_default));
        assert!(cards.iter().all(|c| c.id != "pm_theirs"));
    }

    #[tokio::test]
    async fn test_setup_intent_uses_caller_key_or_fresh_uuid() {
        let fake = processor();
        let (status, body) = call(
            app(fake.clone()),
            Some(TOKEN),
            r#"{"action":"create_setup_intent","idempotency_key":"setup-123"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["client_secret"], "seti_1_secret_abc");

        call(app(fake.clone()), Some(TOKEN), r#"{"action":"create_setup_intent"}"#).await;

        let keys = fake.setup_keys.lock().unwrap().clone();
        assert_eq!(keys.first().map(String::as_str), Some("setup-123"));
        assert!(keys.get(1).is_some_and(|k| Uuid::parse_str(k).is_ok()));
    }

    #[tokio::test]
    async fn test_foreign_payment_method_is_forbidden() {
        let fake = processor();
        for body in [
            r#"{"action":"detach","payment_method_id":"pm_theirs"}"#,
            r#"{"action":"set_default","payment_method_id":"pm_theirs"}"#,
            r#"{"action":"detach","payment_method_id":"pm_unknown"}"#,
        ] {
            let (status, _) = call(app(fake.clone()), Some(TOKEN), body).await;
            assert_eq!(status, StatusCode::FORBIDDEN, "{body}");
        }
        assert!(fake.owners.lock().unwrap().contains_key("pm_theirs"));
        assert!(fake.default.lock().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_detach_and_set_default_own_card() {
        let fake = processor();
        let (status, body) = call(
            app(fake.clone()),
            Some(TOKEN),
            r#"{"action":"set_default","payment_method_id":"pm_mine1"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(fake.default.lock().unwrap().as_deref(), Some("pm_mine1"));

        let (status, _) = call(
            app(fake.clone()),
            Some(TOKEN),
            r#"{"action":"detach","payment_method_id":"pm_mine2"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(!fake.owners.lock().unwrap().contains_key("pm_mine2"));
    }

    #[tokio::test]
    async fn test_processor_failure_is_bad_gateway() {
        let fake = Arc::new(FakeProcessor {
            fail: true,
            ..FakeProcessor::default()
        });
        let (status, body) = call(app(fake), Some(TOKEN), r#"{"action":"list"}"#).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["error"], "Payment processor error");
    }
}
