//! Stripe REST client.
//!
//! Only the calls the payment-method function needs: customer lookup and
//! creation, setup intents, and card listing, detaching and defaulting.
//! Stripe takes form-encoded bodies and reports errors as
//! `{ "error": { "type", "code", "message" } }`.

use async_trait::async_trait;
use hwmarket_core::{CardSummary, SetupIntentSecret, UserId};
use reqwest::{Client, RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::config::StripeConfig;

/// Errors from the Stripe API.
#[derive(Debug, Error)]
pub enum StripeError {
    /// HTTP transport failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Stripe answered with an error object.
    #[error("API error ({status} {error_type}): {message}")]
    Api {
        status: u16,
        error_type: String,
        code: Option<String>,
        message: String,
    },

    /// Too many requests.
    #[error("Rate limited by Stripe")]
    RateLimited,

    /// The configured key was refused.
    #[error("Stripe rejected the API key")]
    Unauthorized,

    /// Response did not have the expected shape.
    #[error("Parse error: {0}")]
    Parse(String),
}

impl StripeError {
    /// Returns `true` when Stripe reports the object does not exist.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Api { status: 404, .. })
            || matches!(self, Self::Api { code: Some(code), .. } if code == "resource_missing")
    }

    /// Message safe to show to the caller.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            Self::Api {
                error_type,
                message,
                ..
            } if error_type == "card_error" => message.clone(),
            Self::RateLimited => "Payment processor is busy, try again shortly".to_string(),
            _ => "Payment processor error".to_string(),
        }
    }
}

/// Stripe customer as this service uses it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Customer {
    pub id: String,
    pub default_payment_method: Option<String>,
}

/// Operations the function performs against the payment processor.
#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    /// Customer for a marketplace user, created on first use.
    async fn find_or_create_customer(
        &self,
        user_id: UserId,
        email: Option<&str>,
    ) -> Result<Customer, StripeError>;

    /// Saved cards, with the customer's default flagged.
    async fn list_cards(&self, customer: &Customer) -> Result<Vec<CardSummary>, StripeError>;

    async fn create_setup_intent(
        &self,
        customer_id: &str,
        idempotency_key: &str,
    ) -> Result<SetupIntentSecret, StripeError>;

    /// Customer a payment method is attached to, if any.
    async fn payment_method_owner(&self, payment_method_id: &str)
    -> Result<Option<String>, StripeError>;

    async fn detach(&self, payment_method_id: &str) -> Result<(), StripeError>;

    async fn set_default(
        &self,
        customer_id: &str,
        payment_method_id: &str,
    ) -> Result<(), StripeError>;
}

/// Returns `true` for strings shaped like a Stripe payment method id.
///
/// Ids are interpolated into request paths, so anything else is refused.
#[must_use]
pub fn is_payment_method_id(id: &str) -> bool {
    id.len() > 3
        && id.len() <= 255
        && (id.starts_with("pm_") || id.starts_with("card_"))
        && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Search query matching the customer tagged with a user id.
fn customer_search_query(user_id: UserId) -> String {
    format!("metadata['user_id']:'{user_id}'")
}

/// Idempotency key for creating a user's customer.
fn customer_idempotency_key(user_id: UserId) -> String {
    format!("customer-{user_id}")
}

// =============================================================================
// Wire types
// =============================================================================

#[derive(Debug, Deserialize)]
struct List<T> {
    data: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct StripeCustomer {
    id: String,
    #[serde(default)]
    invoice_settings: Option<InvoiceSettings>,
}

#[derive(Debug, Deserialize)]
struct InvoiceSettings {
    #[serde(default)]
    default_payment_method: Option<String>,
}

impl From<StripeCustomer> for Customer {
    fn from(customer: StripeCustomer) -> Self {
        Self {
            id: customer.id,
            default_payment_method: customer
                .invoice_settings
                .and_then(|s| s.default_payment_method),
        }
    }
}

#[derive(Debug, Deserialize)]
struct StripePaymentMethod {
    id: String,
    #[serde(default)]
    customer: Option<String>,
    #[serde(default)]
    card: Option<StripeCard>,
}

#[derive(Debug, Deserialize)]
struct StripeCard {
    brand: String,
    last4: String,
    exp_month: u8,
    exp_year: u16,
}

#[derive(Debug, Deserialize)]
struct StripeSetupIntent {
    id: String,
    client_secret: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(rename = "type", default)]
    error_type: Option<String>,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

fn card_summaries(methods: Vec<StripePaymentMethod>, default: Option<&str>) -> Vec<CardSummary> {
    methods
        .into_iter()
        .filter_map(|pm| {
            let card = pm.card?;
            Some(CardSummary {
                is_default: default == Some(pm.id.as_str()),
                id: pm.id,
                brand: card.brand,
                last4: card.last4,
                exp_month: card.exp_month,
                exp_year: card.exp_year,
            })
        })
        .collect()
}

fn api_error(status: StatusCode, body: &str) -> StripeError {
    let parsed = serde_json::from_str::<ErrorEnvelope>(body).ok();
    let (error_type, code, message) = parsed.map_or((None, None, None), |e| {
        (e.error.error_type, e.error.code, e.error.message)
    });
    StripeError::Api {
        status: status.as_u16(),
        error_type: error_type.unwrap_or_else(|| "api_error".to_string()),
        code,
        message: message.unwrap_or_else(|| format!("HTTP {status}")),
    }
}

async fn execute<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, StripeError> {
    let response = request.send().await?;
    let status = response.status();
    match status {
        StatusCode::TOO_MANY_REQUESTS => return Err(StripeError::RateLimited),
        StatusCode::UNAUTHORIZED => return Err(StripeError::Unauthorized),
        _ => {}
    }
    let body = response.text().await?;
    if !status.is_success() {
        let err = api_error(status, &body);
        warn!(status = %status, error = %err, "Stripe request failed");
        return Err(err);
    }
    serde_json::from_str(&body).map_err(|e| StripeError::Parse(e.to_string()))
}

// =============================================================================
// Client
// =============================================================================

/// Stripe API client.
#[derive(Clone)]
pub struct StripeClient {
    client: Client,
    secret_key: SecretString,
    api_base: String,
}

impl std::fmt::Debug for StripeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeClient")
            .field("secret_key", &"[REDACTED]")
            .field("api_base", &self.api_base)
            .finish_non_exhaustive()
    }
}

impl StripeClient {
    /// Create a new Stripe client.
    #[must_use]
    pub fn new(client: Client, config: &StripeConfig) -> Self {
        Self {
            client,
            secret_key: config.secret_key.clone(),
            api_base: config.api_base.clone(),
        }
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.client
            .get(format!("{}/{path}", self.api_base))
            .bearer_auth(self.secret_key.expose_secret())
    }

    fn post(&self, path: &str) -> RequestBuilder {
        self.client
            .post(format!("{}/{path}", self.api_base))
            .bearer_auth(self.secret_key.expose_secret())
    }

    #[instrument(skip(self))]
    async fn search_customer(&self, user_id: UserId) -> Result<Option<Customer>, StripeError> {
        let query = customer_search_query(user_id);
        let request = self
            .get("customers/search")
            .query(&[("query", query.as_str()), ("limit", "1")]);
        let found: List<StripeCustomer> = execute(request).await?;
        Ok(found.data.into_iter().next().map(Customer::from))
    }

    #[instrument(skip(self, email))]
    async fn create_customer(
        &self,
        user_id: UserId,
        email: Option<&str>,
    ) -> Result<Customer, StripeError> {
        let user = user_id.to_string();
        let mut form = vec![("metadata[user_id]", user.as_str())];
        if let Some(email) = email {
            form.push(("email", email));
        }
        let request = self
            .post("customers")
            .header("Idempotency-Key", customer_idempotency_key(user_id))
            .form(&form);
        let created: StripeCustomer = execute(request).await?;
        info!(customer_id = %created.id, "Stripe customer created");
        Ok(created.into())
    }
}

#[async_trait]
impl PaymentProcessor for StripeClient {
    async fn find_or_create_customer(
        &self,
        user_id: UserId,
        email: Option<&str>,
    ) -> Result<Customer, StripeError> {
        if let Some(customer) = self.search_customer(user_id).await? {
            debug!(customer_id = %customer.id, "Stripe customer found");
            return Ok(customer);
        }
        self.create_customer(user_id, email).await
    }

    #[instrument(skip(self, customer), fields(customer_id = %customer.id))]
    async fn list_cards(&self, customer: &Customer) -> Result<Vec<CardSummary>, StripeError> {
        let request = self
            .get(&format!("customers/{}/payment_methods", customer.id))
            .query(&[("type", "card"), ("limit", "100")]);
        let methods: List<StripePaymentMethod> = execute(request).await?;
        Ok(card_summaries(
            methods.data,
            customer.default_payment_method.as_deref(),
        ))
    }

    #[instrument(skip(self, idempotency_key))]
    async fn create_setup_intent(
        &self,
        customer_id: &str,
        idempotency_key: &str,
    ) -> Result<SetupIntentSecret, StripeError> {
        let request = self
            .post("setup_intents")
            .header("Idempotency-Key", idempotency_key)
            .form(&[
                ("customer", customer_id),
                ("usage", "off_session"),
                ("payment_method_types[]", "card"),
            ]);
        let intent: StripeSetupIntent = execute(request).await?;
        let client_secret = intent
            .client_secret
            .ok_or_else(|| StripeError::Parse("setup intent has no client_secret".to_string()))?;
        info!(setup_intent_id = %intent.id, "Setup intent created");
        Ok(SetupIntentSecret {
            setup_intent_id: intent.id,
            client_secret,
            customer_id: customer_id.to_string(),
        })
    }

    #[instrument(skip(self))]
    async fn payment_method_owner(
        &self,
        payment_method_id: &str,
    ) -> Result<Option<String>, StripeError> {
        let method: StripePaymentMethod =
            execute(self.get(&format!("payment_methods/{payment_method_id}"))).await?;
        Ok(method.customer)
    }

    #[instrument(skip(self))]
    async fn detach(&self, payment_method_id: &str) -> Result<(), StripeError> {
        let _: StripePaymentMethod =
            execute(self.post(&format!("payment_methods/{payment_method_id}/detach"))).await?;
        info!("Payment method detached");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn set_default(
        &self,
        customer_id: &str,
        payment_method_id: &str,
    ) -> Result<(), StripeError> {
        let request = self
            .post(&format!("customers/{customer_id}"))
            .form(&[("invoice_settings[default_payment_method]", payment_method_id)]);
        let _: StripeCustomer = execute(request).await?;
        info!("Default payment method updated");
        Ok(())
    }
}
