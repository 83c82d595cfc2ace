//! Backend-as-a-Service access.
//!
//! # Architecture
//!
//! - The backend is the source of truth for money, inventory and identity.
//!   Nothing here keeps durable state.
//! - [`Backend`] is the seam every repository and store goes through. The
//!   production implementation is [`RestBackend`]; tests substitute an
//!   in-memory one.
//! - Rows travel as `serde_json::Value` through the trait and are decoded
//!   into `hwmarket_core` models by the helpers below.
//!
//! # Endpoints
//!
//! | operation | endpoint |
//! |---|---|
//! | select/insert/update/delete | `{url}/rest/v1/{table}` |
//! | rpc | `{url}/rest/v1/rpc/{name}` |
//! | invoke | `{url}/functions/v1/{name}` |
//! | upload | `{url}/storage/v1/object/{bucket}/{path}` |

mod auth;
mod query;
mod rest;

pub use auth::{AuthClient, AuthUser, Session, SignUpOutcome};
pub use query::{Direction, Filter, Query, Table};
pub use rest::RestBackend;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{ClientError, Result};

/// Remote procedure that debits a wallet and schedules a bank transfer.
pub const RPC_REQUEST_PAYOUT: &str = "fn_request_payout";

/// Serverless function names.
pub mod functions {
    /// Stripe customer / setup-intent / payment-method broker.
    pub const MANAGE_PAYMENT_METHODS: &str = "manage-payment-methods";
    /// Shipping quote from the seller's origin to the buyer's address.
    pub const SHIPPING_QUOTE: &str = "get-shipping-quote";
    /// Shipping quote for a seller preparing a parcel.
    pub const SHIPPING_QUOTE_SELLER: &str = "get-shipping-quote-seller";
    /// Creates and confirms the buyer's payment for a checkout.
    pub const CREATE_PAYMENT_INTENT: &str = "create-payment-intent";
}

/// Storage bucket for listing photos.
pub const PRODUCT_IMAGES_BUCKET: &str = "product-images";

/// Operations the client needs from the backend.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Rows matching a query.
    async fn select(&self, query: &Query) -> Result<Vec<Value>>;

    /// Insert one row and return it as stored.
    async fn insert(&self, table: Table, row: Value) -> Result<Value>;

    /// Patch every row matching the query's filters and return them.
    async fn update(&self, query: &Query, patch: Value) -> Result<Vec<Value>>;

    /// Delete every row matching the query's filters.
    async fn delete(&self, query: &Query) -> Result<()>;

    /// Call a database procedure.
    async fn rpc(&self, function: &str, args: Value) -> Result<Value>;

    /// Invoke a serverless function with a JSON body.
    async fn invoke(&self, function: &str, body: Value) -> Result<Value>;

    /// Upload an object and return its public URL.
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String>;
}

/// Select and decode every matching row.
///
/// # Errors
///
/// Returns an error if the request fails or a row does not decode.
pub async fn fetch_all<T: DeserializeOwned>(backend: &dyn Backend, query: &Query) -> Result<Vec<T>> {
    backend
        .select(query)
        .await?
        .into_iter()
        .map(|row| serde_json::from_value(row).map_err(ClientError::from))
        .collect()
}

/// Select and decode the first matching row, if any.
///
/// # Errors
///
/// Returns an error if the request fails or the row does not decode.
pub async fn fetch_optional<T: DeserializeOwned>(
    backend: &dyn Backend,
    query: Query,
) -> Result<Option<T>> {
    let rows = backend.select(&query.limit(1)).await?;
    rows.into_iter()
        .next()
        .map(serde_json::from_value)
        .transpose()
        .map_err(ClientError::from)
}

/// Select and decode exactly one row.
///
/// # Errors
///
/// Returns `ClientError::NotFound` naming `what` if no row matches.
pub async fn fetch_one<T: DeserializeOwned>(
    backend: &dyn Backend,
    query: Query,
    what: &str,
) -> Result<T> {
    fetch_optional(backend, query)
        .await?
        .ok_or_else(|| ClientError::NotFound(what.to_string()))
}

/// Serialize a payload, insert it, and decode the stored row.
///
/// # Errors
///
/// Returns an error if the request fails or the row does not decode.
pub async fn insert_as<P: Serialize + Sync, T: DeserializeOwned>(
    backend: &dyn Backend,
    table: Table,
    payload: &P,
) -> Result<T> {
    let row = backend.insert(table, serde_json::to_value(payload)?).await?;
    Ok(serde_json::from_value(row)?)
}

/// Patch matching rows and decode them.
///
/// # Errors
///
/// Returns an error if the request fails or a row does not decode.
pub async fn update_as<P: Serialize + Sync, T: DeserializeOwned>(
    backend: &dyn Backend,
    query: &Query,
    patch: &P,
) -> Result<Vec<T>> {
    backend
        .update(query, serde_json::to_value(patch)?)
        .await?
        .into_iter()
        .map(|row| serde_json::from_value(row).map_err(ClientError::from))
        .collect()
}

/// Turn a `{"success": false, "error": "..."}` payload into a rejection.
///
/// Procedures and functions report business-rule failures in the body of a
/// successful response. Anything without `success: false` passes through.
///
/// # Errors
///
/// Returns `ClientError::Rejected` with the payload's message.
pub fn reject_on_failure(payload: Value) -> Result<Value> {
    if payload.get("success").and_then(Value::as_bool) == Some(false) {
        let message = payload
            .get("error")
            .or_else(|| payload.get("message"))
            .and_then(Value::as_str)
            .unwrap_or("The request was rejected")
            .to_string();
        return Err(ClientError::Rejected(message));
    }
    Ok(payload)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_reject_on_failure() {
        let ok = reject_on_failure(json!({ "success": true, "transaction_id": "t1" })).unwrap();
        assert_eq!(ok["transaction_id"], "t1");

        let passthrough = reject_on_failure(json!([1, 2])).unwrap();
        assert_eq!(passthrough, json!([1, 2]));

        let err = reject_on_failure(json!({ "success": false, "error": "Insufficient funds" }))
            .unwrap_err();
        assert!(matches!(err, ClientError::Rejected(ref m) if m == "Insufficient funds"));

        let err = reject_on_failure(json!({ "success": false })).unwrap_err();
        assert_eq!(err.user_message(), "The request was rejected");
    }
}
