//! REST implementation of [`Backend`].
//!
//! Uses `reqwest` for HTTP. Every request carries the anonymous key as
//! `apikey` and, once signed in, the user's access token as the bearer so
//! row-level security applies.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use secrecy::ExposeSecret;
use serde_json::Value;
use tracing::{debug, instrument};

use super::auth::Session;
use super::{Backend, Query, Table};
use crate::config::ClientConfig;
use crate::error::{ClientError, Result};

/// Longest slice of a response body copied into logs and errors.
const BODY_SNIPPET: usize = 500;

/// REST client for the backend.
///
/// Cheaply cloneable; clones share the HTTP connection pool and the session.
#[derive(Clone)]
pub struct RestBackend {
    inner: Arc<RestBackendInner>,
}

struct RestBackendInner {
    client: reqwest::Client,
    config: ClientConfig,
    session: RwLock<Option<Session>>,
}

impl RestBackend {
    /// Create a new backend client.
    ///
    /// # Errors
    ///
    /// Returns an error if the anonymous key is not a valid header value or
    /// the HTTP client fails to build.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "apikey",
            HeaderValue::from_str(config.anon_key.expose_secret())
                .map_err(|e| ClientError::Network(format!("invalid API key format: {e}")))?,
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.http_timeout)
            .build()?;

        Ok(Self {
            inner: Arc::new(RestBackendInner {
                client,
                config,
                session: RwLock::new(None),
            }),
        })
    }

    /// Configuration this client was built with.
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Underlying HTTP client (shared with the auth client).
    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.inner.client
    }

    /// Current session, if signed in.
    #[must_use]
    pub fn session(&self) -> Option<Session> {
        self.inner
            .session
            .read()
            .ok()
            .and_then(|guard| guard.clone())
    }

    /// Replace the current session.
    pub fn set_session(&self, session: Option<Session>) {
        if let Ok(mut guard) = self.inner.session.write() {
            *guard = session;
        }
    }

    /// Bearer token: the user's access token, or the anonymous key.
    pub(crate) fn bearer(&self) -> String {
        self.session().map_or_else(
            || self.inner.config.anon_key.expose_secret().to_string(),
            |s| s.access_token.expose_secret().to_string(),
        )
    }

    fn url(&self, path: &str) -> String {
        self.inner.config.endpoint(path)
    }

    fn table_url(&self, table: Table) -> String {
        self.url(&format!("rest/v1/{table}"))
    }

    /// Send a request and decode its JSON body.
    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Value> {
        let response = request.bearer_auth(self.bearer()).send().await?;
        read_json(response).await
    }
}

#[async_trait]
impl Backend for RestBackend {
    #[instrument(skip(self), fields(table = %query.table_name()))]
    async fn select(&self, query: &Query) -> Result<Vec<Value>> {
        let request = self
            .http()
            .get(self.table_url(query.table_name()))
            .query(&query.to_params());
        let body = self.send(request).await?;
        into_rows(body)
    }

    #[instrument(skip(self, row), fields(table = %table))]
    async fn insert(&self, table: Table, row: Value) -> Result<Value> {
        let request = self
            .http()
            .post(self.table_url(table))
            .header("Prefer", "return=representation")
            .json(&row);
        let body = self.send(request).await?;
        into_rows(body)?
            .into_iter()
            .next()
            .ok_or_else(|| ClientError::NotFound(format!("inserted {table} row")))
    }

    #[instrument(skip(self, patch), fields(table = %query.table_name()))]
    async fn update(&self, query: &Query, patch: Value) -> Result<Vec<Value>> {
        let request = self
            .http()
            .patch(self.table_url(query.table_name()))
            .query(&filter_params(query))
            .header("Prefer", "return=representation")
            .json(&patch);
        let body = self.send(request).await?;
        into_rows(body)
    }

    #[instrument(skip(self), fields(table = %query.table_name()))]
    async fn delete(&self, query: &Query) -> Result<()> {
        if query.filters().is_empty() {
            // PostgREST refuses unfiltered deletes; fail before the round trip.
            return Err(ClientError::Rejected(format!(
                "refusing to delete every row of {}",
                query.table_name()
            )));
        }
        let request = self
            .http()
            .delete(self.table_url(query.table_name()))
            .query(&filter_params(query));
        self.send(request).await?;
        Ok(())
    }

    #[instrument(skip(self, args))]
    async fn rpc(&self, function: &str, args: Value) -> Result<Value> {
        let request = self
            .http()
            .post(self.url(&format!("rest/v1/rpc/{function}")))
            .json(&args);
        self.send(request).await
    }

    #[instrument(skip(self, body))]
    async fn invoke(&self, function: &str, body: Value) -> Result<Value> {
        let request = self
            .http()
            .post(self.url(&format!("functions/v1/{function}")))
            .json(&body);
        self.send(request).await
    }

    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String> {
        let encoded_path = path
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect::<Vec<_>>()
            .join("/");
        let request = self
            .http()
            .post(self.url(&format!("storage/v1/object/{bucket}/{encoded_path}")))
            .header("Content-Type", content_type)
            .header("x-upsert", "false")
            .body(bytes);
        self.send(request).await?;

        Ok(self.url(&format!("storage/v1/object/public/{bucket}/{encoded_path}")))
    }
}

/// Query-string pairs without `select`, ordering or paging.
fn filter_params(query: &Query) -> Vec<(String, String)> {
    query
        .filters()
        .iter()
        .map(|f| (f.column().to_string(), f.operand()))
        .collect()
}

/// Normalize a body to a list of rows.
fn into_rows(body: Value) -> Result<Vec<Value>> {
    match body {
        Value::Array(rows) => Ok(rows),
        Value::Null => Ok(Vec::new()),
        row @ Value::Object(_) => Ok(vec![row]),
        other => Err(ClientError::Api {
            status: 200,
            code: None,
            message: format!("expected rows, got {other}"),
        }),
    }
}

/// Check status and decode a JSON body. Empty bodies decode to `null`.
pub(crate) async fn read_json(response: reqwest::Response) -> Result<Value> {
    let status = response.status();

    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get("Retry-After")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(1);
        return Err(ClientError::RateLimited(retry_after));
    }

    let text = response.text().await?;

    if !status.is_success() {
        tracing::warn!(
            status = %status,
            body = %text.chars().take(BODY_SNIPPET).collect::<String>(),
            "Backend returned non-success status"
        );
        return Err(api_error(status.as_u16(), &text));
    }

    if text.trim().is_empty() {
        return Ok(Value::Null);
    }

    serde_json::from_str(&text).map_err(|e| {
        tracing::error!(
            error = %e,
            body = %text.chars().take(BODY_SNIPPET).collect::<String>(),
            "Failed to parse backend response"
        );
        ClientError::Parse(e)
    })
}

/// Map an error response to a [`ClientError`].
///
/// Understands PostgREST (`message`, `code`), auth (`error_description`,
/// `msg`) and function (`error`) error bodies.
pub(crate) fn api_error(status: u16, body: &str) -> ClientError {
    if status == 401 {
        return ClientError::Unauthorized;
    }

    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let field = |name: &str| -> Option<String> {
        parsed
            .as_ref()
            .and_then(|v| v.get(name))
            .and_then(|v| match v {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
    };

    let message = field("message")
        .or_else(|| field("error_description"))
        .or_else(|| field("msg"))
        .or_else(|| field("error"))
        .unwrap_or_else(|| {
            let snippet: String = body.chars().take(200).collect();
            if snippet.trim().is_empty() {
                format!("HTTP {status}")
            } else {
                snippet
            }
        });
    let code = field("code").or_else(|| field("error_code"));

    debug!(status, ?code, %message, "Mapped backend error");
    ClientError::Api {
        status,
        code,
        message,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_api_error_postgrest_body() {
        let body = r#"{"code":"P0001","details":null,"hint":null,"message":"Insufficient funds"}"#;
        match api_error(400, body) {
            ClientError::Api {
                status,
                code,
                message,
            } => {
                assert_eq!(status, 400);
                assert_eq!(code.as_deref(), Some("P0001"));
                assert_eq!(message, "Insufficient funds");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_api_error_auth_and_function_bodies() {
        let err = api_error(400, r#"{"error":"invalid_grant","error_description":"Invalid login credentials"}"#);
        assert_eq!(err.user_message(), "Invalid login credentials");

        let err = api_error(502, r#"{"error":"Stripe unavailable"}"#);
        assert_eq!(err.user_message(), "Stripe unavailable");
    }

    #[test]
    fn test_api_error_plain_and_empty_bodies() {
        assert_eq!(api_error(500, "upstream exploded").user_message(), "upstream exploded");
        assert_eq!(api_error(503, "").user_message(), "HTTP 503");
        assert!(matches!(api_error(401, "{}"), ClientError::Unauthorized));
    }

    #[test]
    fn test_into_rows() {
        assert_eq!(into_rows(json!([{ "a": 1 }])).unwrap().len(), 1);
        assert_eq!(into_rows(json!({ "a": 1 })).unwrap().len(), 1);
        assert!(into_rows(Value::Null).unwrap().is_empty());
        assert!(into_rows(json!("nope")).is_err());
    }

    #[test]
    fn test_filter_params_skip_select_and_order() {
        let query = Query::table(Table::Addresses)
            .eq("user_id", "u1")
            .order("created_at", super::super::Direction::Desc)
            .limit(3);
        assert_eq!(
            filter_params(&query),
            vec![("user_id".to_string(), "eq.u1".to_string())]
        );
    }
}
