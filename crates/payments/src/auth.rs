//! Caller authentication.
//!
//! The caller's bearer token is forwarded to the backend's
//! `GET /auth/v1/user`; whatever user it resolves to is the caller.

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use hwmarket_core::UserId;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::error::AppError;
use crate::state::AppState;

/// The verified caller of a request.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AuthenticatedUser {
    pub id: UserId,
    #[serde(default)]
    pub email: Option<String>,
}

/// Resolves bearer tokens to users.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    /// # Errors
    ///
    /// Returns `AppError::Unauthorized` for a token the backend refuses.
    async fn verify(&self, token: &str) -> Result<AuthenticatedUser, AppError>;
}

/// Verifies tokens against the backend auth service.
#[derive(Clone)]
pub struct BackendAuth {
    client: Client,
    user_url: Url,
    anon_key: SecretString,
}

impl std::fmt::Debug for BackendAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendAuth")
            .field("user_url", &self.user_url.as_str())
            .field("anon_key", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl BackendAuth {
    /// # Errors
    ///
    /// Returns an error if the user endpoint cannot be derived from `api_url`.
    pub fn new(client: Client, api_url: &Url, anon_key: SecretString) -> Result<Self, url::ParseError> {
        Ok(Self {
            client,
            user_url: api_url.join("auth/v1/user")?,
            anon_key,
        })
    }
}

#[async_trait]
impl TokenVerifier for BackendAuth {
    #[instrument(skip_all)]
    async fn verify(&self, token: &str) -> Result<AuthenticatedUser, AppError> {
        let response = self
            .client
            .get(self.user_url.clone())
            .header("apikey", self.anon_key.expose_secret())
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| AppError::AuthService(e.to_string()))?;

        match response.status() {
            status if status.is_success() => {
                let user: AuthenticatedUser = response
                    .json()
                    .await
                    .map_err(|e| AppError::AuthService(e.to_string()))?;
                debug!(user_id = %user.id, "Caller verified");
                Ok(user)
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(AppError::Unauthorized("Invalid or expired token".to_string()))
            }
            status => {
                warn!(status = %status, "Auth service returned an unexpected status");
                Err(AppError::AuthService(format!("HTTP {status}")))
            }
        }
    }
}

/// Token from an `Authorization: Bearer <token>` header.
fn bearer_token(parts: &Parts) -> Option<&str> {
    let value = parts.headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)
            .ok_or_else(|| AppError::Unauthorized("Missing bearer token".to_string()))?;
        state.verifier().verify(token).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::http::Request;

    use super::*;

    fn parts(header: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri("/");
        if let Some(value) = header {
            builder = builder.header(AUTHORIZATION, value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn test_bearer_token() {
        assert_eq!(bearer_token(&parts(Some("Bearer abc.def"))), Some("abc.def"));
        assert_eq!(bearer_token(&parts(Some("bearer abc"))), Some("abc"));
        assert_eq!(bearer_token(&parts(Some("Basic dXNlcg=="))), None);
        assert_eq!(bearer_token(&parts(Some("Bearer "))), None);
        assert_eq!(bearer_token(&parts(None)), None);
    }

    #[test]
    fn test_user_url() {
        let api = Url::parse("https://abc.backend.test").unwrap();
        let auth = BackendAuth::new(Client::new(), &api, SecretString::from("anon")).unwrap();
        assert_eq!(auth.user_url.as_str(), "https://abc.backend.test/auth/v1/user");
        assert!(!format!("{auth:?}").contains("anon\""));
    }
}
