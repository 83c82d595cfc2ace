//! Hosted auth: password sign-in, sign-up, token refresh and sign-out.
//!
//! Sessions are stored on the shared [`RestBackend`] so every later request
//! is made as the signed-in user.

use chrono::{DateTime, Duration, Utc};
use hwmarket_core::UserId;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use tracing::instrument;

use super::rest::{RestBackend, read_json};
use crate::error::{ClientError, Result};

/// The authenticated user.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AuthUser {
    pub id: UserId,
    #[serde(default)]
    pub email: Option<String>,
}

/// An access/refresh token pair.
#[derive(Debug, Clone)]
pub struct Session {
    pub access_token: SecretString,
    pub refresh_token: SecretString,
    pub expires_at: DateTime<Utc>,
    pub user: AuthUser,
}

impl Session {
    /// Returns `true` if the access token expires within `leeway`.
    #[must_use]
    pub fn expires_within(&self, leeway: Duration, now: DateTime<Utc>) -> bool {
        self.expires_at - leeway <= now
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    expires_in: i64,
    user: AuthUser,
}

impl TokenResponse {
    fn into_session(self, now: DateTime<Utc>) -> Session {
        Session {
            access_token: SecretString::from(self.access_token),
            refresh_token: SecretString::from(self.refresh_token),
            expires_at: now + Duration::seconds(self.expires_in),
            user: self.user,
        }
    }
}

/// Result of a sign-up.
#[derive(Debug, Clone)]
pub enum SignUpOutcome {
    /// Signed in immediately.
    SignedIn(Session),
    /// Account created; the user must confirm their email first.
    ConfirmationRequired(AuthUser),
}

/// Client for `/auth/v1`.
#[derive(Clone)]
pub struct AuthClient {
    backend: RestBackend,
}

impl AuthClient {
    /// Wrap a backend; sessions obtained here are installed on it.
    #[must_use]
    pub const fn new(backend: RestBackend) -> Self {
        Self { backend }
    }

    /// Sign in with email and password.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Api` with the backend's message on bad credentials.
    #[instrument(skip(self, password))]
    pub async fn sign_in_with_password(&self, email: &str, password: &SecretString) -> Result<Session> {
        let url = self.backend.config().endpoint("auth/v1/token?grant_type=password");
        let body = json!({ "email": email.trim(), "password": password.expose_secret() });
        let session = self.token_request(&url, &body).await?;
        tracing::info!(user_id = %session.user.id, "Signed in");
        Ok(session)
    }

    /// Create an account.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the email is taken.
    #[instrument(skip(self, password))]
    pub async fn sign_up(&self, email: &str, password: &SecretString) -> Result<SignUpOutcome> {
        let url = self.backend.config().endpoint("auth/v1/signup");
        let body = json!({ "email": email.trim(), "password": password.expose_secret() });
        let response = self
            .backend
            .http()
            .post(url)
            .json(&body)
            .send()
            .await?;
        let value = read_json(response).await?;

        if value.get("access_token").is_some() {
            let token: TokenResponse = serde_json::from_value(value)?;
            let session = token.into_session(Utc::now());
            self.backend.set_session(Some(session.clone()));
            return Ok(SignUpOutcome::SignedIn(session));
        }

        // Without a session the body is either the user or wraps it.
        let user_value = value.get("user").cloned().unwrap_or(value);
        let user: AuthUser = serde_json::from_value(user_value)?;
        Ok(SignUpOutcome::ConfirmationRequired(user))
    }

    /// Exchange the stored refresh token for a new session.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Unauthorized` if there is no session.
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> Result<Session> {
        let current = self.backend.session().ok_or(ClientError::Unauthorized)?;
        let url = self
            .backend
            .config()
            .endpoint("auth/v1/token?grant_type=refresh_token");
        let body = json!({ "refresh_token": current.refresh_token.expose_secret() });
        self.token_request(&url, &body).await
    }

    /// Refresh the session if it expires within a minute.
    ///
    /// # Errors
    ///
    /// Returns an error if a needed refresh fails.
    pub async fn ensure_fresh(&self) -> Result<Option<Session>> {
        match self.backend.session() {
            Some(session) if session.expires_within(Duration::seconds(60), Utc::now()) => {
                self.refresh().await.map(Some)
            }
            other => Ok(other),
        }
    }

    /// Revoke the session remotely and forget it locally.
    ///
    /// The local session is cleared even if the remote call fails.
    ///
    /// # Errors
    ///
    /// Returns the remote error after clearing the local session.
    #[instrument(skip(self))]
    pub async fn sign_out(&self) -> Result<()> {
        if self.backend.session().is_none() {
            return Ok(());
        }
        let url = self.backend.config().endpoint("auth/v1/logout");
        let result = async {
            let response = self
                .backend
                .http()
                .post(url)
                .bearer_auth(self.backend.bearer())
                .send()
                .await?;
            read_json(response).await.map(|_| ())
        }
        .await;
        self.backend.set_session(None);
        result
    }

    /// Fetch the user behind the current token.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Unauthorized` if the token is missing or invalid.
    #[instrument(skip(self))]
    pub async fn current_user(&self) -> Result<AuthUser> {
        if self.backend.session().is_none() {
            return Err(ClientError::Unauthorized);
        }
        let url = self.backend.config().endpoint("auth/v1/user");
        let response = self
            .backend
            .http()
            .get(url)
            .bearer_auth(self.backend.bearer())
            .send()
            .await?;
        Ok(serde_json::from_value(read_json(response).await?)?)
    }

    async fn token_request(&self, url: &str, body: &serde_json::Value) -> Result<Session> {
        let response = self.backend.http().post(url).json(body).send().await?;
        let token: TokenResponse = serde_json::from_value(read_json(response).await?)?;
        let session = token.into_session(Utc::now());
        self.backend.set_session(Some(session.clone()));
        Ok(session)
    }
}
