//! Client error taxonomy.
//!
//! Three kinds of failure matter to callers:
//!
//! - **transport** (`Http`, `Network`, `RateLimited`): the request may not
//!   have reached the backend. Optimistic state is rolled back and a generic
//!   message is shown.
//! - **rejection** (`Api`, `Rejected`, `NotFound`, `Unauthorized`): the
//!   backend answered and said no. Its message is shown verbatim.
//! - **validation** (`Validation`): caught locally before any request.

use hwmarket_core::ValidationError;
use thiserror::Error;

/// Message shown for any transport failure.
pub const GENERIC_NETWORK_MESSAGE: &str =
    "We couldn't reach the server. Check your connection and try again.";

/// Errors that can occur when talking to the backend.
#[derive(Debug, Error)]
pub enum ClientError {
    /// HTTP request failed before a response was received.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Transport failure outside of reqwest (websocket, timeouts).
    #[error("Network error: {0}")]
    Network(String),

    /// Backend returned a non-success status.
    #[error("API error {status}: {message}")]
    Api {
        status: u16,
        code: Option<String>,
        message: String,
    },

    /// A procedure or function ran and refused the operation.
    #[error("Rejected: {0}")]
    Rejected(String),

    /// Response body did not have the expected shape.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// No session, or the session expired.
    #[error("Unauthorized")]
    Unauthorized,

    /// Rate limited by the backend.
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// Input failed client-side validation.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Realtime channel failure.
    #[error("Realtime error: {0}")]
    Realtime(String),
}

impl ClientError {
    /// Returns `true` if the request may not have reached the backend.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Http(_) | Self::Network(_) | Self::RateLimited(_) | Self::Realtime(_)
        )
    }

    /// Text a screen would show for this error.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Http(_) | Self::Network(_) | Self::Realtime(_) => {
                GENERIC_NETWORK_MESSAGE.to_string()
            }
            Self::RateLimited(secs) => {
                format!("Too many requests. Please wait {secs} seconds and try again.")
            }
            Self::Api { message, .. } | Self::Rejected(message) => message.clone(),
            Self::NotFound(what) => format!("{what} was not found."),
            Self::Unauthorized => "Your session has expired. Please sign in again.".to_string(),
            Self::Validation(err) => err.to_string(),
            Self::Parse(_) => "Something went wrong. Please try again.".to_string(),
        }
    }
}

/// Result type alias for `ClientError`.
pub type Result<T> = std::result::Result<T, ClientError>;
