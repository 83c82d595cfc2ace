//! Hardware Market Payments - the `manage-payment-methods` function.
//!
//! Serves on port 3002 and brokers the caller's Stripe customer: listing
//! saved cards, creating setup intents, detaching cards and changing the
//! default card.
//!
//! # Security
//!
//! This service holds the Stripe secret key. Callers are identified only by
//! the bearer token they present, which is verified against the backend
//! auth service on every request. Card operations are refused unless the
//! payment method is attached to the caller's own customer.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;
pub mod state;
pub mod stripe;

use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderName, Method};
use axum::{Router, routing::get};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use config::PaymentsConfig;
pub use state::AppState;

/// Build the router with all routes and middleware except Sentry.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .merge(routes::routes())
        .with_state(state)
        .layer(cors_layer())
        .layer(TraceLayer::new_for_http())
}

/// Liveness health check endpoint.
async fn health() -> &'static str {
    "ok"
}

/// Functions are called straight from the apps, so any origin may call them.
fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::POST, Method::OPTIONS])
        .allow_headers([
            AUTHORIZATION,
            CONTENT_TYPE,
            HeaderName::from_static("apikey"),
            HeaderName::from_static("x-client-info"),
        ])
}
