//! Hardware Market Payments binary.
//!
//! See the library crate for the routes it serves.

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::sync::Arc;

use hwmarket_payments::{AppState, PaymentsConfig, app};
use sentry::integrations::tracing as sentry_tracing;
use sentry::protocol::Event;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Request headers that carry caller or backend credentials.
const CREDENTIAL_HEADERS: [&str; 3] = ["authorization", "apikey", "cookie"];

/// Drop credential headers from events before they leave the process.
fn scrub_credentials(mut event: Event<'static>) -> Option<Event<'static>> {
    if let Some(request) = event.request.as_mut() {
        request
            .headers
            .retain(|name, _| !CREDENTIAL_HEADERS.iter().any(|h| name.eq_ignore_ascii_case(h)));
    }
    Some(event)
}

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &PaymentsConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: config
                .sentry_environment
                .clone()
                .map(std::borrow::Cow::Owned),
            sample_rate: config.sentry_sample_rate,
            traces_sample_rate: config.sentry_traces_sample_rate,
            attach_stacktrace: true,
            send_default_pii: false,
            before_send: Some(Arc::new(scrub_credentials)),
            ..Default::default()
        },
    ));

    sentry::configure_scope(|scope| scope.set_tag("function", "manage-payment-methods"));
    tracing::info!("Sentry initialized");
    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

#[tokio::main]
async fn main() {
    let config = PaymentsConfig::from_env().expect("Failed to load configuration");

    // Sentry must be initialized before the tracing subscriber
    let _sentry_guard = init_sentry(&config);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "hwmarket_payments=info,tower_http=debug".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();

    let state = AppState::from_config(&config).expect("Failed to initialize application state");

    let app = app(state)
        .layer(sentry_tower::NewSentryLayer::new_from_top())
        .layer(sentry_tower::SentryHttpLayer::new().enable_transaction());

    let addr = config.socket_addr();
    tracing::info!(
        %addr,
        stripe_live = config.stripe.is_live(),
        stripe_api = %config.stripe.api_base,
        "manage-payment-methods listening"
    );

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown signal received, draining requests");
}
