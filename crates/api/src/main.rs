//! Autohaul API server.
//!
//! Serves the public quote and tracking endpoints, the client portal feed
//! and the back-office routes.
//!
//! # Architecture
//!
//! - Axum web framework
//! - Managed backend (auth, `PostgREST` tables, conversion procedure)
//! - Askama templates for outbound email, delivered through Resend
//! - Background notification worker fed by a bounded queue

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::sync::Arc;
use std::time::Duration;

use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use autohaul_api::backend::SupabaseClient;
use autohaul_api::config::ApiConfig;
use autohaul_api::services::{IdentityResolver, NotificationQueue, mailer_from_config};
use autohaul_api::state::AppState;
use autohaul_core::Email;

/// How long to let queued email drain after the server stops.
const NOTIFICATION_DRAIN_TIMEOUT: Duration = Duration::from_secs(20);

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &ApiConfig) -> Option<sentry::ClientInitGuard> {
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
            // Customer contact details stay out of error reports
            send_default_pii: false,
            ..Default::default()
        },
    ));

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
    // Load configuration from environment (needed for Sentry init)
    let config = ApiConfig::from_env().expect("Failed to load configuration");

    // Initialize Sentry (must be done before tracing subscriber)
    let _sentry_guard = init_sentry(&config);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "autohaul_api=info,tower_http=debug".into());

    // JSON on hosted platforms for structured log parsing, text locally
    let is_hosted = std::env::var("FLY_APP_NAME").is_ok() || std::env::var("RENDER").is_ok();
    let json_layer =
        is_hosted.then(|| tracing_subscriber::fmt::layer().json().flatten_event(true));
    let text_layer = (!is_hosted).then(tracing_subscriber::fmt::layer);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(text_layer)
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();

    let supabase =
        Arc::new(SupabaseClient::new(&config.supabase).expect("Failed to create backend client"));
    tracing::info!(url = %config.supabase.url, "Backend client created");

    let mailer = mailer_from_config(&config.mail).expect("Failed to create mailer");
    let admin_alert_email = config
        .mail
        .admin_alert_email
        .as_deref()
        .and_then(|raw| match Email::parse(raw) {
            Ok(email) => Some(email),
            Err(e) => {
                tracing::warn!(error = %e, "ADMIN_ALERT_EMAIL is invalid, internal alerts disabled");
                None
            }
        });

    let (notifications, worker) =
        NotificationQueue::new(config.notify, mailer, admin_alert_email);
    let worker = worker.spawn();

    let state = AppState::new(
        IdentityResolver::new(supabase.clone()),
        supabase,
        notifications,
    );
    let app = autohaul_api::app(state, &config.cors_allowed_origins);

    let addr = config.socket_addr();
    tracing::info!("api listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // The router owned the last queue sender, so the worker now drains and exits.
    match tokio::time::timeout(NOTIFICATION_DRAIN_TIMEOUT, worker).await {
        Ok(Ok(report)) => tracing::info!(?report, "Notification worker stopped"),
        Ok(Err(e)) => tracing::error!(error = %e, "Notification worker panicked"),
        Err(_) => tracing::warn!("Notification worker did not drain in time"),
    }
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

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}
