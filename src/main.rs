//! CycleRent API Server
//!
//! Booking, payment and notification backend for the bicycle-rental site.

use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;

use cyclerent_server::auth::{GoTrueClient, OtpService, SessionVerifier, TwilioVerify};
use cyclerent_server::availability::AvailabilityService;
use cyclerent_server::booking::{BookingService, BusinessClock};
use cyclerent_server::config::Config;
use cyclerent_server::db;
use cyclerent_server::notification::{NotificationDispatcher, NotificationWorker, TwilioMessenger};
use cyclerent_server::payment::{payment_sweeper, PaymentService};
use cyclerent_server::state::AppState;
use cyclerent_server::store::PgStore;
use cyclerent_server::{build_router, configure_cors, gateway_registry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!(
        environment = config.environment.as_str(),
        payment_provider = config.payment_provider.as_str(),
        "Starting CycleRent API server"
    );

    let database = db::connect(&config).await?;
    let store = Arc::new(PgStore::new(database.pool().clone()));

    let clock = BusinessClock::new(config.business_utc_offset_minutes)
        .context("BUSINESS_UTC_OFFSET_MINUTES out of range")?;

    // Notification queue and worker
    let messenger = Arc::new(TwilioMessenger::new(&config.twilio));
    let worker = NotificationWorker::new(
        store.clone(),
        messenger,
        config.twilio.admin_numbers.clone(),
    );
    let (notifier, notification_task) =
        NotificationDispatcher::spawn(config.notification_queue_capacity, worker);

    // Services
    let availability_service = Arc::new(AvailabilityService::new(store.clone()));

    let booking_service = Arc::new(BookingService::new(
        store.clone(),
        availability_service.clone(),
        clock,
        notifier.clone(),
    ));

    let payment_service = Arc::new(PaymentService::new(
        store.clone(),
        gateway_registry(&config),
        notifier,
        config.public_site_url.clone(),
    ));

    let otp_service = Arc::new(OtpService::new(
        store.clone(),
        Arc::new(TwilioVerify::new(&config.twilio)),
        Arc::new(GoTrueClient::new(&config.identity)),
        config.identity.email_domain.clone(),
    ));

    let session_verifier = Arc::new(SessionVerifier::new(config.identity.jwt_secret.clone()));

    // Start pending payment sweeper in background
    let sweeper_service = payment_service.clone();
    let sweep_interval = Duration::from_secs(config.payment_sweep_interval_secs);
    let sweeper_task = tokio::spawn(async move {
        tracing::info!("Payment sweeper task started");
        payment_sweeper(sweeper_service, sweep_interval).await;
        tracing::error!("Payment sweeper task exited unexpectedly");
    });

    let app_state = AppState::new(
        booking_service,
        payment_service,
        otp_service,
        availability_service,
        session_verifier,
        Some(database),
    );

    let app = build_router(
        app_state,
        configure_cors(config.cors_allowed_origins.as_deref()),
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));

    tracing::info!("Server listening on {}", addr);
    tracing::info!("Health check at http://{}/health", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    // Serve with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    // The router held the last dispatcher handles; let queued messages drain
    sweeper_task.abort();
    if tokio::time::timeout(Duration::from_secs(10), notification_task)
        .await
        .is_err()
    {
        tracing::warn!("Notification queue did not drain before shutdown");
    }

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        }
    }
}
