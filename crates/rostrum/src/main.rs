//! Rostrum controller binary.
//!
//! One process per controller; `ROSTRUM_ROLE` picks main or backup. Both
//! roles run the same servers:
//! - HTTP/WebSocket gateway for viewers and operators
//! - bus listener and publisher against the Redis broker
//! - failover coordinator (heartbeats out, takeover watch on the backup)
//! - health monitor sampling local resources
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment
//! 2. Install the Prometheus metrics recorder
//! 3. Spawn the state store actor
//! 4. Spawn bus publisher and listener (broker may be down; both retry)
//! 5. Bind and start the HTTP server (gateway + probes + /metrics)
//! 6. Spawn the failover coordinator and health monitor
//! 7. Mark ready, wait for shutdown signal

#![warn(clippy::pedantic)]

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use metrics_exporter_prometheus::PrometheusBuilder;
use rostrum::bus::listener::BusRouter;
use rostrum::bus::{run_listener, run_publisher, BusPublisher};
use rostrum::config::Config;
use rostrum::failover::{ActivationState, FailoverCoordinator, FailoverHandle, Reconciler};
use rostrum::gateway::{self, AppState};
use rostrum::monitor::run_health_monitor;
use rostrum::observability::{health_router, HealthState};
use rostrum::state::{DeviceRole, StateStoreHandle};
use secrecy::ExposeSecret;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rostrum=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Rostrum controller");

    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        role = %config.role,
        device_id = %config.device_id,
        http_bind_address = %config.http_bind_address,
        topic_prefix = %config.topic_prefix,
        heartbeat_interval_seconds = config.heartbeat_interval_seconds,
        failover_timeout_seconds = config.failover_timeout_seconds,
        total_slides = config.total_slides,
        "Configuration loaded successfully"
    );

    // Must happen before any metrics are recorded
    let prometheus_handle = PrometheusBuilder::new().install_recorder().map_err(|e| {
        error!(error = %e, "Failed to install Prometheus metrics recorder");
        format!("Failed to install Prometheus metrics recorder: {e}")
    })?;

    let health_state = Arc::new(HealthState::new());
    let shutdown_token = CancellationToken::new();

    // State store actor
    let store = StateStoreHandle::spawn(
        config.role,
        config.total_slides,
        shutdown_token.child_token(),
    );

    // Bus publisher and listener. Client::open only parses the URL; actual
    // connections are made (and retried) inside the loops, so a down
    // broker does not block startup.
    let redis_client = redis::Client::open(config.redis_url.expose_secret()).map_err(|e| {
        error!(error = %e, "Invalid Redis URL");
        format!("Invalid Redis URL: {e}")
    })?;

    let (publisher, publish_rx) = BusPublisher::channel();
    tokio::spawn(run_publisher(
        redis_client.clone(),
        config.topic_prefix.clone(),
        publish_rx,
        shutdown_token.child_token(),
    ));

    let activation = Arc::new(ActivationState::new(config.role));
    let bus_router = BusRouter::new(store.clone(), config.role, Arc::clone(&activation));
    tokio::spawn(run_listener(
        redis_client,
        config.topic_prefix.clone(),
        bus_router,
        shutdown_token.child_token(),
    ));

    let failover = FailoverHandle::new(
        config.role,
        config.device_id.clone(),
        activation,
        publisher.clone(),
    );

    // HTTP server: gateway routes + probes + /metrics
    let app_state = AppState::new(
        store.clone(),
        publisher,
        failover.clone(),
        Duration::from_secs(config.viewer_write_timeout_seconds),
    );
    let metrics_router = Router::new().route(
        "/metrics",
        axum::routing::get(move || {
            let handle = prometheus_handle.clone();
            async move { handle.render() }
        }),
    );
    let app = gateway::router(app_state)
        .merge(health_router(Arc::clone(&health_state)))
        .merge(metrics_router);

    // Bind before spawning to fail fast on bind errors
    let listener = tokio::net::TcpListener::bind(&config.http_bind_address)
        .await
        .map_err(|e| {
            error!(error = %e, addr = %config.http_bind_address, "Failed to bind HTTP server");
            format!("Failed to bind HTTP server to {}: {e}", config.http_bind_address)
        })?;
    info!(addr = %config.http_bind_address, "HTTP server bound successfully");

    let http_shutdown_token = shutdown_token.child_token();
    tokio::spawn(async move {
        let server = axum::serve(listener, app).with_graceful_shutdown(async move {
            http_shutdown_token.cancelled().await;
            info!("HTTP server shutting down");
        });
        if let Err(e) = server.await {
            error!(error = %e, "HTTP server failed");
        }
    });

    // Failover coordinator. Reconciliation pulls only exist on the backup.
    let reconciler = if config.role == DeviceRole::Backup {
        Some(Reconciler::new(
            &config.main_base_url,
            Duration::from_secs(config.reconcile_timeout_seconds),
        )?)
    } else {
        None
    };
    let coordinator = FailoverCoordinator::new(
        failover,
        store.clone(),
        reconciler,
        Duration::from_secs(config.heartbeat_interval_seconds),
        Duration::from_secs(config.failover_timeout_seconds),
    );
    tokio::spawn(coordinator.run(shutdown_token.child_token()));

    tokio::spawn(run_health_monitor(
        store,
        Duration::from_secs(config.health_interval_seconds),
        shutdown_token.child_token(),
    ));

    health_state.set_ready();
    info!("Rostrum controller running - press Ctrl+C to shutdown");
    shutdown_signal().await;

    info!("Shutdown signal received, initiating graceful shutdown...");

    // Stop taking traffic first so load balancers drain viewers
    health_state.set_not_ready();
    shutdown_token.cancel();

    // Give tasks time to shut down
    tokio::time::sleep(Duration::from_secs(2)).await;

    info!("Rostrum controller shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
///
/// # Panics
///
/// Panics if signal handlers cannot be installed; without them there is
/// no way to shut down gracefully.
async fn shutdown_signal() {
    let ctrl_c = async {
        #[expect(
            clippy::expect_used,
            reason = "Signal handler installation is critical - panic is appropriate if it fails"
        )]
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        #[expect(
            clippy::expect_used,
            reason = "Signal handler installation is critical - panic is appropriate if it fails"
        )]
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
