//! Relay service entry point.

use anyhow::{Context, Result};
use gateway::{
    bootstrap, create_router, load_fixtures, AppState, ClientRegistry, EventRelay,
    ReconnectPolicy, RelayConfig,
};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::Arc;
use tile38_client::{ChannelSubscriber, GeoStore, Tile38Client};
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting geofence relay");

    let config = RelayConfig::from_env().context("reading configuration")?;
    info!("Configuration:");
    info!("  TILE38_URL: {}", config.tile38_url);
    info!("  HTTP_PORT: {}", config.http_port);
    info!("  METRICS_PORT: {}", config.metrics_port);
    info!("  FENCES_DIR: {}", config.fences_dir.display());
    info!("  PLACES: {}", config.places.join(","));
    info!("  ROAM_METERS: {}", config.roam_meters);

    PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], config.metrics_port))
        .install()
        .context("starting Prometheus exporter")?;
    info!("Prometheus metrics server started on port {}", config.metrics_port);

    let tile38 = Arc::new(
        Tile38Client::new(&config.tile38_url, &config.pool).context("creating Tile38 client")?,
    );
    let store: Arc<dyn GeoStore> = tile38.clone();
    let subscriber: Arc<dyn ChannelSubscriber> = tile38;

    let fixtures = load_fixtures(&config.fences_dir, &config.places);
    if fixtures.is_empty() {
        warn!("No place fixtures loaded from {}", config.fences_dir.display());
    }
    let props = Arc::new(bootstrap(store.as_ref(), &fixtures, config.roam_meters).await);

    let registry = Arc::new(ClientRegistry::new());

    let relay = Arc::new(EventRelay::new(
        registry.clone(),
        props,
        ReconnectPolicy {
            initial_delay: config.reconnect_delay,
            max_delay: config.max_reconnect_delay,
        },
    ));

    let (relay_shutdown_tx, relay_shutdown_rx) = mpsc::channel(1);
    let relay_handle = tokio::spawn(async move {
        if let Err(e) = relay.run(subscriber, relay_shutdown_rx).await {
            error!("Relay error: {}", e);
        }
    });

    let state = Arc::new(AppState::new(
        registry,
        store,
        config.roam_meters,
        config.person_ttl,
    ));
    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.http_port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    info!("Relay listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutting down relay...");
    let _ = relay_shutdown_tx.send(()).await;
    let _ = relay_handle.await;

    info!("Relay stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received terminate signal"),
    }
}
