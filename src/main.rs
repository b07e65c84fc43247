use std::sync::Arc;

use anyhow::Result;
use tokio::{net::TcpListener, signal};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use green_energy_bridge::{
    api::{self, AppState},
    config::Config,
    credentials::CredentialStore,
    events::StateBus,
    pairing,
    sync::{SyncCoordinator, SyncSettings},
};

#[tokio::main]
async fn main() -> Result<()> {
    // .env is optional; variables may come from the environment
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let config = Config::from_env()?;

    let store = CredentialStore::new(&config.credentials_path);
    let (client, credentials) = pairing::ensure_paired(&config, &store).await?;

    let settings = SyncSettings {
        monitored_entities: config.entities.ids(),
        scan_interval: config.scan_interval,
        ..SyncSettings::default()
    };
    let coordinator = SyncCoordinator::new(Arc::new(client), credentials, settings);

    // A failed first poll leaves the snapshot degraded; the poller retries.
    if let Err(e) = coordinator.refresh().await {
        warn!(error = %e, "Initial refresh failed");
    }

    let bus = StateBus::default();
    coordinator.start(&bus).await;

    let addr = format!("{}:{}", config.server_host, config.server_port);
    let listener = TcpListener::bind(&addr).await?;
    info!(addr = %addr, "HTTP server listening");

    let state = AppState {
        coordinator: coordinator.clone(),
        bus,
        store,
    };
    axum::serve(listener, api::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    coordinator.stop().await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
