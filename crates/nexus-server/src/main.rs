//! # Nexus Gateway Cache Server
//!
//! Loads configuration, initialises logging and metrics, and serves the
//! admin API while applying cache invalidations from the bus.

use nexus_config::ConfigLoader;
use nexus_core::{init_logging, NexusResult};
use nexus_server::{
    startup::{install_metrics_recorder, print_startup_info},
    AppBuilder,
};
use tokio::signal;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Application error: {}", e);
        eprintln!("nexus-server: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> NexusResult<()> {
    // Load configuration
    let config_loader = ConfigLoader::from_default_location()?;
    let environment = config_loader.environment().to_string();
    let config = config_loader.into_config();

    init_logging(&config.observability.logging())?;

    info!("Starting Nexus gateway cache ({} configuration)...", environment);
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    print_startup_info(&config);

    let metrics = if config.observability.metrics_enabled {
        Some(install_metrics_recorder()?)
    } else {
        None
    };

    let app = AppBuilder::new()
        .with_config(config)
        .with_metrics(metrics)
        .build()
        .await?;

    app.serve(shutdown_signal()).await
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            info!("Received terminate signal, initiating graceful shutdown...");
        }
    }
}
