use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use device_catalog::auth::{generate_secret, AccessPolicy, TokenManager};
use device_catalog::server::{seed_users, CatalogServer, ServerConfig};
use device_catalog::store::{
    DiskImageStore, InMemoryDeviceStore, InMemoryRatingStore, InMemoryUserStore,
};
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser, Debug)]
#[command(name = "server")]
#[command(about = "Role-gated gRPC device catalog server", long_about = None)]
#[command(version)]
struct Args {
    /// Host to bind to, overriding the configuration
    #[arg(short = 'H', long)]
    host: Option<String>,

    /// Port to listen on, overriding the configuration
    #[arg(short, long)]
    port: Option<u16>,

    /// Folder for uploaded images, overriding the configuration
    #[arg(long)]
    image_folder: Option<std::path::PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = ServerConfig::from_env().map_err(|e| {
        error!("Failed to load configuration: {e}");
        format!("Invalid configuration: {e}")
    })?;

    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(folder) = args.image_folder {
        config.storage.image_folder = folder;
    }

    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {e}");
        return Err(format!("Invalid configuration: {e}").into());
    }

    let secret = if config.auth.secret_key.is_empty() {
        warn!("No auth secret configured; tokens will not survive a restart");
        generate_secret()
    } else {
        config.auth.secret_key.clone()
    };
    let tokens = Arc::new(TokenManager::new(
        secret.as_bytes(),
        Duration::from_secs(config.auth.token_duration_secs),
    ));

    let users = Arc::new(InMemoryUserStore::new());
    seed_users(users.as_ref(), &config.auth.seed_users, config.auth.bcrypt_cost).await?;

    let images = DiskImageStore::new(&config.storage.image_folder)?;
    info!(folder = %images.folder().display(), "storing images");

    let server = CatalogServer::new(
        Arc::new(InMemoryDeviceStore::new()),
        Arc::new(images),
        Arc::new(InMemoryRatingStore::new()),
        users,
        config.auth.bcrypt_cost,
        tokens,
        AccessPolicy::catalog(),
    )?;

    if config.metrics.enabled {
        let metrics_addr = config.metrics.addr()?;
        if let Err(e) = metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(metrics_addr)
            .install()
        {
            error!("Failed to start metrics server: {e}");
        } else {
            info!("Metrics server started on {metrics_addr}");
        }
    }

    let listener = TcpListener::bind(config.server.addr()?).await?;
    info!(
        token_ttl_secs = config.auth.token_duration_secs,
        metrics = config.metrics.enabled,
        "Server starting on {}",
        listener.local_addr()?
    );

    server.serve(listener, shutdown_signal()).await?;

    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received terminate signal");
        },
    }
}
