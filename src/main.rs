use std::error::Error;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use keygate_proxy::config::{load_config, ProxyConfig};
use keygate_proxy::keys::FileKeyStore;
use keygate_proxy::lifecycle::{wait_for_signal, Shutdown};
use keygate_proxy::observability::{logging, metrics};
use keygate_proxy::HttpServer;

#[derive(Parser)]
#[command(name = "keygate-proxy")]
#[command(about = "Key-gated HTTP forwarding proxy", long_about = None)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, env = "KEYGATE_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => ProxyConfig::default(),
    };

    logging::init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "keygate-proxy starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        max_connections = config.listener.max_connections,
        upstream_timeout_secs = config.upstream.request_timeout_secs,
        admin_enabled = config.admin.enabled,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        let addr: SocketAddr = config.observability.metrics_address.parse()?;
        metrics::init_metrics(addr)?;
    }

    let store = match &config.keys.store_path {
        Some(path) => FileKeyStore::open(path.as_str())?,
        None => {
            tracing::warn!("No keys.store_path configured, keys will not survive a restart");
            FileKeyStore::in_memory()
        }
    };
    metrics::record_keys_stored(store.len());
    tracing::info!(count = store.len(), "Key store ready");
    let store = Arc::new(store);

    let server = HttpServer::new(config.clone(), store.clone())?;
    let listener = TcpListener::bind(&config.listener.bind_address).await?;

    let shutdown = Shutdown::new();
    let server_task = tokio::spawn(server.run(listener, shutdown.subscribe()));

    match wait_for_signal().await {
        Ok(signal) => tracing::info!(signal, "Shutdown signal received"),
        Err(e) => tracing::error!(error = %e, "Failed to listen for shutdown signals"),
    }
    shutdown.trigger();

    server_task.await??;
    store.flush().await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
