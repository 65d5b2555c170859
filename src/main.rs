//! DNS rewrites daemon.
//!
//! # Architecture Overview
//!
//! ```text
//!   config file ──▶ loader ──▶ DnsFilter ◀── admin API (list/add/delete/check)
//!        ▲                        │
//!        │                        ▼
//!   FilePersister        DefaultStorage (items + DnsEngine snapshot)
//!        ▲                        ▲
//!        └── rewrite changes      └── DNS lookups (match_request)
//!
//!   ConfigWatcher ──▶ reload loop ──▶ DnsFilter::replace_all
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use dns_rewrites::config::{load_config, save_config, AppConfig, ConfigWatcher};
use dns_rewrites::filtering::{DnsFilter, FilePersister};
use dns_rewrites::http::server::shutdown_signal;
use dns_rewrites::observability::{logging, metrics};
use dns_rewrites::HttpServer;

#[derive(Parser)]
#[command(name = "dns-rewrites")]
#[command(about = "Serves administrator-defined DNS rewrites", long_about = None)]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "dns-rewrites.toml")]
    config: PathBuf,

    /// Validate the configuration and compile the rewrites, then exit.
    #[arg(long)]
    check: bool,
}

fn load_or_create(path: &Path) -> Result<AppConfig, Box<dyn std::error::Error>> {
    if path.exists() {
        return Ok(load_config(path)?);
    }

    let config = AppConfig::default();
    save_config(path, &config)?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = load_or_create(&args.config)?;

    logging::init_logging(&config.observability.log_level);
    tracing::info!("dns-rewrites v{} starting", env!("CARGO_PKG_VERSION"));

    let persister = Arc::new(FilePersister::new(&args.config, config.clone()));
    let filter = Arc::new(DnsFilter::new(&config.filtering.rewrites, persister.clone())?);

    tracing::info!(
        path = ?args.config,
        rewrites = config.filtering.rewrites.len(),
        "Configuration loaded"
    );

    if args.check {
        println!("configuration OK: {} rewrites", filter.list().len());
        return Ok(());
    }

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    // The watcher stops when dropped, so keep it for the lifetime of main.
    let (watcher, mut config_updates) = ConfigWatcher::new(&args.config);
    let _watcher = watcher.run()?;

    // Updates only trigger the reload; the file is re-read under the filter's
    // conf lock so admin saves made in between are never reverted.
    let reload_filter = filter.clone();
    tokio::spawn(async move {
        while config_updates.recv().await.is_some() {
            let filter = reload_filter.clone();
            let persister = persister.clone();
            let res = tokio::task::spawn_blocking(move || filter.reload(&persister)).await;
            match res {
                Ok(Ok(true)) => tracing::info!("Rewrites reloaded from config"),
                Ok(Ok(false)) => tracing::debug!("Rewrites unchanged after reload"),
                Ok(Err(e)) => tracing::error!(error = %e, "Failed to apply reloaded rewrites"),
                Err(e) => tracing::error!(error = %e, "Reload task failed"),
            }
        }
    });

    if !config.admin.enabled {
        tracing::info!("Admin API disabled; waiting for shutdown");
        shutdown_signal().await;
        return Ok(());
    }

    let listener = TcpListener::bind(&config.admin.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let server = HttpServer::new(filter, config.admin.clone());
    server.run(listener, shutdown_signal()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
