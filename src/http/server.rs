//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the admin handlers
//! - Wire up middleware (tracing, timeout)
//! - Bind server to listener
//! - Stop gracefully on a shutdown future

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::admin::setup_admin_router;
use crate::config::AdminConfig;
use crate::filtering::DnsFilter;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub filter: Arc<DnsFilter>,
    pub admin: Arc<AdminConfig>,
}

/// HTTP server for the admin API.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    /// Create a new HTTP server for the given filter.
    pub fn new(filter: Arc<DnsFilter>, admin: AdminConfig) -> Self {
        let timeout = Duration::from_secs(admin.request_timeout_secs);
        let state = AppState {
            filter,
            admin: Arc::new(admin),
        };

        let router = Self::build_router(state, timeout);
        Self { router }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(state: AppState, timeout: Duration) -> Router {
        setup_admin_router(state)
            .layer(TimeoutLayer::new(timeout))
            .layer(TraceLayer::new_for_http())
    }

    /// Returns the router, e.g. for in-process tests.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server, accepting connections on the given listener until
    /// `shutdown` completes.
    pub async fn run<F>(self, listener: TcpListener, shutdown: F) -> Result<(), std::io::Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Wait for shutdown signal (Ctrl+C).
pub async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
