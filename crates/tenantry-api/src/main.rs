//! Tenantry server binary.
//!
//! Multi-tenant product lookup service with per-tenant resource caching and
//! per-request batched backend calls.
//!
//! # Usage
//!
//! ```bash
//! # With config file
//! tenantry --config config.yaml
//!
//! # With environment variables only
//! TENANTRY_SERVER__PORT=4000 tenantry
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::signal;
use tracing::{error, info};

use tenantry_api::http::{create_router_with_endpoint, create_router_with_observability, AppState};
use tenantry_api::observability::{init_logging, init_metrics, LoggingConfig};
use tenantry_domain::TenantResourceCache;
use tenantry_remote::{MemoryProductClient, RemoteEntityClient};
use tenantry_server::handlers::products::ProductLookupHandler;
use tenantry_server::{ServerConfig, TenantBundleFactory};

/// Tenantry - multi-tenant product lookup server
#[derive(Parser, Debug)]
#[command(name = "tenantry")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file (YAML)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = match args.config {
        Some(config_path) => ServerConfig::load(&config_path)?,
        None => ServerConfig::from_env()?,
    };

    init_logging(LoggingConfig::from_settings(&config.logging));

    info!(version = env!("CARGO_PKG_VERSION"), "Starting tenantry server");

    let remote = build_remote(&config)?;
    let factory = TenantBundleFactory::new(remote, config.batch_config());
    let cache = TenantResourceCache::new(Arc::new(factory), config.cache_config());
    let evictor = cache.spawn_evictor();

    let state = AppState::new(ProductLookupHandler::new(cache.clone()))
        .with_request_timeout(config.request_timeout());

    let router = if config.metrics.enabled {
        let metrics_state = init_metrics()?;
        info!("Metrics enabled at /metrics");
        create_router_with_observability(state, metrics_state, &config.server.endpoint)
    } else {
        create_router_with_endpoint(state, &config.server.endpoint)
    };

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, endpoint = %config.server.endpoint, "HTTP server listening");

    let served = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await;
    if let Err(ref e) = served {
        error!("HTTP server error: {}", e);
    }

    // In-flight requests have finished; release every tenant bundle.
    let torn_down = cache.shutdown(config.request_timeout()).await;
    if let Err(e) = evictor.await {
        error!("tenant evictor task failed: {}", e);
    }
    info!(bundles = torn_down, "Server shutdown complete");

    served.map_err(Into::into)
}

fn build_remote(config: &ServerConfig) -> anyhow::Result<Arc<dyn RemoteEntityClient>> {
    match config.remote.backend.as_str() {
        "memory" => {
            info!(
                latency_ms = config.remote.latency_ms,
                "Using in-process product backend"
            );
            let client = MemoryProductClient::new()
                .with_latency(Duration::from_millis(config.remote.latency_ms));
            Ok(Arc::new(client))
        }
        other => anyhow::bail!("Unknown remote backend: {}", other),
    }
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("failed to install Ctrl+C handler: {}", e);
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
                error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, draining requests");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_parse_config_flag() {
        let args = Args::parse_from(["tenantry", "--config", "tenantry.yaml"]);
        assert_eq!(args.config.as_deref(), Some("tenantry.yaml"));

        let args = Args::parse_from(["tenantry"]);
        assert!(args.config.is_none());
    }

    #[test]
    fn test_unknown_remote_backend_is_rejected() {
        let mut config = ServerConfig::default();
        config.remote.backend = "grpc".to_string();
        assert!(build_remote(&config).is_err());

        config.remote.backend = "memory".to_string();
        assert!(build_remote(&config).is_ok());
    }
}
