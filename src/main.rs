//! Cache Service admin server
//!
//! Hosts the administration API over a cache backed by Redis (when
//! `REDIS_URL` is set) or by the in-process store.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cache_service::{
    create_router, spawn_cleanup_task, AppState, CacheService, KvStore, MemoryStore, ServerConfig,
};

/// Main entry point for the cache admin server.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Connect the store (Redis or in-process, plus its cleanup task)
/// 4. Create the cache service and the Axum router
/// 5. Start HTTP server on configured port
/// 6. Handle graceful shutdown on SIGINT/SIGTERM
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cache_service=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Cache Service");

    let config = ServerConfig::from_env();
    info!(
        "Configuration loaded: prefix={}, default_ttl={:?}, max_ttl={:?}, port={}, cleanup_interval={}s",
        config.cache.key_prefix,
        config.cache.default_ttl,
        config.cache.max_ttl,
        config.server_port,
        config.cleanup_interval
    );

    let (store, cleanup_handle) = connect_store(&config).await?;
    let cache = CacheService::new(store, config.cache.clone()).context("invalid cache configuration")?;
    info!("Cache service initialized on {} store", cache.store_name());

    let app = create_router(AppState::new(cache));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cleanup_handle))
        .await
        .context("server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Picks the backing store: Redis when configured, otherwise the
/// in-process store with its background cleanup task.
async fn connect_store(config: &ServerConfig) -> anyhow::Result<(Arc<dyn KvStore>, Option<JoinHandle<()>>)> {
    #[cfg(feature = "redis")]
    if let Some(url) = &config.redis_url {
        let store = cache_service::RedisStore::connect(url)
            .await
            .with_context(|| format!("failed to connect to {}", url))?;
        info!("Connected to Redis at {}", url);
        let store: Arc<dyn KvStore> = Arc::new(store);
        return Ok((store, None));
    }

    #[cfg(not(feature = "redis"))]
    if config.redis_url.is_some() {
        warn!("REDIS_URL is set but the redis feature is disabled; using the in-process store");
    }

    let store = Arc::new(MemoryStore::new());
    let cleanup_handle = spawn_cleanup_task(store.clone(), config.cleanup_interval);
    info!("Using in-process store, cleanup every {}s", config.cleanup_interval);
    let store: Arc<dyn KvStore> = store;
    Ok((store, Some(cleanup_handle)))
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
///
/// On shutdown signal, aborts the cleanup task and allows graceful shutdown.
async fn shutdown_signal(cleanup_handle: Option<JoinHandle<()>>) {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                warn!("Failed to install SIGTERM handler: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }

    if let Some(handle) = cleanup_handle {
        handle.abort();
        warn!("Cleanup task aborted");
    }
}
