use membership_service::{
    build_router,
    clock::SystemClock,
    config::{MembershipConfig, StoreBackend},
    db,
    services::{Database, MemoryStore, MembershipCore, Stores},
    AppState,
};
use service_core::observability::logging::init_tracing;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;

#[tokio::main]
async fn main() -> Result<(), service_core::error::AppError> {
    // Load configuration - fail fast if invalid
    let config = MembershipConfig::from_env()?;

    init_tracing(
        &config.service_name,
        &config.log_level,
        config.common.otlp_endpoint.as_deref(),
    )?;

    membership_service::services::metrics::init_metrics();

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
        store = ?config.store.backend,
        "Starting membership service"
    );

    let stores = match config.store.backend {
        StoreBackend::Postgres => {
            let pool = db::create_pool(&config.store).await?;
            db::run_migrations(&pool)
                .await
                .map_err(|e| anyhow::anyhow!("Migration failed: {}", e))?;
            Stores::from_backend(Database::new(pool))
        }
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory store; data does not survive restarts");
            Stores::from_backend(MemoryStore::new())
        }
    };

    let core = MembershipCore::new(&config, stores, Arc::new(SystemClock));

    let purge_interval = Duration::from_secs(config.tokens.purge_interval_seconds.max(1));
    tokio::spawn(purge_expired_tokens(core.clone(), purge_interval));

    let state = AppState {
        config: config.clone(),
        core,
    };
    let app = build_router(state);

    let addr: SocketAddr = config
        .common
        .bind_address()
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid bind address: {}", e))?;

    tracing::info!(address = %addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Service shutdown complete");
    Ok(())
}

async fn purge_expired_tokens(core: MembershipCore, every: Duration) {
    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;
        match core.purge_expired_tokens().await {
            Ok(0) => {}
            Ok(removed) => tracing::info!(removed, "Purged expired opaque tokens"),
            Err(e) => tracing::warn!("Token purge failed: {}", e),
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
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
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        },
    }
}
