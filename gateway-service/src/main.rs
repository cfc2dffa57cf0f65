use gateway_service::{
    AppState, build_router,
    config::GatewayConfig,
    db,
    services::{
        AuditLogger, AuthResolver, ConnectivityMonitor, HttpIdentityStore, OfflineAuthCache,
        PgAuditStore, RetryQueue, RetryQueueConfig, SignatureScanner, SqlOwnershipStore,
    },
};
use service_core::middleware::rate_limit::{FixedWindowLimiter, create_ip_rate_limiter};
use service_core::observability::{logging::init_tracing, metrics::init_metrics};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;

#[tokio::main]
async fn main() -> Result<(), service_core::error::AppError> {
    // Load configuration - fail fast if invalid
    let config = GatewayConfig::from_env()?;

    init_tracing(
        &config.service_name,
        &config.log_level,
        config.otlp_endpoint.as_deref(),
    );

    let metrics_handle = init_metrics()?;

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
        "Starting security gateway"
    );

    // Initialize database connection for audit trail and ownership lookups
    let pool = db::create_pool(&config.database)
        .await
        .map_err(|e| service_core::error::AppError::DatabaseError(anyhow::Error::new(e)))?;
    db::run_migrations(&pool)
        .await
        .map_err(|e| service_core::error::AppError::DatabaseError(anyhow::Error::new(e)))?;
    tracing::info!("Database initialized successfully");

    // Identity store client is constructed here and injected; its lifecycle
    // belongs to the process entry point.
    let identity = Arc::new(
        HttpIdentityStore::new(
            config.identity_store.url.clone(),
            Duration::from_secs(config.identity_store.timeout_seconds),
        )
        .map_err(|e| service_core::error::AppError::ConfigError(anyhow::anyhow!("{}", e)))?,
    );
    tracing::info!(url = %config.identity_store.url, "Identity store client initialized");

    let offline_cache = Arc::new(OfflineAuthCache::new(chrono::Duration::minutes(
        config.auth.session_timeout_minutes,
    )));
    let connectivity = Arc::new(ConnectivityMonitor::new());
    let retry_queue = Arc::new(RetryQueue::new(RetryQueueConfig {
        max_attempts: config.retry.max_attempts,
        max_drain_passes: config.retry.max_drain_passes,
        ..RetryQueueConfig::default()
    }));
    let resolver = AuthResolver::new(
        identity.clone(),
        offline_cache.clone(),
        connectivity,
        retry_queue.clone(),
    );

    let audit = AuditLogger::new(
        Arc::new(PgAuditStore::new(pool.clone())),
        config.features.enable_audit_logging,
    );
    let ownership = Arc::new(SqlOwnershipStore::new(pool));

    let route_limiter = Arc::new(FixedWindowLimiter::new());
    {
        // Idle rate windows are purged on a slow cadence.
        let limiter = route_limiter.clone();
        let window = Duration::from_millis(config.rate_limit.default_window_ms);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(300));
            loop {
                ticker.tick().await;
                limiter.purge_stale(window.saturating_mul(4));
            }
        });
    }

    let login_rate_limiter = create_ip_rate_limiter(
        config.auth.max_login_attempts,
        config.auth.login_window_seconds,
    );
    tracing::info!("Rate limiters initialized: Login and per-route fixed window");

    let state = AppState {
        config: config.clone(),
        identity,
        resolver,
        offline_cache,
        retry_queue,
        audit,
        ownership,
        scanner: Arc::new(SignatureScanner::new()),
        route_limiter,
        login_rate_limiter,
        metrics_handle,
    };

    let app = build_router(state).await?;

    let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
    tracing::info!(address = %addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    service_core::axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Service shutdown complete");
    Ok(())
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
            tracing::info!("Received SIGINT, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        },
    }

    // Give in-flight requests and spawned audit writes time to finish.
    tokio::time::sleep(tokio::time::Duration::from_secs(10)).await;
}
