use sherlar_backend::api;
use sherlar_backend::click::link::CLICK_PAY_BASE_URL;
use sherlar_backend::config::AppConfig;
use sherlar_backend::database;
use sherlar_backend::database::payment_repository::PaymentRepository;
use sherlar_backend::database::poem_repository::PoemRepository;
use sherlar_backend::database::user_repository::UserRepository;
use sherlar_backend::health::{HealthChecker, HealthStatus};
use sherlar_backend::logging::init_tracing;
use sherlar_backend::middleware::logging::{request_logging_middleware, UuidRequestId};
use sherlar_backend::services::click_processor::ClickProcessor;
use sherlar_backend::services::content_sync::{ContentSyncConfig, ContentSyncService};
use sherlar_backend::services::entitlement::EntitlementUpdater;
use sherlar_backend::services::notification::HttpNotifier;
use sherlar_backend::services::session::SessionStore;
use sherlar_backend::workers;

use axum::{
    routing::{get, post},
    Json, Router,
};
use dotenv::dotenv;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::watch;
use tower::ServiceBuilder;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tracing::{error, info};

/// Graceful shutdown signal handler
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
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown");
}

async fn shutdown_signal_with_notify(shutdown_tx: watch::Sender<bool>) {
    shutdown_signal().await;
    let _ = shutdown_tx.send(true);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    dotenv().ok();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
        "🚀 Starting Sherlar backend service"
    );

    let config = AppConfig::from_env().map_err(|e| {
        error!("❌ Failed to load configuration: {}", e);
        anyhow::anyhow!(e)
    })?;
    config.validate().map_err(|e| {
        error!("❌ Invalid configuration: {}", e);
        anyhow::anyhow!(e)
    })?;

    info!(
        host = %config.server.host,
        port = config.server.port,
        click_service_id = %config.click.service_id,
        sign_scheme = config.click.sign_scheme.as_str(),
        payment_amount = %config.click.payment_amount,
        "Server configuration loaded"
    );

    info!("📊 Initializing database connection pool...");
    let db_pool = database::init_pool_from_config(&config.database)
        .await
        .map_err(|e| {
            error!("Failed to initialize database pool: {}", e);
            anyhow::anyhow!(e)
        })?;
    info!("✅ Database connection pool initialized");

    // Repositories and services
    let payment_repo = Arc::new(PaymentRepository::new(db_pool.clone()));
    let user_repo = Arc::new(UserRepository::new(db_pool.clone()));
    let poem_repo = Arc::new(PoemRepository::new(db_pool.clone()));

    let notifier = Arc::new(HttpNotifier::new(&config.notifier).map_err(|e| {
        error!("Failed to initialize notifier: {}", e);
        anyhow::anyhow!(e.to_string())
    })?);

    let entitlement = Arc::new(EntitlementUpdater::new(
        user_repo.clone(),
        notifier,
        Duration::from_secs(config.notifier.timeout_secs),
    ));

    let click_processor = Arc::new(ClickProcessor::new(
        payment_repo.clone(),
        entitlement.clone(),
        config.click.clone(),
    ));

    let content_sync = Arc::new(
        ContentSyncService::new(
            PoemRepository::new(db_pool.clone()),
            ContentSyncConfig::from_env(),
        )
        .map_err(|e| {
            error!("Failed to initialize content sync service: {}", e);
            anyhow::anyhow!(e.to_string())
        })?,
    );

    let session_ttl = std::env::var("SESSION_TTL_SECONDS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(900);
    let sessions = Arc::new(SessionStore::new(Duration::from_secs(session_ttl)));

    let health_checker = HealthChecker::new(db_pool.clone());

    // Background content-sync worker
    let (worker_shutdown_tx, worker_shutdown_rx) = watch::channel(false);
    let sync_enabled = std::env::var("CONTENT_SYNC_ENABLED")
        .unwrap_or_else(|_| "true".to_string())
        .to_lowercase()
        != "false";
    let mut sync_handle = None;
    if sync_enabled {
        let worker_config = workers::content_sync::ContentSyncWorkerConfig::from_env();
        info!(
            sync_interval_secs = worker_config.sync_interval.as_secs(),
            "Starting content sync worker"
        );
        let worker = workers::content_sync::ContentSyncWorker::new(
            content_sync.clone(),
            sessions.clone(),
            worker_config,
        );
        sync_handle = Some(tokio::spawn(worker.run(worker_shutdown_rx)));
    } else {
        info!("Content sync worker disabled (CONTENT_SYNC_ENABLED=false)");
    }

    // Routers
    info!("🛣️  Setting up application routes...");

    let click_state = Arc::new(api::click::ClickState {
        processor: click_processor,
    });
    let click_routes = Router::new()
        .route("/click/prepare", post(api::click::handle_prepare))
        .route("/click/complete", post(api::click::handle_complete))
        .with_state(click_state);

    let payments_state = Arc::new(api::payments::PaymentsState {
        ledger: payment_repo,
        users: user_repo.clone(),
        sessions: sessions.clone(),
        click: config.click.clone(),
    });
    let payments_routes = Router::new()
        .route("/api/payments/link", post(api::payments::create_payment_link))
        .with_state(payments_state);

    let users_state = Arc::new(api::users::UsersState {
        users: user_repo.clone(),
    });
    let users_routes = Router::new()
        .route(
            "/api/users/{telegram_id}/entitlement",
            get(api::users::get_entitlement),
        )
        .route(
            "/api/users/{telegram_id}/viewed",
            post(api::users::increment_viewed),
        )
        .with_state(users_state);

    let admin_state = Arc::new(api::admin::AdminState {
        entitlement,
        content_sync,
        config: config.admin.clone(),
    });
    let admin_routes = Router::new()
        .route(
            "/api/admin/entitlements/grant",
            post(api::admin::grant_entitlement),
        )
        .route(
            "/api/admin/entitlements/revoke",
            post(api::admin::revoke_entitlement),
        )
        .route(
            "/api/admin/content/sync",
            post(api::admin::trigger_content_sync),
        )
        .with_state(admin_state);

    let content_state = Arc::new(api::content::ContentState { poems: poem_repo });
    let content_routes = Router::new()
        .route("/api/content", get(api::content::list_content))
        .with_state(content_state);

    let app = Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/health/ready", get(readiness))
        .route("/health/live", get(liveness))
        .merge(click_routes)
        .merge(payments_routes)
        .merge(users_routes)
        .merge(admin_routes)
        .merge(content_routes)
        .with_state(AppState { health_checker })
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
                .layer(axum::middleware::from_fn(request_logging_middleware))
                .layer(PropagateRequestIdLayer::x_request_id()),
        );

    info!("✅ Routes configured");

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        error!("❌ Failed to bind to address {}: {}", addr, e);
        e
    })?;

    info!(
        address = %addr,
        pay_base_url = CLICK_PAY_BASE_URL,
        "🚀 Server listening on http://{}",
        addr
    );
    info!("✅ Server is ready to accept connections");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal_with_notify(worker_shutdown_tx.clone()))
        .await?;

    let _ = worker_shutdown_tx.send(true);
    if let Some(handle) = sync_handle {
        if let Err(e) = tokio::time::timeout(Duration::from_secs(5), handle).await {
            error!(error = %e, "Timed out waiting for content sync worker shutdown");
        }
    }

    info!("👋 Server shutdown complete");

    Ok(())
}

// Application state for the root/health handlers
#[derive(Clone)]
struct AppState {
    health_checker: HealthChecker,
}

// Handlers
async fn root() -> &'static str {
    "Welcome to Sherlar Backend API"
}

async fn health(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> Result<Json<HealthStatus>, (axum::http::StatusCode, String)> {
    let health_status = state.health_checker.check_health().await;

    // Return 503 if any component is unhealthy
    if !health_status.is_healthy() {
        error!("❌ Health check failed - service unhealthy");
        Err((
            axum::http::StatusCode::SERVICE_UNAVAILABLE,
            "Service Unavailable".to_string(),
        ))
    } else {
        Ok(Json(health_status))
    }
}

/// Readiness probe - checks if the service is ready to accept traffic
async fn readiness(
    state: axum::extract::State<AppState>,
) -> Result<Json<HealthStatus>, (axum::http::StatusCode, String)> {
    health(state).await
}

/// Liveness probe - checks if the service is alive (basic check)
async fn liveness() -> &'static str {
    "OK"
}
