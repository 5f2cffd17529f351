//! ERP RS Server
//!
//! Wires configuration, storage and the API router into an HTTP server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{extract::DefaultBodyLimit, middleware, routing::get, Router};
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use erp_api::AppState;
use erp_core::config::AppConfig;
use erp_db::{seed_default_roles, Database, DatabaseConfig, Stores};
use erp_files::LocalStorage;

mod health;
mod metrics;

use health::{HealthChecker, HealthConfig, HealthState};
use metrics::Metrics;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let loaded = AppConfig::load();
    let format = loaded
        .as_ref()
        .map(|c| c.logging.format.clone())
        .unwrap_or_default();
    init_tracing(&format);

    let config = loaded.unwrap_or_else(|e| {
        warn!("Failed to load configuration: {}, using defaults", e);
        AppConfig::default()
    });

    info!(
        version = env!("CARGO_PKG_VERSION"),
        host = %config.server.host,
        port = config.server.port,
        "Starting ERP RS"
    );

    let database = connect_database(&config).await;
    let stores = match database {
        Some(ref db) => Stores::postgres(db.pool().clone()),
        None => {
            warn!("Running with in-memory stores; data will not survive a restart");
            Stores::memory()
        }
    };
    let seeded = seed_default_roles(stores.roles.as_ref()).await?;
    if seeded > 0 {
        info!(count = seeded, "Default roles created");
    }

    let storage = Arc::new(LocalStorage::new(&config.storage.local_path));
    let state = AppState::new(&stores, storage, &config);

    let metrics = Arc::new(Metrics::new().with_hub(state.hub.clone()));
    let mut checker =
        HealthChecker::new(HealthConfig::default()).with_storage(&config.storage.local_path);
    if let Some(db) = database.clone() {
        checker = checker.with_database(db);
    }
    let health_state = Arc::new(HealthState {
        health: Arc::new(checker),
    });

    let app = build_router(state, health_state, metrics, &config);

    let addr = config.server_addr();
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    if let Some(db) = database {
        db.close().await;
    }
    info!("Server shutdown complete");
    Ok(())
}

/// Human readable logs by default, one JSON object per line with `json`
fn init_tracing(format: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "info,erp_server=debug,erp_api=debug,erp_services=debug,tower_http=debug".into()
    });
    let registry = tracing_subscriber::registry().with(filter);

    if format.eq_ignore_ascii_case("json") {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(false))
            .init();
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true),
            )
            .init();
    }
}

/// Connect and migrate; `None` when the database is unreachable
async fn connect_database(config: &AppConfig) -> Option<Database> {
    let db = match Database::connect(&DatabaseConfig::from(&config.database)).await {
        Ok(db) => {
            info!("Connected to database");
            db
        }
        Err(e) => {
            warn!("Failed to connect to database: {}", e);
            return None;
        }
    };

    if config.database.run_migrations {
        if let Err(e) = db.migrate().await {
            warn!("Database migrations failed: {}", e);
            return None;
        }
    }
    Some(db)
}

fn build_router(
    state: AppState,
    health_state: Arc<HealthState>,
    metrics: Arc<Metrics>,
    config: &AppConfig,
) -> Router {
    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .with_state(health_state);

    let metrics_routes = Router::new()
        .route("/metrics", get(metrics::prometheus_metrics))
        .route("/metrics.json", get(metrics::json_metrics))
        .with_state(metrics.clone());

    Router::new()
        .merge(health_routes)
        .merge(metrics_routes)
        .merge(erp_api::router(state))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CompressionLayer::new())
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods(Any)
                        .allow_headers(Any),
                )
                .layer(TimeoutLayer::new(Duration::from_secs(
                    config.server.request_timeout_seconds,
                )))
                .layer(DefaultBodyLimit::max(config.server.max_body_size_bytes)),
        )
        .layer(middleware::from_fn_with_state(
            metrics,
            metrics::metrics_middleware,
        ))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
