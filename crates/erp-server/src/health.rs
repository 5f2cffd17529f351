//! Health checks
//!
//! Liveness is unconditional. Readiness pings the database (when one is
//! configured) and checks that the upload directory is usable.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use erp_db::Database;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy | Self::Degraded)
    }

    /// The worse of two statuses
    fn combine(self, other: HealthStatus) -> HealthStatus {
        match (self, other) {
            (Self::Unhealthy, _) | (_, Self::Unhealthy) => Self::Unhealthy,
            (Self::Degraded, _) | (_, Self::Degraded) => Self::Degraded,
            _ => Self::Healthy,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ComponentHealth {
    pub name: String,
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub response_time_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub version: String,
    pub uptime_seconds: u64,
    pub components: Vec<ComponentHealth>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl HealthReport {
    pub fn http_status(&self) -> StatusCode {
        match self.status {
            HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
            HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HealthConfig {
    /// Timeout for individual checks
    pub check_timeout: Duration,
    /// How long a report is reused
    pub cache_duration: Duration,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            check_timeout: Duration::from_secs(5),
            cache_duration: Duration::from_secs(10),
        }
    }
}

struct CachedHealth {
    report: HealthReport,
    cached_at: Instant,
}

pub struct HealthChecker {
    config: HealthConfig,
    start_time: Instant,
    cache: RwLock<Option<CachedHealth>>,
    database: Option<Database>,
    storage_root: Option<PathBuf>,
}

impl HealthChecker {
    pub fn new(config: HealthConfig) -> Self {
        Self {
            config,
            start_time: Instant::now(),
            cache: RwLock::new(None),
            database: None,
            storage_root: None,
        }
    }

    pub fn with_database(mut self, database: Database) -> Self {
        self.database = Some(database);
        self
    }

    pub fn with_storage(mut self, root: impl Into<PathBuf>) -> Self {
        self.storage_root = Some(root.into());
        self
    }

    /// Cached report, or a fresh one when the cache expired
    pub async fn check(&self) -> HealthReport {
        {
            let cache = self.cache.read().await;
            if let Some(ref cached) = *cache {
                if cached.cached_at.elapsed() < self.config.cache_duration {
                    debug!("Returning cached health report");
                    return cached.report.clone();
                }
            }
        }

        let report = self.perform_checks().await;

        let mut cache = self.cache.write().await;
        *cache = Some(CachedHealth {
            report: report.clone(),
            cached_at: Instant::now(),
        });
        report
    }

    async fn perform_checks(&self) -> HealthReport {
        let mut components = Vec::new();

        if let Some(ref database) = self.database {
            components.push(self.check_database(database).await);
        }
        if let Some(ref root) = self.storage_root {
            components.push(check_storage(root).await);
        }

        let status = components
            .iter()
            .fold(HealthStatus::Healthy, |acc, c| acc.combine(c.status));

        HealthReport {
            status,
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: self.start_time.elapsed().as_secs(),
            components,
            timestamp: chrono::Utc::now(),
        }
    }

    async fn check_database(&self, database: &Database) -> ComponentHealth {
        let start = Instant::now();
        let outcome = tokio::time::timeout(self.config.check_timeout, database.ping()).await;

        let (status, message) = match outcome {
            Ok(Ok(())) => (HealthStatus::Healthy, "Connected".to_string()),
            Ok(Err(e)) => {
                warn!("Database health check failed: {}", e);
                (HealthStatus::Unhealthy, e.to_string())
            }
            Err(_) => (HealthStatus::Unhealthy, "Timed out".to_string()),
        };
        let stats = database.stats();

        ComponentHealth {
            name: "database".to_string(),
            status,
            message: Some(message),
            response_time_ms: start.elapsed().as_millis() as u64,
            details: Some(serde_json::json!({
                "type": "postgresql",
                "pool_size": stats.size,
                "idle_connections": stats.idle,
            })),
        }
    }
}

/// Uploads still work when the directory is missing (it is created on first
/// write), so that case is only degraded.
async fn check_storage(root: &PathBuf) -> ComponentHealth {
    let start = Instant::now();
    let (status, message) = match tokio::fs::metadata(root).await {
        Ok(meta) if meta.is_dir() && !meta.permissions().readonly() => {
            (HealthStatus::Healthy, "Writable".to_string())
        }
        Ok(meta) if meta.is_dir() => (HealthStatus::Unhealthy, "Read-only".to_string()),
        Ok(_) => (HealthStatus::Unhealthy, "Not a directory".to_string()),
        Err(_) => (HealthStatus::Degraded, "Not created yet".to_string()),
    };

    ComponentHealth {
        name: "storage".to_string(),
        status,
        message: Some(message),
        response_time_ms: start.elapsed().as_millis() as u64,
        details: Some(serde_json::json!({ "path": root.display().to_string() })),
    }
}

/// State of the health routes
pub struct HealthState {
    pub health: Arc<HealthChecker>,
}

/// GET /health/live
pub async fn liveness() -> &'static str {
    "OK"
}

/// GET /health/ready
pub async fn readiness(State(state): State<Arc<HealthState>>) -> (StatusCode, Json<HealthReport>) {
    let report = state.health.check().await;
    (report.http_status(), Json(report))
}

/// GET /health
pub async fn health(State(state): State<Arc<HealthState>>) -> (StatusCode, Json<serde_json::Value>) {
    let report = state.health.check().await;
    let body = serde_json::json!({
        "status": if report.status.is_healthy() { "OK" } else { "UNAVAILABLE" },
        "timestamp": report.timestamp,
        "version": report.version,
    });
    (report.http_status(), Json(body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_health_without_components() {
        let checker = HealthChecker::new(HealthConfig::default());
        let report = checker.check().await;

        assert_eq!(report.status, HealthStatus::Healthy);
        assert!(report.components.is_empty());
    }

    #[tokio::test]
    async fn test_health_cache() {
        let checker = HealthChecker::new(HealthConfig {
            cache_duration: Duration::from_secs(60),
            ..Default::default()
        });

        let report1 = checker.check().await;
        let report2 = checker.check().await;
        assert_eq!(report1.timestamp, report2.timestamp);
    }

    #[tokio::test]
    async fn test_missing_storage_is_degraded() {
        let checker = HealthChecker::new(HealthConfig::default())
            .with_storage("/nonexistent/erp-rs-health-check");
        let report = checker.check().await;

        assert_eq!(report.status, HealthStatus::Degraded);
        assert_eq!(report.http_status(), StatusCode::OK);
        assert_eq!(report.components[0].name, "storage");
    }

    #[tokio::test]
    async fn test_existing_storage_is_healthy() {
        let checker =
            HealthChecker::new(HealthConfig::default()).with_storage(std::env::temp_dir());
        let report = checker.check().await;
        assert_eq!(report.status, HealthStatus::Healthy);
    }

    #[test]
    fn test_status_combination() {
        assert_eq!(
            HealthStatus::Healthy.combine(HealthStatus::Degraded),
            HealthStatus::Degraded
        );
        assert_eq!(
            HealthStatus::Degraded.combine(HealthStatus::Unhealthy),
            HealthStatus::Unhealthy
        );

        let report = HealthReport {
            status: HealthStatus::Unhealthy,
            version: "1.0".to_string(),
            uptime_seconds: 100,
            components: vec![],
            timestamp: chrono::Utc::now(),
        };
        assert_eq!(report.http_status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
