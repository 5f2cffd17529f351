//! Request metrics
//!
//! Prometheus text and JSON exports of HTTP counters plus the number of
//! live realtime subscribers.

use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::Response;
use erp_notifications::EventHub;
use tracing::{debug, info_span, Instrument};

/// Metrics collector
pub struct Metrics {
    pub http_requests_total: AtomicU64,
    /// HTTP requests by status code range
    pub http_requests_2xx: AtomicU64,
    pub http_requests_4xx: AtomicU64,
    pub http_requests_5xx: AtomicU64,
    /// Total request duration in milliseconds
    pub http_request_duration_ms_total: AtomicU64,
    /// Requests currently being served
    pub in_flight_requests: AtomicU64,
    hub: Option<EventHub>,
    start_time: Instant,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            http_requests_total: AtomicU64::new(0),
            http_requests_2xx: AtomicU64::new(0),
            http_requests_4xx: AtomicU64::new(0),
            http_requests_5xx: AtomicU64::new(0),
            http_request_duration_ms_total: AtomicU64::new(0),
            in_flight_requests: AtomicU64::new(0),
            hub: None,
            start_time: Instant::now(),
        }
    }

    /// Report realtime subscribers of `hub`
    pub fn with_hub(mut self, hub: EventHub) -> Self {
        self.hub = Some(hub);
        self
    }

    /// Count a finished request; 1xx and 3xx only reach the total
    pub fn record_request(&self, status: StatusCode, duration_ms: u64) {
        self.http_requests_total.fetch_add(1, Ordering::Relaxed);
        self.http_request_duration_ms_total
            .fetch_add(duration_ms, Ordering::Relaxed);

        let bucket = match status.as_u16() {
            200..=299 => Some(&self.http_requests_2xx),
            400..=499 => Some(&self.http_requests_4xx),
            500.. => Some(&self.http_requests_5xx),
            _ => None,
        };
        if let Some(counter) = bucket {
            counter.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn realtime_subscribers(&self) -> usize {
        self.hub.as_ref().map(EventHub::subscriber_count).unwrap_or(0)
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Prometheus text exposition
    pub fn export_prometheus(&self) -> String {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        let mut out = String::new();

        write_metric(
            &mut out,
            "http_requests_total",
            "counter",
            "Total number of HTTP requests",
            &[("", load(&self.http_requests_total))],
        );
        write_metric(
            &mut out,
            "http_requests_by_status",
            "counter",
            "HTTP requests by status code range",
            &[
                ("status=\"2xx\"", load(&self.http_requests_2xx)),
                ("status=\"4xx\"", load(&self.http_requests_4xx)),
                ("status=\"5xx\"", load(&self.http_requests_5xx)),
            ],
        );
        write_metric(
            &mut out,
            "http_request_duration_ms_total",
            "counter",
            "Total HTTP request duration in milliseconds",
            &[("", load(&self.http_request_duration_ms_total))],
        );
        write_metric(
            &mut out,
            "http_requests_in_flight",
            "gauge",
            "Requests currently being served",
            &[("", load(&self.in_flight_requests))],
        );
        write_metric(
            &mut out,
            "realtime_subscribers",
            "gauge",
            "Open WebSocket subscriptions",
            &[("", self.realtime_subscribers() as u64)],
        );
        write_metric(
            &mut out,
            "uptime_seconds",
            "gauge",
            "Server uptime in seconds",
            &[("", self.uptime_seconds())],
        );
        out
    }

    /// Same figures as JSON
    pub fn export_json(&self) -> serde_json::Value {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        serde_json::json!({
            "http": {
                "requests_total": load(&self.http_requests_total),
                "by_status": {
                    "2xx": load(&self.http_requests_2xx),
                    "4xx": load(&self.http_requests_4xx),
                    "5xx": load(&self.http_requests_5xx),
                },
                "request_duration_ms_total": load(&self.http_request_duration_ms_total),
                "in_flight": load(&self.in_flight_requests),
            },
            "realtime": {
                "subscribers": self.realtime_subscribers(),
            },
            "uptime_seconds": self.uptime_seconds(),
        })
    }
}

/// One `# HELP`/`# TYPE` block; an empty label set prints the bare name
fn write_metric(out: &mut String, name: &str, kind: &str, help: &str, samples: &[(&str, u64)]) {
    let _ = writeln!(out, "# HELP {name} {help}");
    let _ = writeln!(out, "# TYPE {name} {kind}");
    for (labels, value) in samples {
        if labels.is_empty() {
            let _ = writeln!(out, "{name} {value}");
        } else {
            let _ = writeln!(out, "{name}{{{labels}}} {value}");
        }
    }
}

/// Counts every request and logs its latency
pub async fn metrics_middleware(
    State(metrics): State<Arc<Metrics>>,
    request: axum::extract::Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let uri = request.uri().path().to_string();

    metrics.in_flight_requests.fetch_add(1, Ordering::Relaxed);

    let response = next
        .run(request)
        .instrument(info_span!("http_request", %method, %uri))
        .await;

    let duration = start.elapsed();
    let status = response.status();

    debug!(
        method = %method,
        uri = %uri,
        status = %status,
        duration_ms = %duration.as_millis(),
        "Request completed"
    );

    metrics.record_request(status, duration.as_millis() as u64);
    metrics.in_flight_requests.fetch_sub(1, Ordering::Relaxed);

    response
}

/// GET /metrics (Prometheus format)
pub async fn prometheus_metrics(State(metrics): State<Arc<Metrics>>) -> String {
    metrics.export_prometheus()
}

/// GET /metrics.json
pub async fn json_metrics(State(metrics): State<Arc<Metrics>>) -> axum::Json<serde_json::Value> {
    axum::Json(metrics.export_json())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_request() {
        let metrics = Metrics::new();

        metrics.record_request(StatusCode::OK, 50);
        metrics.record_request(StatusCode::NOT_FOUND, 10);
        metrics.record_request(StatusCode::INTERNAL_SERVER_ERROR, 100);

        assert_eq!(metrics.http_requests_total.load(Ordering::Relaxed), 3);
        assert_eq!(metrics.http_requests_2xx.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.http_requests_4xx.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.http_requests_5xx.load(Ordering::Relaxed), 1);
        assert_eq!(
            metrics.http_request_duration_ms_total.load(Ordering::Relaxed),
            160
        );
    }

    #[test]
    fn test_prometheus_export() {
        let metrics = Metrics::new();
        metrics.record_request(StatusCode::OK, 50);

        let output = metrics.export_prometheus();
        assert!(output.contains("http_requests_total 1"));
        assert!(output.contains("http_requests_by_status{status=\"2xx\"} 1"));
        assert!(output.contains("uptime_seconds"));
    }

    #[test]
    fn test_realtime_subscribers() {
        let hub = EventHub::new(8);
        let metrics = Metrics::new().with_hub(hub.clone());
        let _rx = hub.subscribe();

        assert_eq!(metrics.realtime_subscribers(), 1);
        assert_eq!(metrics.export_json()["realtime"]["subscribers"], 1);
    }
}
