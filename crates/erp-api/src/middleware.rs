//! Request middleware: activity recording and cache invalidation

use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use erp_activity::{should_record, RequestTrace};
use tokio::time::Instant;
use tracing::debug;

use crate::extractors::{ActorSlot, AppState};

/// Records every mutating `/api` request once its response is ready
pub async fn record_activity(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let method = request.method().as_str().to_string();
    let path = request.uri().path().to_string();
    if !should_record(&method, &path) {
        return next.run(request).await;
    }

    let start = Instant::now();
    let slot = ActorSlot::default();
    request.extensions_mut().insert(slot.clone());

    let (forwarded_for, user_agent, query, remote_addr) = {
        let header_value = |name: header::HeaderName| {
            request
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        (
            header_value(header::HeaderName::from_static("x-forwarded-for")),
            header_value(header::USER_AGENT),
            request.uri().query().map(str::to_string),
            request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string()),
        )
    };

    let response = next.run(request).await;

    let actor = slot.get();
    let trace = RequestTrace {
        method,
        path,
        query,
        status_code: response.status().as_u16(),
        duration: start.elapsed(),
        forwarded_for,
        remote_addr,
        user_agent,
        user_id: actor.as_ref().map(|(id, _)| *id),
        user_name: actor.map(|(_, name)| name),
    };
    state.activity.record(trace.into_entry()).await;

    response
}

/// Drops cached dashboard figures after a successful mutation and schedules
/// a debounced `dashboard:stats` push
pub async fn invalidate_caches(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let mutating = should_record(request.method().as_str(), request.uri().path());
    let response = next.run(request).await;

    if mutating && response.status().is_success() {
        state.services.dashboard.invalidate();
        if state.services.stats_emitter.mark_dirty() {
            debug!("Dashboard statistics refresh scheduled");
        }
    }
    response
}
