//! Helpers shared by the services

use erp_notifications::{EventHub, Room};
use serde::Serialize;
use tracing::warn;

/// Serialize `value` and emit it. Encoding failures are logged, never returned.
pub(crate) fn publish<T: Serialize>(hub: &EventHub, event: &str, room: Option<Room>, value: &T) {
    match serde_json::to_value(value) {
        Ok(payload) => {
            hub.emit(event, room, payload);
        }
        Err(e) => warn!(event, "Failed to encode realtime payload: {}", e),
    }
}

/// Trimmed, non-empty text
pub(crate) fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
