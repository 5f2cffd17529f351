//! Deriving activity records from finished HTTP requests

use std::time::Duration;

use erp_core::Id;
use erp_models::{ActivityAction, NewActivityLog};
use serde_json::{json, Value};

/// Everything known about a request once its response is ready
#[derive(Debug, Clone, Default)]
pub struct RequestTrace {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub status_code: u16,
    pub duration: Duration,
    pub forwarded_for: Option<String>,
    pub remote_addr: Option<String>,
    pub user_agent: Option<String>,
    pub user_id: Option<Id>,
    pub user_name: Option<String>,
}

/// Only mutating requests under `/api` are recorded
pub fn should_record(method: &str, path: &str) -> bool {
    let mutating = matches!(
        method.to_ascii_uppercase().as_str(),
        "POST" | "PUT" | "PATCH" | "DELETE"
    );
    mutating && (path == "/api" || path.starts_with("/api/"))
}

/// Resource name (segment after `/api/`) and the first numeric id segment
pub fn resource_from_path(path: &str) -> (String, Option<String>) {
    let mut segments = path
        .trim_start_matches('/')
        .split('/')
        .filter(|s| !s.is_empty())
        .skip_while(|s| *s != "api")
        .skip(1);

    let resource = segments.next().unwrap_or("unknown").to_string();
    let resource_id = segments
        .find(|s| s.chars().all(|c| c.is_ascii_digit()))
        .map(str::to_string);

    (resource, resource_id)
}

/// Client address, preferring the first `x-forwarded-for` hop
pub fn client_ip(forwarded_for: Option<&str>, remote_addr: Option<&str>) -> Option<String> {
    forwarded_for
        .and_then(|header| header.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .or(remote_addr)
        .map(str::to_string)
}

impl RequestTrace {
    pub fn into_entry(self) -> NewActivityLog {
        let (resource, resource_id) = resource_from_path(&self.path);
        let ip_address = client_ip(self.forwarded_for.as_deref(), self.remote_addr.as_deref());
        let details = match &self.query {
            Some(query) if !query.is_empty() => json!({ "query": query }),
            _ => Value::Null,
        };

        NewActivityLog {
            user_id: self.user_id,
            user_name: self.user_name.unwrap_or_else(|| "anonymous".to_string()),
            action: ActivityAction::from_method(&self.method),
            resource,
            resource_id,
            method: self.method.to_ascii_uppercase(),
            path: self.path,
            status_code: i32::from(self.status_code),
            duration_ms: self.duration.as_millis().min(i64::MAX as u128) as i64,
            ip_address,
            user_agent: self.user_agent,
            details,
        }
    }
}
