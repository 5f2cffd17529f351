//! Activity Service
//!
//! Appends activity records and pushes each one to the admin room.

use std::sync::Arc;

use erp_core::{ErpResult, Page, PaginationParams};
use erp_db::{ActivityCounts, ActivityFilter, ActivityStore};
use erp_models::{ActivityLog, NewActivityLog};
use erp_notifications::{events, EventHub};
use tracing::warn;

pub const MAX_RECENT: i64 = 100;

#[derive(Clone)]
pub struct ActivityService {
    store: Arc<dyn ActivityStore>,
    hub: EventHub,
}

impl ActivityService {
    pub fn new(store: Arc<dyn ActivityStore>, hub: EventHub) -> Self {
        Self { store, hub }
    }

    /// Append a record. Failures are logged and swallowed so the request
    /// that produced the record is unaffected.
    pub async fn record(&self, entry: NewActivityLog) -> Option<ActivityLog> {
        let resource = entry.resource.clone();
        match self.store.append(entry).await {
            Ok(log) => {
                match serde_json::to_value(&log) {
                    Ok(payload) => {
                        self.hub.emit_to_admins(events::ADMIN_ACTIVITY, payload);
                    }
                    Err(e) => warn!(activity_id = log.id, "Failed to encode activity: {}", e),
                }
                Some(log)
            }
            Err(e) => {
                warn!(resource = %resource, "Failed to record activity: {}", e);
                None
            }
        }
    }

    pub async fn list(
        &self,
        filter: &ActivityFilter,
        params: &PaginationParams,
    ) -> ErpResult<Page<ActivityLog>> {
        let items = self
            .store
            .list(filter, params.limit(), params.offset())
            .await?;
        let total = self.store.count(filter).await?;
        Ok(Page::new(items, total, params))
    }

    pub async fn stats(&self, filter: &ActivityFilter) -> ErpResult<ActivityCounts> {
        Ok(self.store.counts(filter).await?)
    }

    pub async fn recent(&self, limit: i64) -> ErpResult<Vec<ActivityLog>> {
        let limit = limit.clamp(1, MAX_RECENT);
        Ok(self.store.list(&ActivityFilter::default(), limit, 0).await?)
    }
}
