//! Notification Service
//!
//! Persists in-app notifications and pushes them to the recipient's room.

use std::sync::Arc;

use chrono::Utc;
use erp_core::{ErpError, ErpResult, Id, Page, PaginationParams};
use erp_db::NotificationStore;
use erp_models::{NewNotification, Notification};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::hub::{events, EventHub};

/// Event emitted to the admin room for system-level notices
#[derive(Debug, Clone)]
pub struct AdminNotice {
    pub title: String,
    pub message: String,
    pub payload: Value,
}

#[derive(Clone)]
pub struct NotificationService {
    store: Arc<dyn NotificationStore>,
    hub: EventHub,
}

impl NotificationService {
    pub fn new(store: Arc<dyn NotificationStore>, hub: EventHub) -> Self {
        Self { store, hub }
    }

    pub fn hub(&self) -> &EventHub {
        &self.hub
    }

    /// Persist a notification, then push it to `user:<id>`
    pub async fn send_to_user(&self, notification: NewNotification) -> ErpResult<Notification> {
        let created = self.store.create(notification).await?;
        debug!(
            user_id = created.user_id,
            notification_id = created.id,
            "Notification created"
        );

        match serde_json::to_value(&created) {
            Ok(payload) => {
                self.hub
                    .emit_to_user(created.user_id, events::NOTIFICATION_RECEIVED, payload);
            }
            Err(e) => warn!(notification_id = created.id, "Failed to encode notification: {}", e),
        }

        Ok(created)
    }

    /// Send the same notification to several users. Failures are logged
    /// per recipient and do not stop the others.
    pub async fn send_to_users(&self, user_ids: &[Id], template: NewNotification) -> usize {
        let mut sent = 0;
        for &user_id in user_ids {
            let mut notification = template.clone();
            notification.user_id = user_id;
            match self.send_to_user(notification).await {
                Ok(_) => sent += 1,
                Err(e) => warn!(user_id, "Failed to send notification: {}", e),
            }
        }
        sent
    }

    /// Push to every connection without persisting
    pub fn broadcast(&self, event: &str, payload: Value) -> usize {
        self.hub.broadcast(event, payload)
    }

    pub fn send_to_admins(&self, notice: AdminNotice) -> usize {
        self.hub.emit_to_admins(
            events::ADMIN_NOTIFICATION,
            json!({
                "title": notice.title,
                "message": notice.message,
                "data": notice.payload,
            }),
        )
    }

    pub async fn list(
        &self,
        user_id: Id,
        unread_only: bool,
        params: &PaginationParams,
    ) -> ErpResult<Page<Notification>> {
        let items = self
            .store
            .list_for_user(user_id, unread_only, params.limit(), params.offset())
            .await?;
        let total = self.store.count_for_user(user_id, unread_only).await?;
        Ok(Page::new(items, total, params))
    }

    pub async fn unread_count(&self, user_id: Id) -> ErpResult<i64> {
        Ok(self.store.count_for_user(user_id, true).await?)
    }

    /// A user's own notification; anyone else's reads as missing
    async fn owned(&self, user_id: Id, id: Id) -> ErpResult<Notification> {
        self.store
            .find_by_id(id)
            .await?
            .filter(|n| n.user_id == user_id)
            .ok_or_else(|| ErpError::not_found("Notification", id))
    }

    pub async fn mark_read(&self, user_id: Id, id: Id) -> ErpResult<Notification> {
        let mut notification = self.owned(user_id, id).await?;
        if notification.read {
            return Ok(notification);
        }
        notification.mark_read(Utc::now());
        Ok(self.store.update(id, notification).await?)
    }

    pub async fn mark_all_read(&self, user_id: Id) -> ErpResult<u64> {
        Ok(self.store.mark_all_read(user_id, Utc::now()).await?)
    }

    pub async fn delete(&self, user_id: Id, id: Id) -> ErpResult<()> {
        self.owned(user_id, id).await?;
        Ok(self.store.delete(id).await?)
    }
}
