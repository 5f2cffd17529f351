//! Notification API handlers

use axum::{
    extract::{Path, State},
    response::IntoResponse,
};
use erp_auth::builtin;
use erp_core::{ErpError, Id};
use erp_notifications::{events, AdminNotice};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::ApiResult;
use crate::extractors::{ApiJson, ApiQuery, ApiResponse, AppState, AuthenticatedUser, Pagination};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationListQuery {
    #[serde(default)]
    pub unread_only: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnouncementBody {
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub data: Value,
    /// Only the admin room instead of every connection
    #[serde(default)]
    pub admins_only: bool,
}

/// GET /api/notifications
pub async fn list_notifications(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    pagination: Pagination,
    ApiQuery(query): ApiQuery<NotificationListQuery>,
) -> ApiResult<impl IntoResponse> {
    let page = state
        .services
        .notifications
        .list(user.id, query.unread_only, &pagination)
        .await?;
    Ok(ApiResponse::ok(page))
}

/// GET /api/notifications/unread-count
pub async fn unread_count(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> ApiResult<impl IntoResponse> {
    let count = state.services.notifications.unread_count(user.id).await?;
    Ok(ApiResponse::ok(json!({ "count": count })))
}

/// POST /api/notifications/:id/read
pub async fn mark_read(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Id>,
) -> ApiResult<impl IntoResponse> {
    Ok(ApiResponse::ok(state.services.notifications.mark_read(user.id, id).await?))
}

/// POST /api/notifications/read-all
pub async fn mark_all_read(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> ApiResult<impl IntoResponse> {
    let updated = state.services.notifications.mark_all_read(user.id).await?;
    Ok(ApiResponse::ok(json!({ "updated": updated })).with_message("All notifications marked as read"))
}

/// DELETE /api/notifications/:id
pub async fn delete_notification(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Id>,
) -> ApiResult<impl IntoResponse> {
    state.services.notifications.delete(user.id, id).await?;
    Ok(ApiResponse::message("Notification deleted"))
}

/// POST /api/notifications/announce
///
/// Unpersisted push to every connection, or to the admin room only.
pub async fn announce(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    ApiJson(body): ApiJson<AnnouncementBody>,
) -> ApiResult<impl IntoResponse> {
    user.require(builtin::USERS_MANAGE)?;
    if body.title.trim().is_empty() || body.message.trim().is_empty() {
        return Err(ErpError::bad_request("Title and message are required").into());
    }

    let receivers = if body.admins_only {
        state.services.notifications.send_to_admins(AdminNotice {
            title: body.title,
            message: body.message,
            payload: body.data,
        })
    } else {
        state.services.notifications.broadcast(
            events::NOTIFICATION_RECEIVED,
            json!({
                "title": body.title,
                "message": body.message,
                "data": body.data,
                "from": user.name,
            }),
        )
    };
    Ok(ApiResponse::ok(json!({ "receivers": receivers })))
}
