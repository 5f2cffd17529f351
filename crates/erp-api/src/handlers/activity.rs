//! Activity log API handlers (admin)

use axum::{extract::State, response::IntoResponse};
use chrono::{DateTime, Utc};
use erp_auth::builtin;
use erp_core::Id;
use erp_db::ActivityFilter;
use erp_models::ActivityAction;
use serde::Deserialize;

use crate::error::ApiResult;
use crate::extractors::{ApiQuery, ApiResponse, AppState, AuthenticatedUser, Pagination};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityQuery {
    pub user_id: Option<Id>,
    pub resource: Option<String>,
    pub action: Option<ActivityAction>,
    pub success: Option<bool>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl From<ActivityQuery> for ActivityFilter {
    fn from(query: ActivityQuery) -> Self {
        ActivityFilter {
            user_id: query.user_id,
            resource: query.resource.filter(|r| !r.trim().is_empty()),
            action: query.action,
            success: query.success,
            from: query.from,
            to: query.to,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RecentQuery {
    #[serde(default = "default_recent")]
    pub limit: i64,
}

fn default_recent() -> i64 {
    20
}

/// GET /api/activity
pub async fn list_activity(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    pagination: Pagination,
    ApiQuery(query): ApiQuery<ActivityQuery>,
) -> ApiResult<impl IntoResponse> {
    user.require(builtin::ADMIN_ACTIVITY)?;
    let page = state.activity.list(&query.into(), &pagination).await?;
    Ok(ApiResponse::ok(page))
}

/// GET /api/activity/stats
pub async fn activity_stats(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    ApiQuery(query): ApiQuery<ActivityQuery>,
) -> ApiResult<impl IntoResponse> {
    user.require(builtin::ADMIN_ACTIVITY)?;
    Ok(ApiResponse::ok(state.activity.stats(&query.into()).await?))
}

/// GET /api/activity/recent
pub async fn recent_activity(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    ApiQuery(query): ApiQuery<RecentQuery>,
) -> ApiResult<impl IntoResponse> {
    user.require(builtin::ADMIN_ACTIVITY)?;
    Ok(ApiResponse::ok(state.activity.recent(query.limit).await?))
}
