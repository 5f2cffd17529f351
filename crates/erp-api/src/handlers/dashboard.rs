//! Dashboard API handlers

use axum::{extract::State, response::IntoResponse};

use crate::error::ApiResult;
use crate::extractors::{ApiResponse, AppState, AuthenticatedUser};

/// GET /api/dashboard/stats
pub async fn dashboard_stats(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> ApiResult<impl IntoResponse> {
    Ok(ApiResponse::ok(state.services.dashboard.dashboard_stats(&user).await?))
}
