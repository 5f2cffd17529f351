//! Department API handlers

use axum::{
    extract::{Path, State},
    response::IntoResponse,
};
use erp_core::Id;
use erp_db::DepartmentFilter;
use erp_models::DepartmentStatus;
use erp_services::departments::{DepartmentInput, DepartmentUpdate};
use serde::Deserialize;

use crate::error::ApiResult;
use crate::extractors::{ApiJson, ApiQuery, ApiResponse, AppState, AuthenticatedUser};

#[derive(Debug, Default, Deserialize)]
pub struct DepartmentListQuery {
    pub search: Option<String>,
    pub status: Option<DepartmentStatus>,
}

#[derive(Debug, Deserialize)]
pub struct PermissionsBody {
    pub permissions: Vec<String>,
}

/// GET /api/departments
pub async fn list_departments(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    ApiQuery(query): ApiQuery<DepartmentListQuery>,
) -> ApiResult<impl IntoResponse> {
    let filter = DepartmentFilter {
        search: query.search.filter(|s| !s.trim().is_empty()),
        status: query.status,
    };
    Ok(ApiResponse::ok(state.services.departments.list(&user, &filter).await?))
}

/// GET /api/departments/:id
pub async fn get_department(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Id>,
) -> ApiResult<impl IntoResponse> {
    Ok(ApiResponse::ok(state.services.departments.get(&user, id).await?))
}

/// POST /api/departments
pub async fn create_department(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    ApiJson(input): ApiJson<DepartmentInput>,
) -> ApiResult<impl IntoResponse> {
    let department = state.services.departments.create(&user, input).await?;
    Ok(ApiResponse::created(department).with_message("Department created successfully"))
}

/// PUT /api/departments/:id
pub async fn update_department(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Id>,
    ApiJson(update): ApiJson<DepartmentUpdate>,
) -> ApiResult<impl IntoResponse> {
    let department = state.services.departments.update(&user, id, update).await?;
    Ok(ApiResponse::ok(department).with_message("Department updated successfully"))
}

/// DELETE /api/departments/:id
pub async fn delete_department(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Id>,
) -> ApiResult<impl IntoResponse> {
    state.services.departments.delete(&user, id).await?;
    Ok(ApiResponse::message("Department deleted successfully"))
}

/// PUT /api/departments/:id/permissions
pub async fn update_department_permissions(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Id>,
    ApiJson(body): ApiJson<PermissionsBody>,
) -> ApiResult<impl IntoResponse> {
    let department = state
        .services
        .departments
        .update_permissions(&user, id, body.permissions)
        .await?;
    Ok(ApiResponse::ok(department).with_message("Department permissions updated"))
}
