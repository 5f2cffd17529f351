//! Administration API handlers: roles, user accounts, the permission
//! catalog and backups

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
};
use erp_auth::builtin;
use erp_core::Id;
use erp_db::UserFilter;
use erp_models::{NewRole, UserStatus};
use erp_services::roles::{RoleUpdate, UserAdminUpdate};
use serde::Deserialize;
use tracing::info;

use crate::error::ApiResult;
use crate::extractors::{ApiJson, ApiQuery, ApiResponse, AppState, AuthenticatedUser, Pagination};

/// GET /api/permissions
pub async fn permission_catalog(_user: AuthenticatedUser) -> impl IntoResponse {
    ApiResponse::ok(builtin::CATALOG)
}

// ============================================================================
// Roles
// ============================================================================

/// GET /api/roles
pub async fn list_roles(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> ApiResult<impl IntoResponse> {
    Ok(ApiResponse::ok(state.services.roles.list(&user).await?))
}

/// GET /api/roles/:id
pub async fn get_role(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Id>,
) -> ApiResult<impl IntoResponse> {
    Ok(ApiResponse::ok(state.services.roles.get(&user, id).await?))
}

/// POST /api/roles
pub async fn create_role(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    ApiJson(input): ApiJson<NewRole>,
) -> ApiResult<impl IntoResponse> {
    let role = state.services.roles.create(&user, input).await?;
    Ok(ApiResponse::created(role).with_message("Role created"))
}

/// PUT /api/roles/:id
pub async fn update_role(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Id>,
    ApiJson(update): ApiJson<RoleUpdate>,
) -> ApiResult<impl IntoResponse> {
    let role = state.services.roles.update(&user, id, update).await?;
    Ok(ApiResponse::ok(role).with_message("Role updated"))
}

/// DELETE /api/roles/:id
pub async fn delete_role(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Id>,
) -> ApiResult<impl IntoResponse> {
    state.services.roles.delete(&user, id).await?;
    Ok(ApiResponse::message("Role deleted"))
}

// ============================================================================
// Users
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserListQuery {
    pub search: Option<String>,
    pub status: Option<UserStatus>,
    pub role_id: Option<Id>,
}

/// GET /api/users
pub async fn list_users(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    pagination: Pagination,
    ApiQuery(query): ApiQuery<UserListQuery>,
) -> ApiResult<impl IntoResponse> {
    let filter = UserFilter {
        search: query.search,
        status: query.status,
        role_id: query.role_id,
    };
    let page = state.services.users.list(&user, &filter, &pagination).await?;
    Ok(ApiResponse::ok(page))
}

/// GET /api/users/:id
pub async fn get_user(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Id>,
) -> ApiResult<impl IntoResponse> {
    Ok(ApiResponse::ok(state.services.users.get(&user, id).await?))
}

/// PUT /api/users/:id
pub async fn update_user(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Id>,
    ApiJson(update): ApiJson<UserAdminUpdate>,
) -> ApiResult<impl IntoResponse> {
    let updated = state.services.users.update(&user, id, update).await?;
    Ok(ApiResponse::ok(updated).with_message("User updated"))
}

/// DELETE /api/users/:id
pub async fn delete_user(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Id>,
) -> ApiResult<impl IntoResponse> {
    state.services.users.delete(&user, id).await?;
    Ok(ApiResponse::message("User deleted"))
}

// ============================================================================
// Backup
// ============================================================================

/// GET /api/admin/backup
pub async fn download_backup(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> ApiResult<impl IntoResponse> {
    let archive = state.services.backup.export(&user).await?;
    info!(
        user_id = user.id,
        filename = %archive.filename,
        "Backup downloaded"
    );

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/zip".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", archive.filename),
            ),
        ],
        archive.bytes,
    ))
}
