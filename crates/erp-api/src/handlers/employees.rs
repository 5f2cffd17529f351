//! Employee API handlers

use axum::{
    extract::{Path, State},
    response::IntoResponse,
};
use erp_core::Id;
use erp_db::EmployeeFilter;
use erp_models::{EmployeeStatus, NewEmployee};
use erp_services::employees::EmployeeUpdate;
use serde::Deserialize;

use crate::error::ApiResult;
use crate::extractors::{ApiJson, ApiQuery, ApiResponse, AppState, AuthenticatedUser, Pagination};

#[derive(Debug, Default, Deserialize)]
pub struct EmployeeListQuery {
    pub search: Option<String>,
    pub status: Option<EmployeeStatus>,
    pub department: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DeleteQuery {
    #[serde(default)]
    pub hard: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkUserBody {
    pub user_id: Id,
}

/// GET /api/employees
pub async fn list_employees(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    pagination: Pagination,
    ApiQuery(query): ApiQuery<EmployeeListQuery>,
) -> ApiResult<impl IntoResponse> {
    let filter = EmployeeFilter {
        search: query.search.filter(|s| !s.trim().is_empty()),
        status: query.status,
        department: query.department,
    };
    let page = state.services.employees.list(&user, &filter, &pagination).await?;
    Ok(ApiResponse::ok(page))
}

/// GET /api/employees/skills
pub async fn list_skills(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> ApiResult<impl IntoResponse> {
    Ok(ApiResponse::ok(state.services.employees.skills(&user).await?))
}

/// GET /api/employees/:id
pub async fn get_employee(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Id>,
) -> ApiResult<impl IntoResponse> {
    Ok(ApiResponse::ok(state.services.employees.get(&user, id).await?))
}

/// POST /api/employees
pub async fn create_employee(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    ApiJson(input): ApiJson<NewEmployee>,
) -> ApiResult<impl IntoResponse> {
    let employee = state.services.employees.create(&user, input).await?;
    Ok(ApiResponse::created(employee).with_message("Employee created successfully"))
}

/// PUT /api/employees/:id
pub async fn update_employee(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Id>,
    ApiJson(update): ApiJson<EmployeeUpdate>,
) -> ApiResult<impl IntoResponse> {
    let employee = state.services.employees.update(&user, id, update).await?;
    Ok(ApiResponse::ok(employee).with_message("Employee updated successfully"))
}

/// DELETE /api/employees/:id?hard=true
pub async fn delete_employee(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Id>,
    ApiQuery(query): ApiQuery<DeleteQuery>,
) -> ApiResult<impl IntoResponse> {
    state.services.employees.delete(&user, id, query.hard).await?;
    let message = if query.hard {
        "Employee deleted"
    } else {
        "Employee terminated"
    };
    Ok(ApiResponse::message(message))
}

/// POST /api/employees/:id/link-user
pub async fn link_user(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Id>,
    ApiJson(body): ApiJson<LinkUserBody>,
) -> ApiResult<impl IntoResponse> {
    let employee = state.services.employees.link_user(&user, id, body.user_id).await?;
    Ok(ApiResponse::ok(employee).with_message("User linked"))
}
