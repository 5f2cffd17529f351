//! Project API handlers

use axum::{
    extract::{Path, State},
    response::IntoResponse,
};
use erp_core::Id;
use erp_services::projects::{ProjectInput, ProjectQuery, ProjectUpdate};
use serde::Deserialize;

use crate::error::ApiResult;
use crate::extractors::{ApiJson, ApiQuery, ApiResponse, AppState, AuthenticatedUser, Pagination};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamMemberBody {
    pub employee_id: Id,
}

/// GET /api/projects
pub async fn list_projects(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    pagination: Pagination,
    ApiQuery(query): ApiQuery<ProjectQuery>,
) -> ApiResult<impl IntoResponse> {
    let page = state.services.projects.list(&user, query, &pagination).await?;
    Ok(ApiResponse::ok(page))
}

/// GET /api/projects/:id
pub async fn get_project(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Id>,
) -> ApiResult<impl IntoResponse> {
    Ok(ApiResponse::ok(state.services.projects.get(&user, id).await?))
}

/// POST /api/projects
pub async fn create_project(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    ApiJson(input): ApiJson<ProjectInput>,
) -> ApiResult<impl IntoResponse> {
    let project = state.services.projects.create(&user, input).await?;
    Ok(ApiResponse::created(project).with_message("Project created successfully"))
}

/// PUT /api/projects/:id
pub async fn update_project(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Id>,
    ApiJson(update): ApiJson<ProjectUpdate>,
) -> ApiResult<impl IntoResponse> {
    let project = state.services.projects.update(&user, id, update).await?;
    Ok(ApiResponse::ok(project).with_message("Project updated successfully"))
}

/// DELETE /api/projects/:id
pub async fn delete_project(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Id>,
) -> ApiResult<impl IntoResponse> {
    state.services.projects.delete(&user, id).await?;
    Ok(ApiResponse::message("Project deleted successfully"))
}

/// GET /api/projects/:id/stats
pub async fn project_stats(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Id>,
) -> ApiResult<impl IntoResponse> {
    Ok(ApiResponse::ok(state.services.projects.stats(&user, id).await?))
}

/// POST /api/projects/:id/team
pub async fn add_team_member(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Id>,
    ApiJson(body): ApiJson<TeamMemberBody>,
) -> ApiResult<impl IntoResponse> {
    let project = state
        .services
        .projects
        .add_team_member(&user, id, body.employee_id)
        .await?;
    Ok(ApiResponse::ok(project).with_message("Team member added"))
}

/// DELETE /api/projects/:id/team/:employee_id
pub async fn remove_team_member(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path((id, employee_id)): Path<(Id, Id)>,
) -> ApiResult<impl IntoResponse> {
    let project = state
        .services
        .projects
        .remove_team_member(&user, id, employee_id)
        .await?;
    Ok(ApiResponse::ok(project).with_message("Team member removed"))
}
