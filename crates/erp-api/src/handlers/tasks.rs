//! Task API handlers

use axum::{
    extract::{Path, State},
    response::IntoResponse,
};
use erp_core::Id;
use erp_models::TaskStatus;
use erp_services::dependencies::{DependencyInput, GraphQuery};
use erp_services::tasks::{CommentInput, TaskInput, TaskQuery, TaskUpdate, TimeLogInput};
use serde::Deserialize;

use crate::error::ApiResult;
use crate::extractors::{ApiJson, ApiQuery, ApiResponse, AppState, AuthenticatedUser, Pagination};

#[derive(Debug, Deserialize)]
pub struct StatusBody {
    pub status: TaskStatus,
}

/// GET /api/tasks
pub async fn list_tasks(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    pagination: Pagination,
    ApiQuery(query): ApiQuery<TaskQuery>,
) -> ApiResult<impl IntoResponse> {
    let page = state.services.tasks.list(&user, query, &pagination).await?;
    Ok(ApiResponse::ok(page))
}

/// GET /api/tasks/time-tracking
pub async fn time_tracking(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    ApiQuery(query): ApiQuery<TaskQuery>,
) -> ApiResult<impl IntoResponse> {
    Ok(ApiResponse::ok(state.services.tasks.time_tracking(&user, query).await?))
}

/// GET /api/tasks/:id
pub async fn get_task(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Id>,
) -> ApiResult<impl IntoResponse> {
    Ok(ApiResponse::ok(state.services.tasks.get(&user, id).await?))
}

/// POST /api/tasks
pub async fn create_task(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    ApiJson(input): ApiJson<TaskInput>,
) -> ApiResult<impl IntoResponse> {
    let task = state.services.tasks.create(&user, input).await?;
    Ok(ApiResponse::created(task).with_message("Task created successfully"))
}

/// PUT /api/tasks/:id
pub async fn update_task(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Id>,
    ApiJson(update): ApiJson<TaskUpdate>,
) -> ApiResult<impl IntoResponse> {
    let task = state.services.tasks.update(&user, id, update).await?;
    Ok(ApiResponse::ok(task).with_message("Task updated successfully"))
}

/// PATCH /api/tasks/:id/status
pub async fn update_task_status(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Id>,
    ApiJson(body): ApiJson<StatusBody>,
) -> ApiResult<impl IntoResponse> {
    let task = state.services.tasks.update_status(&user, id, body.status).await?;
    Ok(ApiResponse::ok(task))
}

/// DELETE /api/tasks/:id
pub async fn delete_task(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Id>,
) -> ApiResult<impl IntoResponse> {
    state.services.tasks.delete(&user, id).await?;
    Ok(ApiResponse::message("Task deleted successfully"))
}

/// POST /api/tasks/:id/comments
pub async fn add_comment(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Id>,
    ApiJson(input): ApiJson<CommentInput>,
) -> ApiResult<impl IntoResponse> {
    let task = state.services.tasks.add_comment(&user, id, input).await?;
    Ok(ApiResponse::created(task).with_message("Comment added"))
}

/// POST /api/tasks/:id/time
pub async fn log_time(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Id>,
    ApiJson(input): ApiJson<TimeLogInput>,
) -> ApiResult<impl IntoResponse> {
    let task = state.services.tasks.log_time(&user, id, input).await?;
    Ok(ApiResponse::ok(task).with_message("Time logged"))
}

/// POST /api/tasks/:id/dependencies
pub async fn add_dependency(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Id>,
    ApiJson(input): ApiJson<DependencyInput>,
) -> ApiResult<impl IntoResponse> {
    let task = state.services.tasks.add_dependency(&user, id, input).await?;
    Ok(ApiResponse::ok(task).with_message("Dependency added"))
}

/// DELETE /api/tasks/:id/dependencies/:dependency_id
pub async fn remove_dependency(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path((id, dependency_id)): Path<(Id, Id)>,
) -> ApiResult<impl IntoResponse> {
    let task = state
        .services
        .tasks
        .remove_dependency(&user, id, dependency_id)
        .await?;
    Ok(ApiResponse::ok(task).with_message("Dependency removed"))
}

/// GET /api/tasks/:id/blocked
pub async fn blocked_status(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Id>,
) -> ApiResult<impl IntoResponse> {
    Ok(ApiResponse::ok(state.services.tasks.blocked(&user, id).await?))
}

/// GET /api/tasks/dependency-graph
pub async fn dependency_graph(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    ApiQuery(query): ApiQuery<GraphQuery>,
) -> ApiResult<impl IntoResponse> {
    Ok(ApiResponse::ok(state.services.tasks.dependency_graph(&user, query).await?))
}

/// GET /api/tasks/critical-path
pub async fn critical_path(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    ApiQuery(query): ApiQuery<GraphQuery>,
) -> ApiResult<impl IntoResponse> {
    Ok(ApiResponse::ok(state.services.tasks.critical_path(&user, query).await?))
}
