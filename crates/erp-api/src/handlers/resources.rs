//! Resource allocation API handlers

use axum::{
    extract::{Path, State},
    response::IntoResponse,
};
use chrono::NaiveDate;
use erp_core::Id;
use erp_services::resources::{AllocationInput, AllocationQuery, AllocationUpdate};
use serde::Deserialize;

use crate::error::ApiResult;
use crate::extractors::{ApiJson, ApiQuery, ApiResponse, AppState, AuthenticatedUser};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RangeQuery {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictQuery {
    pub employee_id: Id,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapacityQuery {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

/// GET /api/resources/allocations
pub async fn list_allocations(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    ApiQuery(query): ApiQuery<AllocationQuery>,
) -> ApiResult<impl IntoResponse> {
    Ok(ApiResponse::ok(state.services.resources.list(&user, query).await?))
}

/// GET /api/resources/allocations/:id
pub async fn get_allocation(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Id>,
) -> ApiResult<impl IntoResponse> {
    Ok(ApiResponse::ok(state.services.resources.get(&user, id).await?))
}

/// POST /api/resources/allocations
pub async fn create_allocation(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    ApiJson(input): ApiJson<AllocationInput>,
) -> ApiResult<impl IntoResponse> {
    let allocation = state.services.resources.create(&user, input).await?;
    Ok(ApiResponse::created(allocation).with_message("Resource allocated successfully"))
}

/// PUT /api/resources/allocations/:id
pub async fn update_allocation(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Id>,
    ApiJson(update): ApiJson<AllocationUpdate>,
) -> ApiResult<impl IntoResponse> {
    let allocation = state.services.resources.update(&user, id, update).await?;
    Ok(ApiResponse::ok(allocation).with_message("Allocation updated successfully"))
}

/// DELETE /api/resources/allocations/:id
pub async fn delete_allocation(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Id>,
) -> ApiResult<impl IntoResponse> {
    state.services.resources.delete(&user, id).await?;
    Ok(ApiResponse::message("Allocation deleted successfully"))
}

/// GET /api/resources/utilization/:employee_id
pub async fn employee_utilization(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(employee_id): Path<Id>,
    ApiQuery(range): ApiQuery<RangeQuery>,
) -> ApiResult<impl IntoResponse> {
    let utilization = state
        .services
        .resources
        .utilization(&user, employee_id, range.start_date, range.end_date)
        .await?;
    Ok(ApiResponse::ok(utilization))
}

/// GET /api/resources/conflicts
pub async fn detect_conflicts(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    ApiQuery(query): ApiQuery<ConflictQuery>,
) -> ApiResult<impl IntoResponse> {
    let report = state
        .services
        .resources
        .detect_conflicts(&user, query.employee_id, query.start_date, query.end_date)
        .await?;
    Ok(ApiResponse::ok(report))
}

/// GET /api/resources/capacity
pub async fn capacity_planning(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    ApiQuery(query): ApiQuery<CapacityQuery>,
) -> ApiResult<impl IntoResponse> {
    let plan = state
        .services
        .resources
        .capacity_planning(&user, query.start_date, query.end_date)
        .await?;
    Ok(ApiResponse::ok(plan))
}

/// GET /api/resources/skills
pub async fn skill_matrix(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> ApiResult<impl IntoResponse> {
    Ok(ApiResponse::ok(state.services.resources.skill_matrix(&user).await?))
}
