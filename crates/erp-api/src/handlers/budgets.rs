//! Budget API handlers

use axum::{
    extract::{Path, State},
    response::IntoResponse,
};
use erp_core::Id;
use erp_services::budgets::{BudgetInput, BudgetQuery, BudgetUpdate, DecisionInput, ExpenseInput};

use crate::error::ApiResult;
use crate::extractors::{ApiJson, ApiQuery, ApiResponse, AppState, AuthenticatedUser};

/// GET /api/budgets
pub async fn list_budgets(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    ApiQuery(query): ApiQuery<BudgetQuery>,
) -> ApiResult<impl IntoResponse> {
    Ok(ApiResponse::ok(state.services.budgets.list(&user, query).await?))
}

/// GET /api/budgets/summary
pub async fn budget_summary(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    ApiQuery(query): ApiQuery<BudgetQuery>,
) -> ApiResult<impl IntoResponse> {
    Ok(ApiResponse::ok(state.services.budgets.summary(&user, query).await?))
}

/// GET /api/budgets/:id
pub async fn get_budget(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Id>,
) -> ApiResult<impl IntoResponse> {
    Ok(ApiResponse::ok(state.services.budgets.get(&user, id).await?))
}

/// POST /api/budgets
pub async fn create_budget(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    ApiJson(input): ApiJson<BudgetInput>,
) -> ApiResult<impl IntoResponse> {
    let budget = state.services.budgets.create(&user, input).await?;
    Ok(ApiResponse::created(budget).with_message("Budget created successfully"))
}

/// PUT /api/budgets/:id
pub async fn update_budget(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Id>,
    ApiJson(update): ApiJson<BudgetUpdate>,
) -> ApiResult<impl IntoResponse> {
    let budget = state.services.budgets.update(&user, id, update).await?;
    Ok(ApiResponse::ok(budget).with_message("Budget updated successfully"))
}

/// DELETE /api/budgets/:id
pub async fn delete_budget(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Id>,
) -> ApiResult<impl IntoResponse> {
    state.services.budgets.delete(&user, id).await?;
    Ok(ApiResponse::message("Budget deleted successfully"))
}

/// POST /api/budgets/:id/submit
pub async fn submit_budget(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Id>,
) -> ApiResult<impl IntoResponse> {
    let budget = state.services.budgets.submit(&user, id).await?;
    Ok(ApiResponse::ok(budget).with_message("Budget submitted for approval"))
}

/// POST /api/budgets/:id/approve
pub async fn approve_budget(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Id>,
    body: Option<ApiJson<DecisionInput>>,
) -> ApiResult<impl IntoResponse> {
    let input = body.map(|ApiJson(input)| input).unwrap_or_default();
    let budget = state.services.budgets.approve(&user, id, input).await?;
    Ok(ApiResponse::ok(budget).with_message("Budget approved"))
}

/// POST /api/budgets/:id/reject
pub async fn reject_budget(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Id>,
    body: Option<ApiJson<DecisionInput>>,
) -> ApiResult<impl IntoResponse> {
    let input = body.map(|ApiJson(input)| input).unwrap_or_default();
    let budget = state.services.budgets.reject(&user, id, input).await?;
    Ok(ApiResponse::ok(budget).with_message("Budget rejected"))
}

/// POST /api/budgets/:id/activate
pub async fn activate_budget(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Id>,
) -> ApiResult<impl IntoResponse> {
    let budget = state.services.budgets.activate(&user, id).await?;
    Ok(ApiResponse::ok(budget).with_message("Budget activated"))
}

/// POST /api/budgets/:id/close
pub async fn close_budget(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Id>,
) -> ApiResult<impl IntoResponse> {
    let budget = state.services.budgets.close(&user, id).await?;
    Ok(ApiResponse::ok(budget).with_message("Budget closed"))
}

/// POST /api/budgets/:id/expenses
pub async fn record_expense(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Id>,
    ApiJson(input): ApiJson<ExpenseInput>,
) -> ApiResult<impl IntoResponse> {
    let budget = state.services.budgets.record_expense(&user, id, input).await?;
    Ok(ApiResponse::ok(budget).with_message("Expense recorded"))
}

/// GET /api/budgets/:id/variance
pub async fn budget_variance(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Id>,
) -> ApiResult<impl IntoResponse> {
    Ok(ApiResponse::ok(state.services.budgets.variance(&user, id).await?))
}

/// GET /api/budgets/:id/alerts
pub async fn budget_alerts(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Id>,
) -> ApiResult<impl IntoResponse> {
    Ok(ApiResponse::ok(state.services.budgets.alerts(&user, id).await?))
}
