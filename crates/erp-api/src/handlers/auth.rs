//! Authentication API handlers

use axum::{extract::State, response::IntoResponse};
use erp_services::auth::{ChangePasswordInput, LoginInput, RegisterInput};

use crate::error::ApiResult;
use crate::extractors::{ApiJson, ApiResponse, AppState, AuthenticatedUser};

/// POST /api/auth/register
pub async fn register(
    State(state): State<AppState>,
    ApiJson(input): ApiJson<RegisterInput>,
) -> ApiResult<impl IntoResponse> {
    let session = state.services.auth.register(input).await?;
    Ok(ApiResponse::created(session).with_message("Registration successful"))
}

/// POST /api/auth/login
pub async fn login(
    State(state): State<AppState>,
    ApiJson(input): ApiJson<LoginInput>,
) -> ApiResult<impl IntoResponse> {
    let session = state.services.auth.login(input).await?;
    Ok(ApiResponse::ok(session).with_message("Login successful"))
}

/// GET /api/auth/me
pub async fn me(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> ApiResult<impl IntoResponse> {
    Ok(ApiResponse::ok(state.services.auth.me(&user).await?))
}

/// PUT /api/auth/password
pub async fn change_password(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    ApiJson(input): ApiJson<ChangePasswordInput>,
) -> ApiResult<impl IntoResponse> {
    state.services.auth.change_password(&user, input).await?;
    Ok(ApiResponse::message("Password updated"))
}
