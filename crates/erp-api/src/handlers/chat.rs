//! Chat API handlers

use axum::{
    extract::{Path, State},
    response::IntoResponse,
};
use erp_core::Id;
use erp_services::chat::{GroupInput, MessageInput};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::error::ApiResult;
use crate::extractors::{ApiJson, ApiResponse, AppState, AuthenticatedUser};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectChatBody {
    pub user_id: Id,
}

/// GET /api/chats
pub async fn list_chats(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> ApiResult<impl IntoResponse> {
    Ok(ApiResponse::ok(state.services.chat.list_chats(&user).await?))
}

/// GET /api/chats/unread
pub async fn unread_counts(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> ApiResult<impl IntoResponse> {
    Ok(ApiResponse::ok(state.services.chat.unread_counts(&user).await?))
}

/// POST /api/chats/direct
pub async fn open_direct(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    ApiJson(body): ApiJson<DirectChatBody>,
) -> ApiResult<impl IntoResponse> {
    Ok(ApiResponse::ok(state.services.chat.open_direct(&user, body.user_id).await?))
}

/// POST /api/chats/group
pub async fn create_group(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    ApiJson(input): ApiJson<GroupInput>,
) -> ApiResult<impl IntoResponse> {
    let chat = state.services.chat.create_group(&user, input).await?;
    Ok(ApiResponse::created(chat).with_message("Group created"))
}

/// GET /api/chats/:id
pub async fn get_chat(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Id>,
) -> ApiResult<impl IntoResponse> {
    Ok(ApiResponse::ok(state.services.chat.get(&user, id).await?))
}

/// POST /api/chats/:id/messages
pub async fn send_message(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Id>,
    ApiJson(input): ApiJson<MessageInput>,
) -> ApiResult<impl IntoResponse> {
    let message = state.services.chat.send_message(&user, id, input).await?;
    Ok(ApiResponse::created(message))
}

/// POST /api/chats/:id/read
pub async fn mark_read(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Id>,
) -> ApiResult<impl IntoResponse> {
    let marked = state.services.chat.mark_read(&user, id).await?;
    Ok(ApiResponse::ok(json!({ "marked": marked })))
}

/// DELETE /api/chats/:id/messages/:message_id
pub async fn delete_message(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path((id, message_id)): Path<(Id, Uuid)>,
) -> ApiResult<impl IntoResponse> {
    state.services.chat.delete_message(&user, id, message_id).await?;
    Ok(ApiResponse::message("Message deleted"))
}
