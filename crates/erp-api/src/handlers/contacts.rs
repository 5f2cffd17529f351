//! Contact (CRM) API handlers

use axum::{
    extract::{Path, State},
    response::IntoResponse,
};
use erp_core::Id;
use erp_services::contacts::{ContactInput, ContactQuery, ContactUpdate};
use serde::Deserialize;

use crate::error::ApiResult;
use crate::extractors::{ApiJson, ApiQuery, ApiResponse, AppState, AuthenticatedUser, Pagination};

#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
}

/// GET /api/contacts
pub async fn list_contacts(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    pagination: Pagination,
    ApiQuery(query): ApiQuery<ContactQuery>,
) -> ApiResult<impl IntoResponse> {
    let page = state.services.contacts.list(&user, query, &pagination).await?;
    Ok(ApiResponse::ok(page))
}

/// GET /api/contacts/search?q=
pub async fn search_contacts(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    ApiQuery(query): ApiQuery<SearchQuery>,
) -> ApiResult<impl IntoResponse> {
    let contacts = state.services.contacts.search(&user, query.q.as_deref()).await?;
    Ok(ApiResponse::ok(contacts))
}

/// GET /api/contacts/:id
pub async fn get_contact(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Id>,
) -> ApiResult<impl IntoResponse> {
    Ok(ApiResponse::ok(state.services.contacts.get(&user, id).await?))
}

/// POST /api/contacts
pub async fn create_contact(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    ApiJson(input): ApiJson<ContactInput>,
) -> ApiResult<impl IntoResponse> {
    let contact = state.services.contacts.create(&user, input).await?;
    Ok(ApiResponse::created(contact).with_message("Contact created successfully"))
}

/// PUT /api/contacts/:id
pub async fn update_contact(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Id>,
    ApiJson(update): ApiJson<ContactUpdate>,
) -> ApiResult<impl IntoResponse> {
    let contact = state.services.contacts.update(&user, id, update).await?;
    Ok(ApiResponse::ok(contact).with_message("Contact updated successfully"))
}

/// DELETE /api/contacts/:id
pub async fn delete_contact(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Id>,
) -> ApiResult<impl IntoResponse> {
    state.services.contacts.delete(&user, id).await?;
    Ok(ApiResponse::message("Contact deleted successfully"))
}
