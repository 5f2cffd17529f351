//! File API handlers
//!
//! Files hang off a chat or a project; access follows the parent: chat
//! participants, or users who can see the project.

use axum::{
    extract::{multipart::MultipartError, Multipart, Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
};
use bytes::Bytes;
use erp_auth::CurrentUser;
use erp_core::{ErpError, ErpResult, Id};
use erp_files::{content_disposition, Upload};
use erp_models::FileContext;
use serde::Deserialize;

use crate::error::{ApiError, ApiResult};
use crate::extractors::{ApiQuery, ApiResponse, AppState, AuthenticatedUser};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileListQuery {
    pub context: FileContext,
    pub context_id: Id,
}

fn multipart_error(err: MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ErpError::bad_request("File too large").into()
    } else {
        ErpError::bad_request(err.body_text()).into()
    }
}

/// The caller must be able to see the chat or project a file belongs to
async fn ensure_context_access(
    state: &AppState,
    user: &CurrentUser,
    context: FileContext,
    context_id: Id,
) -> ErpResult<()> {
    match context {
        FileContext::Chat => state.services.chat.get(user, context_id).await.map(|_| ()),
        FileContext::Project => state.services.projects.get(user, context_id).await.map(|_| ()),
    }
}

/// POST /api/files (multipart: `context`, `contextId`, `file`)
pub async fn upload_file(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    mut multipart: Multipart,
) -> ApiResult<impl IntoResponse> {
    let mut context: Option<FileContext> = None;
    let mut context_id: Option<Id> = None;
    let mut upload: Option<Upload> = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "context" => {
                let text = field.text().await.map_err(multipart_error)?;
                context = Some(
                    text.trim()
                        .parse()
                        .map_err(|_| ErpError::bad_request("context must be chat or project"))?,
                );
            }
            "contextId" => {
                let text = field.text().await.map_err(multipart_error)?;
                context_id = Some(
                    text.trim()
                        .parse()
                        .map_err(|_| ErpError::bad_request("contextId must be a number"))?,
                );
            }
            "file" => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let content_type = field.content_type().map(str::to_string);
                let data: Bytes = field.bytes().await.map_err(multipart_error)?;
                upload = Some(Upload {
                    filename,
                    content_type,
                    data,
                });
            }
            _ => {}
        }
    }

    let (Some(context), Some(context_id)) = (context, context_id) else {
        return Err(ErpError::bad_request("context and contextId are required").into());
    };
    let upload = upload.ok_or_else(|| ErpError::bad_request("No file uploaded"))?;

    ensure_context_access(&state, &user, context, context_id).await?;
    let file = state.files.upload(user.id, context, context_id, upload).await?;
    Ok(ApiResponse::created(file).with_message("File uploaded successfully"))
}

/// GET /api/files?context=&contextId=
pub async fn list_files(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    ApiQuery(query): ApiQuery<FileListQuery>,
) -> ApiResult<impl IntoResponse> {
    ensure_context_access(&state, &user, query.context, query.context_id).await?;
    let files = state.files.list(query.context, query.context_id).await?;
    Ok(ApiResponse::ok(files))
}

/// GET /api/files/:id
pub async fn download_file(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Id>,
) -> ApiResult<impl IntoResponse> {
    let file = state.files.get(id).await?;
    ensure_context_access(&state, &user, file.context, file.context_id).await?;

    let (file, data) = state.files.download(id).await?;
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, file.content_type.clone()),
            (header::CONTENT_DISPOSITION, content_disposition(&file)),
        ],
        data,
    ))
}

/// DELETE /api/files/:id
pub async fn delete_file(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Id>,
) -> ApiResult<impl IntoResponse> {
    state.files.delete(id, user.id, user.has_full_access()).await?;
    Ok(ApiResponse::message("File deleted successfully"))
}
