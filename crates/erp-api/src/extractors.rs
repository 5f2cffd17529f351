//! Application state and axum extractors for API handlers

use std::sync::{Arc, OnceLock};

use axum::{
    async_trait,
    extract::{FromRef, FromRequest, FromRequestParts, Query},
    http::{header, request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use erp_activity::ActivityService;
use erp_auth::{Authenticator, CurrentUser, JwtService, PermissionResolver, RequestHeaders};
use erp_core::config::AppConfig;
use erp_core::{Id, PaginationParams};
use erp_db::Stores;
use erp_files::{FileService, Storage};
use erp_notifications::EventHub;
use erp_services::Services;
use serde::Serialize;
use std::time::Duration;

use crate::error::ApiError;

/// Application state shared by every handler
#[derive(Clone)]
pub struct AppState {
    pub services: Services,
    pub files: FileService,
    pub activity: ActivityService,
    pub authenticator: Arc<Authenticator>,
    pub hub: EventHub,
}

impl AppState {
    /// Wire services, authentication and the event hub over `stores`
    pub fn new(stores: &Stores, storage: Arc<dyn Storage>, config: &AppConfig) -> Self {
        let hub = EventHub::new(config.realtime.channel_capacity);
        let resolver = Arc::new(PermissionResolver::new(
            stores,
            Duration::from_secs(config.cache.permission_ttl_seconds),
        ));
        let jwt = Arc::new(JwtService::new(
            config.auth.jwt_secret.as_bytes(),
            config.auth.token_expiration_seconds,
        ));

        let services = Services::new(stores, hub.clone(), resolver.clone(), jwt.clone(), config);
        let files = FileService::new(stores.files.clone(), storage, config.storage.max_upload_bytes);
        let activity = ActivityService::new(stores.activity.clone(), hub.clone());

        Self {
            services,
            files,
            activity,
            authenticator: Arc::new(Authenticator::new(jwt, resolver)),
            hub,
        }
    }
}

/// Who made a request, filled in once the caller is authenticated.
///
/// The activity middleware places an empty slot in the request extensions
/// and reads it back after the handler ran.
#[derive(Clone, Default)]
pub struct ActorSlot(Arc<OnceLock<(Id, String)>>);

impl ActorSlot {
    pub fn set(&self, id: Id, name: &str) {
        let _ = self.0.set((id, name.to_string()));
    }

    pub fn get(&self) -> Option<(Id, String)> {
        self.0.get().cloned()
    }
}

/// Authenticated user extractor
pub struct AuthenticatedUser(pub CurrentUser);

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
    AppState: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = AppState::from_ref(state);

        let headers = RequestHeaders {
            authorization: parts
                .headers
                .get(header::AUTHORIZATION)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string),
            query_token: None,
        };
        let user = app_state.authenticator.authenticate(&headers).await?;

        if let Some(slot) = parts.extensions.get::<ActorSlot>() {
            slot.set(user.id, &user.name);
        }
        Ok(AuthenticatedUser(user))
    }
}

impl std::ops::Deref for AuthenticatedUser {
    type Target = CurrentUser;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// JSON body whose rejections use the API error envelope
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

/// Query string whose rejections use the API error envelope
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct ApiQuery<T>(pub T);

/// Pagination from `?page=&perPage=`; malformed values fall back to defaults
pub struct Pagination(pub PaginationParams);

#[async_trait]
impl<S> FromRequestParts<S> for Pagination
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(params) = Query::<PaginationParams>::from_request_parts(parts, state)
            .await
            .unwrap_or_else(|_| Query(PaginationParams::default()));
        Ok(Pagination(params.normalized()))
    }
}

impl std::ops::Deref for Pagination {
    type Target = PaginationParams;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Success envelope: `{ "success": true, "data": ..., "message"? }`
pub struct ApiResponse<T: Serialize> {
    status: StatusCode,
    data: T,
    message: Option<String>,
}

#[derive(Serialize)]
struct SuccessBody<T: Serialize> {
    success: bool,
    data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            status: StatusCode::OK,
            data,
            message: None,
        }
    }

    pub fn created(data: T) -> Self {
        Self {
            status: StatusCode::CREATED,
            data,
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl ApiResponse<serde_json::Value> {
    /// No payload, just a confirmation
    pub fn message(message: impl Into<String>) -> Self {
        Self::ok(serde_json::Value::Null).with_message(message)
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        let body = SuccessBody {
            success: true,
            data: self.data,
            message: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}
