//! API error handling
//!
//! Every failure leaves the API as the JSON envelope
//! `{ "success": false, "message", "code", "errors"? }`.

use std::collections::HashMap;

use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use erp_core::ErpError;
use serde::Serialize;
use tracing::error;

/// API error, a thin wrapper so handlers can use `?` on service results
#[derive(Debug)]
pub struct ApiError(pub ErpError);

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl From<ErpError> for ApiError {
    fn from(err: ErpError) -> Self {
        ApiError(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError(ErpError::bad_request(rejection.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError(ErpError::bad_request(rejection.body_text()))
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError(ErpError::bad_request(rejection.body_text()))
    }
}

#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    message: String,
    code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    errors: Option<HashMap<String, Vec<String>>>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let err = self.0;

        let (message, errors) = match &err {
            ErpError::Validation(validation) => {
                (err.to_string(), Some(validation.errors.clone()))
            }
            // Internal details stay in the log
            ErpError::Database(_) | ErpError::Internal(_) | ErpError::Config(_) => {
                error!("Request failed: {}", err);
                ("Internal server error".to_string(), None)
            }
            _ => (err.to_string(), None),
        };

        let body = ErrorBody {
            success: false,
            message,
            code: err.error_code(),
            errors,
        };
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ApiError::from(ErpError::not_found("Project", 3)).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(ErpError::invalid("endDate", "must not be before startDate")).status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ApiError::from(ErpError::conflict("Duplicate phone")).status_code(),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn test_internal_message_is_hidden() {
        let response = ApiError::from(ErpError::Database("connection refused".into())).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
