//! Core error types for ERP RS
//!
//! Every layer converts its failures into [`ErpError`], which carries the
//! HTTP status and machine-readable code the API reports.

use std::collections::HashMap;
use thiserror::Error;

/// Core error type for all ERP operations
#[derive(Error, Debug)]
pub enum ErpError {
    #[error("{entity} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("{message}")]
    Unauthorized { message: String },

    #[error("{message}")]
    Forbidden { message: String },

    #[error("{message}")]
    BadRequest { message: String },

    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationErrors),

    #[error("{message}")]
    Conflict { message: String },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ErpError {
    pub fn not_found(entity: &'static str, id: impl std::fmt::Display) -> Self {
        ErpError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        ErpError::Unauthorized {
            message: message.into(),
        }
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        ErpError::Forbidden {
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        ErpError::BadRequest {
            message: message.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        ErpError::Conflict {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        ErpError::Internal(message.into())
    }

    /// Single-field validation failure
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = ValidationErrors::new();
        errors.add(field, message);
        ErpError::Validation(errors)
    }

    pub fn status_code(&self) -> u16 {
        match self {
            ErpError::NotFound { .. } => 404,
            ErpError::Unauthorized { .. } => 401,
            ErpError::Forbidden { .. } => 403,
            ErpError::BadRequest { .. } => 400,
            ErpError::Validation(_) => 422,
            ErpError::Conflict { .. } => 409,
            ErpError::Database(_) | ErpError::Internal(_) | ErpError::Config(_) => 500,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            ErpError::NotFound { .. } => "not_found",
            ErpError::Unauthorized { .. } => "unauthorized",
            ErpError::Forbidden { .. } => "forbidden",
            ErpError::BadRequest { .. } => "bad_request",
            ErpError::Validation(_) => "validation_failed",
            ErpError::Conflict { .. } => "conflict",
            ErpError::Database(_) => "database_error",
            ErpError::Internal(_) => "internal_error",
            ErpError::Config(_) => "configuration_error",
        }
    }

    pub fn is_server_error(&self) -> bool {
        self.status_code() >= 500
    }
}

/// Validation errors collection: field errors plus base errors
#[derive(Error, Debug, Default, Clone)]
#[error("{}", self.full_messages().join(", "))]
pub struct ValidationErrors {
    /// field_name -> messages
    pub errors: HashMap<String, Vec<String>>,
    /// Errors not tied to a specific field
    pub base_errors: Vec<String>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors
            .entry(field.into())
            .or_default()
            .push(message.into());
    }

    pub fn add_base(&mut self, message: impl Into<String>) {
        self.base_errors.push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty() && self.base_errors.is_empty()
    }

    pub fn has_error(&self, field: &str) -> bool {
        self.errors.contains_key(field)
    }

    pub fn get(&self, field: &str) -> Option<&Vec<String>> {
        self.errors.get(field)
    }

    pub fn merge(&mut self, other: ValidationErrors) {
        for (field, messages) in other.errors {
            self.errors.entry(field).or_default().extend(messages);
        }
        self.base_errors.extend(other.base_errors);
    }

    /// Field errors sorted by field name, after base errors
    pub fn full_messages(&self) -> Vec<String> {
        let mut messages = self.base_errors.clone();
        let mut fields: Vec<_> = self.errors.iter().collect();
        fields.sort_by(|a, b| a.0.cmp(b.0));
        for (field, field_messages) in fields {
            for msg in field_messages {
                messages.push(format!("{} {}", field, msg));
            }
        }
        messages
    }

    /// `Ok(())` when empty, otherwise the collected errors
    pub fn into_result(self) -> Result<(), ErpError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(ErpError::Validation(self))
        }
    }
}

impl From<validator::ValidationErrors> for ValidationErrors {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut out = ValidationErrors::new();
        for (field, field_errors) in errors.field_errors() {
            for error in field_errors {
                let message = error
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("is invalid ({})", error.code));
                out.add(field.to_string(), message);
            }
        }
        out
    }
}

impl From<validator::ValidationErrors> for ErpError {
    fn from(errors: validator::ValidationErrors) -> Self {
        ErpError::Validation(errors.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(ErpError::not_found("Budget", 1).status_code(), 404);
        assert_eq!(ErpError::forbidden("no").status_code(), 403);
        assert_eq!(ErpError::bad_request("bad").status_code(), 400);
        assert_eq!(ErpError::conflict("dup").status_code(), 409);
        assert_eq!(ErpError::invalid("name", "is required").status_code(), 422);
        assert_eq!(ErpError::Database("down".into()).status_code(), 500);
    }

    #[test]
    fn test_full_messages_order() {
        let mut errors = ValidationErrors::new();
        errors.add("phone", "is required");
        errors.add("name", "is required");
        errors.add_base("Contact is invalid");

        assert_eq!(
            errors.full_messages(),
            vec![
                "Contact is invalid".to_string(),
                "name is required".to_string(),
                "phone is required".to_string(),
            ]
        );
    }

    #[test]
    fn test_into_result() {
        assert!(ValidationErrors::new().into_result().is_ok());

        let mut errors = ValidationErrors::new();
        errors.add("hours", "must be greater than 0");
        let err = errors.into_result().unwrap_err();
        assert_eq!(err.error_code(), "validation_failed");
    }

    #[test]
    fn test_message_display() {
        let err = ErpError::bad_request("Department already exists");
        assert_eq!(err.to_string(), "Department already exists");
        assert_eq!(ErpError::not_found("Task", 7).to_string(), "Task not found");
    }
}
