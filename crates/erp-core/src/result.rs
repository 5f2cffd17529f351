//! Result type aliases

use crate::error::ErpError;

/// Standard Result type for ERP operations
pub type ErpResult<T> = Result<T, ErpError>;
