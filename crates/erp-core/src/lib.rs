//! # erp-core
//!
//! Core types and utilities shared by every ERP RS crate:
//! - the error taxonomy and HTTP status mapping
//! - result aliases
//! - application configuration
//! - pagination parameters
//! - the TTL cache used for dashboard and permission lookups

pub mod cache;
pub mod config;
pub mod error;
pub mod pagination;
pub mod result;
pub mod traits;

pub use cache::TtlCache;
pub use error::*;
pub use pagination::*;
pub use result::*;
pub use traits::*;
