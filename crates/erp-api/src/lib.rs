//! # erp-api
//!
//! HTTP surface of ERP RS: axum handlers, extractors, the JSON response
//! envelope, request middleware and the `/ws` push channel.

pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod ws;

pub use error::{ApiError, ApiResult};
pub use extractors::{ApiResponse, AppState, AuthenticatedUser};
pub use routes::router;
