//! # erp-activity
//!
//! Append-only activity log for ERP RS.
//!
//! Every mutating API request is turned into an [`erp_models::ActivityLog`]
//! after its response is produced, stored, and pushed to the admin room.

pub mod service;
pub mod trace;

pub use service::ActivityService;
pub use trace::{client_ip, resource_from_path, should_record, RequestTrace};
