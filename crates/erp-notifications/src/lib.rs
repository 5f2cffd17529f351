//! # erp-notifications
//!
//! In-app notifications and real-time event delivery for ERP RS.
//!
//! ## Features
//!
//! - Event hub with per-user and admin rooms
//! - Persisted notifications pushed as `notification:received`
//! - Unpersisted broadcasts and admin notices

pub mod hub;
pub mod service;

pub use hub::{events, rooms_for, EventHub, RealtimeEvent, Room};
pub use service::{AdminNotice, NotificationService};
