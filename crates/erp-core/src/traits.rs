//! Core traits shared by models and stores

use chrono::{DateTime, Utc};

/// Primary key type (BIGSERIAL)
pub type Id = i64;

/// Entities that have a primary key
pub trait Identifiable {
    fn id(&self) -> Id;
}

/// Entities that track their last modification time
pub trait Timestamped {
    fn created_at(&self) -> DateTime<Utc>;

    /// Record a modification at `now`. Append-only records keep the default no-op.
    fn touch(&mut self, _now: DateTime<Utc>) {}
}
