//! Resource allocation model
//!
//! Table: resource_allocations. An allocation books an employee onto a
//! project for a number of hours per week across a date range.

use chrono::{DateTime, NaiveDate, Utc};
use erp_core::{Id, Identifiable, Timestamped};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::NewRecord;

text_enum! {
    pub enum AllocationStatus ("allocation status") {
        Planned => "planned",
        Active => "active",
        Completed => "completed",
        Cancelled => "cancelled",
    }
}

impl Default for AllocationStatus {
    fn default() -> Self {
        AllocationStatus::Planned
    }
}

impl AllocationStatus {
    /// Statuses that still consume capacity
    pub fn is_committed(&self) -> bool {
        matches!(self, AllocationStatus::Planned | AllocationStatus::Active)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ResourceAllocation {
    pub id: Id,
    pub employee_id: Id,
    pub project_id: Id,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// Hours per week
    pub allocated_hours: f64,
    pub role: Option<String>,
    #[sqlx(try_from = "String")]
    pub status: AllocationStatus,
    pub utilization_rate: f64,
    pub notes: Option<String>,
    pub created_by: Id,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ResourceAllocation {
    /// Inclusive date-range overlap
    pub fn overlaps(&self, start: NaiveDate, end: NaiveDate) -> bool {
        self.start_date <= end && self.end_date >= start
    }

    pub fn overlaps_with(&self, other: &ResourceAllocation) -> bool {
        self.overlaps(other.start_date, other.end_date)
    }
}

#[derive(Debug, Clone)]
pub struct NewResourceAllocation {
    pub employee_id: Id,
    pub project_id: Id,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub allocated_hours: f64,
    pub role: Option<String>,
    pub status: AllocationStatus,
    pub utilization_rate: f64,
    pub notes: Option<String>,
    pub created_by: Id,
}

impl NewRecord<ResourceAllocation> for NewResourceAllocation {
    fn into_record(self, id: Id, now: DateTime<Utc>) -> ResourceAllocation {
        ResourceAllocation {
            id,
            employee_id: self.employee_id,
            project_id: self.project_id,
            start_date: self.start_date,
            end_date: self.end_date,
            allocated_hours: self.allocated_hours,
            role: self.role,
            status: self.status,
            utilization_rate: self.utilization_rate,
            notes: self.notes,
            created_by: self.created_by,
            created_at: now,
            updated_at: now,
        }
    }
}

impl Identifiable for ResourceAllocation {
    fn id(&self) -> Id {
        self.id
    }
}

impl Timestamped for ResourceAllocation {
    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }
}
