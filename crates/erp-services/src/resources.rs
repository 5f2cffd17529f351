//! Resource Service
//!
//! Allocations book employees onto projects in hours per week. A standard
//! week is 40 hours; more than that is over-allocation, more than 60 is
//! critical.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::NaiveDate;
use erp_auth::{builtin, CurrentUser};
use erp_core::{ErpError, ErpResult, Id};
use erp_db::{AllocationFilter, AllocationStore, EmployeeFilter, EmployeeStore, ProjectStore};
use erp_models::{AllocationStatus, EmployeeStatus, NewResourceAllocation, ResourceAllocation};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::projects::percent;
use crate::support::non_blank;

pub const WEEKLY_CAPACITY_HOURS: f64 = 40.0;
pub const CRITICAL_HOURS: f64 = 60.0;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocationQuery {
    pub employee_id: Option<Id>,
    pub project_id: Option<Id>,
    pub status: Option<AllocationStatus>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl AllocationQuery {
    fn into_filter(self) -> ErpResult<AllocationFilter> {
        Ok(AllocationFilter {
            employee_id: self.employee_id,
            project_id: self.project_id,
            statuses: self.status.into_iter().collect(),
            overlapping: date_range(self.start_date, self.end_date)?,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocationInput {
    pub employee_id: Id,
    pub project_id: Id,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub allocated_hours: f64,
    pub role: Option<String>,
    pub status: Option<AllocationStatus>,
    pub utilization_rate: Option<f64>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocationUpdate {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub allocated_hours: Option<f64>,
    pub role: Option<String>,
    pub status: Option<AllocationStatus>,
    pub utilization_rate: Option<f64>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictSeverity {
    None,
    OverAllocated,
    Critical,
}

impl ConflictSeverity {
    pub fn for_hours(total: f64) -> Self {
        if total > CRITICAL_HOURS {
            ConflictSeverity::Critical
        } else if total > WEEKLY_CAPACITY_HOURS {
            ConflictSeverity::OverAllocated
        } else {
            ConflictSeverity::None
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverlapPair {
    pub first: Id,
    pub second: Id,
    pub overlap_start: NaiveDate,
    pub overlap_end: NaiveDate,
    pub combined_hours: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictReport {
    pub employee_id: Id,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub total_allocated: f64,
    pub capacity: f64,
    pub has_conflict: bool,
    pub severity: ConflictSeverity,
    pub allocations: Vec<ResourceAllocation>,
    pub overlaps: Vec<OverlapPair>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmployeeUtilization {
    pub employee_id: Id,
    pub total_hours: f64,
    pub average_utilization: f64,
    pub allocation_count: usize,
    pub allocations: Vec<ResourceAllocation>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CapacityEntry {
    pub employee_id: Id,
    pub name: String,
    pub position: String,
    pub departments: Vec<String>,
    pub capacity: f64,
    pub allocated: f64,
    pub available: f64,
    pub utilization_rate: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillRow {
    pub employee_id: Id,
    pub name: String,
    /// Same order as `SkillMatrix::skills`
    pub has: Vec<bool>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillMatrix {
    pub skills: Vec<String>,
    pub employees: Vec<SkillRow>,
}

#[derive(Clone)]
pub struct ResourceService {
    allocations: Arc<dyn AllocationStore>,
    employees: Arc<dyn EmployeeStore>,
    projects: Arc<dyn ProjectStore>,
}

impl ResourceService {
    pub fn new(
        allocations: Arc<dyn AllocationStore>,
        employees: Arc<dyn EmployeeStore>,
        projects: Arc<dyn ProjectStore>,
    ) -> Self {
        Self {
            allocations,
            employees,
            projects,
        }
    }

    pub async fn list(
        &self,
        user: &CurrentUser,
        query: AllocationQuery,
    ) -> ErpResult<Vec<ResourceAllocation>> {
        user.require(builtin::RESOURCES_VIEW)?;
        Ok(self.allocations.list(&query.into_filter()?).await?)
    }

    pub async fn get(&self, user: &CurrentUser, id: Id) -> ErpResult<ResourceAllocation> {
        user.require(builtin::RESOURCES_VIEW)?;
        self.find(id).await
    }

    pub async fn create(
        &self,
        user: &CurrentUser,
        input: AllocationInput,
    ) -> ErpResult<ResourceAllocation> {
        user.require(builtin::RESOURCES_MANAGE)?;

        check_dates(input.start_date, input.end_date)?;
        check_hours(input.allocated_hours)?;
        if !self.employees.exists(input.employee_id).await? {
            return Err(ErpError::not_found("Employee", input.employee_id));
        }
        if !self.projects.exists(input.project_id).await? {
            return Err(ErpError::not_found("Project", input.project_id));
        }

        let allocation = self
            .allocations
            .create(NewResourceAllocation {
                employee_id: input.employee_id,
                project_id: input.project_id,
                start_date: input.start_date,
                end_date: input.end_date,
                allocated_hours: input.allocated_hours,
                role: non_blank(input.role.as_deref()),
                status: input.status.unwrap_or_default(),
                utilization_rate: rate_or_default(input.utilization_rate, input.allocated_hours)?,
                notes: non_blank(input.notes.as_deref()),
                created_by: user.id,
            })
            .await?;

        info!(
            allocation_id = allocation.id,
            employee_id = allocation.employee_id,
            project_id = allocation.project_id,
            hours = allocation.allocated_hours,
            "Resource allocated"
        );
        self.warn_if_over_allocated(&allocation).await;
        Ok(allocation)
    }

    pub async fn update(
        &self,
        user: &CurrentUser,
        id: Id,
        update: AllocationUpdate,
    ) -> ErpResult<ResourceAllocation> {
        user.require(builtin::RESOURCES_MANAGE)?;
        let mut allocation = self.find(id).await?;

        if let Some(start) = update.start_date {
            allocation.start_date = start;
        }
        if let Some(end) = update.end_date {
            allocation.end_date = end;
        }
        check_dates(allocation.start_date, allocation.end_date)?;
        if let Some(hours) = update.allocated_hours {
            allocation.allocated_hours = check_hours(hours)?;
            if update.utilization_rate.is_none() {
                allocation.utilization_rate = rate_or_default(None, hours)?;
            }
        }
        if let Some(rate) = update.utilization_rate {
            allocation.utilization_rate = rate_or_default(Some(rate), allocation.allocated_hours)?;
        }
        if let Some(role) = update.role {
            allocation.role = non_blank(Some(&role));
        }
        if let Some(status) = update.status {
            allocation.status = status;
        }
        if let Some(notes) = update.notes {
            allocation.notes = non_blank(Some(&notes));
        }

        let allocation = self.allocations.update(id, allocation).await?;
        self.warn_if_over_allocated(&allocation).await;
        Ok(allocation)
    }

    pub async fn delete(&self, user: &CurrentUser, id: Id) -> ErpResult<()> {
        user.require(builtin::RESOURCES_MANAGE)?;
        self.find(id).await?;
        self.allocations.delete(id).await?;
        info!(allocation_id = id, "Allocation deleted");
        Ok(())
    }

    pub async fn utilization(
        &self,
        user: &CurrentUser,
        employee_id: Id,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> ErpResult<EmployeeUtilization> {
        if user.employee_id != Some(employee_id) {
            user.require(builtin::RESOURCES_VIEW)?;
        }
        let allocations = self
            .allocations
            .list(&AllocationFilter {
                employee_id: Some(employee_id),
                overlapping: date_range(start, end)?,
                ..Default::default()
            })
            .await?;

        let total_hours: f64 = allocations.iter().map(|a| a.allocated_hours).sum();
        let average_utilization = if allocations.is_empty() {
            0.0
        } else {
            allocations.iter().map(|a| a.utilization_rate).sum::<f64>() / allocations.len() as f64
        };

        Ok(EmployeeUtilization {
            employee_id,
            total_hours,
            average_utilization,
            allocation_count: allocations.len(),
            allocations,
        })
    }

    pub async fn detect_conflicts(
        &self,
        user: &CurrentUser,
        employee_id: Id,
        start: NaiveDate,
        end: NaiveDate,
    ) -> ErpResult<ConflictReport> {
        user.require(builtin::RESOURCES_VIEW)?;
        check_dates(start, end)?;

        let allocations = self
            .allocations
            .list(&AllocationFilter::committed(employee_id, start, end))
            .await?;
        Ok(conflict_report(employee_id, start, end, allocations))
    }

    pub async fn capacity_planning(
        &self,
        user: &CurrentUser,
        start: NaiveDate,
        end: NaiveDate,
    ) -> ErpResult<Vec<CapacityEntry>> {
        user.require(builtin::RESOURCES_VIEW)?;
        check_dates(start, end)?;

        let employees = self
            .employees
            .list(&EmployeeFilter::with_status(EmployeeStatus::Active), i64::MAX, 0)
            .await?;
        let committed = self
            .allocations
            .list(&AllocationFilter {
                statuses: vec![AllocationStatus::Planned, AllocationStatus::Active],
                overlapping: Some((start, end)),
                ..Default::default()
            })
            .await?;

        Ok(employees
            .into_iter()
            .map(|employee| {
                let allocated: f64 = committed
                    .iter()
                    .filter(|a| a.employee_id == employee.id)
                    .map(|a| a.allocated_hours)
                    .sum();
                CapacityEntry {
                    employee_id: employee.id,
                    name: employee.full_name(),
                    position: employee.position,
                    departments: employee.departments,
                    capacity: WEEKLY_CAPACITY_HOURS,
                    allocated,
                    available: (WEEKLY_CAPACITY_HOURS - allocated).max(0.0),
                    utilization_rate: percent(allocated, WEEKLY_CAPACITY_HOURS),
                }
            })
            .collect())
    }

    pub async fn skill_matrix(&self, user: &CurrentUser) -> ErpResult<SkillMatrix> {
        user.require(builtin::RESOURCES_VIEW)?;

        let employees = self
            .employees
            .list(&EmployeeFilter::with_status(EmployeeStatus::Active), i64::MAX, 0)
            .await?;
        let skills: Vec<String> = employees
            .iter()
            .flat_map(|e| e.skills.iter().map(|s| s.trim().to_string()))
            .filter(|s| !s.is_empty())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let rows = employees
            .iter()
            .map(|employee| SkillRow {
                employee_id: employee.id,
                name: employee.full_name(),
                has: skills
                    .iter()
                    .map(|skill| employee.skills.iter().any(|s| s.trim() == skill))
                    .collect(),
            })
            .collect();

        Ok(SkillMatrix {
            skills,
            employees: rows,
        })
    }

    async fn warn_if_over_allocated(&self, allocation: &ResourceAllocation) {
        if !allocation.status.is_committed() {
            return;
        }
        let filter = AllocationFilter::committed(
            allocation.employee_id,
            allocation.start_date,
            allocation.end_date,
        );
        match self.allocations.list(&filter).await {
            Ok(rows) => {
                let total: f64 = rows.iter().map(|a| a.allocated_hours).sum();
                if total > WEEKLY_CAPACITY_HOURS {
                    warn!(
                        employee_id = allocation.employee_id,
                        total_hours = total,
                        "Employee is over-allocated"
                    );
                }
            }
            Err(e) => warn!(employee_id = allocation.employee_id, "Failed to check allocation load: {}", e),
        }
    }

    async fn find(&self, id: Id) -> ErpResult<ResourceAllocation> {
        self.allocations
            .find_by_id(id)
            .await?
            .ok_or_else(|| ErpError::not_found("Resource allocation", id))
    }
}

/// Pairwise overlaps are found with a nested scan
pub fn conflict_report(
    employee_id: Id,
    start: NaiveDate,
    end: NaiveDate,
    allocations: Vec<ResourceAllocation>,
) -> ConflictReport {
    let total_allocated: f64 = allocations.iter().map(|a| a.allocated_hours).sum();

    let mut overlaps = Vec::new();
    for (i, a) in allocations.iter().enumerate() {
        for b in &allocations[i + 1..] {
            if a.overlaps_with(b) {
                overlaps.push(OverlapPair {
                    first: a.id,
                    second: b.id,
                    overlap_start: a.start_date.max(b.start_date),
                    overlap_end: a.end_date.min(b.end_date),
                    combined_hours: a.allocated_hours + b.allocated_hours,
                });
            }
        }
    }

    ConflictReport {
        employee_id,
        start_date: start,
        end_date: end,
        total_allocated,
        capacity: WEEKLY_CAPACITY_HOURS,
        has_conflict: total_allocated > WEEKLY_CAPACITY_HOURS,
        severity: ConflictSeverity::for_hours(total_allocated),
        allocations,
        overlaps,
    }
}

fn check_dates(start: NaiveDate, end: NaiveDate) -> ErpResult<()> {
    if end < start {
        return Err(ErpError::invalid("endDate", "must be on or after the start date"));
    }
    Ok(())
}

fn check_hours(hours: f64) -> ErpResult<f64> {
    if !hours.is_finite() || hours <= 0.0 {
        return Err(ErpError::invalid("allocatedHours", "must be greater than 0"));
    }
    Ok(hours)
}

/// An explicit rate must lie in 0..=100; otherwise it follows from the hours
fn rate_or_default(rate: Option<f64>, hours: f64) -> ErpResult<f64> {
    match rate {
        Some(rate) if !(0.0..=100.0).contains(&rate) => Err(ErpError::invalid(
            "utilizationRate",
            "must be between 0 and 100",
        )),
        Some(rate) => Ok(rate),
        None => Ok(percent(hours, WEEKLY_CAPACITY_HOURS).min(100.0)),
    }
}

fn date_range(
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> ErpResult<Option<(NaiveDate, NaiveDate)>> {
    match (start, end) {
        (Some(start), Some(end)) => {
            check_dates(start, end)?;
            Ok(Some((start, end)))
        }
        (Some(start), None) => Ok(Some((start, far_date(9999, 12, 31)))),
        (None, Some(end)) => Ok(Some((far_date(1, 1, 1), end))),
        (None, None) => Ok(None),
    }
}

/// Open range ends, kept inside the PostgreSQL `date` range
fn far_date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{admin, employee_input, fixture, member};

    fn date(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, m, d).unwrap()
    }

    fn input(employee_id: Id, project_id: Id, start: NaiveDate, end: NaiveDate, hours: f64) -> AllocationInput {
        AllocationInput {
            employee_id,
            project_id,
            start_date: start,
            end_date: end,
            allocated_hours: hours,
            role: Some("Developer".into()),
            status: Some(AllocationStatus::Active),
            utilization_rate: None,
            notes: None,
        }
    }

    #[tokio::test]
    async fn test_create_validates() {
        let fx = fixture().await;
        let employee = fx.stores.employees.create(employee_input("r@x.io", &[])).await.unwrap();
        let project = fx.create_project("Staffed").await;

        let err = fx
            .services
            .resources
            .create(&admin(), input(employee.id, project.id, date(2, 1), date(1, 1), 10.0))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 422);

        let err = fx
            .services
            .resources
            .create(&admin(), input(employee.id, project.id, date(1, 1), date(2, 1), 0.0))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 422);

        let allocation = fx
            .services
            .resources
            .create(&admin(), input(employee.id, project.id, date(1, 1), date(2, 1), 20.0))
            .await
            .unwrap();
        assert_eq!(allocation.utilization_rate, 50.0);

        let err = fx
            .services
            .resources
            .create(&member(4, &["resources.view"]), input(employee.id, project.id, date(1, 1), date(2, 1), 5.0))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 403);
    }

    #[tokio::test]
    async fn test_conflict_severity() {
        let fx = fixture().await;
        let employee = fx.stores.employees.create(employee_input("busy@x.io", &[])).await.unwrap();
        let project = fx.create_project("Crunch").await;
        let resources = &fx.services.resources;

        resources
            .create(&admin(), input(employee.id, project.id, date(1, 1), date(1, 31), 30.0))
            .await
            .unwrap();
        resources
            .create(&admin(), input(employee.id, project.id, date(1, 15), date(2, 15), 20.0))
            .await
            .unwrap();
        let mut cancelled = input(employee.id, project.id, date(1, 1), date(1, 31), 40.0);
        cancelled.status = Some(AllocationStatus::Cancelled);
        resources.create(&admin(), cancelled).await.unwrap();

        let report = resources
            .detect_conflicts(&admin(), employee.id, date(1, 1), date(1, 31))
            .await
            .unwrap();
        assert_eq!(report.total_allocated, 50.0);
        assert!(report.has_conflict);
        assert_eq!(report.severity, ConflictSeverity::OverAllocated);
        assert_eq!(report.overlaps.len(), 1);
        assert_eq!(report.overlaps[0].overlap_start, date(1, 15));
        assert_eq!(report.overlaps[0].overlap_end, date(1, 31));

        let report = resources
            .detect_conflicts(&admin(), employee.id, date(2, 1), date(2, 28))
            .await
            .unwrap();
        assert_eq!(report.severity, ConflictSeverity::None);
        assert!(report.overlaps.is_empty());
    }

    #[test]
    fn test_severity_bands() {
        assert_eq!(ConflictSeverity::for_hours(40.0), ConflictSeverity::None);
        assert_eq!(ConflictSeverity::for_hours(40.5), ConflictSeverity::OverAllocated);
        assert_eq!(ConflictSeverity::for_hours(61.0), ConflictSeverity::Critical);
    }

    #[tokio::test]
    async fn test_capacity_and_skills() {
        let fx = fixture().await;
        let mut first = employee_input("a@x.io", &[]);
        first.skills = vec!["rust".into(), "sql".into()];
        let first = fx.stores.employees.create(first).await.unwrap();
        let mut second = employee_input("b@x.io", &[]);
        second.skills = vec!["design".into()];
        fx.stores.employees.create(second).await.unwrap();
        let project = fx.create_project("Plan").await;

        fx.services
            .resources
            .create(&admin(), input(first.id, project.id, date(3, 1), date(3, 31), 30.0))
            .await
            .unwrap();

        let plan = fx
            .services
            .resources
            .capacity_planning(&admin(), date(3, 1), date(3, 31))
            .await
            .unwrap();
        let row = plan.iter().find(|r| r.employee_id == first.id).unwrap();
        assert_eq!(row.allocated, 30.0);
        assert_eq!(row.available, 10.0);
        assert_eq!(row.utilization_rate, 75.0);

        let matrix = fx.services.resources.skill_matrix(&admin()).await.unwrap();
        assert_eq!(matrix.skills, vec!["design", "rust", "sql"]);
        let row = matrix.employees.iter().find(|r| r.employee_id == first.id).unwrap();
        assert_eq!(row.has, vec![false, true, true]);
    }

    #[tokio::test]
    async fn test_utilization_average() {
        let fx = fixture().await;
        let employee = fx.stores.employees.create(employee_input("u@x.io", &[])).await.unwrap();
        let project = fx.create_project("Avg").await;
        for hours in [10.0, 30.0] {
            fx.services
                .resources
                .create(&admin(), input(employee.id, project.id, date(4, 1), date(4, 30), hours))
                .await
                .unwrap();
        }

        let report = fx
            .services
            .resources
            .utilization(&admin(), employee.id, None, None)
            .await
            .unwrap();
        assert_eq!(report.total_hours, 40.0);
        assert_eq!(report.average_utilization, 50.0);
    }
}
