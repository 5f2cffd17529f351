//! Department Service
//!
//! Departments own a name that employees reference, so renames cascade into
//! every employee's department list and the member count is recomputed
//! after each change.

use std::sync::Arc;

use erp_auth::{builtin, validate_permission_names, CurrentUser, PermissionResolver};
use erp_core::{ErpError, ErpResult, Id};
use erp_db::{DepartmentFilter, DepartmentStore, EmployeeStore};
use erp_models::{Department, DepartmentManager, DepartmentStatus, NewDepartment};
use serde::Deserialize;
use sqlx::types::Json;
use tracing::info;

use crate::support::non_blank;

/// Create parameters
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepartmentInput {
    pub name: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub manager: Option<DepartmentManager>,
    /// Employee to record as manager; also joins the department
    pub manager_id: Option<Id>,
    #[serde(default)]
    pub employee_ids: Vec<Id>,
    pub budget: Option<f64>,
    pub status: Option<DepartmentStatus>,
    #[serde(default)]
    pub permissions: Vec<String>,
}

/// Update parameters; absent fields are left alone
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepartmentUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub manager: Option<DepartmentManager>,
    pub manager_id: Option<Id>,
    pub employee_ids: Option<Vec<Id>>,
    pub budget: Option<f64>,
    pub status: Option<DepartmentStatus>,
}

#[derive(Clone)]
pub struct DepartmentService {
    departments: Arc<dyn DepartmentStore>,
    employees: Arc<dyn EmployeeStore>,
    resolver: Arc<PermissionResolver>,
}

impl DepartmentService {
    pub fn new(
        departments: Arc<dyn DepartmentStore>,
        employees: Arc<dyn EmployeeStore>,
        resolver: Arc<PermissionResolver>,
    ) -> Self {
        Self {
            departments,
            employees,
            resolver,
        }
    }

    /// Departments matching the filter, with fresh member counts
    pub async fn list(
        &self,
        user: &CurrentUser,
        filter: &DepartmentFilter,
    ) -> ErpResult<Vec<Department>> {
        user.require(builtin::EMPLOYEES_VIEW)?;

        let mut departments = self.departments.list(filter).await?;
        for department in departments.iter_mut() {
            department.employee_count = self.recount(department).await?;
        }
        Ok(departments)
    }

    pub async fn get(&self, user: &CurrentUser, id: Id) -> ErpResult<Department> {
        user.require(builtin::EMPLOYEES_VIEW)?;
        self.find(id).await
    }

    pub async fn create(&self, user: &CurrentUser, input: DepartmentInput) -> ErpResult<Department> {
        user.require(builtin::DEPARTMENTS_MANAGE)?;

        let (name, description) = match (
            non_blank(input.name.as_deref()),
            non_blank(input.description.as_deref()),
        ) {
            (Some(name), Some(description)) => (name, description),
            _ => return Err(ErpError::bad_request("Name and description are required")),
        };
        let location = non_blank(input.location.as_deref())
            .ok_or_else(|| ErpError::bad_request("Location is required"))?;

        if self.departments.find_by_name(&name).await?.is_some() {
            return Err(ErpError::bad_request("Department already exists"));
        }
        validate_permission_names(&input.permissions)?;

        let manager = match input.manager_id {
            Some(employee_id) => Some(self.manager_from_employee(employee_id).await?),
            None => input.manager,
        };

        let mut department = self
            .departments
            .create(NewDepartment {
                name,
                description,
                location,
                manager,
                budget: input.budget.unwrap_or(0.0).max(0.0),
                status: input.status.unwrap_or_default(),
                permissions: input.permissions,
            })
            .await?;

        let members: Vec<Id> = input.manager_id.into_iter().chain(input.employee_ids).collect();
        self.assign(&department.name, &members).await?;
        department.employee_count = self.recount(&department).await?;

        info!(department_id = department.id, name = %department.name, "Department created");
        Ok(department)
    }

    pub async fn update(
        &self,
        user: &CurrentUser,
        id: Id,
        update: DepartmentUpdate,
    ) -> ErpResult<Department> {
        user.require(builtin::DEPARTMENTS_MANAGE)?;

        let mut department = self.find(id).await?;
        let old_name = department.name.clone();

        if let Some(name) = update.name.as_deref() {
            let name = non_blank(Some(name))
                .ok_or_else(|| ErpError::bad_request("Department name cannot be empty"))?;
            if name != old_name {
                if let Some(existing) = self.departments.find_by_name(&name).await? {
                    if existing.id != id {
                        return Err(ErpError::bad_request("Department already exists"));
                    }
                }
                department.name = name;
            }
        }
        if let Some(description) = non_blank(update.description.as_deref()) {
            department.description = description;
        }
        if let Some(location) = non_blank(update.location.as_deref()) {
            department.location = location;
        }
        if let Some(budget) = update.budget {
            department.budget = budget.max(0.0);
        }
        if let Some(status) = update.status {
            department.status = status;
        }
        match update.manager_id {
            Some(employee_id) => {
                department.manager = Some(Json(self.manager_from_employee(employee_id).await?));
            }
            None => {
                if let Some(manager) = update.manager {
                    department.manager = Some(Json(manager));
                }
            }
        }

        let status_changed = update.status.is_some();
        let mut department = self.departments.update(id, department).await?;

        if department.name != old_name {
            let renamed = self
                .employees
                .rename_department(&old_name, &department.name)
                .await?;
            info!(
                department_id = id,
                from = %old_name,
                to = %department.name,
                employees = renamed,
                "Department renamed"
            );
        }

        let members: Vec<Id> = update
            .manager_id
            .into_iter()
            .chain(update.employee_ids.unwrap_or_default())
            .collect();
        self.assign(&department.name, &members).await?;
        department.employee_count = self.recount(&department).await?;

        if status_changed || department.name != old_name {
            // Membership-derived permissions depend on name and status
            self.resolver.invalidate_all();
        }

        Ok(department)
    }

    pub async fn delete(&self, user: &CurrentUser, id: Id) -> ErpResult<()> {
        user.require(builtin::DEPARTMENTS_MANAGE)?;

        let department = self.find(id).await?;
        let count = self.recount(&department).await?;
        if count > 0 {
            return Err(ErpError::bad_request(format!(
                "Cannot delete department with {} assigned employees",
                count
            )));
        }

        self.departments.delete(id).await?;
        info!(department_id = id, name = %department.name, "Department deleted");
        Ok(())
    }

    /// Replace the permissions granted to every member of the department
    pub async fn update_permissions(
        &self,
        user: &CurrentUser,
        id: Id,
        permissions: Vec<String>,
    ) -> ErpResult<Department> {
        user.require(builtin::DEPARTMENTS_MANAGE)?;
        validate_permission_names(&permissions)?;

        let mut department = self.find(id).await?;
        department.permissions = dedup(permissions);
        let department = self.departments.update(id, department).await?;

        self.resolver.invalidate_all();
        info!(
            department_id = id,
            permissions = department.permissions.len(),
            "Department permissions updated"
        );
        Ok(department)
    }

    async fn find(&self, id: Id) -> ErpResult<Department> {
        self.departments
            .find_by_id(id)
            .await?
            .ok_or_else(|| ErpError::not_found("Department", id))
    }

    async fn manager_from_employee(&self, employee_id: Id) -> ErpResult<DepartmentManager> {
        let employee = self
            .employees
            .find_by_id(employee_id)
            .await?
            .ok_or_else(|| ErpError::not_found("Employee", employee_id))?;

        Ok(DepartmentManager {
            name: employee.full_name(),
            email: employee.email,
            phone: employee.phone.unwrap_or_default(),
        })
    }

    /// Add the department to each employee that is not yet a member
    async fn assign(&self, department: &str, employee_ids: &[Id]) -> ErpResult<()> {
        for &employee_id in employee_ids {
            let mut employee = self
                .employees
                .find_by_id(employee_id)
                .await?
                .ok_or_else(|| ErpError::not_found("Employee", employee_id))?;

            if !employee.in_department(department) {
                employee.departments.push(department.to_string());
                if let Some(user_id) = employee.user_id {
                    self.resolver.invalidate(user_id);
                }
                self.employees.update(employee_id, employee).await?;
            }
        }
        Ok(())
    }

    /// Recompute and store the member count, returning it
    async fn recount(&self, department: &Department) -> ErpResult<i32> {
        let count = self.employees.count_in_department(&department.name).await?;
        let count = i32::try_from(count).unwrap_or(i32::MAX);
        if count != department.employee_count {
            self.departments.set_employee_count(department.id, count).await?;
        }
        Ok(count)
    }
}

fn dedup(mut values: Vec<String>) -> Vec<String> {
    values.sort();
    values.dedup();
    values
}
