//! Employee Service

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::NaiveDate;
use erp_auth::{builtin, CurrentUser, PermissionResolver};
use erp_core::{ErpError, ErpResult, Id, Page, PaginationParams};
use erp_db::{DepartmentStore, EmployeeFilter, EmployeeStore, UserStore};
use erp_models::{Employee, EmployeeStatus, NewEmployee};
use serde::Deserialize;
use tracing::info;
use validator::Validate;

/// Update parameters; absent fields are left alone
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmployeeUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub position: Option<String>,
    pub departments: Option<Vec<String>>,
    pub skills: Option<Vec<String>>,
    pub status: Option<EmployeeStatus>,
    pub hire_date: Option<NaiveDate>,
    pub salary: Option<f64>,
}

#[derive(Clone)]
pub struct EmployeeService {
    employees: Arc<dyn EmployeeStore>,
    departments: Arc<dyn DepartmentStore>,
    users: Arc<dyn UserStore>,
    resolver: Arc<PermissionResolver>,
}

impl EmployeeService {
    pub fn new(
        employees: Arc<dyn EmployeeStore>,
        departments: Arc<dyn DepartmentStore>,
        users: Arc<dyn UserStore>,
        resolver: Arc<PermissionResolver>,
    ) -> Self {
        Self {
            employees,
            departments,
            users,
            resolver,
        }
    }

    pub async fn list(
        &self,
        user: &CurrentUser,
        filter: &EmployeeFilter,
        params: &PaginationParams,
    ) -> ErpResult<Page<Employee>> {
        user.require(builtin::EMPLOYEES_VIEW)?;

        let items = self
            .employees
            .list(filter, params.limit(), params.offset())
            .await?;
        let total = self.employees.count_matching(filter).await?;
        Ok(Page::new(items, total, params))
    }

    pub async fn get(&self, user: &CurrentUser, id: Id) -> ErpResult<Employee> {
        if user.employee_id != Some(id) {
            user.require(builtin::EMPLOYEES_VIEW)?;
        }
        self.find(id).await
    }

    pub async fn create(&self, user: &CurrentUser, mut input: NewEmployee) -> ErpResult<Employee> {
        user.require(builtin::EMPLOYEES_MANAGE)?;

        input.email = input.email.trim().to_lowercase();
        input.first_name = input.first_name.trim().to_string();
        input.last_name = input.last_name.trim().to_string();
        input.departments = dedup(input.departments);
        input.skills = dedup(input.skills);
        input.validate()?;

        if self.employees.find_by_email(&input.email).await?.is_some() {
            return Err(ErpError::conflict("Employee with this email already exists"));
        }
        self.ensure_departments_exist(&input.departments).await?;
        if let Some(user_id) = input.user_id {
            self.ensure_user_unlinked(user_id, None).await?;
        }

        let employee = self.employees.create(input).await?;
        self.recount(&employee.departments).await?;
        if let Some(user_id) = employee.user_id {
            self.resolver.invalidate(user_id);
        }

        info!(employee_id = employee.id, email = %employee.email, "Employee created");
        Ok(employee)
    }

    pub async fn update(
        &self,
        user: &CurrentUser,
        id: Id,
        update: EmployeeUpdate,
    ) -> ErpResult<Employee> {
        user.require(builtin::EMPLOYEES_MANAGE)?;

        let mut employee = self.find(id).await?;
        let previous_departments = employee.departments.clone();

        if let Some(email) = update.email {
            let email = email.trim().to_lowercase();
            if email != employee.email {
                if let Some(other) = self.employees.find_by_email(&email).await? {
                    if other.id != id {
                        return Err(ErpError::conflict("Employee with this email already exists"));
                    }
                }
                employee.email = email;
            }
        }
        if let Some(first_name) = update.first_name {
            employee.first_name = first_name.trim().to_string();
        }
        if let Some(last_name) = update.last_name {
            employee.last_name = last_name.trim().to_string();
        }
        if let Some(phone) = update.phone {
            employee.phone = Some(phone).filter(|p| !p.trim().is_empty());
        }
        if let Some(position) = update.position {
            employee.position = position.trim().to_string();
        }
        if let Some(departments) = update.departments {
            let departments = dedup(departments);
            self.ensure_departments_exist(&departments).await?;
            employee.departments = departments;
        }
        if let Some(skills) = update.skills {
            employee.skills = dedup(skills);
        }
        if let Some(status) = update.status {
            employee.status = status;
        }
        if let Some(hire_date) = update.hire_date {
            employee.hire_date = Some(hire_date);
        }
        if let Some(salary) = update.salary {
            if salary < 0.0 {
                return Err(ErpError::invalid("salary", "must not be negative"));
            }
            employee.salary = Some(salary);
        }
        if employee.first_name.is_empty() {
            return Err(ErpError::invalid("firstName", "is required"));
        }
        if employee.position.is_empty() {
            return Err(ErpError::invalid("position", "is required"));
        }

        let employee = self.employees.update(id, employee).await?;

        let touched: Vec<String> = previous_departments
            .into_iter()
            .chain(employee.departments.iter().cloned())
            .collect();
        self.recount(&touched).await?;
        if let Some(user_id) = employee.user_id {
            self.resolver.invalidate(user_id);
        }

        Ok(employee)
    }

    /// Terminate the employee, or remove the record entirely when `hard`
    pub async fn delete(&self, user: &CurrentUser, id: Id, hard: bool) -> ErpResult<()> {
        user.require(builtin::EMPLOYEES_MANAGE)?;
        if hard && !user.has_full_access() {
            return Err(ErpError::forbidden("Only administrators can permanently delete employees"));
        }

        let mut employee = self.find(id).await?;
        let departments = employee.departments.clone();
        let user_id = employee.user_id;

        if hard {
            self.employees.delete(id).await?;
        } else {
            employee.status = EmployeeStatus::Terminated;
            self.employees.update(id, employee).await?;
        }

        self.recount(&departments).await?;
        if let Some(user_id) = user_id {
            self.resolver.invalidate(user_id);
        }

        info!(employee_id = id, hard, "Employee removed");
        Ok(())
    }

    /// Every distinct skill across employees, sorted
    pub async fn skills(&self, user: &CurrentUser) -> ErpResult<Vec<String>> {
        user.require(builtin::EMPLOYEES_VIEW)?;

        let employees = self
            .employees
            .list(&EmployeeFilter::default(), i64::MAX, 0)
            .await?;
        let skills: BTreeSet<String> = employees
            .into_iter()
            .filter(|e| e.status != EmployeeStatus::Terminated)
            .flat_map(|e| e.skills)
            .collect();
        Ok(skills.into_iter().collect())
    }

    /// Attach a login identity to an HR record
    pub async fn link_user(
        &self,
        user: &CurrentUser,
        employee_id: Id,
        user_id: Id,
    ) -> ErpResult<Employee> {
        user.require(builtin::EMPLOYEES_MANAGE)?;

        let mut employee = self.find(employee_id).await?;
        if !self.users.exists(user_id).await? {
            return Err(ErpError::not_found("User", user_id));
        }
        self.ensure_user_unlinked(user_id, Some(employee_id)).await?;

        let previous = employee.user_id.replace(user_id);
        let employee = self.employees.update(employee_id, employee).await?;

        for affected in previous.into_iter().chain([user_id]) {
            self.resolver.invalidate(affected);
        }
        info!(employee_id, user_id, "Employee linked to user");
        Ok(employee)
    }

    async fn find(&self, id: Id) -> ErpResult<Employee> {
        self.employees
            .find_by_id(id)
            .await?
            .ok_or_else(|| ErpError::not_found("Employee", id))
    }

    async fn ensure_departments_exist(&self, names: &[String]) -> ErpResult<()> {
        if names.is_empty() {
            return Ok(());
        }
        let found = self.departments.find_by_names(names).await?;
        for name in names {
            if !found.iter().any(|d| &d.name == name) {
                return Err(ErpError::bad_request(format!("Unknown department: {}", name)));
            }
        }
        Ok(())
    }

    async fn ensure_user_unlinked(&self, user_id: Id, except: Option<Id>) -> ErpResult<()> {
        match self.employees.find_by_user_id(user_id).await? {
            Some(other) if Some(other.id) != except => Err(ErpError::conflict(
                "User is already linked to another employee",
            )),
            _ => Ok(()),
        }
    }

    async fn recount(&self, names: &[String]) -> ErpResult<()> {
        let names: BTreeSet<&String> = names.iter().collect();
        for department in self
            .departments
            .find_by_names(&names.into_iter().cloned().collect::<Vec<_>>())
            .await?
        {
            let count = self.employees.count_in_department(&department.name).await?;
            let count = i32::try_from(count).unwrap_or(i32::MAX);
            if count != department.employee_count {
                self.departments.set_employee_count(department.id, count).await?;
            }
        }
        Ok(())
    }
}

fn dedup(values: Vec<String>) -> Vec<String> {
    let mut seen = BTreeSet::new();
    values
        .into_iter()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty() && seen.insert(v.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::departments::DepartmentInput;
    use crate::testing::{admin, employee_input, fixture, member};

    async fn department(fx: &crate::testing::Fixture, name: &str) {
        fx.services
            .departments
            .create(
                &admin(),
                DepartmentInput {
                    name: Some(name.into()),
                    description: Some("d".into()),
                    location: Some("HQ".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_duplicate_email_conflicts() {
        let fx = fixture().await;
        let service = &fx.services.employees;
        service.create(&admin(), employee_input("a@x.io", &[])).await.unwrap();

        let err = service
            .create(&admin(), employee_input("A@X.io", &[]))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 409);
    }

    #[tokio::test]
    async fn test_create_recounts_departments() {
        let fx = fixture().await;
        department(&fx, "Engineering").await;

        fx.services
            .employees
            .create(&admin(), employee_input("a@x.io", &["Engineering"]))
            .await
            .unwrap();

        let d = fx.stores.departments.find_by_name("Engineering").await.unwrap().unwrap();
        assert_eq!(d.employee_count, 1);

        let err = fx
            .services
            .employees
            .create(&admin(), employee_input("b@x.io", &["Nowhere"]))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[tokio::test]
    async fn test_soft_and_hard_delete() {
        let fx = fixture().await;
        department(&fx, "Ops").await;
        let e = fx
            .services
            .employees
            .create(&admin(), employee_input("a@x.io", &["Ops"]))
            .await
            .unwrap();

        let manager = member(9, &["employees.manage"]);
        fx.services.employees.delete(&manager, e.id, false).await.unwrap();
        let terminated = fx.stores.employees.find_by_id(e.id).await.unwrap().unwrap();
        assert_eq!(terminated.status, EmployeeStatus::Terminated);
        let d = fx.stores.departments.find_by_name("Ops").await.unwrap().unwrap();
        assert_eq!(d.employee_count, 0);

        let err = fx.services.employees.delete(&manager, e.id, true).await.unwrap_err();
        assert_eq!(err.status_code(), 403);
        fx.services.employees.delete(&admin(), e.id, true).await.unwrap();
        assert!(fx.stores.employees.find_by_id(e.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_skills_are_unique_and_sorted() {
        let fx = fixture().await;
        let mut a = employee_input("a@x.io", &[]);
        a.skills = vec!["rust".into(), "sql".into()];
        let mut b = employee_input("b@x.io", &[]);
        b.skills = vec!["sql".into(), "excel".into(), " ".into()];
        fx.services.employees.create(&admin(), a).await.unwrap();
        fx.services.employees.create(&admin(), b).await.unwrap();

        let skills = fx.services.employees.skills(&admin()).await.unwrap();
        assert_eq!(skills, vec!["excel", "rust", "sql"]);
    }

    #[tokio::test]
    async fn test_link_user_once() {
        let fx = fixture().await;
        let user = fx.register("u@x.io").await;
        let a = fx.services.employees.create(&admin(), employee_input("a@x.io", &[])).await.unwrap();
        let b = fx.services.employees.create(&admin(), employee_input("b@x.io", &[])).await.unwrap();

        let linked = fx.services.employees.link_user(&admin(), a.id, user.id).await.unwrap();
        assert_eq!(linked.user_id, Some(user.id));

        let err = fx.services.employees.link_user(&admin(), b.id, user.id).await.unwrap_err();
        assert_eq!(err.status_code(), 409);
    }
}
