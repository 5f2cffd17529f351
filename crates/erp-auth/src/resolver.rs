//! Per-request permission resolution
//!
//! Resolves user → role → employee → departments once and caches the
//! resulting [`CurrentUser`] for the configured TTL.

use std::sync::Arc;
use std::time::Duration;

use erp_core::{ErpError, ErpResult, Id, TtlCache};
use erp_db::{DepartmentStore, EmployeeStore, RoleStore, Stores, UserStore};
use tracing::debug;

use crate::permissions::CurrentUser;

pub struct PermissionResolver {
    users: Arc<dyn UserStore>,
    roles: Arc<dyn RoleStore>,
    employees: Arc<dyn EmployeeStore>,
    departments: Arc<dyn DepartmentStore>,
    cache: TtlCache<Id, CurrentUser>,
}

impl PermissionResolver {
    pub fn new(stores: &Stores, ttl: Duration) -> Self {
        Self {
            users: stores.users.clone(),
            roles: stores.roles.clone(),
            employees: stores.employees.clone(),
            departments: stores.departments.clone(),
            cache: TtlCache::new(ttl),
        }
    }

    pub async fn resolve(&self, user_id: Id) -> ErpResult<CurrentUser> {
        if let Some(user) = self.cache.get(&user_id) {
            return Ok(user);
        }

        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| ErpError::unauthorized("User no longer exists"))?;

        if !user.is_active() {
            return Err(ErpError::forbidden("Account is not active"));
        }

        let mut current = CurrentUser::new(user.id, &user.name, &user.email);

        if let Some(role_id) = user.role_id {
            if let Some(role) = self.roles.find_by_id(role_id).await? {
                current = current.with_role(role.id, &role.name, role.level);
                current.grant(role.permissions);
            }
        }

        if let Some(employee) = self.employees.find_by_user_id(user.id).await? {
            let departments = self.departments.find_by_names(&employee.departments).await?;
            for department in departments.into_iter().filter(|d| d.is_active()) {
                current.grant(department.permissions);
            }
            current = current.with_employee(employee.id, employee.departments);
        }

        debug!(user_id, role_level = current.role_level, "Resolved permissions");
        self.cache.insert(user_id, current.clone());
        Ok(current)
    }

    /// Drop one user's cached permissions
    pub fn invalidate(&self, user_id: Id) {
        self.cache.invalidate(&user_id);
    }

    /// Drop every cached permission set (role or department change)
    pub fn invalidate_all(&self) {
        self.cache.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use erp_db::seed_default_roles;
    use erp_models::{
        DepartmentStatus, EmployeeStatus, NewDepartment, NewEmployee, NewUser, UserStatus,
    };

    async fn setup() -> (Stores, Id) {
        let stores = Stores::memory();
        seed_default_roles(stores.roles.as_ref()).await.unwrap();
        let employee_role = stores.roles.find_by_name("employee").await.unwrap().unwrap();

        let user = stores
            .users
            .create(NewUser {
                name: "Asha Rao".into(),
                email: "asha@example.com".into(),
                password_hash: String::new(),
                role_id: Some(employee_role.id),
                status: UserStatus::Active,
            })
            .await
            .unwrap();

        for (name, status, permission) in [
            ("Finance", DepartmentStatus::Active, "finance.view"),
            ("Legal", DepartmentStatus::Inactive, "resources.manage"),
        ] {
            stores
                .departments
                .create(NewDepartment {
                    name: name.into(),
                    description: "d".into(),
                    location: "HQ".into(),
                    manager: None,
                    budget: 0.0,
                    status,
                    permissions: vec![permission.into()],
                })
                .await
                .unwrap();
        }

        stores
            .employees
            .create(NewEmployee {
                user_id: Some(user.id),
                first_name: "Asha".into(),
                last_name: "Rao".into(),
                email: "asha@example.com".into(),
                phone: None,
                position: "Analyst".into(),
                departments: vec!["Finance".into(), "Legal".into()],
                skills: vec![],
                status: EmployeeStatus::Active,
                hire_date: None,
                salary: None,
            })
            .await
            .unwrap();

        (stores, user.id)
    }

    #[tokio::test]
    async fn test_union_of_role_and_active_departments() {
        let (stores, user_id) = setup().await;
        let resolver = PermissionResolver::new(&stores, Duration::from_secs(60));

        let user = resolver.resolve(user_id).await.unwrap();
        assert_eq!(user.role_level, 20);
        assert!(user.has_permission("tasks.view"));
        assert!(user.has_permission("finance.view"));
        assert!(!user.has_permission("resources.manage"));
        assert_eq!(user.departments.len(), 2);
    }

    #[tokio::test]
    async fn test_cached_until_invalidated() {
        let (stores, user_id) = setup().await;
        let resolver = PermissionResolver::new(&stores, Duration::from_secs(60));
        assert!(resolver.resolve(user_id).await.unwrap().has_permission("finance.view"));

        let mut finance = stores.departments.find_by_name("finance").await.unwrap().unwrap();
        finance.permissions.clear();
        stores.departments.update(finance.id, finance).await.unwrap();

        assert!(resolver.resolve(user_id).await.unwrap().has_permission("finance.view"));
        resolver.invalidate_all();
        assert!(!resolver.resolve(user_id).await.unwrap().has_permission("finance.view"));
    }

    #[tokio::test]
    async fn test_unknown_user_is_unauthorized() {
        let stores = Stores::memory();
        let resolver = PermissionResolver::new(&stores, Duration::from_secs(60));
        let err = resolver.resolve(99).await.unwrap_err();
        assert_eq!(err.status_code(), 401);
    }
}
