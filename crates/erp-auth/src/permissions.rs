//! Permission system for ERP RS
//!
//! A user's effective permissions are the union of their role's permissions
//! and the permissions of every active department their employee record
//! belongs to. Roles at [`FULL_ACCESS_LEVEL`] or above pass every check.

use std::collections::BTreeSet;

use erp_core::{ErpError, ErpResult, Id};
use erp_models::FULL_ACCESS_LEVEL;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

/// Permission granting everything
pub const WILDCARD: &str = "*";

static PERMISSION_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z]+\.[a-z_]+$").expect("permission name pattern is valid")
});

// ============================================================================
// Permission Definition
// ============================================================================

/// Built-in permission definition
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Permission {
    pub name: &'static str,
    pub category: &'static str,
    pub description: &'static str,
}

const fn permission(
    name: &'static str,
    category: &'static str,
    description: &'static str,
) -> Permission {
    Permission {
        name,
        category,
        description,
    }
}

/// All built-in permissions
pub mod builtin {
    use super::{permission, Permission};

    pub const EMPLOYEES_VIEW: &str = "employees.view";
    pub const EMPLOYEES_MANAGE: &str = "employees.manage";
    pub const DEPARTMENTS_MANAGE: &str = "departments.manage";
    pub const PROJECTS_VIEW: &str = "projects.view";
    pub const PROJECTS_VIEW_ALL: &str = "projects.view_all";
    pub const PROJECTS_CREATE: &str = "projects.create";
    pub const PROJECTS_EDIT: &str = "projects.edit";
    pub const PROJECTS_DELETE: &str = "projects.delete";
    pub const TASKS_VIEW: &str = "tasks.view";
    pub const TASKS_CREATE: &str = "tasks.create";
    pub const TASKS_EDIT: &str = "tasks.edit";
    pub const TASKS_DELETE: &str = "tasks.delete";
    pub const FINANCE_VIEW: &str = "finance.view";
    pub const FINANCE_MANAGE: &str = "finance.manage";
    pub const FINANCE_APPROVE: &str = "finance.approve";
    pub const CONTACTS_VIEW: &str = "contacts.view";
    pub const CONTACTS_MANAGE: &str = "contacts.manage";
    pub const RESOURCES_VIEW: &str = "resources.view";
    pub const RESOURCES_MANAGE: &str = "resources.manage";
    pub const ADMIN_ACTIVITY: &str = "admin.activity";
    pub const ADMIN_BACKUP: &str = "admin.backup";
    pub const ROLES_MANAGE: &str = "roles.manage";
    pub const USERS_MANAGE: &str = "users.manage";

    pub const CATALOG: &[Permission] = &[
        permission(EMPLOYEES_VIEW, "hr", "View employees and departments"),
        permission(EMPLOYEES_MANAGE, "hr", "Create, edit and remove employees"),
        permission(DEPARTMENTS_MANAGE, "hr", "Manage departments and their permissions"),
        permission(PROJECTS_VIEW, "projects", "View assigned projects"),
        permission(PROJECTS_VIEW_ALL, "projects", "View every project"),
        permission(PROJECTS_CREATE, "projects", "Create projects"),
        permission(PROJECTS_EDIT, "projects", "Edit projects and their teams"),
        permission(PROJECTS_DELETE, "projects", "Delete projects"),
        permission(TASKS_VIEW, "tasks", "View tasks"),
        permission(TASKS_CREATE, "tasks", "Create tasks"),
        permission(TASKS_EDIT, "tasks", "Edit tasks, comment and log time"),
        permission(TASKS_DELETE, "tasks", "Delete tasks"),
        permission(FINANCE_VIEW, "finance", "View budgets"),
        permission(FINANCE_MANAGE, "finance", "Create and edit budgets, record expenses"),
        permission(FINANCE_APPROVE, "finance", "Approve or reject budgets"),
        permission(CONTACTS_VIEW, "crm", "View contacts"),
        permission(CONTACTS_MANAGE, "crm", "Create and edit contacts"),
        permission(RESOURCES_VIEW, "resources", "View allocations and capacity"),
        permission(RESOURCES_MANAGE, "resources", "Allocate employees to projects"),
        permission(ADMIN_ACTIVITY, "admin", "Read the activity log"),
        permission(ADMIN_BACKUP, "admin", "Download database backups"),
        permission(ROLES_MANAGE, "admin", "Manage roles"),
        permission(USERS_MANAGE, "admin", "Manage user accounts"),
    ];
}

/// Whether `name` is a well-formed permission name (`area.action`)
pub fn is_valid_permission_name(name: &str) -> bool {
    name == WILDCARD || PERMISSION_NAME.is_match(name)
}

/// Reject a permission list containing malformed names
pub fn validate_permission_names(names: &[String]) -> ErpResult<()> {
    match names.iter().find(|n| !is_valid_permission_name(n)) {
        Some(bad) => Err(ErpError::invalid(
            "permissions",
            format!("Invalid permission name: {}", bad),
        )),
        None => Ok(()),
    }
}

// ============================================================================
// User Context
// ============================================================================

/// Current user with resolved permissions
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentUser {
    pub id: Id,
    pub name: String,
    pub email: String,
    pub role_id: Option<Id>,
    pub role_name: Option<String>,
    pub role_level: i32,
    /// Linked HR record, if any
    pub employee_id: Option<Id>,
    pub departments: Vec<String>,
    permissions: BTreeSet<String>,
}

impl CurrentUser {
    pub fn new(id: Id, name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            email: email.into(),
            role_id: None,
            role_name: None,
            role_level: 0,
            employee_id: None,
            departments: Vec::new(),
            permissions: BTreeSet::new(),
        }
    }

    pub fn with_role(mut self, id: Id, name: impl Into<String>, level: i32) -> Self {
        self.role_id = Some(id);
        self.role_name = Some(name.into());
        self.role_level = level;
        self
    }

    pub fn with_employee(mut self, employee_id: Id, departments: Vec<String>) -> Self {
        self.employee_id = Some(employee_id);
        self.departments = departments;
        self
    }

    /// Add permissions to the set
    pub fn grant<I, S>(&mut self, permissions: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.permissions.extend(permissions.into_iter().map(Into::into));
    }

    pub fn permissions(&self) -> impl Iterator<Item = &str> {
        self.permissions.iter().map(String::as_str)
    }

    pub fn has_full_access(&self) -> bool {
        self.role_level >= FULL_ACCESS_LEVEL || self.permissions.contains(WILDCARD)
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.has_full_access() || self.permissions.contains(permission)
    }

    pub fn require(&self, permission: &str) -> ErpResult<()> {
        if self.has_permission(permission) {
            Ok(())
        } else {
            Err(ErpError::forbidden(format!(
                "Permission required: {}",
                permission
            )))
        }
    }

    pub fn require_all(&self, permissions: &[&str]) -> ErpResult<()> {
        permissions.iter().try_for_each(|p| self.require(p))
    }

    /// Assignment-aware check for tasks and projects.
    ///
    /// Full access and assigned users pass. Everyone else needs `permission`,
    /// and is refused outright when the operation requires assignment.
    pub fn require_assigned(
        &self,
        permission: &str,
        assigned: bool,
        requires_assignment: bool,
    ) -> ErpResult<()> {
        if self.has_full_access() || assigned {
            return Ok(());
        }
        self.require(permission)?;
        if requires_assignment {
            return Err(ErpError::forbidden(
                "You must be assigned to this resource",
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn member() -> CurrentUser {
        let mut user = CurrentUser::new(7, "Asha", "asha@example.com").with_role(4, "Employee", 20);
        user.grant(["tasks.view", "projects.view"]);
        user
    }

    #[test]
    fn test_permission_names() {
        assert!(is_valid_permission_name("finance.view"));
        assert!(is_valid_permission_name("projects.view_all"));
        assert!(is_valid_permission_name("*"));
        assert!(!is_valid_permission_name("Finance.view"));
        assert!(!is_valid_permission_name("finance"));
        assert!(!is_valid_permission_name("finance.view.all"));
        assert!(validate_permission_names(&["tasks.edit".into(), "bad name".into()]).is_err());
    }

    #[test]
    fn test_catalog_names_are_valid_and_unique() {
        let names: BTreeSet<_> = builtin::CATALOG.iter().map(|p| p.name).collect();
        assert_eq!(names.len(), builtin::CATALOG.len());
        assert!(builtin::CATALOG.iter().all(|p| is_valid_permission_name(p.name)));
    }

    #[test]
    fn test_full_access_level() {
        let director = CurrentUser::new(1, "Dee", "dee@example.com").with_role(2, "Director", 80);
        assert!(director.has_permission("finance.approve"));

        let manager = CurrentUser::new(1, "Max", "max@example.com").with_role(3, "Manager", 60);
        assert!(!manager.has_permission("finance.approve"));
    }

    #[test]
    fn test_require_reports_missing_permission() {
        let err = member().require("finance.view").unwrap_err();
        assert_eq!(err.status_code(), 403);
        assert_eq!(err.to_string(), "Permission required: finance.view");
    }

    #[test]
    fn test_assignment_checks() {
        let user = member();

        // assigned users pass without the permission
        assert!(user.require_assigned("tasks.edit", true, true).is_ok());
        // unassigned users need the permission
        assert!(user.require_assigned("tasks.edit", false, false).is_err());

        let mut editor = member();
        editor.grant(["tasks.edit"]);
        assert!(editor.require_assigned("tasks.edit", false, false).is_ok());
        assert!(editor.require_assigned("tasks.edit", false, true).is_err());
    }
}
