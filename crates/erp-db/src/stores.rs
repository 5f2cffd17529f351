//! The full set of entity stores, backed either by PostgreSQL or by memory

use std::sync::Arc;

use erp_models::{
    ActivityLog, Budget, BudgetAlert, Chat, Contact, Department, Employee, Notification, Project,
    ResourceAllocation, Role, StoredFile, Task, User,
};
use sqlx::PgPool;

use crate::activities::{ActivityStore, PgActivityRepository};
use crate::allocations::{AllocationStore, PgAllocationRepository};
use crate::budgets::{BudgetAlertStore, BudgetStore, PgBudgetAlertRepository, PgBudgetRepository};
use crate::chats::{ChatStore, PgChatRepository};
use crate::contacts::{ContactStore, PgContactRepository};
use crate::departments::{DepartmentStore, PgDepartmentRepository};
use crate::employees::{EmployeeStore, PgEmployeeRepository};
use crate::files::{FileStore, PgFileRepository};
use crate::memory::MemoryTable;
use crate::notifications::{NotificationStore, PgNotificationRepository};
use crate::projects::{PgProjectRepository, ProjectStore};
use crate::roles::{PgRoleRepository, RoleStore};
use crate::tasks::{PgTaskRepository, TaskStore};
use crate::users::{PgUserRepository, UserStore};

/// Shared handles to every store; cheap to clone
#[derive(Clone)]
pub struct Stores {
    pub roles: Arc<dyn RoleStore>,
    pub users: Arc<dyn UserStore>,
    pub employees: Arc<dyn EmployeeStore>,
    pub departments: Arc<dyn DepartmentStore>,
    pub projects: Arc<dyn ProjectStore>,
    pub tasks: Arc<dyn TaskStore>,
    pub budgets: Arc<dyn BudgetStore>,
    pub budget_alerts: Arc<dyn BudgetAlertStore>,
    pub allocations: Arc<dyn AllocationStore>,
    pub contacts: Arc<dyn ContactStore>,
    pub chats: Arc<dyn ChatStore>,
    pub notifications: Arc<dyn NotificationStore>,
    pub activity: Arc<dyn ActivityStore>,
    pub files: Arc<dyn FileStore>,
}

impl Stores {
    pub fn postgres(pool: PgPool) -> Self {
        Self {
            roles: Arc::new(PgRoleRepository::new(pool.clone())),
            users: Arc::new(PgUserRepository::new(pool.clone())),
            employees: Arc::new(PgEmployeeRepository::new(pool.clone())),
            departments: Arc::new(PgDepartmentRepository::new(pool.clone())),
            projects: Arc::new(PgProjectRepository::new(pool.clone())),
            tasks: Arc::new(PgTaskRepository::new(pool.clone())),
            budgets: Arc::new(PgBudgetRepository::new(pool.clone())),
            budget_alerts: Arc::new(PgBudgetAlertRepository::new(pool.clone())),
            allocations: Arc::new(PgAllocationRepository::new(pool.clone())),
            contacts: Arc::new(PgContactRepository::new(pool.clone())),
            chats: Arc::new(PgChatRepository::new(pool.clone())),
            notifications: Arc::new(PgNotificationRepository::new(pool.clone())),
            activity: Arc::new(PgActivityRepository::new(pool.clone())),
            files: Arc::new(PgFileRepository::new(pool)),
        }
    }

    /// Process-local stores for development and tests
    pub fn memory() -> Self {
        Self {
            roles: Arc::new(MemoryTable::<Role>::new("Role")),
            users: Arc::new(MemoryTable::<User>::new("User")),
            employees: Arc::new(MemoryTable::<Employee>::new("Employee")),
            departments: Arc::new(MemoryTable::<Department>::new("Department")),
            projects: Arc::new(MemoryTable::<Project>::new("Project")),
            tasks: Arc::new(MemoryTable::<Task>::new("Task")),
            budgets: Arc::new(MemoryTable::<Budget>::new("Budget")),
            budget_alerts: Arc::new(MemoryTable::<BudgetAlert>::new("Budget alert")),
            allocations: Arc::new(MemoryTable::<ResourceAllocation>::new("Resource allocation")),
            contacts: Arc::new(MemoryTable::<Contact>::new("Contact")),
            chats: Arc::new(MemoryTable::<Chat>::new("Chat")),
            notifications: Arc::new(MemoryTable::<Notification>::new("Notification")),
            activity: Arc::new(MemoryTable::<ActivityLog>::new("Activity log")),
            files: Arc::new(MemoryTable::<StoredFile>::new("File")),
        }
    }
}
