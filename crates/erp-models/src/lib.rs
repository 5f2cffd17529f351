//! # erp-models
//!
//! Domain entities for ERP RS. Each entity doubles as its database row
//! (`sqlx::FromRow`, snake_case columns) and its JSON representation
//! (camelCase). Status enums are stored as text; embedded collections
//! (budget categories, task comments, chat messages) are stored as JSONB.

#[macro_use]
mod macros;

pub mod activity;
pub mod allocation;
pub mod budget;
pub mod chat;
pub mod contact;
pub mod department;
pub mod employee;
pub mod file;
pub mod notification;
pub mod project;
pub mod role;
pub mod task;
pub mod user;

pub use activity::{ActivityAction, ActivityLog, NewActivityLog};
pub use allocation::{AllocationStatus, NewResourceAllocation, ResourceAllocation};
pub use budget::{
    AlertSeverity, ApprovalDecision, Budget, BudgetAlert, BudgetApproval, BudgetCategory,
    BudgetStatus, BudgetType, NewBudget, NewBudgetAlert,
};
pub use chat::{Chat, ChatMessage, NewChat};
pub use contact::{Contact, ContactVisibility, NewContact};
pub use department::{Department, DepartmentManager, DepartmentStatus, NewDepartment};
pub use employee::{Employee, EmployeeStatus, NewEmployee};
pub use file::{FileContext, NewStoredFile, StoredFile};
pub use notification::{NewNotification, Notification, NotificationKind, NotificationPriority};
pub use project::{NewProject, Priority, Project, ProjectStatus};
pub use role::{NewRole, Role, FULL_ACCESS_LEVEL};
pub use task::{
    DependencyType, NewTask, Task, TaskComment, TaskDependency, TaskStatus, TimeEntry,
};
pub use user::{NewUser, User, UserStatus};

/// Error for text values that do not name an enum variant
#[derive(Debug, Clone, thiserror::Error)]
#[error("invalid {kind} value: '{value}'")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

/// Conversion from an insert DTO into a persisted record
pub trait NewRecord<T> {
    fn into_record(self, id: erp_core::Id, now: chrono::DateTime<chrono::Utc>) -> T;
}
