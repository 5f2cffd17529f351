//! # erp-db
//!
//! Database layer for ERP RS.
//!
//! This crate provides PostgreSQL access using SQLx, including:
//!
//! - Connection pool management and embedded migrations
//! - Repository traits for every entity, with PostgreSQL implementations
//! - In-memory implementations of the same traits for development and tests
//!
//! ## Example
//!
//! ```ignore
//! use erp_db::{Database, DatabaseConfig, Stores};
//!
//! let db = Database::connect(&DatabaseConfig::default()).await?;
//! db.migrate().await?;
//!
//! let stores = Stores::postgres(db.pool().clone());
//! let project = stores.projects.find_by_id(1).await?;
//! ```

pub mod activities;
pub mod allocations;
pub mod budgets;
pub mod chats;
pub mod contacts;
pub mod departments;
pub mod employees;
pub mod files;
pub mod memory;
pub mod notifications;
pub mod pool;
pub mod projects;
pub mod repository;
pub mod roles;
pub mod stores;
pub mod tasks;
pub mod users;

// Re-exports
pub use activities::{ActivityCounts, ActivityFilter, ActivityStore};
pub use allocations::{AllocationFilter, AllocationStore};
pub use budgets::{BudgetAlertStore, BudgetFilter, BudgetStore};
pub use chats::ChatStore;
pub use contacts::{ContactFilter, ContactStore, ContactViewer};
pub use departments::{DepartmentFilter, DepartmentStore};
pub use employees::{EmployeeFilter, EmployeeStore};
pub use files::FileStore;
pub use memory::MemoryTable;
pub use notifications::NotificationStore;
pub use pool::{Database, DatabaseConfig, PoolStats};
pub use projects::{ProjectFilter, ProjectStore, ProjectViewer};
pub use repository::{Repository, RepositoryError, RepositoryResult};
pub use roles::{seed_default_roles, RoleStore};
pub use stores::Stores;
pub use tasks::{TaskFilter, TaskStore};
pub use users::{UserFilter, UserStore};
