//! # erp-services
//!
//! Business logic services for ERP RS.
//!
//! Each service owns the rules of one area: validation, permission checks,
//! cascades across stores, notifications and real-time events. Handlers in
//! `erp-api` stay thin and call into [`Services`].

pub mod auth;
pub mod backup;
pub mod budgets;
pub mod chat;
pub mod contacts;
pub mod dashboard;
pub mod departments;
pub mod dependencies;
pub mod employees;
pub mod projects;
pub mod resources;
pub mod roles;
pub mod tasks;

mod support;

use std::sync::Arc;
use std::time::Duration;

use erp_auth::{JwtService, PermissionResolver};
use erp_core::config::AppConfig;
use erp_db::Stores;
use erp_notifications::{EventHub, NotificationService};

pub use auth::AuthService;
pub use backup::{BackupArchive, BackupService};
pub use budgets::BudgetService;
pub use chat::ChatService;
pub use contacts::ContactService;
pub use dashboard::{DashboardService, DashboardStats, DashboardStatsEmitter};
pub use departments::DepartmentService;
pub use employees::EmployeeService;
pub use projects::ProjectService;
pub use resources::ResourceService;
pub use roles::{RoleService, UserService};
pub use tasks::TaskService;

/// Every service, wired to one set of stores
#[derive(Clone)]
pub struct Services {
    pub auth: AuthService,
    pub roles: RoleService,
    pub users: UserService,
    pub departments: DepartmentService,
    pub employees: EmployeeService,
    pub projects: ProjectService,
    pub tasks: TaskService,
    pub budgets: BudgetService,
    pub resources: ResourceService,
    pub contacts: ContactService,
    pub chat: ChatService,
    pub notifications: NotificationService,
    pub dashboard: DashboardService,
    pub stats_emitter: DashboardStatsEmitter,
    pub backup: BackupService,
}

impl Services {
    pub fn new(
        stores: &Stores,
        hub: EventHub,
        resolver: Arc<PermissionResolver>,
        jwt: Arc<JwtService>,
        config: &AppConfig,
    ) -> Self {
        let notifications = NotificationService::new(stores.notifications.clone(), hub.clone());
        let dashboard = DashboardService::new(
            stores.clone(),
            Duration::from_secs(config.cache.dashboard_ttl_seconds),
        );
        let stats_emitter = DashboardStatsEmitter::new(
            dashboard.clone(),
            hub.clone(),
            Duration::from_millis(config.realtime.stats_debounce_ms),
        );

        Self {
            auth: AuthService::new(
                stores.users.clone(),
                stores.roles.clone(),
                stores.employees.clone(),
                jwt,
                resolver.clone(),
                config.auth.password_min_length,
            ),
            roles: RoleService::new(stores.roles.clone(), stores.users.clone(), resolver.clone()),
            users: UserService::new(stores.users.clone(), stores.roles.clone(), resolver.clone()),
            departments: DepartmentService::new(
                stores.departments.clone(),
                stores.employees.clone(),
                resolver.clone(),
            ),
            employees: EmployeeService::new(
                stores.employees.clone(),
                stores.departments.clone(),
                stores.users.clone(),
                resolver,
            ),
            projects: ProjectService::new(
                stores.projects.clone(),
                stores.tasks.clone(),
                stores.employees.clone(),
                stores.budgets.clone(),
                notifications.clone(),
            ),
            tasks: TaskService::new(
                stores.tasks.clone(),
                stores.projects.clone(),
                stores.employees.clone(),
                notifications.clone(),
            ),
            budgets: BudgetService::new(
                stores.budgets.clone(),
                stores.budget_alerts.clone(),
                stores.projects.clone(),
                notifications.clone(),
            ),
            resources: ResourceService::new(
                stores.allocations.clone(),
                stores.employees.clone(),
                stores.projects.clone(),
            ),
            contacts: ContactService::new(stores.contacts.clone()),
            chat: ChatService::new(
                stores.chats.clone(),
                stores.users.clone(),
                stores.files.clone(),
                hub,
            ),
            notifications,
            dashboard,
            stats_emitter,
            backup: BackupService::new(stores.clone()),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::NaiveDate;
    use erp_auth::{CurrentUser, JwtService, PermissionResolver};
    use erp_core::config::AppConfig;
    use erp_db::{seed_default_roles, Stores};
    use erp_models::{EmployeeStatus, NewEmployee, Project, Task, User};
    use erp_notifications::EventHub;

    use crate::auth::RegisterInput;
    use crate::projects::ProjectInput;
    use crate::tasks::TaskInput;
    use crate::Services;

    pub struct Fixture {
        pub stores: Stores,
        pub hub: EventHub,
        pub resolver: Arc<PermissionResolver>,
        pub services: Services,
    }

    /// Memory stores with the default roles seeded
    pub async fn fixture() -> Fixture {
        let stores = Stores::memory();
        seed_default_roles(stores.roles.as_ref()).await.unwrap();

        let hub = EventHub::new(64);
        let resolver = Arc::new(PermissionResolver::new(&stores, Duration::from_secs(60)));
        let jwt = Arc::new(JwtService::new(b"test-secret", 3600));
        let services = Services::new(&stores, hub.clone(), resolver.clone(), jwt, &AppConfig::default());

        Fixture {
            stores,
            hub,
            resolver,
            services,
        }
    }

    impl Fixture {
        /// The first registered user becomes Root
        pub async fn register(&self, email: &str) -> User {
            self.services
                .auth
                .register(RegisterInput {
                    name: "Test User".into(),
                    email: email.into(),
                    password: "password1".into(),
                    role_id: None,
                })
                .await
                .unwrap()
                .user
        }

        pub async fn create_project(&self, name: &str) -> Project {
            self.services
                .projects
                .create(
                    &admin(),
                    ProjectInput {
                        name: Some(name.into()),
                        start_date: NaiveDate::from_ymd_opt(2024, 1, 1),
                        ..Default::default()
                    },
                )
                .await
                .unwrap()
        }

        /// Unassigned task with a four hour estimate
        pub async fn create_task(&self, project_id: i64, title: &str) -> Task {
            self.services
                .tasks
                .create(
                    &admin(),
                    TaskInput {
                        project_id: Some(project_id),
                        title: Some(title.into()),
                        estimated_hours: Some(4.0),
                        ..Default::default()
                    },
                )
                .await
                .unwrap()
        }
    }

    pub fn admin() -> CurrentUser {
        CurrentUser::new(1, "Admin", "admin@x.io").with_role(1, "Root", 100)
    }

    pub fn member(id: i64, permissions: &[&str]) -> CurrentUser {
        let mut user = CurrentUser::new(id, format!("User {}", id), format!("user{}@x.io", id))
            .with_role(4, "Employee", 20);
        user.grant(permissions.iter().copied());
        user
    }

    pub fn employee_input(email: &str, departments: &[&str]) -> NewEmployee {
        NewEmployee {
            user_id: None,
            first_name: "Test".into(),
            last_name: email.into(),
            email: email.into(),
            phone: None,
            position: "Engineer".into(),
            departments: departments.iter().map(|d| d.to_string()).collect(),
            skills: Vec::new(),
            status: EmployeeStatus::Active,
            hire_date: None,
            salary: None,
        }
    }
}
