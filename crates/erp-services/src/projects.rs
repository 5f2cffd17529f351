//! Project Service
//!
//! Visibility: holders of `projects.view_all` (or full access) see every
//! project, everyone else only the projects they are assigned to.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use erp_auth::{builtin, CurrentUser};
use erp_core::{ErpError, ErpResult, Id, Page, PaginationParams};
use erp_db::{
    BudgetFilter, BudgetStore, EmployeeStore, ProjectFilter, ProjectStore, ProjectViewer,
    TaskFilter, TaskStore,
};
use erp_models::{NewNotification, NewProject, NotificationKind, Priority, Project, ProjectStatus, TaskStatus};
use erp_notifications::{events, EventHub, NotificationService};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::support::{non_blank, publish};

/// List filters from the query string
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectQuery {
    pub status: Option<ProjectStatus>,
    pub priority: Option<Priority>,
    pub search: Option<String>,
    pub department: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectInput {
    pub name: Option<String>,
    pub description: Option<String>,
    pub status: Option<ProjectStatus>,
    pub priority: Option<Priority>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub budget: Option<f64>,
    pub manager_id: Option<Id>,
    #[serde(default)]
    pub team: Vec<Id>,
    #[serde(default)]
    pub members: Vec<Id>,
    pub department: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub status: Option<ProjectStatus>,
    pub priority: Option<Priority>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub budget: Option<f64>,
    pub progress: Option<i32>,
    pub manager_id: Option<Id>,
    pub members: Option<Vec<Id>>,
    pub department: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectStats {
    pub project_id: Id,
    pub total_tasks: i64,
    pub tasks_by_status: BTreeMap<String, i64>,
    pub completed_tasks: i64,
    pub completion_rate: f64,
    pub estimated_hours: f64,
    pub actual_hours: f64,
    pub budget: f64,
    pub spent: f64,
    pub budget_utilization: f64,
    pub progress: i32,
    pub team_size: usize,
}

#[derive(Clone)]
pub struct ProjectService {
    projects: Arc<dyn ProjectStore>,
    tasks: Arc<dyn TaskStore>,
    employees: Arc<dyn EmployeeStore>,
    budgets: Arc<dyn BudgetStore>,
    notifications: NotificationService,
    hub: EventHub,
}

impl ProjectService {
    pub fn new(
        projects: Arc<dyn ProjectStore>,
        tasks: Arc<dyn TaskStore>,
        employees: Arc<dyn EmployeeStore>,
        budgets: Arc<dyn BudgetStore>,
        notifications: NotificationService,
    ) -> Self {
        let hub = notifications.hub().clone();
        Self {
            projects,
            tasks,
            employees,
            budgets,
            notifications,
            hub,
        }
    }

    pub async fn list(
        &self,
        user: &CurrentUser,
        query: ProjectQuery,
        params: &PaginationParams,
    ) -> ErpResult<Page<Project>> {
        user.require(builtin::PROJECTS_VIEW)?;

        let filter = ProjectFilter {
            status: query.status,
            priority: query.priority,
            search: non_blank(query.search.as_deref()),
            department: non_blank(query.department.as_deref()),
            visible_to: viewer_scope(user),
        };
        let items = self
            .projects
            .list(&filter, params.limit(), params.offset())
            .await?;
        let total = self.projects.count_matching(&filter).await?;
        Ok(Page::new(items, total, params))
    }

    pub async fn get(&self, user: &CurrentUser, id: Id) -> ErpResult<Project> {
        user.require(builtin::PROJECTS_VIEW)?;
        let project = self.find(id).await?;
        ensure_visible(user, &project)?;
        Ok(project)
    }

    pub async fn create(&self, user: &CurrentUser, input: ProjectInput) -> ErpResult<Project> {
        user.require(builtin::PROJECTS_CREATE)?;

        let name = non_blank(input.name.as_deref())
            .ok_or_else(|| ErpError::invalid("name", "is required"))?;
        let start_date = input.start_date.unwrap_or_else(|| Utc::now().date_naive());
        check_dates(start_date, input.end_date)?;
        let budget = check_budget(input.budget.unwrap_or(0.0))?;

        if let Some(manager_id) = input.manager_id {
            self.ensure_employee(manager_id).await?;
        }
        let mut team = Vec::new();
        for employee_id in input.team {
            self.ensure_employee(employee_id).await?;
            if !team.contains(&employee_id) {
                team.push(employee_id);
            }
        }
        let mut members = input.members;
        if !members.contains(&user.id) {
            members.push(user.id);
        }
        members.dedup();

        let project = self
            .projects
            .create(NewProject {
                name,
                description: input.description.unwrap_or_default().trim().to_string(),
                status: input.status.unwrap_or_default(),
                priority: input.priority.unwrap_or_default(),
                start_date,
                end_date: input.end_date,
                budget,
                manager_id: input.manager_id,
                owner_id: user.id,
                team,
                members,
                department: non_blank(input.department.as_deref()),
            })
            .await?;

        info!(project_id = project.id, owner_id = user.id, "Project created");
        publish(&self.hub, events::PROJECT_CREATED, None, &project);
        if let Some(manager_id) = project.manager_id {
            self.notify_employee(manager_id, &project, "You are managing a new project")
                .await;
        }
        Ok(project)
    }

    pub async fn update(
        &self,
        user: &CurrentUser,
        id: Id,
        update: ProjectUpdate,
    ) -> ErpResult<Project> {
        let mut project = self.find(id).await?;
        user.require_assigned(
            builtin::PROJECTS_EDIT,
            project.is_assigned(user.id, user.employee_id),
            false,
        )?;

        if let Some(name) = update.name {
            project.name = non_blank(Some(&name))
                .ok_or_else(|| ErpError::invalid("name", "is required"))?;
        }
        if let Some(description) = update.description {
            project.description = description.trim().to_string();
        }
        if let Some(status) = update.status {
            project.status = status;
            if status == ProjectStatus::Completed {
                project.progress = 100;
            }
        }
        if let Some(priority) = update.priority {
            project.priority = priority;
        }
        if let Some(start_date) = update.start_date {
            project.start_date = start_date;
        }
        if update.end_date.is_some() {
            project.end_date = update.end_date;
        }
        check_dates(project.start_date, project.end_date)?;
        if let Some(budget) = update.budget {
            project.budget = check_budget(budget)?;
        }
        if let Some(progress) = update.progress {
            project.progress = progress.clamp(0, 100);
        }
        if let Some(manager_id) = update.manager_id {
            self.ensure_employee(manager_id).await?;
            project.manager_id = Some(manager_id);
        }
        if let Some(mut members) = update.members {
            if !members.contains(&project.owner_id) {
                members.push(project.owner_id);
            }
            members.sort_unstable();
            members.dedup();
            project.members = members;
        }
        if let Some(department) = update.department {
            project.department = non_blank(Some(&department));
        }

        let project = self.projects.update(id, project).await?;
        publish(&self.hub, events::PROJECT_UPDATED, None, &project);
        Ok(project)
    }

    /// Delete a project and its tasks
    pub async fn delete(&self, user: &CurrentUser, id: Id) -> ErpResult<()> {
        user.require(builtin::PROJECTS_DELETE)?;
        let project = self.find(id).await?;

        let removed_tasks = self.tasks.delete_for_project(id).await?;
        self.projects.delete(id).await?;

        info!(project_id = id, removed_tasks, "Project deleted");
        publish(
            &self.hub,
            events::PROJECT_DELETED,
            None,
            &json!({ "id": id, "name": project.name }),
        );
        Ok(())
    }

    pub async fn add_team_member(
        &self,
        user: &CurrentUser,
        id: Id,
        employee_id: Id,
    ) -> ErpResult<Project> {
        let mut project = self.find(id).await?;
        user.require_assigned(
            builtin::PROJECTS_EDIT,
            project.is_assigned(user.id, user.employee_id),
            false,
        )?;
        self.ensure_employee(employee_id).await?;

        if project.team.contains(&employee_id) {
            return Err(ErpError::conflict("Employee is already on the project team"));
        }
        project.team.push(employee_id);
        let project = self.projects.update(id, project).await?;

        publish(&self.hub, events::PROJECT_UPDATED, None, &project);
        self.notify_employee(employee_id, &project, "You were added to a project team")
            .await;
        Ok(project)
    }

    pub async fn remove_team_member(
        &self,
        user: &CurrentUser,
        id: Id,
        employee_id: Id,
    ) -> ErpResult<Project> {
        let mut project = self.find(id).await?;
        user.require_assigned(
            builtin::PROJECTS_EDIT,
            project.is_assigned(user.id, user.employee_id),
            false,
        )?;

        let before = project.team.len();
        project.team.retain(|&e| e != employee_id);
        if project.team.len() == before {
            return Err(ErpError::not_found("Team member", employee_id));
        }

        let project = self.projects.update(id, project).await?;
        publish(&self.hub, events::PROJECT_UPDATED, None, &project);
        Ok(project)
    }

    pub async fn stats(&self, user: &CurrentUser, id: Id) -> ErpResult<ProjectStats> {
        let project = self.get(user, id).await?;

        let tasks_by_status = self.tasks.count_by_status(Some(id)).await?;
        let total_tasks: i64 = tasks_by_status.values().sum();
        let completed_tasks = tasks_by_status
            .get(TaskStatus::Completed.as_str())
            .copied()
            .unwrap_or(0);

        let tasks = self
            .tasks
            .list(&TaskFilter::for_project(id), i64::MAX, 0)
            .await?;
        let estimated_hours = tasks.iter().map(|t| t.estimated_hours).sum();
        let actual_hours = tasks.iter().map(|t| t.actual_hours).sum();

        let spent: f64 = self
            .budgets
            .list(&BudgetFilter {
                project_id: Some(id),
                ..Default::default()
            })
            .await?
            .iter()
            .map(|b| b.actual_spent)
            .sum();

        Ok(ProjectStats {
            project_id: id,
            total_tasks,
            tasks_by_status,
            completed_tasks,
            completion_rate: percent(completed_tasks as f64, total_tasks as f64),
            estimated_hours,
            actual_hours,
            budget: project.budget,
            spent,
            budget_utilization: percent(spent, project.budget),
            progress: project.progress,
            team_size: project.team.len(),
        })
    }

    async fn find(&self, id: Id) -> ErpResult<Project> {
        self.projects
            .find_by_id(id)
            .await?
            .ok_or_else(|| ErpError::not_found("Project", id))
    }

    async fn ensure_employee(&self, employee_id: Id) -> ErpResult<()> {
        if !self.employees.exists(employee_id).await? {
            return Err(ErpError::not_found("Employee", employee_id));
        }
        Ok(())
    }

    /// Best effort: employees without a login are skipped
    async fn notify_employee(&self, employee_id: Id, project: &Project, message: &str) {
        let user_id = match self.employees.find_by_id(employee_id).await {
            Ok(Some(employee)) => employee.user_id,
            _ => None,
        };
        if let Some(user_id) = user_id {
            let notification = NewNotification::new(
                user_id,
                NotificationKind::Project,
                project.name.clone(),
                message,
            )
            .action_url(format!("/projects/{}", project.id))
            .metadata(json!({ "projectId": project.id }));
            if let Err(e) = self.notifications.send_to_user(notification).await {
                tracing::warn!(project_id = project.id, user_id, "Failed to notify: {}", e);
            }
        }
    }
}

/// `None` means every project is visible
pub(crate) fn viewer_scope(user: &CurrentUser) -> Option<ProjectViewer> {
    if user.has_permission(builtin::PROJECTS_VIEW_ALL) {
        None
    } else {
        Some(ProjectViewer {
            user_id: user.id,
            employee_id: user.employee_id,
        })
    }
}

pub(crate) fn ensure_visible(user: &CurrentUser, project: &Project) -> ErpResult<()> {
    if viewer_scope(user).is_some() && !project.is_assigned(user.id, user.employee_id) {
        return Err(ErpError::forbidden("You do not have access to this project"));
    }
    Ok(())
}

fn check_dates(start: NaiveDate, end: Option<NaiveDate>) -> ErpResult<()> {
    match end {
        Some(end) if end < start => Err(ErpError::invalid(
            "endDate",
            "must be on or after the start date",
        )),
        _ => Ok(()),
    }
}

fn check_budget(budget: f64) -> ErpResult<f64> {
    if !budget.is_finite() || budget < 0.0 {
        return Err(ErpError::invalid("budget", "must not be negative"));
    }
    Ok(budget)
}

pub(crate) fn percent(part: f64, whole: f64) -> f64 {
    if whole > 0.0 {
        (part / whole * 10_000.0).round() / 100.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{admin, employee_input, fixture, member};

    fn input(name: &str) -> ProjectInput {
        ProjectInput {
            name: Some(name.into()),
            start_date: NaiveDate::from_ymd_opt(2024, 1, 1),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_emits_and_adds_owner() {
        let fx = fixture().await;
        let mut rx = fx.hub.subscribe();

        let project = fx.services.projects.create(&admin(), input("Website")).await.unwrap();

        assert_eq!(project.owner_id, 1);
        assert!(project.members.contains(&1));
        let event = rx.recv().await.unwrap();
        assert_eq!(event.event, events::PROJECT_CREATED);
        assert_eq!(event.payload["name"], "Website");
    }

    #[tokio::test]
    async fn test_end_before_start_is_invalid() {
        let fx = fixture().await;
        let err = fx
            .services
            .projects
            .create(
                &admin(),
                ProjectInput {
                    end_date: NaiveDate::from_ymd_opt(2023, 12, 31),
                    ..input("Backwards")
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 422);
    }

    #[tokio::test]
    async fn test_members_only_see_assigned_projects() {
        let fx = fixture().await;
        let mine = fx.services.projects.create(&admin(), input("Mine")).await.unwrap();
        let _other = fx.services.projects.create(&admin(), input("Other")).await.unwrap();
        fx.services
            .projects
            .update(
                &admin(),
                mine.id,
                ProjectUpdate {
                    members: Some(vec![7]),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let viewer = member(7, &["projects.view"]);
        let page = fx
            .services
            .projects
            .list(&viewer, ProjectQuery::default(), &PaginationParams::default())
            .await
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].name, "Mine");

        let everyone = member(8, &["projects.view", "projects.view_all"]);
        let page = fx
            .services
            .projects
            .list(&everyone, ProjectQuery::default(), &PaginationParams::default())
            .await
            .unwrap();
        assert_eq!(page.total, 2);
    }

    #[tokio::test]
    async fn test_assigned_user_can_edit_without_permission() {
        let fx = fixture().await;
        let project = fx
            .services
            .projects
            .create(
                &admin(),
                ProjectInput {
                    members: vec![7],
                    ..input("Shared")
                },
            )
            .await
            .unwrap();

        let assigned = member(7, &[]);
        let updated = fx
            .services
            .projects
            .update(
                &assigned,
                project.id,
                ProjectUpdate {
                    progress: Some(140),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.progress, 100);

        let outsider = member(8, &[]);
        let err = fx
            .services
            .projects
            .update(&outsider, project.id, ProjectUpdate::default())
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 403);
    }

    #[tokio::test]
    async fn test_team_management() {
        let fx = fixture().await;
        let employee = fx.stores.employees.create(employee_input("e@x.io", &[])).await.unwrap();
        let project = fx.services.projects.create(&admin(), input("Team")).await.unwrap();

        let project = fx
            .services
            .projects
            .add_team_member(&admin(), project.id, employee.id)
            .await
            .unwrap();
        assert_eq!(project.team, vec![employee.id]);

        let err = fx
            .services
            .projects
            .add_team_member(&admin(), project.id, employee.id)
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 409);

        let project = fx
            .services
            .projects
            .remove_team_member(&admin(), project.id, employee.id)
            .await
            .unwrap();
        assert!(project.team.is_empty());
    }

    #[tokio::test]
    async fn test_delete_removes_tasks_and_emits() {
        let fx = fixture().await;
        let project = fx.services.projects.create(&admin(), input("Doomed")).await.unwrap();
        fx.create_task(project.id, "Only task").await;
        let mut rx = fx.hub.subscribe();

        fx.services.projects.delete(&admin(), project.id).await.unwrap();

        let event = rx.recv().await.unwrap();
        assert_eq!(event.event, events::PROJECT_DELETED);
        assert_eq!(fx.stores.tasks.count().await.unwrap(), 0);
    }

    #[test]
    fn test_percent() {
        assert_eq!(percent(1.0, 3.0), 33.33);
        assert_eq!(percent(5.0, 0.0), 0.0);
    }
}
