//! Task Service
//!
//! Edits, comments and time logging use the assignment-aware check:
//! the assignee and anyone assigned to the task's project always pass.
//! Dependencies stay within one project and never form a cycle.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use erp_auth::{builtin, CurrentUser};
use erp_core::{ErpError, ErpResult, Id, Page, PaginationParams};
use erp_db::{EmployeeStore, ProjectStore, TaskFilter, TaskStore};
use erp_models::{
    NewNotification, NewTask, NotificationKind, Priority, Task, TaskComment, TaskStatus, TimeEntry,
};
use erp_notifications::{events, EventHub, NotificationService};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::dependencies::{
    self, BlockedStatus, CriticalPath, DependencyInput, GraphNode, GraphQuery,
};
use crate::projects::{ensure_visible, percent};
use crate::support::{non_blank, publish};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskQuery {
    pub project_id: Option<Id>,
    pub assigned_to: Option<Id>,
    pub status: Option<TaskStatus>,
    pub priority: Option<Priority>,
    pub search: Option<String>,
}

impl From<TaskQuery> for TaskFilter {
    fn from(query: TaskQuery) -> Self {
        TaskFilter {
            project_id: query.project_id,
            assigned_to: query.assigned_to,
            status: query.status,
            priority: query.priority,
            search: non_blank(query.search.as_deref()),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskInput {
    pub project_id: Option<Id>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<TaskStatus>,
    pub priority: Option<Priority>,
    pub assigned_to: Option<Id>,
    pub due_date: Option<NaiveDate>,
    pub estimated_hours: Option<f64>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<TaskStatus>,
    pub priority: Option<Priority>,
    pub assigned_to: Option<Id>,
    pub due_date: Option<NaiveDate>,
    pub estimated_hours: Option<f64>,
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommentInput {
    pub text: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TimeLogInput {
    pub hours: f64,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskTime {
    pub id: Id,
    pub title: String,
    pub status: TaskStatus,
    pub estimated_hours: f64,
    pub actual_hours: f64,
    pub variance: f64,
}

/// Estimated against actual hours across a set of tasks
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeTracking {
    pub task_count: usize,
    pub total_estimated: f64,
    pub total_actual: f64,
    pub variance: f64,
    pub variance_percent: f64,
    pub tasks: Vec<TaskTime>,
}

#[derive(Clone)]
pub struct TaskService {
    tasks: Arc<dyn TaskStore>,
    projects: Arc<dyn ProjectStore>,
    employees: Arc<dyn EmployeeStore>,
    notifications: NotificationService,
    hub: EventHub,
}

impl TaskService {
    pub fn new(
        tasks: Arc<dyn TaskStore>,
        projects: Arc<dyn ProjectStore>,
        employees: Arc<dyn EmployeeStore>,
        notifications: NotificationService,
    ) -> Self {
        let hub = notifications.hub().clone();
        Self {
            tasks,
            projects,
            employees,
            notifications,
            hub,
        }
    }

    /// Without `tasks.view` a user only sees tasks assigned to them
    pub async fn list(
        &self,
        user: &CurrentUser,
        query: TaskQuery,
        params: &PaginationParams,
    ) -> ErpResult<Page<Task>> {
        let filter = self.scoped(user, query.into())?;
        let items = self
            .tasks
            .list(&filter, params.limit(), params.offset())
            .await?;
        let total = self.tasks.count_matching(&filter).await?;
        Ok(Page::new(items, total, params))
    }

    pub async fn get(&self, user: &CurrentUser, id: Id) -> ErpResult<Task> {
        let task = self.find(id).await?;
        user.require_assigned(builtin::TASKS_VIEW, self.is_assigned(user, &task).await?, false)?;
        Ok(task)
    }

    pub async fn create(&self, user: &CurrentUser, input: TaskInput) -> ErpResult<Task> {
        user.require(builtin::TASKS_CREATE)?;

        let project_id = input
            .project_id
            .ok_or_else(|| ErpError::invalid("projectId", "is required"))?;
        let project = self
            .projects
            .find_by_id(project_id)
            .await?
            .ok_or_else(|| ErpError::not_found("Project", project_id))?;
        ensure_visible(user, &project)?;
        if project.is_closed() {
            return Err(ErpError::bad_request("Cannot add tasks to a closed project"));
        }

        let title = non_blank(input.title.as_deref())
            .ok_or_else(|| ErpError::invalid("title", "is required"))?;
        let estimated_hours = check_hours("estimatedHours", input.estimated_hours.unwrap_or(0.0))?;
        if let Some(employee_id) = input.assigned_to {
            self.ensure_employee(employee_id).await?;
        }

        let task = self
            .tasks
            .create(NewTask {
                project_id,
                title,
                description: input.description.unwrap_or_default().trim().to_string(),
                status: input.status.unwrap_or_default(),
                priority: input.priority.unwrap_or_default(),
                assigned_to: input.assigned_to,
                created_by: user.id,
                due_date: input.due_date,
                estimated_hours,
                tags: clean_tags(input.tags),
            })
            .await?;

        info!(task_id = task.id, project_id, "Task created");
        publish(&self.hub, events::TASK_CREATED, None, &task);
        if let Some(employee_id) = task.assigned_to {
            self.notify_assignee(employee_id, &task, user).await;
        }
        Ok(task)
    }

    pub async fn update(&self, user: &CurrentUser, id: Id, update: TaskUpdate) -> ErpResult<Task> {
        let mut task = self.find(id).await?;
        user.require_assigned(builtin::TASKS_EDIT, self.is_assigned(user, &task).await?, false)?;

        if let Some(title) = update.title {
            task.title = non_blank(Some(&title))
                .ok_or_else(|| ErpError::invalid("title", "is required"))?;
        }
        if let Some(description) = update.description {
            task.description = description.trim().to_string();
        }
        if let Some(status) = update.status {
            task.set_status(status, Utc::now());
        }
        if let Some(priority) = update.priority {
            task.priority = priority;
        }
        if update.due_date.is_some() {
            task.due_date = update.due_date;
        }
        if let Some(hours) = update.estimated_hours {
            task.estimated_hours = check_hours("estimatedHours", hours)?;
        }
        if let Some(tags) = update.tags {
            task.tags = clean_tags(tags);
        }

        let newly_assigned = match update.assigned_to {
            Some(employee_id) if task.assigned_to != Some(employee_id) => {
                self.ensure_employee(employee_id).await?;
                task.assigned_to = Some(employee_id);
                Some(employee_id)
            }
            _ => None,
        };

        let task = self.tasks.update(id, task).await?;
        publish(&self.hub, events::TASK_UPDATED, None, &task);
        if let Some(employee_id) = newly_assigned {
            self.notify_assignee(employee_id, &task, user).await;
        }
        Ok(task)
    }

    pub async fn update_status(
        &self,
        user: &CurrentUser,
        id: Id,
        status: TaskStatus,
    ) -> ErpResult<Task> {
        self.update(
            user,
            id,
            TaskUpdate {
                status: Some(status),
                ..Default::default()
            },
        )
        .await
    }

    pub async fn delete(&self, user: &CurrentUser, id: Id) -> ErpResult<()> {
        user.require(builtin::TASKS_DELETE)?;
        let task = self.find(id).await?;
        self.tasks.delete(id).await?;
        let unlinked = self.tasks.drop_dependency_on(id).await?;

        info!(task_id = id, project_id = task.project_id, unlinked, "Task deleted");
        publish(
            &self.hub,
            events::TASK_DELETED,
            None,
            &json!({ "id": id, "projectId": task.project_id }),
        );
        Ok(())
    }

    pub async fn add_comment(
        &self,
        user: &CurrentUser,
        id: Id,
        input: CommentInput,
    ) -> ErpResult<Task> {
        let mut task = self.find(id).await?;
        user.require_assigned(builtin::TASKS_EDIT, self.is_assigned(user, &task).await?, false)?;

        let text = non_blank(Some(&input.text))
            .ok_or_else(|| ErpError::invalid("text", "is required"))?;
        task.comments.0.push(TaskComment {
            id: Uuid::new_v4(),
            user_id: user.id,
            user_name: user.name.clone(),
            text,
            created_at: Utc::now(),
        });

        let task = self.tasks.update(id, task).await?;
        publish(&self.hub, events::TASK_UPDATED, None, &task);
        Ok(task)
    }

    pub async fn log_time(
        &self,
        user: &CurrentUser,
        id: Id,
        input: TimeLogInput,
    ) -> ErpResult<Task> {
        let mut task = self.find(id).await?;
        user.require_assigned(builtin::TASKS_EDIT, self.is_assigned(user, &task).await?, false)?;

        if !input.hours.is_finite() || input.hours <= 0.0 {
            return Err(ErpError::invalid("hours", "must be greater than 0"));
        }
        task.log_time(TimeEntry {
            id: Uuid::new_v4(),
            user_id: user.id,
            hours: input.hours,
            note: non_blank(input.note.as_deref()),
            logged_at: Utc::now(),
        });

        let task = self.tasks.update(id, task).await?;
        info!(task_id = id, hours = input.hours, "Time logged");
        publish(&self.hub, events::TASK_UPDATED, None, &task);
        Ok(task)
    }

    pub async fn add_dependency(
        &self,
        user: &CurrentUser,
        id: Id,
        input: DependencyInput,
    ) -> ErpResult<Task> {
        let depends_on = input
            .depends_on
            .ok_or_else(|| ErpError::bad_request("Dependency task ID required"))?;
        let mut task = self.find(id).await?;
        user.require_assigned(builtin::TASKS_EDIT, self.is_assigned(user, &task).await?, false)?;

        let dependency = self.find(depends_on).await?;
        if dependency.project_id != task.project_id {
            return Err(ErpError::bad_request(
                "Dependencies must belong to the same project",
            ));
        }
        let siblings = self
            .tasks
            .list(&TaskFilter::for_project(task.project_id), i64::MAX, 0)
            .await?;
        if dependencies::creates_cycle(&siblings, id, depends_on) {
            return Err(ErpError::bad_request("Circular dependency detected"));
        }

        if !task.add_dependency(depends_on, input.kind.unwrap_or_default()) {
            return Ok(task);
        }
        let task = self.tasks.update(id, task).await?;
        info!(task_id = id, depends_on, "Task dependency added");
        publish(
            &self.hub,
            events::TASK_DEPENDENCY_ADDED,
            None,
            &json!({ "taskId": id, "dependsOn": depends_on }),
        );
        Ok(task)
    }

    /// Removing a dependency that is not there is a no-op
    pub async fn remove_dependency(
        &self,
        user: &CurrentUser,
        id: Id,
        dependency_id: Id,
    ) -> ErpResult<Task> {
        let mut task = self.find(id).await?;
        user.require_assigned(builtin::TASKS_EDIT, self.is_assigned(user, &task).await?, false)?;

        if !task.remove_dependency(dependency_id) {
            return Ok(task);
        }
        let task = self.tasks.update(id, task).await?;
        publish(
            &self.hub,
            events::TASK_DEPENDENCY_REMOVED,
            None,
            &json!({ "taskId": id, "dependencyId": dependency_id }),
        );
        Ok(task)
    }

    pub async fn dependency_graph(
        &self,
        user: &CurrentUser,
        query: GraphQuery,
    ) -> ErpResult<Vec<GraphNode>> {
        let filter = self.scoped(
            user,
            TaskFilter {
                project_id: query.project_id,
                ..Default::default()
            },
        )?;
        let tasks = self.tasks.list(&filter, i64::MAX, 0).await?;
        Ok(tasks.iter().map(GraphNode::from).collect())
    }

    pub async fn critical_path(&self, user: &CurrentUser, query: GraphQuery) -> ErpResult<CriticalPath> {
        user.require(builtin::TASKS_VIEW)?;
        let project_id = query
            .project_id
            .ok_or_else(|| ErpError::bad_request("Project ID required"))?;
        let project = self
            .projects
            .find_by_id(project_id)
            .await?
            .ok_or_else(|| ErpError::not_found("Project", project_id))?;
        ensure_visible(user, &project)?;

        let tasks = self
            .tasks
            .list(&TaskFilter::for_project(project_id), i64::MAX, 0)
            .await?;
        Ok(dependencies::critical_path(&tasks))
    }

    pub async fn blocked(&self, user: &CurrentUser, id: Id) -> ErpResult<BlockedStatus> {
        let task = self.get(user, id).await?;
        let mut upstream = Vec::with_capacity(task.dependencies.len());
        for dependency in task.dependencies.iter() {
            if let Some(dep) = self.tasks.find_by_id(dependency.task_id).await? {
                upstream.push(dep);
            }
        }
        Ok(dependencies::blockers(&task, &upstream))
    }

    pub async fn time_tracking(&self, user: &CurrentUser, query: TaskQuery) -> ErpResult<TimeTracking> {
        let filter = self.scoped(user, query.into())?;
        let tasks = self.tasks.list(&filter, i64::MAX, 0).await?;
        Ok(summarize_time(&tasks))
    }

    fn scoped(&self, user: &CurrentUser, mut filter: TaskFilter) -> ErpResult<TaskFilter> {
        if user.has_permission(builtin::TASKS_VIEW) {
            return Ok(filter);
        }
        match user.employee_id {
            Some(employee_id) => {
                filter.assigned_to = Some(employee_id);
                Ok(filter)
            }
            None => Err(ErpError::forbidden(format!(
                "Permission required: {}",
                builtin::TASKS_VIEW
            ))),
        }
    }

    async fn find(&self, id: Id) -> ErpResult<Task> {
        self.tasks
            .find_by_id(id)
            .await?
            .ok_or_else(|| ErpError::not_found("Task", id))
    }

    /// Direct assignment, or membership of the task's project
    async fn is_assigned(&self, user: &CurrentUser, task: &Task) -> ErpResult<bool> {
        if task.assigned_to.is_some() && task.assigned_to == user.employee_id {
            return Ok(true);
        }
        let project = self.projects.find_by_id(task.project_id).await?;
        Ok(project.map_or(false, |p| p.is_assigned(user.id, user.employee_id)))
    }

    async fn ensure_employee(&self, employee_id: Id) -> ErpResult<()> {
        if !self.employees.exists(employee_id).await? {
            return Err(ErpError::not_found("Employee", employee_id));
        }
        Ok(())
    }

    async fn notify_assignee(&self, employee_id: Id, task: &Task, assigner: &CurrentUser) {
        let user_id = match self.employees.find_by_id(employee_id).await {
            Ok(Some(employee)) => employee.user_id,
            Ok(None) => None,
            Err(e) => {
                warn!(employee_id, "Failed to look up assignee: {}", e);
                None
            }
        };
        let Some(user_id) = user_id else {
            return;
        };
        if user_id == assigner.id {
            return;
        }

        let notification = NewNotification::new(
            user_id,
            NotificationKind::Task,
            "New task assigned",
            format!("{} assigned you \"{}\"", assigner.name, task.title),
        )
        .action_url(format!("/projects/{}/tasks/{}", task.project_id, task.id))
        .metadata(json!({ "taskId": task.id, "projectId": task.project_id }));

        if let Err(e) = self.notifications.send_to_user(notification).await {
            warn!(task_id = task.id, user_id, "Failed to notify assignee: {}", e);
        }
    }
}

fn check_hours(field: &str, hours: f64) -> ErpResult<f64> {
    if !hours.is_finite() || hours < 0.0 {
        return Err(ErpError::invalid(field, "must not be negative"));
    }
    Ok(hours)
}

fn clean_tags(tags: Vec<String>) -> Vec<String> {
    let mut tags: Vec<String> = tags
        .iter()
        .filter_map(|t| non_blank(Some(t)))
        .collect();
    tags.sort();
    tags.dedup();
    tags
}

pub(crate) fn summarize_time(tasks: &[Task]) -> TimeTracking {
    let total_estimated: f64 = tasks.iter().map(|t| t.estimated_hours).sum();
    let total_actual: f64 = tasks.iter().map(|t| t.actual_hours).sum();
    let variance = total_actual - total_estimated;

    TimeTracking {
        task_count: tasks.len(),
        total_estimated,
        total_actual,
        variance,
        variance_percent: percent(variance, total_estimated),
        tasks: tasks
            .iter()
            .map(|t| TaskTime {
                id: t.id,
                title: t.title.clone(),
                status: t.status,
                estimated_hours: t.estimated_hours,
                actual_hours: t.actual_hours,
                variance: t.actual_hours - t.estimated_hours,
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{admin, employee_input, fixture, member};

    #[tokio::test]
    async fn test_create_requires_existing_project() {
        let fx = fixture().await;
        let err = fx
            .services
            .tasks
            .create(
                &admin(),
                TaskInput {
                    project_id: Some(99),
                    title: Some("Orphan".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 404);
    }

    #[tokio::test]
    async fn test_assignment_notifies_assignee() {
        let fx = fixture().await;
        // id 1 would be the acting admin
        fx.register("owner@x.io").await;
        let user = fx.register("dev@x.io").await;
        let mut input = employee_input("dev@x.io", &[]);
        input.user_id = Some(user.id);
        let employee = fx.stores.employees.create(input).await.unwrap();
        let project = fx.create_project("Build").await;

        let task = fx
            .services
            .tasks
            .create(
                &admin(),
                TaskInput {
                    project_id: Some(project.id),
                    title: Some("Wire API".into()),
                    assigned_to: Some(employee.id),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(task.assigned_to, Some(employee.id));

        let inbox = fx.stores.notifications.list_for_user(user.id, false, 10, 0).await.unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].kind, NotificationKind::Task);
    }

    #[tokio::test]
    async fn test_log_time_and_tracking() {
        let fx = fixture().await;
        let project = fx.create_project("Hours").await;
        let task = fx.create_task(project.id, "Estimate me").await;

        let err = fx
            .services
            .tasks
            .log_time(&admin(), task.id, TimeLogInput { hours: 0.0, note: None })
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 422);

        let task = fx
            .services
            .tasks
            .log_time(
                &admin(),
                task.id,
                TimeLogInput {
                    hours: 6.0,
                    note: Some("pairing".into()),
                },
            )
            .await
            .unwrap();
        assert_eq!(task.actual_hours, 6.0);
        assert_eq!(task.time_entries.len(), 1);

        let tracking = fx
            .services
            .tasks
            .time_tracking(
                &admin(),
                TaskQuery {
                    project_id: Some(project.id),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(tracking.total_estimated, 4.0);
        assert_eq!(tracking.total_actual, 6.0);
        assert_eq!(tracking.variance, 2.0);
        assert_eq!(tracking.variance_percent, 50.0);
    }

    #[tokio::test]
    async fn test_status_update_stamps_completion() {
        let fx = fixture().await;
        let project = fx.create_project("Done").await;
        let task = fx.create_task(project.id, "Finish").await;
        let mut rx = fx.hub.subscribe();

        let task = fx
            .services
            .tasks
            .update_status(&admin(), task.id, TaskStatus::Completed)
            .await
            .unwrap();
        assert!(task.completed_at.is_some());
        assert_eq!(rx.recv().await.unwrap().event, events::TASK_UPDATED);
    }

    #[tokio::test]
    async fn test_outsider_cannot_comment() {
        let fx = fixture().await;
        let project = fx.create_project("Private").await;
        let task = fx.create_task(project.id, "Secret").await;

        let err = fx
            .services
            .tasks
            .add_comment(&member(42, &[]), task.id, CommentInput { text: "hi".into() })
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 403);

        let task = fx
            .services
            .tasks
            .add_comment(&admin(), task.id, CommentInput { text: " looks good ".into() })
            .await
            .unwrap();
        assert_eq!(task.comments[0].text, "looks good");
    }

    #[tokio::test]
    async fn test_project_member_can_comment_and_log_time() {
        let fx = fixture().await;
        let project = fx
            .services
            .projects
            .create(
                &admin(),
                crate::projects::ProjectInput {
                    name: Some("Shared".into()),
                    start_date: NaiveDate::from_ymd_opt(2024, 1, 1),
                    members: vec![7],
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let task = fx.create_task(project.id, "Pair on it").await;

        let teammate = member(7, &["tasks.view"]);
        let task = fx
            .services
            .tasks
            .add_comment(&teammate, task.id, CommentInput { text: "on it".into() })
            .await
            .unwrap();
        assert_eq!(task.comments.len(), 1);
        let task = fx
            .services
            .tasks
            .log_time(&teammate, task.id, TimeLogInput { hours: 1.5, note: None })
            .await
            .unwrap();
        assert_eq!(task.actual_hours, 1.5);

        let err = fx
            .services
            .tasks
            .add_comment(&member(8, &["tasks.view"]), task.id, CommentInput { text: "me too".into() })
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 403);
    }

    fn depends_on(id: Id) -> DependencyInput {
        DependencyInput {
            depends_on: Some(id),
            kind: None,
        }
    }

    #[tokio::test]
    async fn test_dependencies_refuse_cycles_and_other_projects() {
        let fx = fixture().await;
        let project = fx.create_project("Graph").await;
        let design = fx.create_task(project.id, "Design").await;
        let build = fx.create_task(project.id, "Build").await;
        let ship = fx.create_task(project.id, "Ship").await;
        let tasks = &fx.services.tasks;
        let mut rx = fx.hub.subscribe();

        let err = tasks.add_dependency(&admin(), build.id, DependencyInput::default()).await.unwrap_err();
        assert_eq!(err.status_code(), 400);

        tasks.add_dependency(&admin(), build.id, depends_on(design.id)).await.unwrap();
        assert_eq!(rx.recv().await.unwrap().event, events::TASK_DEPENDENCY_ADDED);
        let ship = tasks.add_dependency(&admin(), ship.id, depends_on(build.id)).await.unwrap();
        assert_eq!(ship.dependencies.len(), 1);

        // design -> ship would close design <- build <- ship
        let err = tasks.add_dependency(&admin(), design.id, depends_on(ship.id)).await.unwrap_err();
        assert_eq!(err.to_string(), "Circular dependency detected");
        let err = tasks.add_dependency(&admin(), design.id, depends_on(design.id)).await.unwrap_err();
        assert_eq!(err.status_code(), 400);

        let elsewhere = fx.create_project("Elsewhere").await;
        let other = fx.create_task(elsewhere.id, "Unrelated").await;
        let err = tasks.add_dependency(&admin(), ship.id, depends_on(other.id)).await.unwrap_err();
        assert_eq!(err.status_code(), 400);
        let err = tasks.add_dependency(&admin(), ship.id, depends_on(999)).await.unwrap_err();
        assert_eq!(err.status_code(), 404);

        let ship = tasks.remove_dependency(&admin(), ship.id, build.id).await.unwrap();
        assert!(ship.dependencies.is_empty());
        let ship = tasks.remove_dependency(&admin(), ship.id, build.id).await.unwrap();
        assert!(ship.dependencies.is_empty());
    }

    #[tokio::test]
    async fn test_blocked_until_dependency_completes() {
        let fx = fixture().await;
        let project = fx.create_project("Blocked").await;
        let design = fx.create_task(project.id, "Design").await;
        let build = fx.create_task(project.id, "Build").await;
        let tasks = &fx.services.tasks;
        tasks.add_dependency(&admin(), build.id, depends_on(design.id)).await.unwrap();

        let status = tasks.blocked(&admin(), build.id).await.unwrap();
        assert!(status.is_blocked);
        assert_eq!(status.blocked_by[0].id, design.id);

        tasks.update_status(&admin(), design.id, TaskStatus::Completed).await.unwrap();
        assert!(!tasks.blocked(&admin(), build.id).await.unwrap().is_blocked);

        tasks.delete(&admin(), design.id).await.unwrap();
        let build = tasks.get(&admin(), build.id).await.unwrap();
        assert!(build.dependencies.is_empty());
    }

    #[tokio::test]
    async fn test_critical_path_and_graph() {
        let fx = fixture().await;
        let project = fx.create_project("Path").await;
        let design = fx.create_task(project.id, "Design").await;
        let build = fx.create_task(project.id, "Build").await;
        fx.create_task(project.id, "Docs").await;
        let tasks = &fx.services.tasks;
        tasks.add_dependency(&admin(), build.id, depends_on(design.id)).await.unwrap();

        let err = tasks.critical_path(&admin(), GraphQuery::default()).await.unwrap_err();
        assert_eq!(err.status_code(), 400);

        let query = GraphQuery { project_id: Some(project.id) };
        let path = tasks.critical_path(&admin(), query.clone()).await.unwrap();
        let ids: Vec<Id> = path.critical_path.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![design.id, build.id]);
        assert_eq!(path.total_duration, 8.0);

        let graph = tasks.dependency_graph(&admin(), query).await.unwrap();
        assert_eq!(graph.len(), 3);
        let node = graph.iter().find(|n| n.id == build.id).unwrap();
        assert_eq!(node.dependencies[0].task_id, design.id);

        let err = tasks.critical_path(&member(9, &[]), GraphQuery { project_id: Some(project.id) }).await.unwrap_err();
        assert_eq!(err.status_code(), 403);
    }

    #[tokio::test]
    async fn test_list_without_view_is_scoped_to_assignee() {
        let fx = fixture().await;
        let project = fx.create_project("Scope").await;
        fx.create_task(project.id, "Not mine").await;

        let viewer = member(5, &[]).with_employee(77, vec![]);
        let page = fx
            .services
            .tasks
            .list(&viewer, TaskQuery::default(), &PaginationParams::default())
            .await
            .unwrap();
        assert_eq!(page.total, 0);

        let err = fx
            .services
            .tasks
            .list(&member(6, &[]), TaskQuery::default(), &PaginationParams::default())
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 403);
    }
}
