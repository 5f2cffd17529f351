//! Task model
//!
//! Table: tasks. Comments, time entries and dependencies are embedded JSONB
//! arrays.

use chrono::{DateTime, NaiveDate, Utc};
use erp_core::{Id, Identifiable, Timestamped};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

use crate::project::Priority;
use crate::NewRecord;

text_enum! {
    pub enum TaskStatus ("task status") {
        Todo => "todo",
        InProgress => "in_progress",
        Review => "review",
        Completed => "completed",
        Blocked => "blocked",
    }
}

text_enum! {
    pub enum DependencyType ("dependency type") {
        FinishToStart => "finish-to-start",
        StartToStart => "start-to-start",
        FinishToFinish => "finish-to-finish",
        StartToFinish => "start-to-finish",
    }
}

impl Default for DependencyType {
    fn default() -> Self {
        DependencyType::FinishToStart
    }
}

impl Default for TaskStatus {
    fn default() -> Self {
        TaskStatus::Todo
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskComment {
    pub id: Uuid,
    pub user_id: Id,
    pub user_name: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeEntry {
    pub id: Uuid,
    pub user_id: Id,
    pub hours: f64,
    pub note: Option<String>,
    pub logged_at: DateTime<Utc>,
}

/// `task_id` must finish (or start, per `kind`) before the owning task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDependency {
    pub task_id: Id,
    #[serde(rename = "type")]
    pub kind: DependencyType,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: Id,
    pub project_id: Id,
    pub title: String,
    pub description: String,
    #[sqlx(try_from = "String")]
    pub status: TaskStatus,
    #[sqlx(try_from = "String")]
    pub priority: Priority,
    /// Assigned employee
    pub assigned_to: Option<Id>,
    /// Creating user
    pub created_by: Id,
    pub due_date: Option<NaiveDate>,
    pub estimated_hours: f64,
    pub actual_hours: f64,
    pub tags: Vec<String>,
    pub comments: Json<Vec<TaskComment>>,
    pub time_entries: Json<Vec<TimeEntry>>,
    pub dependencies: Json<Vec<TaskDependency>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        self.status != TaskStatus::Completed && self.due_date.map_or(false, |d| d < today)
    }

    /// Apply a status change, stamping or clearing `completed_at`
    pub fn set_status(&mut self, status: TaskStatus, now: DateTime<Utc>) {
        if status == TaskStatus::Completed && self.status != TaskStatus::Completed {
            self.completed_at = Some(now);
        } else if status != TaskStatus::Completed {
            self.completed_at = None;
        }
        self.status = status;
    }

    pub fn log_time(&mut self, entry: TimeEntry) {
        self.actual_hours += entry.hours;
        self.time_entries.0.push(entry);
    }

    pub fn depends_on(&self, task_id: Id) -> bool {
        self.dependencies.iter().any(|d| d.task_id == task_id)
    }

    /// Returns false when the dependency was already present
    pub fn add_dependency(&mut self, task_id: Id, kind: DependencyType) -> bool {
        if self.depends_on(task_id) {
            return false;
        }
        self.dependencies.0.push(TaskDependency { task_id, kind });
        true
    }

    /// Returns false when there was nothing to remove
    pub fn remove_dependency(&mut self, task_id: Id) -> bool {
        let before = self.dependencies.len();
        self.dependencies.0.retain(|d| d.task_id != task_id);
        self.dependencies.len() != before
    }
}

#[derive(Debug, Clone)]
pub struct NewTask {
    pub project_id: Id,
    pub title: String,
    pub description: String,
    pub status: TaskStatus,
    pub priority: Priority,
    pub assigned_to: Option<Id>,
    pub created_by: Id,
    pub due_date: Option<NaiveDate>,
    pub estimated_hours: f64,
    pub tags: Vec<String>,
}

impl NewRecord<Task> for NewTask {
    fn into_record(self, id: Id, now: DateTime<Utc>) -> Task {
        let completed_at = (self.status == TaskStatus::Completed).then_some(now);
        Task {
            id,
            project_id: self.project_id,
            title: self.title,
            description: self.description,
            status: self.status,
            priority: self.priority,
            assigned_to: self.assigned_to,
            created_by: self.created_by,
            due_date: self.due_date,
            estimated_hours: self.estimated_hours,
            actual_hours: 0.0,
            tags: self.tags,
            comments: Json(Vec::new()),
            time_entries: Json(Vec::new()),
            dependencies: Json(Vec::new()),
            completed_at,
            created_at: now,
            updated_at: now,
        }
    }
}

impl Identifiable for Task {
    fn id(&self) -> Id {
        self.id
    }
}

impl Timestamped for Task {
    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }
}
