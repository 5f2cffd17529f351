//! Task dependency graph
//!
//! Edges point from a task to the tasks it depends on. Cycles are refused
//! when an edge is added, so the graph of one project is a DAG.

use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;
use erp_core::Id;
use erp_models::{DependencyType, Task, TaskDependency, TaskStatus};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyInput {
    pub depends_on: Option<Id>,
    #[serde(rename = "type")]
    pub kind: Option<DependencyType>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphQuery {
    pub project_id: Option<Id>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphNode {
    pub id: Id,
    pub title: String,
    pub status: TaskStatus,
    pub due_date: Option<NaiveDate>,
    pub dependencies: Vec<TaskDependency>,
}

impl From<&Task> for GraphNode {
    fn from(task: &Task) -> Self {
        Self {
            id: task.id,
            title: task.title.clone(),
            status: task.status,
            due_date: task.due_date,
            dependencies: task.dependencies.0.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PathStep {
    pub id: Id,
    pub title: String,
    /// Estimated hours
    pub duration: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CriticalPath {
    /// Earliest task first
    pub critical_path: Vec<PathStep>,
    pub total_duration: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Blocker {
    pub id: Id,
    pub title: String,
    pub status: TaskStatus,
    #[serde(rename = "type")]
    pub kind: DependencyType,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockedStatus {
    pub is_blocked: bool,
    pub blocked_by: Vec<Blocker>,
}

/// Whether `task_id -> depends_on` would close a cycle
pub fn creates_cycle(tasks: &[Task], task_id: Id, depends_on: Id) -> bool {
    if task_id == depends_on {
        return true;
    }
    let edges: HashMap<Id, Vec<Id>> = tasks
        .iter()
        .map(|t| (t.id, t.dependencies.iter().map(|d| d.task_id).collect()))
        .collect();

    let mut seen = HashSet::new();
    let mut stack = vec![depends_on];
    while let Some(current) = stack.pop() {
        if current == task_id {
            return true;
        }
        if !seen.insert(current) {
            continue;
        }
        if let Some(next) = edges.get(&current) {
            stack.extend(next.iter().copied());
        }
    }
    false
}

/// Longest chain of dependencies weighted by estimated hours.
///
/// Dependencies on tasks outside `tasks` are ignored. Ties go to the lower
/// task id.
pub fn critical_path(tasks: &[Task]) -> CriticalPath {
    let by_id: HashMap<Id, &Task> = tasks.iter().map(|t| (t.id, t)).collect();
    let mut ids: Vec<Id> = by_id.keys().copied().collect();
    ids.sort_unstable();

    // id -> (length of the longest chain ending here, predecessor on it)
    let mut best: HashMap<Id, (f64, Option<Id>)> = HashMap::new();
    for &id in &ids {
        longest_to(id, &by_id, &mut best, &mut HashSet::new());
    }

    let end = ids.iter().copied().fold(None, |acc: Option<(Id, f64)>, id| {
        let length = best.get(&id).map_or(0.0, |b| b.0);
        match acc {
            Some((_, top)) if top >= length => acc,
            _ => Some((id, length)),
        }
    });

    let mut steps = Vec::new();
    let mut cursor = end.map(|(id, _)| id);
    while let Some(id) = cursor {
        let Some(task) = by_id.get(&id) else {
            break;
        };
        steps.push(PathStep {
            id,
            title: task.title.clone(),
            duration: task.estimated_hours,
        });
        cursor = best.get(&id).and_then(|b| b.1);
    }
    steps.reverse();

    CriticalPath {
        total_duration: steps.iter().map(|s| s.duration).sum(),
        critical_path: steps,
    }
}

fn longest_to(
    id: Id,
    by_id: &HashMap<Id, &Task>,
    best: &mut HashMap<Id, (f64, Option<Id>)>,
    visiting: &mut HashSet<Id>,
) -> f64 {
    if let Some(&(length, _)) = best.get(&id) {
        return length;
    }
    let Some(task) = by_id.get(&id) else {
        return 0.0;
    };
    if !visiting.insert(id) {
        return 0.0;
    }

    let mut deps: Vec<Id> = task
        .dependencies
        .iter()
        .map(|d| d.task_id)
        .filter(|dep| by_id.contains_key(dep))
        .collect();
    deps.sort_unstable();

    let mut before: (f64, Option<Id>) = (0.0, None);
    for dep in deps {
        let length = longest_to(dep, by_id, best, visiting);
        if before.1.is_none() || length > before.0 {
            before = (length, Some(dep));
        }
    }
    visiting.remove(&id);

    let length = before.0 + task.estimated_hours;
    best.insert(id, (length, before.1));
    length
}

/// Dependencies of `task` that are not completed yet
pub fn blockers(task: &Task, dependencies: &[Task]) -> BlockedStatus {
    let blocked_by: Vec<Blocker> = task
        .dependencies
        .iter()
        .filter_map(|d| {
            let dep = dependencies.iter().find(|t| t.id == d.task_id)?;
            (dep.status != TaskStatus::Completed).then(|| Blocker {
                id: dep.id,
                title: dep.title.clone(),
                status: dep.status,
                kind: d.kind,
            })
        })
        .collect();

    BlockedStatus {
        is_blocked: !blocked_by.is_empty(),
        blocked_by,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use erp_models::{NewRecord, NewTask, Priority};

    fn task(id: Id, hours: f64, deps: &[Id]) -> Task {
        let mut task = NewTask {
            project_id: 1,
            title: format!("T{}", id),
            description: String::new(),
            status: TaskStatus::Todo,
            priority: Priority::Medium,
            assigned_to: None,
            created_by: 1,
            due_date: None,
            estimated_hours: hours,
            tags: vec![],
        }
        .into_record(id, Utc::now());
        for &dep in deps {
            task.add_dependency(dep, DependencyType::FinishToStart);
        }
        task
    }

    #[test]
    fn test_cycle_detection() {
        // 3 -> 2 -> 1
        let tasks = vec![task(1, 1.0, &[]), task(2, 1.0, &[1]), task(3, 1.0, &[2])];
        assert!(creates_cycle(&tasks, 1, 3));
        assert!(creates_cycle(&tasks, 1, 2));
        assert!(creates_cycle(&tasks, 2, 2));
        assert!(!creates_cycle(&tasks, 3, 1));
        assert!(!creates_cycle(&tasks, 1, 4));
    }

    #[test]
    fn test_critical_path_follows_heaviest_chain() {
        // 1 (2h) -> 3 (5h) -> 4 (1h) outweighs 2 (4h) -> 4
        let tasks = vec![
            task(1, 2.0, &[]),
            task(2, 4.0, &[]),
            task(3, 5.0, &[1]),
            task(4, 1.0, &[2, 3, 99]),
            task(5, 3.0, &[]),
        ];
        let path = critical_path(&tasks);
        let ids: Vec<Id> = path.critical_path.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![1, 3, 4]);
        assert_eq!(path.total_duration, 8.0);
    }

    #[test]
    fn test_critical_path_of_nothing() {
        let path = critical_path(&[]);
        assert!(path.critical_path.is_empty());
        assert_eq!(path.total_duration, 0.0);
    }

    #[test]
    fn test_blockers_skip_completed() {
        let mut done = task(1, 1.0, &[]);
        done.set_status(TaskStatus::Completed, Utc::now());
        let open = task(2, 1.0, &[]);
        let target = task(3, 1.0, &[1, 2]);

        let status = blockers(&target, &[done.clone(), open]);
        assert!(status.is_blocked);
        assert_eq!(status.blocked_by.len(), 1);
        assert_eq!(status.blocked_by[0].id, 2);

        let target = task(4, 1.0, &[1]);
        assert!(!blockers(&target, &[done]).is_blocked);
    }
}
