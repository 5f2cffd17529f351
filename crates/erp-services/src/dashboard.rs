//! Dashboard statistics
//!
//! Organisation-wide counts are cached for the configured TTL; the caller's
//! unread notification count is always read fresh.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use erp_auth::CurrentUser;
use erp_core::{ErpResult, TtlCache};
use erp_db::{BudgetFilter, EmployeeFilter, Stores};
use erp_models::EmployeeStatus;
use erp_notifications::{events, EventHub};
use serde::Serialize;
use tracing::{debug, warn};

use crate::projects::percent;
use crate::support::publish;

const GLOBAL_KEY: &str = "global";

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetTotals {
    pub total: f64,
    pub spent: f64,
    pub utilization: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_employees: i64,
    pub active_employees: i64,
    pub departments: i64,
    pub total_projects: i64,
    pub projects_by_status: BTreeMap<String, i64>,
    pub total_tasks: i64,
    pub tasks_by_status: BTreeMap<String, i64>,
    pub overdue_tasks: i64,
    pub budgets: BudgetTotals,
    /// Caller-specific; absent in broadcast snapshots
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unread_notifications: Option<i64>,
    pub generated_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct DashboardService {
    stores: Stores,
    cache: Arc<TtlCache<String, DashboardStats>>,
}

impl DashboardService {
    pub fn new(stores: Stores, ttl: Duration) -> Self {
        Self {
            stores,
            cache: Arc::new(TtlCache::new(ttl)),
        }
    }

    pub async fn dashboard_stats(&self, user: &CurrentUser) -> ErpResult<DashboardStats> {
        let mut stats = self.snapshot().await?;
        stats.unread_notifications =
            Some(self.stores.notifications.count_for_user(user.id, true).await?);
        Ok(stats)
    }

    /// Organisation-wide figures, from cache when fresh
    pub async fn snapshot(&self) -> ErpResult<DashboardStats> {
        let key = GLOBAL_KEY.to_string();
        if let Some(stats) = self.cache.get(&key) {
            return Ok(stats);
        }

        let stats = self.compute().await?;
        self.cache.insert(key, stats.clone());
        Ok(stats)
    }

    pub fn invalidate(&self) {
        self.cache.clear();
    }

    async fn compute(&self) -> ErpResult<DashboardStats> {
        let s = &self.stores;
        let today = Utc::now().date_naive();

        let total_employees = s.employees.count().await?;
        let active_employees = s
            .employees
            .count_matching(&EmployeeFilter::with_status(EmployeeStatus::Active))
            .await?;
        let departments = s.departments.count().await?;
        let projects_by_status = s.projects.count_by_status().await?;
        let tasks_by_status = s.tasks.count_by_status(None).await?;
        let overdue_tasks = s.tasks.count_overdue(today).await?;

        let budgets = s.budgets.list(&BudgetFilter::default()).await?;
        let total: f64 = budgets.iter().map(|b| b.total_budget).sum();
        let spent: f64 = budgets.iter().map(|b| b.actual_spent).sum();

        debug!("Dashboard statistics recomputed");
        Ok(DashboardStats {
            total_employees,
            active_employees,
            departments,
            total_projects: projects_by_status.values().sum(),
            projects_by_status,
            total_tasks: tasks_by_status.values().sum(),
            tasks_by_status,
            overdue_tasks,
            budgets: BudgetTotals {
                total,
                spent,
                utilization: percent(spent, total),
            },
            unread_notifications: None,
            generated_at: Utc::now(),
        })
    }
}

/// Debounced `dashboard:stats` broadcaster.
///
/// Mutations call [`mark_dirty`](Self::mark_dirty); at most one recompute
/// is scheduled per window and it runs once the window has passed.
#[derive(Clone)]
pub struct DashboardStatsEmitter {
    dashboard: DashboardService,
    hub: EventHub,
    window: Duration,
    scheduled: Arc<AtomicBool>,
}

impl DashboardStatsEmitter {
    pub fn new(dashboard: DashboardService, hub: EventHub, window: Duration) -> Self {
        Self {
            dashboard,
            hub,
            window,
            scheduled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Returns whether this call scheduled a recompute
    pub fn mark_dirty(&self) -> bool {
        if self.scheduled.swap(true, Ordering::AcqRel) {
            return false;
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            self.scheduled.store(false, Ordering::Release);
            return false;
        };

        let emitter = self.clone();
        runtime.spawn(async move {
            tokio::time::sleep(emitter.window).await;
            emitter.scheduled.store(false, Ordering::Release);
            emitter.emit_now().await;
        });
        true
    }

    pub fn is_scheduled(&self) -> bool {
        self.scheduled.load(Ordering::Acquire)
    }

    async fn emit_now(&self) {
        self.dashboard.invalidate();
        match self.dashboard.snapshot().await {
            Ok(stats) => publish(&self.hub, events::DASHBOARD_STATS, None, &stats),
            Err(e) => warn!("Failed to compute dashboard statistics: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{admin, fixture};

    #[tokio::test]
    async fn test_stats_are_cached_until_invalidated() {
        let fx = fixture().await;
        let dashboard = &fx.services.dashboard;

        let before = dashboard.dashboard_stats(&admin()).await.unwrap();
        assert_eq!(before.total_projects, 0);

        fx.create_project("Cached").await;
        let cached = dashboard.dashboard_stats(&admin()).await.unwrap();
        assert_eq!(cached.total_projects, 0);

        dashboard.invalidate();
        let fresh = dashboard.dashboard_stats(&admin()).await.unwrap();
        assert_eq!(fresh.total_projects, 1);
        assert_eq!(fresh.projects_by_status["planning"], 1);
        assert_eq!(fresh.unread_notifications, Some(0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_emitter_debounces() {
        let fx = fixture().await;
        let emitter = DashboardStatsEmitter::new(
            fx.services.dashboard.clone(),
            fx.hub.clone(),
            Duration::from_secs(2),
        );
        let mut rx = fx.hub.subscribe();

        assert!(emitter.mark_dirty());
        assert!(!emitter.mark_dirty());
        assert!(!emitter.mark_dirty());

        let event = rx.recv().await.unwrap();
        assert_eq!(event.event, events::DASHBOARD_STATS);
        assert!(event.payload.get("unreadNotifications").is_none());
        assert!(!emitter.is_scheduled());
        assert!(rx.try_recv().is_err());

        assert!(emitter.mark_dirty());
    }
}
