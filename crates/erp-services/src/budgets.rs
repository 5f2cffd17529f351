//! Budget Service
//!
//! Budget lifecycle, expense recording and threshold alerts.
//!
//! Utilization is `actual_spent / total_budget * 100`. After every spend or
//! total change each crossed threshold (80, 90, 100) is stored once per
//! budget; a newly stored alert notifies the budget's creator and is emitted
//! as `budget:alert`.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{Datelike, Utc};
use erp_auth::{builtin, CurrentUser};
use erp_core::{ErpError, ErpResult, Id};
use erp_db::{BudgetAlertStore, BudgetFilter, BudgetStore, ProjectStore};
use erp_models::{
    AlertSeverity, ApprovalDecision, Budget, BudgetAlert, BudgetApproval, BudgetCategory,
    BudgetStatus, BudgetType, NewBudget, NewBudgetAlert, NewNotification, NotificationKind,
    NotificationPriority,
};
use erp_notifications::{events, EventHub, NotificationService};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use crate::projects::percent;
use crate::support::{non_blank, publish};

/// Utilization percentages that raise an alert
pub const ALERT_THRESHOLDS: [i32; 3] = [80, 90, 100];

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetQuery {
    pub status: Option<BudgetStatus>,
    pub budget_type: Option<BudgetType>,
    pub project_id: Option<Id>,
    pub department: Option<String>,
    pub fiscal_year: Option<i32>,
}

impl From<BudgetQuery> for BudgetFilter {
    fn from(query: BudgetQuery) -> Self {
        BudgetFilter {
            status: query.status,
            budget_type: query.budget_type,
            project_id: query.project_id,
            department: non_blank(query.department.as_deref()),
            fiscal_year: query.fiscal_year,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetInput {
    pub project_id: Option<Id>,
    pub project_name: Option<String>,
    pub budget_type: Option<BudgetType>,
    pub department: Option<String>,
    pub total_budget: Option<f64>,
    pub currency: Option<String>,
    #[serde(default)]
    pub categories: Vec<BudgetCategory>,
    pub fiscal_year: Option<i32>,
    pub fiscal_period: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetUpdate {
    pub project_name: Option<String>,
    pub department: Option<String>,
    pub total_budget: Option<f64>,
    pub currency: Option<String>,
    pub categories: Option<Vec<BudgetCategory>>,
    pub fiscal_period: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DecisionInput {
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExpenseInput {
    /// Category name or type; spending without one only moves the total
    pub category: Option<String>,
    pub amount: f64,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryVariance {
    pub name: String,
    #[serde(rename = "type")]
    pub category_type: String,
    pub allocated: f64,
    pub spent: f64,
    pub variance: f64,
    pub utilization_percentage: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetVariance {
    pub budget_id: Id,
    pub project_id: Option<Id>,
    pub total_budget: f64,
    pub actual_spent: f64,
    pub variance: f64,
    pub variance_percentage: f64,
    pub utilization_percentage: f64,
    pub status: &'static str,
    pub alerts: Vec<String>,
    pub category_analysis: Vec<CategoryVariance>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusTotals {
    pub count: i64,
    pub total_budget: f64,
    pub actual_spent: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetSummary {
    pub count: i64,
    pub total_budget: f64,
    pub actual_spent: f64,
    pub remaining: f64,
    pub utilization: f64,
    pub by_status: BTreeMap<String, StatusTotals>,
}

#[derive(Clone)]
pub struct BudgetService {
    budgets: Arc<dyn BudgetStore>,
    alerts: Arc<dyn BudgetAlertStore>,
    projects: Arc<dyn ProjectStore>,
    notifications: NotificationService,
    hub: EventHub,
}

impl BudgetService {
    pub fn new(
        budgets: Arc<dyn BudgetStore>,
        alerts: Arc<dyn BudgetAlertStore>,
        projects: Arc<dyn ProjectStore>,
        notifications: NotificationService,
    ) -> Self {
        let hub = notifications.hub().clone();
        Self {
            budgets,
            alerts,
            projects,
            notifications,
            hub,
        }
    }

    pub async fn list(&self, user: &CurrentUser, query: BudgetQuery) -> ErpResult<Vec<Budget>> {
        user.require(builtin::FINANCE_VIEW)?;
        Ok(self.budgets.list(&query.into()).await?)
    }

    pub async fn get(&self, user: &CurrentUser, id: Id) -> ErpResult<Budget> {
        user.require(builtin::FINANCE_VIEW)?;
        self.find(id).await
    }

    pub async fn create(&self, user: &CurrentUser, input: BudgetInput) -> ErpResult<Budget> {
        user.require_all(&[builtin::FINANCE_VIEW, builtin::FINANCE_MANAGE])?;

        let budget_type = input.budget_type.unwrap_or(BudgetType::Project);
        let mut project_name = non_blank(input.project_name.as_deref());
        let department = non_blank(input.department.as_deref());

        match budget_type {
            BudgetType::Project => {
                let project_id = input
                    .project_id
                    .ok_or_else(|| ErpError::invalid("projectId", "is required for project budgets"))?;
                let project = self
                    .projects
                    .find_by_id(project_id)
                    .await?
                    .ok_or_else(|| ErpError::not_found("Project", project_id))?;
                project_name.get_or_insert(project.name);
            }
            BudgetType::Department => {
                if department.is_none() {
                    return Err(ErpError::invalid(
                        "department",
                        "is required for department budgets",
                    ));
                }
            }
        }
        let project_name = project_name
            .or_else(|| department.clone())
            .ok_or_else(|| ErpError::invalid("projectName", "is required"))?;

        let categories = normalize_categories(input.categories)?;
        let allocated: f64 = categories.iter().map(|c| c.allocated_amount).sum();
        let total_budget = check_amount("totalBudget", input.total_budget.unwrap_or(allocated))?;

        let budget = self
            .budgets
            .create(NewBudget {
                project_id: input.project_id.filter(|_| budget_type == BudgetType::Project),
                project_name,
                budget_type,
                department,
                total_budget,
                currency: non_blank(input.currency.as_deref())
                    .map(|c| c.to_uppercase())
                    .unwrap_or_else(|| "INR".to_string()),
                categories,
                fiscal_year: input.fiscal_year.unwrap_or_else(|| Utc::now().year()),
                fiscal_period: non_blank(input.fiscal_period.as_deref())
                    .unwrap_or_else(|| "annual".to_string()),
                notes: non_blank(input.notes.as_deref()),
                created_by: user.id,
            })
            .await?;

        info!(budget_id = budget.id, total = budget.total_budget, "Budget created");
        self.check_alerts(&budget).await;
        Ok(budget)
    }

    pub async fn update(&self, user: &CurrentUser, id: Id, update: BudgetUpdate) -> ErpResult<Budget> {
        user.require_all(&[builtin::FINANCE_VIEW, builtin::FINANCE_MANAGE])?;
        let mut budget = self.find(id).await?;
        if budget.status == BudgetStatus::Closed {
            return Err(ErpError::bad_request("Closed budgets cannot be edited"));
        }

        if let Some(name) = update.project_name {
            budget.project_name =
                non_blank(Some(&name)).ok_or_else(|| ErpError::invalid("projectName", "is required"))?;
        }
        if let Some(department) = update.department {
            budget.department = non_blank(Some(&department));
        }
        if let Some(total) = update.total_budget {
            budget.total_budget = check_amount("totalBudget", total)?;
        }
        if let Some(currency) = update.currency {
            if let Some(currency) = non_blank(Some(&currency)) {
                budget.currency = currency.to_uppercase();
            }
        }
        if let Some(categories) = update.categories {
            let categories = normalize_categories(categories)?;
            // Keep spending that was recorded without a category
            let old_spent: f64 = budget.categories.iter().map(|c| c.spent_amount).sum();
            let new_spent: f64 = categories.iter().map(|c| c.spent_amount).sum();
            budget.actual_spent = (budget.actual_spent - old_spent + new_spent).max(0.0);
            budget.categories.0 = categories;
        }
        if let Some(period) = update.fiscal_period {
            if let Some(period) = non_blank(Some(&period)) {
                budget.fiscal_period = period;
            }
        }
        if let Some(notes) = update.notes {
            budget.notes = non_blank(Some(&notes));
        }

        let budget = self.budgets.update(id, budget).await?;
        self.check_alerts(&budget).await;
        Ok(budget)
    }

    pub async fn delete(&self, user: &CurrentUser, id: Id) -> ErpResult<()> {
        user.require_all(&[builtin::FINANCE_VIEW, builtin::FINANCE_MANAGE])?;
        let budget = self.find(id).await?;
        if budget.status == BudgetStatus::Active {
            return Err(ErpError::bad_request("Active budgets must be closed before deletion"));
        }

        self.alerts.delete_for_budget(id).await?;
        self.budgets.delete(id).await?;
        info!(budget_id = id, "Budget deleted");
        Ok(())
    }

    /// draft | rejected -> pending
    pub async fn submit(&self, user: &CurrentUser, id: Id) -> ErpResult<Budget> {
        user.require(builtin::FINANCE_MANAGE)?;
        self.transition(id, &[BudgetStatus::Draft, BudgetStatus::Rejected], BudgetStatus::Pending)
            .await
    }

    /// draft | pending -> approved
    pub async fn approve(&self, user: &CurrentUser, id: Id, input: DecisionInput) -> ErpResult<Budget> {
        self.decide(user, id, ApprovalDecision::Approved, input).await
    }

    /// draft | pending -> rejected
    pub async fn reject(&self, user: &CurrentUser, id: Id, input: DecisionInput) -> ErpResult<Budget> {
        self.decide(user, id, ApprovalDecision::Rejected, input).await
    }

    /// approved -> active
    pub async fn activate(&self, user: &CurrentUser, id: Id) -> ErpResult<Budget> {
        user.require(builtin::FINANCE_MANAGE)?;
        self.transition(id, &[BudgetStatus::Approved], BudgetStatus::Active)
            .await
    }

    /// approved | active -> closed
    pub async fn close(&self, user: &CurrentUser, id: Id) -> ErpResult<Budget> {
        user.require(builtin::FINANCE_MANAGE)?;
        self.transition(id, &[BudgetStatus::Approved, BudgetStatus::Active], BudgetStatus::Closed)
            .await
    }

    pub async fn record_expense(
        &self,
        user: &CurrentUser,
        id: Id,
        input: ExpenseInput,
    ) -> ErpResult<Budget> {
        user.require(builtin::FINANCE_MANAGE)?;
        if !input.amount.is_finite() || input.amount <= 0.0 {
            return Err(ErpError::invalid("amount", "must be greater than 0"));
        }

        let mut budget = self.find(id).await?;
        if !budget.status.accepts_expenses() {
            return Err(ErpError::bad_request(format!(
                "Expenses cannot be recorded against a {} budget",
                budget.status
            )));
        }

        if let Some(category) = non_blank(input.category.as_deref()) {
            let wanted = category.to_lowercase();
            let slot = budget
                .categories
                .0
                .iter_mut()
                .find(|c| c.name.to_lowercase() == wanted || c.category_type.to_lowercase() == wanted)
                .ok_or_else(|| ErpError::bad_request(format!("Unknown budget category: {}", category)))?;
            slot.spent_amount += input.amount;
        }
        budget.actual_spent += input.amount;

        let budget = self.budgets.update(id, budget).await?;
        info!(
            budget_id = id,
            amount = input.amount,
            utilization = budget.utilization(),
            description = input.description.as_deref().unwrap_or(""),
            "Expense recorded"
        );
        self.check_alerts(&budget).await;
        Ok(budget)
    }

    pub async fn alerts(&self, user: &CurrentUser, id: Id) -> ErpResult<Vec<BudgetAlert>> {
        user.require(builtin::FINANCE_VIEW)?;
        self.find(id).await?;
        Ok(self.alerts.list_for_budget(id).await?)
    }

    pub async fn variance(&self, user: &CurrentUser, id: Id) -> ErpResult<BudgetVariance> {
        let budget = self.get(user, id).await?;
        Ok(analyze(&budget))
    }

    pub async fn summary(&self, user: &CurrentUser, query: BudgetQuery) -> ErpResult<BudgetSummary> {
        user.require(builtin::FINANCE_VIEW)?;
        let budgets = self.budgets.list(&query.into()).await?;
        Ok(summarize(&budgets))
    }

    async fn decide(
        &self,
        user: &CurrentUser,
        id: Id,
        decision: ApprovalDecision,
        input: DecisionInput,
    ) -> ErpResult<Budget> {
        user.require(builtin::FINANCE_APPROVE)?;

        let mut budget = self.find(id).await?;
        if !matches!(budget.status, BudgetStatus::Draft | BudgetStatus::Pending) {
            return Err(ErpError::bad_request(format!(
                "Cannot {} a {} budget",
                verb(decision),
                budget.status
            )));
        }

        budget.status = match decision {
            ApprovalDecision::Approved => BudgetStatus::Approved,
            ApprovalDecision::Rejected => BudgetStatus::Rejected,
        };
        budget.approvals.0.push(BudgetApproval {
            user_id: user.id,
            user_name: user.name.clone(),
            decision,
            comment: non_blank(input.comment.as_deref()),
            decided_at: Utc::now(),
        });

        let budget = self.budgets.update(id, budget).await?;
        info!(budget_id = id, decision = %decision, approver = user.id, "Budget decision recorded");

        if budget.created_by != user.id {
            let notification = NewNotification::new(
                budget.created_by,
                NotificationKind::Budget,
                format!("Budget {}", decision),
                format!("{} {} budget \"{}\"", user.name, decision, budget.project_name),
            )
            .action_url(format!("/finance/budgets/{}", budget.id))
            .metadata(json!({ "budgetId": budget.id, "decision": decision }));
            if let Err(e) = self.notifications.send_to_user(notification).await {
                warn!(budget_id = id, "Failed to notify budget owner: {}", e);
            }
        }
        Ok(budget)
    }

    async fn transition(&self, id: Id, from: &[BudgetStatus], to: BudgetStatus) -> ErpResult<Budget> {
        let mut budget = self.find(id).await?;
        if !from.contains(&budget.status) {
            return Err(ErpError::bad_request(format!(
                "Cannot move a {} budget to {}",
                budget.status, to
            )));
        }
        budget.status = to;
        let budget = self.budgets.update(id, budget).await?;
        info!(budget_id = id, status = %to, "Budget status changed");
        Ok(budget)
    }

    /// Store and announce every newly crossed threshold. Best effort.
    async fn check_alerts(&self, budget: &Budget) {
        let utilization = budget.utilization();

        for threshold in crossed_thresholds(utilization) {
            let severity = AlertSeverity::for_threshold(threshold);
            let message = alert_message(budget, threshold, utilization);
            let stored = self
                .alerts
                .insert_if_absent(NewBudgetAlert {
                    budget_id: budget.id,
                    threshold,
                    utilization,
                    severity,
                    message: message.clone(),
                })
                .await;

            let alert = match stored {
                Ok(Some(alert)) => alert,
                Ok(None) => continue,
                Err(e) => {
                    warn!(budget_id = budget.id, threshold, "Failed to store budget alert: {}", e);
                    continue;
                }
            };

            warn!(budget_id = budget.id, threshold, utilization, "Budget threshold crossed");
            let notification = NewNotification::new(
                budget.created_by,
                NotificationKind::Budget,
                "Budget alert",
                message,
            )
            .priority(notification_priority(severity))
            .action_url(format!("/finance/budgets/{}", budget.id))
            .metadata(json!({ "budgetId": budget.id, "threshold": threshold }));
            if let Err(e) = self.notifications.send_to_user(notification).await {
                warn!(budget_id = budget.id, "Failed to send budget alert notification: {}", e);
            }

            publish(
                &self.hub,
                events::BUDGET_ALERT,
                None,
                &json!({
                    "budgetId": budget.id,
                    "projectId": budget.project_id,
                    "projectName": budget.project_name,
                    "threshold": alert.threshold,
                    "utilization": alert.utilization,
                    "severity": alert.severity,
                    "message": alert.message,
                }),
            );
        }
    }

    async fn find(&self, id: Id) -> ErpResult<Budget> {
        self.budgets
            .find_by_id(id)
            .await?
            .ok_or_else(|| ErpError::not_found("Budget", id))
    }
}

fn verb(decision: ApprovalDecision) -> &'static str {
    match decision {
        ApprovalDecision::Approved => "approve",
        ApprovalDecision::Rejected => "reject",
    }
}

/// Trim names, reject negative or non-finite amounts
fn normalize_categories(categories: Vec<BudgetCategory>) -> ErpResult<Vec<BudgetCategory>> {
    categories
        .into_iter()
        .map(|c| {
            Ok(BudgetCategory {
                name: c.name.trim().to_string(),
                category_type: non_blank(Some(&c.category_type))
                    .unwrap_or_else(|| "labor".to_string()),
                allocated_amount: check_amount("categories.allocatedAmount", c.allocated_amount)?,
                spent_amount: check_amount("categories.spentAmount", c.spent_amount)?,
            })
        })
        .collect()
}

fn check_amount(field: &str, amount: f64) -> ErpResult<f64> {
    if !amount.is_finite() || amount < 0.0 {
        return Err(ErpError::invalid(field, "must not be negative"));
    }
    Ok(amount)
}

pub fn crossed_thresholds(utilization: f64) -> impl Iterator<Item = i32> {
    ALERT_THRESHOLDS
        .into_iter()
        .filter(move |&t| utilization >= f64::from(t))
}

fn alert_message(budget: &Budget, threshold: i32, utilization: f64) -> String {
    if threshold >= 100 {
        format!(
            "Budget \"{}\" is exhausted: {:.1}% used",
            budget.project_name, utilization
        )
    } else {
        format!(
            "Budget \"{}\" crossed {}% utilization ({:.1}% used)",
            budget.project_name, threshold, utilization
        )
    }
}

fn notification_priority(severity: AlertSeverity) -> NotificationPriority {
    match severity {
        AlertSeverity::Critical => NotificationPriority::Urgent,
        AlertSeverity::High => NotificationPriority::High,
        AlertSeverity::Warning => NotificationPriority::Medium,
    }
}

pub fn health_status(utilization: f64) -> &'static str {
    if utilization > 100.0 {
        "over-budget"
    } else if utilization > 90.0 {
        "at-risk"
    } else if utilization > 75.0 {
        "on-track"
    } else {
        "under-utilized"
    }
}

pub fn analyze(budget: &Budget) -> BudgetVariance {
    let utilization = budget.utilization();
    let variance = budget.remaining();

    let mut alerts = Vec::new();
    if utilization > 100.0 {
        alerts.push(format!("Budget exceeded by {:.1}%", utilization - 100.0));
    } else if utilization > 90.0 {
        alerts.push(format!(
            "Budget utilization at {:.1}% - Monitor closely",
            utilization
        ));
    }
    for category in budget.categories.iter() {
        let category_utilization = category.utilization();
        if category_utilization > 100.0 {
            alerts.push(format!(
                "{} category over budget by {:.1}%",
                category.category_type,
                category_utilization - 100.0
            ));
        }
    }

    BudgetVariance {
        budget_id: budget.id,
        project_id: budget.project_id,
        total_budget: budget.total_budget,
        actual_spent: budget.actual_spent,
        variance,
        variance_percentage: percent(variance, budget.total_budget),
        utilization_percentage: percent(budget.actual_spent, budget.total_budget),
        status: health_status(utilization),
        alerts,
        category_analysis: budget
            .categories
            .iter()
            .map(|c| CategoryVariance {
                name: c.name.clone(),
                category_type: c.category_type.clone(),
                allocated: c.allocated_amount,
                spent: c.spent_amount,
                variance: c.allocated_amount - c.spent_amount,
                utilization_percentage: percent(c.spent_amount, c.allocated_amount),
            })
            .collect(),
    }
}

pub fn summarize(budgets: &[Budget]) -> BudgetSummary {
    let mut summary = BudgetSummary::default();
    for budget in budgets {
        summary.count += 1;
        summary.total_budget += budget.total_budget;
        summary.actual_spent += budget.actual_spent;

        let totals = summary
            .by_status
            .entry(budget.status.as_str().to_string())
            .or_default();
        totals.count += 1;
        totals.total_budget += budget.total_budget;
        totals.actual_spent += budget.actual_spent;
    }
    summary.remaining = summary.total_budget - summary.actual_spent;
    summary.utilization = percent(summary.actual_spent, summary.total_budget);
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{admin, fixture, member};

    fn department_budget(total: f64) -> BudgetInput {
        BudgetInput {
            budget_type: Some(BudgetType::Department),
            department: Some("Engineering".into()),
            total_budget: Some(total),
            categories: vec![BudgetCategory {
                name: "Salaries".into(),
                category_type: "labor".into(),
                allocated_amount: total,
                spent_amount: 0.0,
            }],
            ..Default::default()
        }
    }

    fn expense(amount: f64) -> ExpenseInput {
        ExpenseInput {
            category: Some("labor".into()),
            amount,
            description: None,
        }
    }

    #[tokio::test]
    async fn test_create_requires_finance_view() {
        let fx = fixture().await;
        let err = fx
            .services
            .budgets
            .create(&member(3, &["finance.manage"]), department_budget(100.0))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 403);

        let budget = fx
            .services
            .budgets
            .create(&member(3, &["finance.view", "finance.manage"]), department_budget(100.0))
            .await
            .unwrap();
        assert_eq!(budget.status, BudgetStatus::Draft);
        assert_eq!(budget.project_name, "Engineering");
    }

    #[tokio::test]
    async fn test_status_transitions() {
        let fx = fixture().await;
        let budgets = &fx.services.budgets;
        let budget = budgets.create(&admin(), department_budget(100.0)).await.unwrap();

        let err = budgets.activate(&admin(), budget.id).await.unwrap_err();
        assert_eq!(err.status_code(), 400);

        budgets.submit(&admin(), budget.id).await.unwrap();
        let approved = budgets
            .approve(&admin(), budget.id, DecisionInput { comment: Some("ok".into()) })
            .await
            .unwrap();
        assert_eq!(approved.status, BudgetStatus::Approved);
        assert_eq!(approved.approvals.len(), 1);

        budgets.activate(&admin(), budget.id).await.unwrap();
        budgets.close(&admin(), budget.id).await.unwrap();

        let err = budgets
            .update(&admin(), budget.id, BudgetUpdate::default())
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[tokio::test]
    async fn test_approval_needs_permission() {
        let fx = fixture().await;
        let budget = fx.services.budgets.create(&admin(), department_budget(100.0)).await.unwrap();
        let err = fx
            .services
            .budgets
            .approve(
                &member(3, &["finance.view", "finance.manage"]),
                budget.id,
                DecisionInput::default(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 403);
    }

    #[tokio::test]
    async fn test_expenses_raise_each_alert_once() {
        let fx = fixture().await;
        let budgets = &fx.services.budgets;
        let budget = budgets.create(&admin(), department_budget(1000.0)).await.unwrap();

        let err = budgets.record_expense(&admin(), budget.id, expense(10.0)).await.unwrap_err();
        assert_eq!(err.status_code(), 400);

        budgets
            .approve(&admin(), budget.id, DecisionInput::default())
            .await
            .unwrap();
        let mut rx = fx.hub.subscribe();

        budgets.record_expense(&admin(), budget.id, expense(850.0)).await.unwrap();
        budgets.record_expense(&admin(), budget.id, expense(10.0)).await.unwrap();
        let budget = budgets.record_expense(&admin(), budget.id, expense(60.0)).await.unwrap();
        assert_eq!(budget.actual_spent, 920.0);
        assert_eq!(budget.categories[0].spent_amount, 920.0);

        let alerts = budgets.alerts(&admin(), budget.id).await.unwrap();
        let thresholds: Vec<i32> = alerts.iter().map(|a| a.threshold).collect();
        assert_eq!(thresholds, vec![80, 90]);
        assert_eq!(alerts[1].severity, AlertSeverity::High);

        let mut emitted = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if event.event == events::BUDGET_ALERT {
                emitted.push(event.payload["threshold"].as_i64().unwrap());
            }
        }
        assert_eq!(emitted, vec![80, 90]);
    }

    #[tokio::test]
    async fn test_expense_validation() {
        let fx = fixture().await;
        let budget = fx.services.budgets.create(&admin(), department_budget(100.0)).await.unwrap();
        fx.services
            .budgets
            .approve(&admin(), budget.id, DecisionInput::default())
            .await
            .unwrap();

        let err = fx
            .services
            .budgets
            .record_expense(&admin(), budget.id, expense(-5.0))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 422);

        let err = fx
            .services
            .budgets
            .record_expense(
                &admin(),
                budget.id,
                ExpenseInput {
                    category: Some("travel".into()),
                    amount: 5.0,
                    description: None,
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[tokio::test]
    async fn test_variance_and_summary() {
        let fx = fixture().await;
        let budget = fx.services.budgets.create(&admin(), department_budget(200.0)).await.unwrap();
        fx.services
            .budgets
            .approve(&admin(), budget.id, DecisionInput::default())
            .await
            .unwrap();
        fx.services
            .budgets
            .record_expense(&admin(), budget.id, expense(250.0))
            .await
            .unwrap();

        let variance = fx.services.budgets.variance(&admin(), budget.id).await.unwrap();
        assert_eq!(variance.status, "over-budget");
        assert_eq!(variance.variance, -50.0);
        assert_eq!(variance.alerts[0], "Budget exceeded by 25.0%");
        assert_eq!(variance.alerts[1], "labor category over budget by 25.0%");

        let summary = fx
            .services
            .budgets
            .summary(&admin(), BudgetQuery::default())
            .await
            .unwrap();
        assert_eq!(summary.count, 1);
        assert_eq!(summary.by_status["approved"].actual_spent, 250.0);
    }

    #[test]
    fn test_health_status_bands() {
        assert_eq!(health_status(101.0), "over-budget");
        assert_eq!(health_status(95.0), "at-risk");
        assert_eq!(health_status(80.0), "on-track");
        assert_eq!(health_status(10.0), "under-utilized");
    }

    #[test]
    fn test_crossed_thresholds() {
        assert_eq!(crossed_thresholds(79.9).count(), 0);
        assert_eq!(crossed_thresholds(90.0).collect::<Vec<_>>(), vec![80, 90]);
        assert_eq!(crossed_thresholds(150.0).count(), 3);
    }
}
