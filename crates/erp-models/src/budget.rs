//! Budget and budget alert models
//!
//! Tables: budgets, budget_alerts

use chrono::{DateTime, Utc};
use erp_core::{Id, Identifiable, Timestamped};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;

use crate::NewRecord;

text_enum! {
    pub enum BudgetType ("budget type") {
        Project => "project",
        Department => "department",
    }
}

text_enum! {
    pub enum BudgetStatus ("budget status") {
        Draft => "draft",
        Pending => "pending",
        Approved => "approved",
        Rejected => "rejected",
        Active => "active",
        Closed => "closed",
    }
}

impl Default for BudgetStatus {
    fn default() -> Self {
        BudgetStatus::Draft
    }
}

impl BudgetStatus {
    /// Spending can only be recorded against approved or running budgets
    pub fn accepts_expenses(&self) -> bool {
        matches!(self, BudgetStatus::Approved | BudgetStatus::Active)
    }
}

text_enum! {
    pub enum ApprovalDecision ("approval decision") {
        Approved => "approved",
        Rejected => "rejected",
    }
}

text_enum! {
    pub enum AlertSeverity ("alert severity") {
        Warning => "warning",
        High => "high",
        Critical => "critical",
    }
}

impl AlertSeverity {
    pub fn for_threshold(threshold: i32) -> Self {
        match threshold {
            t if t >= 100 => AlertSeverity::Critical,
            t if t >= 90 => AlertSeverity::High,
            _ => AlertSeverity::Warning,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetCategory {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default = "default_category_type")]
    pub category_type: String,
    #[serde(default)]
    pub allocated_amount: f64,
    #[serde(default)]
    pub spent_amount: f64,
}

fn default_category_type() -> String {
    "labor".to_string()
}

impl BudgetCategory {
    pub fn utilization(&self) -> f64 {
        if self.allocated_amount > 0.0 {
            self.spent_amount / self.allocated_amount * 100.0
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetApproval {
    pub user_id: Id,
    pub user_name: String,
    pub decision: ApprovalDecision,
    pub comment: Option<String>,
    pub decided_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Budget {
    pub id: Id,
    pub project_id: Option<Id>,
    pub project_name: String,
    #[sqlx(try_from = "String")]
    pub budget_type: BudgetType,
    pub department: Option<String>,
    pub total_budget: f64,
    pub actual_spent: f64,
    pub currency: String,
    pub categories: Json<Vec<BudgetCategory>>,
    #[sqlx(try_from = "String")]
    pub status: BudgetStatus,
    pub fiscal_year: i32,
    pub fiscal_period: String,
    pub approvals: Json<Vec<BudgetApproval>>,
    pub notes: Option<String>,
    pub created_by: Id,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Budget {
    /// `actual_spent / total_budget * 100`, or 0 for an empty budget
    pub fn utilization(&self) -> f64 {
        if self.total_budget > 0.0 {
            self.actual_spent / self.total_budget * 100.0
        } else {
            0.0
        }
    }

    pub fn remaining(&self) -> f64 {
        self.total_budget - self.actual_spent
    }

    pub fn allocated_total(&self) -> f64 {
        self.categories.iter().map(|c| c.allocated_amount).sum()
    }
}

#[derive(Debug, Clone)]
pub struct NewBudget {
    pub project_id: Option<Id>,
    pub project_name: String,
    pub budget_type: BudgetType,
    pub department: Option<String>,
    pub total_budget: f64,
    pub currency: String,
    pub categories: Vec<BudgetCategory>,
    pub fiscal_year: i32,
    pub fiscal_period: String,
    pub notes: Option<String>,
    pub created_by: Id,
}

impl NewRecord<Budget> for NewBudget {
    fn into_record(self, id: Id, now: DateTime<Utc>) -> Budget {
        let actual_spent = self.categories.iter().map(|c| c.spent_amount).sum();
        Budget {
            id,
            project_id: self.project_id,
            project_name: self.project_name,
            budget_type: self.budget_type,
            department: self.department,
            total_budget: self.total_budget,
            actual_spent,
            currency: self.currency,
            categories: Json(self.categories),
            status: BudgetStatus::Draft,
            fiscal_year: self.fiscal_year,
            fiscal_period: self.fiscal_period,
            approvals: Json(Vec::new()),
            notes: self.notes,
            created_by: self.created_by,
            created_at: now,
            updated_at: now,
        }
    }
}

impl Identifiable for Budget {
    fn id(&self) -> Id {
        self.id
    }
}

impl Timestamped for Budget {
    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }
}

/// A threshold crossing, stored once per (budget, threshold)
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct BudgetAlert {
    pub id: Id,
    pub budget_id: Id,
    pub threshold: i32,
    pub utilization: f64,
    #[sqlx(try_from = "String")]
    pub severity: AlertSeverity,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewBudgetAlert {
    pub budget_id: Id,
    pub threshold: i32,
    pub utilization: f64,
    pub severity: AlertSeverity,
    pub message: String,
}

impl NewRecord<BudgetAlert> for NewBudgetAlert {
    fn into_record(self, id: Id, now: DateTime<Utc>) -> BudgetAlert {
        BudgetAlert {
            id,
            budget_id: self.budget_id,
            threshold: self.threshold,
            utilization: self.utilization,
            severity: self.severity,
            message: self.message,
            created_at: now,
        }
    }
}

impl Identifiable for BudgetAlert {
    fn id(&self) -> Id {
        self.id
    }
}

impl Timestamped for BudgetAlert {
    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utilization() {
        let mut budget = NewBudget {
            project_id: None,
            project_name: "Office move".into(),
            budget_type: BudgetType::Department,
            department: Some("Operations".into()),
            total_budget: 1000.0,
            currency: "INR".into(),
            categories: vec![],
            fiscal_year: 2024,
            fiscal_period: "annual".into(),
            notes: None,
            created_by: 1,
        }
        .into_record(1, Utc::now());

        budget.actual_spent = 850.0;
        assert_eq!(budget.utilization(), 85.0);
        assert_eq!(budget.remaining(), 150.0);

        budget.total_budget = 0.0;
        assert_eq!(budget.utilization(), 0.0);
    }

    #[test]
    fn test_category_defaults() {
        let category: BudgetCategory = serde_json::from_str("{}").unwrap();
        assert_eq!(category.name, "");
        assert_eq!(category.category_type, "labor");
        assert_eq!(category.allocated_amount, 0.0);
    }

    #[test]
    fn test_severity_for_threshold() {
        assert_eq!(AlertSeverity::for_threshold(80), AlertSeverity::Warning);
        assert_eq!(AlertSeverity::for_threshold(90), AlertSeverity::High);
        assert_eq!(AlertSeverity::for_threshold(100), AlertSeverity::Critical);
    }
}
