use chrono::{Datelike, Local};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Month keys are `YYYY-MM`, lexicographically sortable.
pub fn current_month_key() -> String {
    let now = Local::now();
    format!("{:04}-{:02}", now.year(), now.month())
}

pub fn is_month_key(input: &str) -> bool {
    let Some((year, month)) = input.split_once('-') else {
        return false;
    };

    year.len() == 4
        && year.chars().all(|ch| ch.is_ascii_digit())
        && month.len() == 2
        && matches!(month.parse::<u8>(), Ok(1..=12))
}

pub fn create_id() -> String {
    Uuid::new_v4().to_string()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CategoryKind {
    /// Bills with a paid checkbox.
    #[default]
    Bills,
    /// Informational balances; `paid` is ignored.
    Income,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    pub id: String,
    pub name: String,
    pub amount: f64,
    #[serde(default)]
    pub paid: bool,
    #[serde(default)]
    pub category_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: String,
    pub name: String,
    // Legacy records omit the type; they are bills.
    #[serde(default, rename = "type")]
    pub kind: CategoryKind,
    // The wire shape calls income entries "bills" too.
    #[serde(rename = "bills", default)]
    pub entries: Vec<Entry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub split_by: Option<u32>,
}

impl Category {
    pub fn new(name: impl Into<String>, kind: CategoryKind, split_by: Option<u32>) -> Self {
        Self {
            id: create_id(),
            name: name.into(),
            kind,
            entries: Vec::new(),
            split_by,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Budget {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<String>,
    pub category_name: String,
    pub limit: f64,
    /// Snapshot at creation/edit time, not live-recomputed.
    pub spent: f64,
    pub month_key: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InvestmentKind {
    Stocks,
    Funds,
    Crypto,
    Savings,
    RealEstate,
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Investment {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: InvestmentKind,
    /// Cost basis.
    pub amount: f64,
    pub purchase_date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl Investment {
    pub fn current_value_or_cost(&self) -> f64 {
        self.current_value.unwrap_or(self.amount)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GoalCategory {
    Emergency,
    Purchase,
    Vacation,
    Education,
    Retirement,
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinancialGoal {
    pub id: String,
    pub name: String,
    pub category: GoalCategory,
    pub target_amount: f64,
    pub current_amount: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BillingCycle {
    Monthly,
    Quarterly,
    Yearly,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub id: String,
    pub name: String,
    pub amount: f64,
    pub billing_cycle: BillingCycle,
    pub next_billing_date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// One record per `YYYY-MM` month key; category order is display order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthRecord {
    pub month_key: String,
    #[serde(default)]
    pub categories: Vec<Category>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budgets: Option<Vec<Budget>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub investments: Option<Vec<Investment>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goals: Option<Vec<FinancialGoal>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscriptions: Option<Vec<Subscription>>,
}

impl MonthRecord {
    pub fn new(month_key: impl Into<String>) -> Self {
        Self {
            month_key: month_key.into(),
            categories: Vec::new(),
            budgets: None,
            investments: None,
            goals: None,
            subscriptions: None,
        }
    }

    pub fn category(&self, category_id: &str) -> Option<&Category> {
        self.categories.iter().find(|c| c.id == category_id)
    }

    pub fn category_mut(&mut self, category_id: &str) -> Option<&mut Category> {
        self.categories.iter_mut().find(|c| c.id == category_id)
    }

    /// Copies this month's categories into a new record under `target_key`
    /// with fresh ids and every bill reset to unpaid. Budgets, investments,
    /// goals and subscriptions do not carry over.
    pub fn duplicate_as(&self, target_key: impl Into<String>) -> MonthRecord {
        let categories = self
            .categories
            .iter()
            .map(|category| {
                let category_id = create_id();
                Category {
                    id: category_id.clone(),
                    name: category.name.clone(),
                    kind: category.kind,
                    split_by: category.split_by,
                    entries: category
                        .entries
                        .iter()
                        .map(|entry| Entry {
                            id: create_id(),
                            name: entry.name.clone(),
                            amount: entry.amount,
                            paid: false,
                            category_id: category_id.clone(),
                            note: entry.note.clone(),
                        })
                        .collect(),
                }
            })
            .collect();

        MonthRecord {
            month_key: target_key.into(),
            categories,
            budgets: None,
            investments: None,
            goals: None,
            subscriptions: None,
        }
    }
}
