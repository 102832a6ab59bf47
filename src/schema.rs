use chrono::NaiveDate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct Refund {
    #[schemars(description = "Refunded amount, a non-negative magnitude subtracted from the parent transaction")]
    pub amount: f64,

    #[serde(default)]
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct Transaction {
    pub id: String,

    #[schemars(description = "Date the transaction happened. Used as the monthly grouping key by default.")]
    pub date: NaiveDate,

    #[serde(default)]
    #[schemars(description = "Booking date. Used as the grouping key when the accounting date basis is selected.")]
    pub accounting_date: Option<NaiveDate>,

    #[schemars(description = "Amount as a non-negative magnitude. The direction comes from is_income.")]
    pub amount: f64,

    pub is_income: bool,

    pub category_id: String,

    #[serde(default)]
    pub subcategory_id: Option<String>,

    #[serde(default)]
    pub refunds: Vec<Refund>,
}

impl Transaction {
    /// Amount minus every refund attached to it.
    pub fn net_amount(&self) -> f64 {
        self.amount - self.refunds.iter().map(|r| r.amount).sum::<f64>()
    }

    /// Net amount with the training sign: income positive, expense negative.
    pub fn signed_net_amount(&self) -> f64 {
        if self.is_income {
            self.net_amount()
        } else {
            -self.net_amount()
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum CategoryType {
    #[schemars(description = "Money coming in: salaries, sales, interest")]
    Income,

    #[schemars(description = "Variable spending: groceries, leisure, travel")]
    Expense,

    #[schemars(description = "Committed spending that barely moves month to month: rent, insurance, subscriptions")]
    FixedExpense,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct Subcategory {
    pub id: String,
    pub name: String,
    pub category_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct Category {
    pub id: String,
    pub name: String,

    #[serde(rename = "type")]
    pub category_type: CategoryType,

    #[serde(default)]
    pub subcategories: Vec<Subcategory>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frequency {
    Monthly,
    Quarterly,
    Yearly,
}

impl Frequency {
    /// Unknown values yield `None` so that newer frequencies are skipped, not rejected.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "monthly" => Some(Self::Monthly),
            "quarterly" => Some(Self::Quarterly),
            "yearly" => Some(Self::Yearly),
            _ => None,
        }
    }

    pub fn step_months(&self) -> u32 {
        match self {
            Self::Monthly => 1,
            Self::Quarterly => 3,
            Self::Yearly => 12,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct RecurringEventDefinition {
    #[serde(default)]
    pub id: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    pub amount: f64,

    pub is_income: bool,

    pub category_id: String,

    #[serde(default)]
    pub subcategory_id: Option<String>,

    #[schemars(description = "One of 'monthly', 'quarterly', 'yearly'. Other values are ignored during projection.")]
    pub frequency: String,

    pub start_date: NaiveDate,

    #[serde(default)]
    #[schemars(description = "Last date an occurrence may fall on. When absent the projection stops two years from today.")]
    pub end_date: Option<NaiveDate>,

    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl RecurringEventDefinition {
    pub fn frequency(&self) -> Option<Frequency> {
        Frequency::parse(&self.frequency)
    }
}

/// A hypothetical cash flow applied on top of a baseline forecast. Never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct SimulationEvent {
    pub date: NaiveDate,

    pub amount: f64,

    pub is_income: bool,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub category_id: Option<String>,

    #[serde(default)]
    pub subcategory_id: Option<String>,
}
