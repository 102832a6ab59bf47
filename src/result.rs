use crate::schema::CategoryType;
use chrono::NaiveDate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Point estimates for the two portfolio series, one value per forecast month.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ForecastSeries {
    pub income: Vec<f64>,
    pub expense: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SubcategoryForecast {
    #[schemars(description = "Signed point estimates (income positive, expense negative), one per forecast month")]
    pub forecast: Vec<f64>,
    pub min_forecast: Vec<f64>,
    pub max_forecast: Vec<f64>,
    #[schemars(description = "Signed monthly history the model was trained on, oldest first")]
    pub historical: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CategoryForecast {
    #[serde(rename = "type")]
    pub category_type: CategoryType,
    pub forecast: Vec<f64>,
    pub min_forecast: Vec<f64>,
    pub max_forecast: Vec<f64>,
    pub historical: Vec<f64>,
    #[serde(default)]
    pub subcategories: BTreeMap<String, SubcategoryForecast>,
}

/// The forecast handed back to callers. Field names are part of the wire contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ForecastResult {
    #[schemars(description = "First day of each forecast month, in order")]
    pub dates: Vec<NaiveDate>,

    pub forecast: ForecastSeries,

    #[schemars(description = "Pessimistic net bound per month: income lower bound minus expense upper bound")]
    pub min_forecast: Vec<f64>,

    #[schemars(description = "Optimistic net bound per month: income upper bound minus expense lower bound")]
    pub max_forecast: Vec<f64>,

    pub total_income: f64,
    pub total_expense: f64,

    #[schemars(description = "total_income - total_expense")]
    pub balance: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub categories: Option<BTreeMap<String, CategoryForecast>>,
}

impl ForecastResult {
    /// A structurally complete, all-zero forecast over `dates`.
    pub fn zeroed(dates: Vec<NaiveDate>) -> Self {
        let n = dates.len();
        Self {
            dates,
            forecast: ForecastSeries {
                income: vec![0.0; n],
                expense: vec![0.0; n],
            },
            min_forecast: vec![0.0; n],
            max_forecast: vec![0.0; n],
            total_income: 0.0,
            total_expense: 0.0,
            balance: 0.0,
            categories: None,
        }
    }

    pub fn months_ahead(&self) -> usize {
        self.dates.len()
    }

    pub fn period_index(&self, period: NaiveDate) -> Option<usize> {
        self.dates.iter().position(|d| *d == period)
    }

    /// Recomputes totals from the full-horizon point arrays.
    pub fn recompute_totals(&mut self) {
        self.total_income = self.forecast.income.iter().sum();
        self.total_expense = self.forecast.expense.iter().sum();
        self.balance = self.total_income - self.total_expense;
    }

    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(ForecastResult)
    }

    pub fn schema_as_json() -> Result<String, serde_json::Error> {
        let schema = Self::generate_json_schema();
        serde_json::to_string_pretty(&schema)
    }
}
