//! # Budget Forecast
//!
//! Multi-month budget forecasts from a ledger of past transactions, with recurring cash
//! flows projected forward, a category breakdown, and what-if simulation on top.
//!
//! ## Core Concepts
//!
//! - **Period**: a calendar month, keyed by its first day
//! - **Horizon**: the next N months after today, independent of the data
//! - **Magnitude convention**: income and expense are both non-negative; net = income - expense
//! - **Forecasting model**: anything implementing [`ForecastingModel`]; [`AdditiveModel`] by default
//! - **Simulation overlay**: hypothetical events applied to a copy of a baseline forecast
//!
//! ## Example
//!
//! ```rust,ignore
//! use budget_forecast::*;
//! use chrono::NaiveDate;
//!
//! let transactions = vec![Transaction {
//!     id: "t1".to_string(),
//!     date: NaiveDate::from_ymd_opt(2024, 1, 3).unwrap(),
//!     accounting_date: None,
//!     amount: 3200.0,
//!     is_income: true,
//!     category_id: "salary".to_string(),
//!     subcategory_id: None,
//!     refunds: vec![],
//! }];
//!
//! let baseline = generate_forecast(&transactions, &[], &[], 6, true, true)?;
//! println!("Expected balance: {:.2}", baseline.balance);
//! ```

pub mod aggregation;
pub mod composer;
pub mod concurrent;
pub mod config;
pub mod engine;
pub mod error;
pub mod forecaster;
pub mod model;
pub mod params;
pub mod recurring;
pub mod result;
pub mod schema;
pub mod seasonality;
pub mod service;
pub mod simulation;
pub mod source;
pub mod utils;

pub use aggregation::{DateBasis, HistoricalAggregator, PortfolioSeries};
pub use composer::CategoryForecastComposer;
pub use concurrent::{ConcurrentForecaster, SeriesJob, SeriesKey};
pub use config::{ForecastConfig, ModelKind};
pub use engine::{ForecastAssembler, ForecastInputs};
pub use error::{ForecastError, Result};
pub use forecaster::{SeriesForecaster, SufficiencyPolicy};
pub use model::{
    AdditiveModel, FittedModel, Forecast, ForecastPoint, ForecastingModel, ModelSettings,
    MovingAverageModel,
};
pub use params::{ForecastParams, SimulationParams};
pub use recurring::{RecurringEventProjector, RecurringOccurrence};
pub use result::{CategoryForecast, ForecastResult, ForecastSeries, SubcategoryForecast};
pub use schema::*;
pub use service::ForecastService;
pub use simulation::{CategoryCatalog, SimulationEngine};
pub use source::{
    DataSnapshot, DataSource, DataSourceConfig, FailoverSource, InMemorySource, JsonFileSource,
    SnapshotScope, TransactionFilter,
};

use chrono::{NaiveDate, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Longest horizon a request may ask for, in months.
pub const MAX_MONTHS_AHEAD: i32 = 120;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MonthlySeriesPoint {
    /// First day of the month.
    pub period: NaiveDate,
    pub value: f64,
}

/// Monthly values ordered by period, one point per month.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct MonthlySeries(Vec<MonthlySeriesPoint>);

impl MonthlySeries {
    /// Sorts by period and sums points that share a month.
    pub fn from_points(mut points: Vec<MonthlySeriesPoint>) -> Self {
        points.sort_by_key(|p| p.period);

        let mut merged: Vec<MonthlySeriesPoint> = Vec::with_capacity(points.len());
        for point in points {
            match merged.last_mut() {
                Some(last) if utils::same_month(last.period, point.period) => {
                    last.value += point.value;
                }
                _ => merged.push(MonthlySeriesPoint {
                    period: utils::first_of_month(point.period),
                    value: point.value,
                }),
            }
        }

        Self(merged)
    }

    pub fn points(&self) -> &[MonthlySeriesPoint] {
        &self.0
    }

    pub fn values(&self) -> Vec<f64> {
        self.0.iter().map(|p| p.value).collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn first_period(&self) -> Option<NaiveDate> {
        self.0.first().map(|p| p.period)
    }

    pub fn last_period(&self) -> Option<NaiveDate> {
        self.0.last().map(|p| p.period)
    }
}

/// Forecast `months_ahead` months from today's UTC date with the default additive model.
pub fn generate_forecast(
    records: &[Transaction],
    categories: &[Category],
    recurring: &[RecurringEventDefinition],
    months_ahead: i32,
    include_recurring: bool,
    detailed_categories: bool,
) -> Result<ForecastResult> {
    let today = Utc::now().date_naive();
    let forecaster = SeriesForecaster::new(Arc::new(AdditiveModel::default()), today);
    let params = ForecastParams {
        months_ahead,
        include_recurring,
        detailed_categories,
    };
    let inputs = ForecastInputs {
        transactions: records,
        categories,
        recurring,
    };

    ForecastAssembler::new(forecaster, today).generate(&inputs, &params)
}

pub fn simulate_forecast(
    baseline: &ForecastResult,
    events: &[SimulationEvent],
    catalog: &CategoryCatalog,
) -> ForecastResult {
    SimulationEngine::new(catalog).simulate(baseline, events)
}
