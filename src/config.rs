use crate::aggregation::{DateBasis, HistoricalAggregator};
use crate::engine::ForecastAssembler;
use crate::error::{ForecastError, Result};
use crate::forecaster::{SeriesForecaster, DEFAULT_MIN_POINTS};
use crate::model::{AdditiveModel, ForecastingModel, ModelSettings, MovingAverageModel};
use crate::recurring::DEFAULT_CEILING_DAYS;
use chrono::NaiveDate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Which forecasting model backs every series.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelKind {
    #[default]
    Additive,
    /// Flat projection of the recent mean, for sparse or erratic ledgers.
    MovingAverage { window: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ForecastConfig {
    pub model: ModelSettings,
    pub model_kind: ModelKind,
    #[schemars(description = "Months of history a series needs before it is modelled")]
    pub min_history_points: usize,
    pub date_basis: DateBasis,
    #[schemars(description = "Insert zero months between the first and last observed month")]
    pub fill_gaps: bool,
    #[schemars(description = "Projection ceiling in days for recurring events without an end date")]
    pub recurring_ceiling_days: i64,
    #[schemars(description = "Per-series training budget in milliseconds, applied on every forecast path")]
    pub series_timeout_ms: Option<u64>,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            model: ModelSettings::default(),
            model_kind: ModelKind::default(),
            min_history_points: DEFAULT_MIN_POINTS,
            date_basis: DateBasis::default(),
            fill_gaps: true,
            recurring_ceiling_days: DEFAULT_CEILING_DAYS,
            series_timeout_ms: None,
        }
    }
}

impl ForecastConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn validate(&self) -> Result<()> {
        let width = self.model.interval_width;
        if !(width > 0.0 && width < 1.0) {
            return Err(ForecastError::Configuration(format!(
                "interval_width must be between 0 and 1 (exclusive), got {}",
                width
            )));
        }
        if self.min_history_points < 1 {
            return Err(ForecastError::Configuration(
                "min_history_points must be at least 1".to_string(),
            ));
        }
        if self.model.uncertainty_samples < 1 {
            return Err(ForecastError::Configuration(
                "uncertainty_samples must be at least 1".to_string(),
            ));
        }
        if let ModelKind::MovingAverage { window: 0 } = self.model_kind {
            return Err(ForecastError::Configuration(
                "moving average window must be at least 1".to_string(),
            ));
        }
        if self.recurring_ceiling_days < 0 {
            return Err(ForecastError::Configuration(
                "recurring_ceiling_days cannot be negative".to_string(),
            ));
        }
        Ok(())
    }

    pub fn build_model(&self) -> Arc<dyn ForecastingModel> {
        match self.model_kind {
            ModelKind::Additive => Arc::new(AdditiveModel::new(self.model.clone())),
            ModelKind::MovingAverage { window } => {
                Arc::new(MovingAverageModel::new(window, self.model.clone()))
            }
        }
    }

    pub fn series_timeout(&self) -> Option<Duration> {
        self.series_timeout_ms.map(Duration::from_millis)
    }

    /// An assembler wired with every setting in this config.
    pub fn assembler(&self, today: NaiveDate) -> ForecastAssembler {
        let forecaster = SeriesForecaster::new(self.build_model(), today)
            .with_min_points(self.min_history_points);

        ForecastAssembler::new(forecaster, today)
            .with_aggregator(HistoricalAggregator::new(self.date_basis, self.fill_gaps))
            .with_recurring_ceiling_days(self.recurring_ceiling_days)
            .with_series_timeout(self.series_timeout())
    }
}
