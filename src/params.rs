use crate::error::{ForecastError, Result};
use crate::schema::SimulationEvent;
use crate::MAX_MONTHS_AHEAD;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const DEFAULT_MONTHS_AHEAD: i32 = 6;

fn default_months_ahead() -> i32 {
    DEFAULT_MONTHS_AHEAD
}

fn default_true() -> bool {
    true
}

fn check_horizon(months_ahead: i32) -> Result<usize> {
    if !(0..=MAX_MONTHS_AHEAD).contains(&months_ahead) {
        return Err(ForecastError::InvalidHorizon(months_ahead));
    }
    usize::try_from(months_ahead).map_err(|_| ForecastError::InvalidHorizon(months_ahead))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ForecastParams {
    #[serde(default = "default_months_ahead")]
    #[schemars(description = "Number of future calendar months to forecast, starting the month after today (0-120)")]
    pub months_ahead: i32,

    #[serde(default = "default_true")]
    pub include_recurring: bool,

    #[serde(default = "default_true")]
    pub detailed_categories: bool,
}

impl Default for ForecastParams {
    fn default() -> Self {
        Self {
            months_ahead: DEFAULT_MONTHS_AHEAD,
            include_recurring: true,
            detailed_categories: true,
        }
    }
}

impl ForecastParams {
    pub fn new(months_ahead: i32) -> Self {
        Self {
            months_ahead,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        check_horizon(self.months_ahead).map(|_| ())
    }

    /// The validated horizon length.
    pub fn horizon(&self) -> Result<usize> {
        check_horizon(self.months_ahead)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SimulationParams {
    #[serde(default = "default_months_ahead")]
    pub months_ahead: i32,

    #[serde(default)]
    pub events: Vec<SimulationEvent>,
}

impl Default for SimulationParams {
    fn default() -> Self {
        Self {
            months_ahead: DEFAULT_MONTHS_AHEAD,
            events: Vec::new(),
        }
    }
}

impl SimulationParams {
    pub fn validate(&self) -> Result<()> {
        check_horizon(self.months_ahead).map(|_| ())
    }

    /// Baseline parameters: recurring flows and category detail always on.
    pub fn baseline(&self) -> ForecastParams {
        ForecastParams {
            months_ahead: self.months_ahead,
            include_recurring: true,
            detailed_categories: true,
        }
    }
}
