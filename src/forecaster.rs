use crate::error::Result;
use crate::model::{Forecast, ForecastPoint, ForecastingModel};
use crate::utils::{future_period_starts, months_between, same_month};
use crate::MonthlySeries;
use chrono::NaiveDate;
use log::{debug, warn};
use std::sync::Arc;

/// Minimum monthly points before a series is handed to the model.
pub const DEFAULT_MIN_POINTS: usize = 3;

/// What a call site does with a series that is too short to model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SufficiencyPolicy {
    /// Produce a zero forecast (portfolio totals must always exist).
    ZeroFill,
    /// Leave the series out of the output (category and subcategory breakdowns).
    Omit,
}

/// Uniform train/predict front for a [`ForecastingModel`], with the insufficient-data and
/// model-failure policies applied.
#[derive(Clone)]
pub struct SeriesForecaster {
    model: Arc<dyn ForecastingModel>,
    min_points: usize,
    today: NaiveDate,
}

impl SeriesForecaster {
    pub fn new(model: Arc<dyn ForecastingModel>, today: NaiveDate) -> Self {
        Self {
            model,
            min_points: DEFAULT_MIN_POINTS,
            today,
        }
    }

    pub fn with_min_points(mut self, min_points: usize) -> Self {
        self.min_points = min_points.max(1);
        self
    }

    pub fn min_points(&self) -> usize {
        self.min_points
    }

    pub fn today(&self) -> NaiveDate {
        self.today
    }

    pub fn has_enough_history(&self, series: &MonthlySeries) -> bool {
        !series.is_empty() && series.len() >= self.min_points
    }

    /// Fits the series and returns the model output: fitted history followed by
    /// `horizon_length` months beyond the last historical period.
    ///
    /// Short or empty series, and any model error, give `horizon_length` zero points
    /// starting the month after today.
    pub fn train(&self, series: &MonthlySeries, horizon_length: usize) -> Forecast {
        if !self.has_enough_history(series) {
            debug!(
                "Series has {} of {} required points; using zero forecast",
                series.len(),
                self.min_points
            );
            return self.zero_forecast(horizon_length);
        }

        match self.fit_and_predict(series, horizon_length) {
            Ok(forecast) => forecast,
            Err(e) => {
                warn!("Model failed on series of {} points: {}", series.len(), e);
                self.zero_forecast(horizon_length)
            }
        }
    }

    /// Forecasts the series and keeps only the points whose month matches one of
    /// `dates`, in `dates` order. Months the model did not produce are dropped.
    pub fn forecast_for(&self, series: &MonthlySeries, dates: &[NaiveDate]) -> Forecast {
        if !self.has_enough_history(series) {
            return zeros_for(dates);
        }

        let periods = self.periods_to_cover(series, dates);
        match self.fit_and_predict(series, periods) {
            Ok(output) => match_periods(&output, dates),
            Err(e) => {
                warn!("Model failed on series of {} points: {}", series.len(), e);
                zeros_for(dates)
            }
        }
    }

    pub fn forecast_with_policy(
        &self,
        series: &MonthlySeries,
        dates: &[NaiveDate],
        policy: SufficiencyPolicy,
    ) -> Option<Forecast> {
        if self.has_enough_history(series) {
            return Some(self.forecast_for(series, dates));
        }

        match policy {
            SufficiencyPolicy::ZeroFill => Some(zeros_for(dates)),
            SufficiencyPolicy::Omit => None,
        }
    }

    fn fit_and_predict(&self, series: &MonthlySeries, periods: usize) -> Result<Forecast> {
        let fitted = self.model.fit(series)?;
        fitted.predict(periods)
    }

    /// At least `dates.len()` months past the history, and enough to reach the last date
    /// when the history stops short of the horizon.
    fn periods_to_cover(&self, series: &MonthlySeries, dates: &[NaiveDate]) -> usize {
        let reach = match (series.last_period(), dates.last()) {
            (Some(last_hist), Some(last_date)) => months_between(last_hist, *last_date).max(0),
            _ => 0,
        };
        dates.len().max(reach as usize)
    }

    fn zero_forecast(&self, horizon_length: usize) -> Forecast {
        zeros_for(&future_period_starts(self.today, horizon_length))
    }
}

pub(crate) fn zeros_for(dates: &[NaiveDate]) -> Forecast {
    dates.iter().map(|d| ForecastPoint::zero(*d)).collect()
}

fn match_periods(output: &[ForecastPoint], dates: &[NaiveDate]) -> Forecast {
    dates
        .iter()
        .filter_map(|date| output.iter().find(|p| same_month(p.period, *date)).copied())
        .collect()
}
