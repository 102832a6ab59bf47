//! The forecasting capability: a `fit`/`predict` contract over monthly series plus the
//! models shipped with the crate.
//!
//! Any additive trend + seasonality model can sit behind [`ForecastingModel`]; the
//! pipeline never looks past the trait.

use crate::error::{ForecastError, Result};
use crate::seasonality::{estimate_yearly_offsets, offset_for, MIN_POINTS_FOR_YEARLY};
use crate::utils::{add_months, months_between};
use crate::MonthlySeries;
use chrono::NaiveDate;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// One predicted month.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ForecastPoint {
    pub period: NaiveDate,
    pub point_estimate: f64,
    pub lower_bound: f64,
    pub upper_bound: f64,
}

impl ForecastPoint {
    pub fn zero(period: NaiveDate) -> Self {
        Self {
            period,
            point_estimate: 0.0,
            lower_bound: 0.0,
            upper_bound: 0.0,
        }
    }
}

pub type Forecast = Vec<ForecastPoint>;

pub trait ForecastingModel: Send + Sync {
    fn fit(&self, series: &MonthlySeries) -> Result<Box<dyn FittedModel>>;
}

pub trait FittedModel: Send {
    /// Fitted values for every historical period followed by `periods` future months.
    fn predict(&self, periods: usize) -> Result<Vec<ForecastPoint>>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ModelSettings {
    pub yearly_seasonality: bool,
    /// Monthly buckets carry no weekly signal; kept so settings round-trip.
    pub weekly_seasonality: bool,
    /// Monthly buckets carry no daily signal; kept so settings round-trip.
    pub daily_seasonality: bool,
    #[schemars(description = "Trend flexibility: how far the trend may wander per future month, relative to typical month-to-month change")]
    pub changepoint_prior_scale: f64,
    #[schemars(description = "Strength of the seasonal offsets. Smaller values shrink them toward zero.")]
    pub seasonality_prior_scale: f64,
    #[schemars(description = "Width of the prediction interval, e.g. 0.8 for an 80% interval")]
    pub interval_width: f64,
    pub uncertainty_samples: usize,
    pub seed: u64,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            yearly_seasonality: true,
            weekly_seasonality: false,
            daily_seasonality: false,
            changepoint_prior_scale: 0.05,
            seasonality_prior_scale: 10.0,
            interval_width: 0.8,
            uncertainty_samples: 1000,
            seed: 42,
        }
    }
}

/// Linear trend plus optional yearly seasonality, with intervals taken from simulated
/// future paths.
#[derive(Debug, Clone, Default)]
pub struct AdditiveModel {
    settings: ModelSettings,
}

impl AdditiveModel {
    pub fn new(settings: ModelSettings) -> Self {
        Self { settings }
    }
}

struct FittedAdditive {
    periods: Vec<NaiveDate>,
    origin: NaiveDate,
    intercept: f64,
    slope: f64,
    seasonal: [f64; 12],
    sigma: f64,
    trend_sd: f64,
    settings: ModelSettings,
}

impl ForecastingModel for AdditiveModel {
    fn fit(&self, series: &MonthlySeries) -> Result<Box<dyn FittedModel>> {
        let points = series.points();
        let origin = series.first_period().ok_or(ForecastError::InsufficientData {
            points: 0,
            required: 1,
        })?;

        if points.iter().any(|p| !p.value.is_finite()) {
            return Err(ForecastError::ModelFailure(
                "series contains non-finite values".to_string(),
            ));
        }

        let t: Vec<f64> = points
            .iter()
            .map(|p| months_between(origin, p.period) as f64)
            .collect();
        let y: Vec<f64> = points.iter().map(|p| p.value).collect();
        let n = y.len() as f64;

        let t_mean = t.iter().sum::<f64>() / n;
        let y_mean = y.iter().sum::<f64>() / n;
        let sxx: f64 = t.iter().map(|ti| (ti - t_mean).powi(2)).sum();
        let sxy: f64 = t
            .iter()
            .zip(&y)
            .map(|(ti, yi)| (ti - t_mean) * (yi - y_mean))
            .sum();

        let slope = if sxx > 0.0 { sxy / sxx } else { 0.0 };
        let intercept = y_mean - slope * t_mean;

        let residuals: Vec<(NaiveDate, f64)> = points
            .iter()
            .zip(&t)
            .map(|(p, ti)| (p.period, p.value - (intercept + slope * ti)))
            .collect();

        let seasonal = if self.settings.yearly_seasonality && points.len() >= MIN_POINTS_FOR_YEARLY
        {
            estimate_yearly_offsets(&residuals, self.settings.seasonality_prior_scale)
        } else {
            [0.0; 12]
        };

        let dof = if points.len() > 2 { n - 2.0 } else { n };
        let sse: f64 = residuals
            .iter()
            .map(|(period, r)| (r - offset_for(&seasonal, *period)).powi(2))
            .sum();
        let sigma = (sse / dof).sqrt();

        let mean_abs_change = if y.len() > 1 {
            y.windows(2).map(|w| (w[1] - w[0]).abs()).sum::<f64>() / (n - 1.0)
        } else {
            0.0
        };
        let trend_sd = self.settings.changepoint_prior_scale.max(0.0) * mean_abs_change;

        Ok(Box::new(FittedAdditive {
            periods: points.iter().map(|p| p.period).collect(),
            origin,
            intercept,
            slope,
            seasonal,
            sigma,
            trend_sd,
            settings: self.settings.clone(),
        }))
    }
}

impl FittedAdditive {
    fn mean_at(&self, period: NaiveDate) -> f64 {
        let t = months_between(self.origin, period) as f64;
        self.intercept + self.slope * t + offset_for(&self.seasonal, period)
    }
}

impl FittedModel for FittedAdditive {
    fn predict(&self, periods: usize) -> Result<Vec<ForecastPoint>> {
        let last = match self.periods.last() {
            Some(last) => *last,
            None => return Ok(Vec::new()),
        };

        let mut sampler = IntervalSampler::new(&self.settings, self.sigma, self.trend_sd)?;
        let mut output = Vec::with_capacity(self.periods.len() + periods);

        for period in &self.periods {
            let mean = self.mean_at(*period);
            let (lower, upper) = sampler.interval(mean);
            output.push(ForecastPoint {
                period: *period,
                point_estimate: mean,
                lower_bound: lower,
                upper_bound: upper,
            });
        }

        for step in 1..=periods {
            let period = add_months(last, step as u32)?;
            let mean = self.mean_at(period);
            sampler.advance();
            let (lower, upper) = sampler.interval(mean);
            output.push(ForecastPoint {
                period,
                point_estimate: mean,
                lower_bound: lower,
                upper_bound: upper,
            });
        }

        Ok(output)
    }
}

/// Mean of the most recent `window` months, projected flat.
#[derive(Debug, Clone)]
pub struct MovingAverageModel {
    window: usize,
    settings: ModelSettings,
}

impl MovingAverageModel {
    pub fn new(window: usize, settings: ModelSettings) -> Self {
        Self {
            window: window.max(1),
            settings,
        }
    }
}

struct FittedMovingAverage {
    periods: Vec<NaiveDate>,
    level: f64,
    sigma: f64,
    settings: ModelSettings,
}

impl ForecastingModel for MovingAverageModel {
    fn fit(&self, series: &MonthlySeries) -> Result<Box<dyn FittedModel>> {
        let values = series.values();
        if values.is_empty() {
            return Err(ForecastError::InsufficientData {
                points: 0,
                required: 1,
            });
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(ForecastError::ModelFailure(
                "series contains non-finite values".to_string(),
            ));
        }

        let start = values.len().saturating_sub(self.window);
        let recent = &values[start..];
        let level = recent.iter().sum::<f64>() / recent.len() as f64;
        let variance =
            recent.iter().map(|v| (v - level).powi(2)).sum::<f64>() / recent.len() as f64;

        Ok(Box::new(FittedMovingAverage {
            periods: series.points().iter().map(|p| p.period).collect(),
            level,
            sigma: variance.sqrt(),
            settings: self.settings.clone(),
        }))
    }
}

impl FittedModel for FittedMovingAverage {
    fn predict(&self, periods: usize) -> Result<Vec<ForecastPoint>> {
        let last = match self.periods.last() {
            Some(last) => *last,
            None => return Ok(Vec::new()),
        };

        // No trend walk, so every month shares one interval.
        let mut sampler = IntervalSampler::new(&self.settings, self.sigma, 0.0)?;
        let (lower, upper) = sampler.interval(self.level);
        let future = (1..=periods).map(|step| add_months(last, step as u32));
        let history = self.periods.iter().map(|p| Ok(*p));

        history
            .chain(future)
            .map(|period| {
                Ok(ForecastPoint {
                    period: period?,
                    point_estimate: self.level,
                    lower_bound: lower,
                    upper_bound: upper,
                })
            })
            .collect()
    }
}

/// Draws simulated values around a mean and reads the interval off their quantiles.
///
/// Each sample is `mean + drift + noise`. Every sample path carries its own trend drift,
/// a random walk with deviation `trend_sd` that takes one step per future month;
/// `noise` has deviation `sigma`.
struct IntervalSampler {
    rng: StdRng,
    noise: Normal<f64>,
    walk: Normal<f64>,
    drift: Vec<f64>,
    lower_q: f64,
    upper_q: f64,
}

impl IntervalSampler {
    fn new(settings: &ModelSettings, sigma: f64, trend_sd: f64) -> Result<Self> {
        let noise = Normal::new(0.0, sigma)
            .map_err(|e| ForecastError::ModelFailure(format!("invalid noise scale: {}", e)))?;
        let walk = Normal::new(0.0, trend_sd)
            .map_err(|e| ForecastError::ModelFailure(format!("invalid trend scale: {}", e)))?;
        let width = settings.interval_width.clamp(0.0, 1.0);

        Ok(Self {
            rng: StdRng::seed_from_u64(settings.seed),
            noise,
            walk,
            drift: vec![0.0; settings.uncertainty_samples.max(1)],
            lower_q: (1.0 - width) / 2.0,
            upper_q: (1.0 + width) / 2.0,
        })
    }

    /// Moves every sample path one month further from the last observation.
    fn advance(&mut self) {
        for d in self.drift.iter_mut() {
            *d += self.walk.sample(&mut self.rng);
        }
    }

    fn interval(&mut self, mean: f64) -> (f64, f64) {
        let mut draws: Vec<f64> = Vec::with_capacity(self.drift.len());
        for d in &self.drift {
            draws.push(mean + d + self.noise.sample(&mut self.rng));
        }
        draws.sort_by(|a, b| a.total_cmp(b));

        (quantile(&draws, self.lower_q), quantile(&draws, self.upper_q))
    }
}

fn quantile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = ((sorted.len() - 1) as f64 * q).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}
