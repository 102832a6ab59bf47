//! Fan-out of per-series training onto the blocking pool, with a per-series time budget.
//!
//! Training is CPU-bound, so each series runs on `spawn_blocking`. A series that overruns
//! its budget or panics is replaced by its policy's fallback; the rest are unaffected.

use crate::error::ForecastError;
use crate::forecaster::{zeros_for, SeriesForecaster, SufficiencyPolicy};
use crate::model::Forecast;
use crate::MonthlySeries;
use chrono::NaiveDate;
use futures::future::join_all;
use log::{debug, warn};
use std::sync::Arc;
use std::time::Duration;

/// Identifies one series in a forecasting request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SeriesKey {
    Income,
    Expense,
    Category(String),
    Subcategory {
        category_id: String,
        subcategory_id: String,
    },
}

#[derive(Debug, Clone)]
pub struct SeriesJob {
    pub key: SeriesKey,
    pub series: MonthlySeries,
    pub dates: Arc<Vec<NaiveDate>>,
    pub policy: SufficiencyPolicy,
}

impl SeriesJob {
    pub fn new(
        key: SeriesKey,
        series: MonthlySeries,
        dates: Arc<Vec<NaiveDate>>,
        policy: SufficiencyPolicy,
    ) -> Self {
        Self {
            key,
            series,
            dates,
            policy,
        }
    }

    fn fallback(&self) -> Option<Forecast> {
        match self.policy {
            SufficiencyPolicy::ZeroFill => Some(zeros_for(&self.dates)),
            SufficiencyPolicy::Omit => None,
        }
    }
}

#[derive(Clone)]
pub struct ConcurrentForecaster {
    forecaster: SeriesForecaster,
    timeout: Option<Duration>,
}

impl ConcurrentForecaster {
    pub fn new(forecaster: SeriesForecaster, timeout: Option<Duration>) -> Self {
        Self {
            forecaster,
            timeout,
        }
    }

    /// Trains every job concurrently. Results come back in job order.
    pub async fn forecast_all(&self, jobs: Vec<SeriesJob>) -> Vec<(SeriesKey, Option<Forecast>)> {
        debug!("Training {} series concurrently", jobs.len());
        let tasks = jobs.into_iter().map(|job| self.run(job));
        join_all(tasks).await
    }

    async fn run(&self, job: SeriesJob) -> (SeriesKey, Option<Forecast>) {
        let forecaster = self.forecaster.clone();
        let series = job.series.clone();
        let dates = Arc::clone(&job.dates);
        let policy = job.policy;

        let handle = tokio::task::spawn_blocking(move || {
            forecaster.forecast_with_policy(&series, &dates, policy)
        });

        let outcome = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, handle).await {
                Ok(joined) => joined.map_err(|e| ForecastError::ModelFailure(e.to_string())),
                Err(_) => Err(ForecastError::Timeout),
            },
            None => handle
                .await
                .map_err(|e| ForecastError::ModelFailure(e.to_string())),
        };

        match outcome {
            Ok(forecast) => (job.key, forecast),
            Err(e) => {
                warn!("Series {:?} fell back to its default forecast: {}", job.key, e);
                let fallback = job.fallback();
                (job.key, fallback)
            }
        }
    }
}
