use crate::aggregation::{HistoricalAggregator, PortfolioSeries};
use crate::composer::CategoryForecastComposer;
use crate::concurrent::{ConcurrentForecaster, SeriesJob, SeriesKey};
use crate::error::Result;
use crate::forecaster::{SeriesForecaster, SufficiencyPolicy};
use crate::model::{Forecast, ForecastPoint};
use crate::params::ForecastParams;
use crate::recurring::{monthly_totals, RecurringEventProjector, DEFAULT_CEILING_DAYS};
use crate::result::{CategoryForecast, ForecastResult};
use crate::schema::{Category, RecurringEventDefinition, Transaction};
use crate::utils::{future_period_starts, last_day_of_month, same_month};
use crate::MonthlySeries;
use chrono::NaiveDate;
use log::{debug, info, warn};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

/// Everything a forecast is computed from. Read-only.
#[derive(Debug, Clone, Copy, Default)]
pub struct ForecastInputs<'a> {
    pub transactions: &'a [Transaction],
    pub categories: &'a [Category],
    pub recurring: &'a [RecurringEventDefinition],
}

/// Combines portfolio forecasts, recurring flows and the category breakdown into one
/// [`ForecastResult`].
#[derive(Clone)]
pub struct ForecastAssembler {
    forecaster: SeriesForecaster,
    aggregator: HistoricalAggregator,
    today: NaiveDate,
    recurring_ceiling_days: i64,
    series_timeout: Option<Duration>,
}

impl ForecastAssembler {
    pub fn new(forecaster: SeriesForecaster, today: NaiveDate) -> Self {
        Self {
            forecaster,
            aggregator: HistoricalAggregator::default(),
            today,
            recurring_ceiling_days: DEFAULT_CEILING_DAYS,
            series_timeout: None,
        }
    }

    pub fn with_aggregator(mut self, aggregator: HistoricalAggregator) -> Self {
        self.aggregator = aggregator;
        self
    }

    pub fn with_recurring_ceiling_days(mut self, days: i64) -> Self {
        self.recurring_ceiling_days = days;
        self
    }

    /// Per-series training budget. Both [`generate`](Self::generate) and
    /// [`generate_concurrent`](Self::generate_concurrent) honour it.
    pub fn with_series_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.series_timeout = timeout;
        self
    }

    pub fn today(&self) -> NaiveDate {
        self.today
    }

    /// Trains every series in turn on the calling thread. With a series timeout set, the
    /// work runs on a private runtime instead so the budget applies; inside an async
    /// context use [`generate_concurrent`](Self::generate_concurrent).
    pub fn generate(&self, inputs: &ForecastInputs, params: &ForecastParams) -> Result<ForecastResult> {
        if let Some(timeout) = self.series_timeout {
            if tokio::runtime::Handle::try_current().is_err() {
                return self.generate_bounded(inputs, params);
            }
            warn!(
                "Series timeout of {:?} not applied: generate called inside an async runtime",
                timeout
            );
        }

        let dates = future_period_starts(self.today, params.horizon()?);
        let portfolio = self.aggregator.portfolio_series(inputs.transactions);

        if portfolio.is_empty() {
            return Ok(self.empty_history(dates));
        }

        let income = self.portfolio_forecast(&portfolio.income, &dates);
        let expense = self.portfolio_forecast(&portfolio.expense, &dates);

        let categories = if params.detailed_categories {
            Some(self.composer().compose(inputs.transactions, inputs.categories, &dates))
        } else {
            None
        };

        Ok(self.finish(dates, &income, &expense, inputs, params, categories))
    }

    /// Same result as [`generate`](Self::generate), with every series trained concurrently
    /// under the configured timeout.
    pub async fn generate_concurrent(
        &self,
        inputs: &ForecastInputs<'_>,
        params: &ForecastParams,
    ) -> Result<ForecastResult> {
        let dates = future_period_starts(self.today, params.horizon()?);
        let PortfolioSeries { income, expense } =
            self.aggregator.portfolio_series(inputs.transactions);

        if income.is_empty() && expense.is_empty() {
            return Ok(self.empty_history(dates));
        }

        let shared_dates = Arc::new(dates.clone());
        let composer = self.composer();
        let plan = if params.detailed_categories {
            composer.plan(inputs.transactions, inputs.categories)
        } else {
            Vec::new()
        };

        let mut jobs = vec![
            SeriesJob::new(SeriesKey::Income, income, shared_dates.clone(), SufficiencyPolicy::ZeroFill),
            SeriesJob::new(SeriesKey::Expense, expense, shared_dates.clone(), SufficiencyPolicy::ZeroFill),
        ];
        for node in &plan {
            jobs.push(SeriesJob::new(
                node.key(),
                node.series.clone(),
                shared_dates.clone(),
                SufficiencyPolicy::Omit,
            ));
            for sub in &node.subcategories {
                jobs.push(SeriesJob::new(
                    node.subcategory_key(sub),
                    sub.series.clone(),
                    shared_dates.clone(),
                    SufficiencyPolicy::Omit,
                ));
            }
        }

        let runner = ConcurrentForecaster::new(self.forecaster.clone(), self.series_timeout);
        let mut outcomes: HashMap<SeriesKey, Option<Forecast>> =
            runner.forecast_all(jobs).await.into_iter().collect();

        let income = outcomes.remove(&SeriesKey::Income).flatten().unwrap_or_default();
        let expense = outcomes.remove(&SeriesKey::Expense).flatten().unwrap_or_default();

        let categories = if params.detailed_categories {
            Some(CategoryForecastComposer::assemble(plan, |key, _| {
                outcomes.remove(key).flatten()
            }))
        } else {
            None
        };

        Ok(self.finish(dates, &income, &expense, inputs, params, categories))
    }

    fn generate_bounded(&self, inputs: &ForecastInputs, params: &ForecastParams) -> Result<ForecastResult> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()?;
        let result = runtime.block_on(self.generate_concurrent(inputs, params));
        // Timed-out training threads are left to finish on their own.
        runtime.shutdown_background();
        result
    }

    fn composer(&self) -> CategoryForecastComposer {
        CategoryForecastComposer::new(self.forecaster.clone(), self.aggregator)
    }

    fn portfolio_forecast(&self, series: &MonthlySeries, dates: &[NaiveDate]) -> Forecast {
        self.forecaster
            .forecast_with_policy(series, dates, SufficiencyPolicy::ZeroFill)
            .unwrap_or_default()
    }

    /// No history at all: zeros over the horizon, recurring flows not applied.
    fn empty_history(&self, dates: Vec<NaiveDate>) -> ForecastResult {
        info!(
            "No transaction history; returning a zero forecast over {} months",
            dates.len()
        );
        ForecastResult::zeroed(dates)
    }

    fn finish(
        &self,
        dates: Vec<NaiveDate>,
        income: &[ForecastPoint],
        expense: &[ForecastPoint],
        inputs: &ForecastInputs,
        params: &ForecastParams,
        categories: Option<BTreeMap<String, CategoryForecast>>,
    ) -> ForecastResult {
        let mut result = ForecastResult::zeroed(dates);

        for (i, date) in result.dates.iter().enumerate() {
            let inc = point_for(income, *date, "income");
            let exp = point_for(expense, *date, "expense");

            result.forecast.income[i] = inc.point_estimate;
            result.forecast.expense[i] = exp.point_estimate;
            result.min_forecast[i] = inc.lower_bound - exp.upper_bound;
            result.max_forecast[i] = inc.upper_bound - exp.lower_bound;
        }

        if params.include_recurring {
            self.add_recurring(&mut result, inputs.recurring);
        }

        result.recompute_totals();
        result.categories = categories.filter(|c| !c.is_empty());

        info!(
            "Forecast over {} months: income {:.2}, expense {:.2}, balance {:.2}",
            result.months_ahead(),
            result.total_income,
            result.total_expense,
            result.balance
        );
        result
    }

    /// Adds recurring flows to the point estimates. Bounds are left as the model gave them.
    fn add_recurring(&self, result: &mut ForecastResult, definitions: &[RecurringEventDefinition]) {
        let horizon_end = match result.dates.last() {
            Some(last) => last_day_of_month(*last),
            None => return,
        };

        let occurrences = RecurringEventProjector::new(self.today, horizon_end)
            .with_ceiling_days(self.recurring_ceiling_days)
            .project(definitions);

        for (i, date) in result.dates.iter().enumerate() {
            let (income, expense) = monthly_totals(&occurrences, *date);
            result.forecast.income[i] += income;
            result.forecast.expense[i] += expense;
        }
        debug!("Applied {} recurring occurrences", occurrences.len());
    }
}

fn point_for(points: &[ForecastPoint], date: NaiveDate, label: &str) -> ForecastPoint {
    match points.iter().find(|p| same_month(p.period, date)) {
        Some(point) => *point,
        None => {
            warn!("No {} forecast for {}; using zero", label, date);
            ForecastPoint::zero(date)
        }
    }
}
