use crate::config::ForecastConfig;
use crate::engine::{ForecastAssembler, ForecastInputs};
use crate::error::Result;
use crate::params::{ForecastParams, SimulationParams};
use crate::result::ForecastResult;
use crate::simulation::{CategoryCatalog, SimulationEngine};
use crate::source::{DataSnapshot, DataSource, SnapshotScope};
use chrono::{NaiveDate, Utc};
use log::info;

fn inputs(snapshot: &DataSnapshot) -> ForecastInputs<'_> {
    ForecastInputs {
        transactions: &snapshot.transactions,
        categories: &snapshot.categories,
        recurring: &snapshot.recurring_events,
    }
}

/// Request-level entry point: fetches one ledger snapshot per call and runs the pipeline.
///
/// With `series_timeout_ms` configured, every path trains under the per-series budget.
pub struct ForecastService<D> {
    source: D,
    config: ForecastConfig,
    today: Option<NaiveDate>,
}

impl<D: DataSource> ForecastService<D> {
    pub fn new(source: D, config: ForecastConfig) -> Self {
        Self {
            source,
            config,
            today: None,
        }
    }

    /// Pins "today" instead of reading the UTC clock.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    pub fn config(&self) -> &ForecastConfig {
        &self.config
    }

    fn today(&self) -> NaiveDate {
        self.today.unwrap_or_else(|| Utc::now().date_naive())
    }

    fn assembler(&self) -> ForecastAssembler {
        self.config.assembler(self.today())
    }

    fn fetch(&self, params: &ForecastParams) -> Result<DataSnapshot> {
        self.source.fetch_snapshot(SnapshotScope {
            categories: params.detailed_categories,
            recurring_events: params.include_recurring,
        })
    }

    pub fn forecast(&self, params: &ForecastParams) -> Result<ForecastResult> {
        params.validate()?;
        info!(
            "Forecast requested: {} months, recurring {}, categories {}",
            params.months_ahead, params.include_recurring, params.detailed_categories
        );

        let snapshot = self.fetch(params)?;
        self.assembler().generate(&inputs(&snapshot), params)
    }

    /// [`forecast`](Self::forecast) with per-series training fanned out on the tokio
    /// blocking pool.
    pub async fn forecast_concurrent(&self, params: &ForecastParams) -> Result<ForecastResult> {
        params.validate()?;
        let snapshot = self.fetch(params)?;
        self.assembler()
            .generate_concurrent(&inputs(&snapshot), params)
            .await
    }

    pub fn simulate(&self, params: &SimulationParams) -> Result<ForecastResult> {
        params.validate()?;

        let baseline_params = params.baseline();
        let snapshot = self.fetch(&baseline_params)?;
        let baseline = self.assembler().generate(&inputs(&snapshot), &baseline_params)?;

        Ok(overlay(&snapshot, &baseline, params))
    }

    /// [`simulate`](Self::simulate) with the baseline trained through
    /// [`generate_concurrent`](ForecastAssembler::generate_concurrent).
    pub async fn simulate_concurrent(&self, params: &SimulationParams) -> Result<ForecastResult> {
        params.validate()?;

        let baseline_params = params.baseline();
        let snapshot = self.fetch(&baseline_params)?;
        let baseline = self
            .assembler()
            .generate_concurrent(&inputs(&snapshot), &baseline_params)
            .await?;

        Ok(overlay(&snapshot, &baseline, params))
    }
}

fn overlay(snapshot: &DataSnapshot, baseline: &ForecastResult, params: &SimulationParams) -> ForecastResult {
    if params.events.is_empty() {
        return baseline.clone();
    }

    let catalog = CategoryCatalog::from_categories(&snapshot.categories);
    SimulationEngine::new(&catalog).simulate(baseline, &params.events)
}
