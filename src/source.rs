//! Where ledger data comes from. The forecasting core only sees [`DataSource`].

use crate::error::{ForecastError, Result};
use crate::schema::{Category, RecurringEventDefinition, Transaction};
use log::{debug, warn};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable holding the path of the JSON ledger snapshot.
pub const DATA_PATH_ENV: &str = "BUDGET_FORECAST_DATA";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionFilter {
    pub category_id: Option<String>,
    pub subcategory_id: Option<String>,
}

impl TransactionFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn category(id: impl Into<String>) -> Self {
        Self {
            category_id: Some(id.into()),
            subcategory_id: None,
        }
    }

    pub fn subcategory(id: impl Into<String>) -> Self {
        Self {
            category_id: None,
            subcategory_id: Some(id.into()),
        }
    }

    pub fn matches(&self, tx: &Transaction) -> bool {
        let category_ok = self
            .category_id
            .as_deref()
            .map_or(true, |id| tx.category_id == id);
        let subcategory_ok = self
            .subcategory_id
            .as_deref()
            .map_or(true, |id| tx.subcategory_id.as_deref() == Some(id));
        category_ok && subcategory_ok
    }
}

pub trait DataSource: Send + Sync {
    fn fetch_transactions(&self, filter: &TransactionFilter) -> Result<Vec<Transaction>>;

    fn fetch_categories(&self) -> Result<Vec<Category>>;

    /// Recurring definitions with `active` set. Inactive ones never leave the source.
    fn fetch_active_recurring_events(&self) -> Result<Vec<RecurringEventDefinition>>;

    /// Everything one request needs, resolved from a single source. Categories and
    /// recurring events are left empty unless asked for.
    fn fetch_snapshot(&self, scope: SnapshotScope) -> Result<DataSnapshot> {
        Ok(DataSnapshot {
            transactions: self.fetch_transactions(&TransactionFilter::all())?,
            categories: if scope.categories {
                self.fetch_categories()?
            } else {
                Vec::new()
            },
            recurring_events: if scope.recurring_events {
                self.fetch_active_recurring_events()?
            } else {
                Vec::new()
            },
        })
    }
}

/// Which optional parts of a [`DataSnapshot`] a request needs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SnapshotScope {
    pub categories: bool,
    pub recurring_events: bool,
}

impl SnapshotScope {
    pub fn full() -> Self {
        Self {
            categories: true,
            recurring_events: true,
        }
    }
}

/// Everything a source can serve, as one serialisable document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DataSnapshot {
    #[serde(default)]
    pub transactions: Vec<Transaction>,
    #[serde(default)]
    pub categories: Vec<Category>,
    #[serde(default)]
    pub recurring_events: Vec<RecurringEventDefinition>,
}

impl DataSnapshot {
    fn transactions_matching(&self, filter: &TransactionFilter) -> Vec<Transaction> {
        self.transactions
            .iter()
            .filter(|tx| filter.matches(tx))
            .cloned()
            .collect()
    }

    fn active_recurring(&self) -> Vec<RecurringEventDefinition> {
        self.recurring_events
            .iter()
            .filter(|e| e.active)
            .cloned()
            .collect()
    }

    fn scoped(mut self, scope: SnapshotScope) -> Self {
        self.recurring_events = if scope.recurring_events {
            self.active_recurring()
        } else {
            Vec::new()
        };
        if !scope.categories {
            self.categories.clear();
        }
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    snapshot: DataSnapshot,
}

impl InMemorySource {
    pub fn new(
        transactions: Vec<Transaction>,
        categories: Vec<Category>,
        recurring_events: Vec<RecurringEventDefinition>,
    ) -> Self {
        Self {
            snapshot: DataSnapshot {
                transactions,
                categories,
                recurring_events,
            },
        }
    }

    pub fn from_snapshot(snapshot: DataSnapshot) -> Self {
        Self { snapshot }
    }
}

impl DataSource for InMemorySource {
    fn fetch_transactions(&self, filter: &TransactionFilter) -> Result<Vec<Transaction>> {
        Ok(self.snapshot.transactions_matching(filter))
    }

    fn fetch_categories(&self) -> Result<Vec<Category>> {
        Ok(self.snapshot.categories.clone())
    }

    fn fetch_active_recurring_events(&self) -> Result<Vec<RecurringEventDefinition>> {
        Ok(self.snapshot.active_recurring())
    }
}

/// Reads a [`DataSnapshot`] JSON file on every fetch, so edits are picked up.
#[derive(Debug, Clone)]
pub struct JsonFileSource {
    path: PathBuf,
}

impl JsonFileSource {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<DataSnapshot> {
        let contents = std::fs::read_to_string(&self.path).map_err(|e| {
            ForecastError::DataSource(format!("Cannot read {}: {}", self.path.display(), e))
        })?;
        let snapshot: DataSnapshot = serde_json::from_str(&contents).map_err(|e| {
            ForecastError::DataSource(format!("Invalid snapshot {}: {}", self.path.display(), e))
        })?;
        debug!(
            "Loaded snapshot {}: {} transactions, {} categories, {} recurring events",
            self.path.display(),
            snapshot.transactions.len(),
            snapshot.categories.len(),
            snapshot.recurring_events.len()
        );
        Ok(snapshot)
    }

    /// Writes a snapshot in the format [`load`](Self::load) reads.
    pub fn save(&self, snapshot: &DataSnapshot) -> Result<()> {
        let json = serde_json::to_string_pretty(snapshot)?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }
}

impl DataSource for JsonFileSource {
    fn fetch_transactions(&self, filter: &TransactionFilter) -> Result<Vec<Transaction>> {
        Ok(self.load()?.transactions_matching(filter))
    }

    fn fetch_categories(&self) -> Result<Vec<Category>> {
        Ok(self.load()?.categories)
    }

    fn fetch_active_recurring_events(&self) -> Result<Vec<RecurringEventDefinition>> {
        Ok(self.load()?.active_recurring())
    }

    fn fetch_snapshot(&self, scope: SnapshotScope) -> Result<DataSnapshot> {
        Ok(self.load()?.scoped(scope))
    }
}

/// Serves from `primary`, switching to `secondary` when the primary fails.
///
/// [`fetch_snapshot`](DataSource::fetch_snapshot) fails over as a whole, so a request never
/// mixes records from both sources.
#[derive(Debug, Clone)]
pub struct FailoverSource<P, S> {
    primary: P,
    secondary: S,
}

impl<P: DataSource, S: DataSource> FailoverSource<P, S> {
    pub fn new(primary: P, secondary: S) -> Self {
        Self { primary, secondary }
    }

    fn with_failover<T>(
        &self,
        what: &str,
        fetch: impl Fn(&dyn DataSource) -> Result<T>,
    ) -> Result<T> {
        match fetch(&self.primary) {
            Ok(value) => Ok(value),
            Err(e) => {
                warn!("Primary source failed to fetch {}: {}; using secondary", what, e);
                fetch(&self.secondary)
            }
        }
    }
}

impl<P: DataSource, S: DataSource> DataSource for FailoverSource<P, S> {
    fn fetch_transactions(&self, filter: &TransactionFilter) -> Result<Vec<Transaction>> {
        self.with_failover("transactions", |source| source.fetch_transactions(filter))
    }

    fn fetch_categories(&self) -> Result<Vec<Category>> {
        self.with_failover("categories", |source| source.fetch_categories())
    }

    fn fetch_active_recurring_events(&self) -> Result<Vec<RecurringEventDefinition>> {
        self.with_failover("recurring events", |source| {
            source.fetch_active_recurring_events()
        })
    }

    fn fetch_snapshot(&self, scope: SnapshotScope) -> Result<DataSnapshot> {
        self.with_failover("snapshot", |source| source.fetch_snapshot(scope))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataSourceConfig {
    pub data_path: PathBuf,
}

impl DataSourceConfig {
    /// Reads the snapshot path from `BUDGET_FORECAST_DATA`. Missing or blank is an error.
    pub fn from_env() -> Result<Self> {
        Self::from_value(std::env::var(DATA_PATH_ENV).ok())
    }

    pub fn from_value(value: Option<String>) -> Result<Self> {
        match value.map(|v| v.trim().to_string()) {
            Some(path) if !path.is_empty() => Ok(Self {
                data_path: PathBuf::from(path),
            }),
            _ => Err(ForecastError::Configuration(format!(
                "{} must point to a ledger snapshot file",
                DATA_PATH_ENV
            ))),
        }
    }

    pub fn open(&self) -> JsonFileSource {
        JsonFileSource::new(&self.data_path)
    }
}
