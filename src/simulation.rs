//! What-if overlay: hypothetical events applied to a copy of a baseline forecast.
//!
//! Bounds move asymmetrically around each event (0.9x and 1.1x of its amount). This is a
//! heuristic widening, not a statistical interval.

use crate::result::ForecastResult;
use crate::schema::{Category, SimulationEvent};
use crate::utils::first_of_month;
use log::{debug, info, warn};
use std::collections::HashMap;

pub const LOW_FACTOR: f64 = 0.9;
pub const HIGH_FACTOR: f64 = 1.1;

/// Resolves category and subcategory ids to the names used as keys in a forecast.
#[derive(Debug, Clone, Default)]
pub struct CategoryCatalog {
    categories: HashMap<String, String>,
    subcategories: HashMap<String, String>,
}

impl CategoryCatalog {
    pub fn from_categories(categories: &[Category]) -> Self {
        let mut catalog = Self::default();
        for category in categories {
            catalog
                .categories
                .insert(category.id.clone(), category.name.clone());
            for sub in &category.subcategories {
                catalog.subcategories.insert(sub.id.clone(), sub.name.clone());
            }
        }
        catalog
    }

    pub fn category_name(&self, id: &str) -> Option<&str> {
        self.categories.get(id).map(String::as_str)
    }

    pub fn subcategory_name(&self, id: &str) -> Option<&str> {
        self.subcategories.get(id).map(String::as_str)
    }
}

pub struct SimulationEngine<'a> {
    catalog: &'a CategoryCatalog,
}

impl<'a> SimulationEngine<'a> {
    pub fn new(catalog: &'a CategoryCatalog) -> Self {
        Self { catalog }
    }

    /// Returns a new result with every event applied. The baseline is never touched.
    ///
    /// A baseline whose portfolio arrays do not line up with its dates is returned as is.
    pub fn simulate(&self, baseline: &ForecastResult, events: &[SimulationEvent]) -> ForecastResult {
        let mut result = baseline.clone();
        if !portfolio_aligned(&result) {
            warn!(
                "Baseline arrays do not match its {} dates; skipping {} simulation events",
                result.dates.len(),
                events.len()
            );
            return result;
        }
        let mut applied = 0usize;

        for event in events {
            let period = first_of_month(event.date);
            let idx = match result.period_index(period) {
                Some(idx) => idx,
                None => {
                    debug!("Ignoring simulation event on {}: outside the horizon", event.date);
                    continue;
                }
            };

            let amount = event.amount;
            if event.is_income {
                result.forecast.income[idx] += amount;
                result.min_forecast[idx] += LOW_FACTOR * amount;
                result.max_forecast[idx] += HIGH_FACTOR * amount;
            } else {
                result.forecast.expense[idx] += amount;
                result.min_forecast[idx] -= HIGH_FACTOR * amount;
                result.max_forecast[idx] -= LOW_FACTOR * amount;
            }

            self.apply_to_category(&mut result, event, idx);
            applied += 1;
        }

        result.recompute_totals();
        info!(
            "Simulated {} of {} events: income {:.2}, expense {:.2}, balance {:.2}",
            applied,
            events.len(),
            result.total_income,
            result.total_expense,
            result.balance
        );
        result
    }

    fn apply_to_category(&self, result: &mut ForecastResult, event: &SimulationEvent, idx: usize) {
        let signed = if event.is_income {
            event.amount
        } else {
            -event.amount
        };

        let name = match event
            .category_id
            .as_deref()
            .and_then(|id| self.catalog.category_name(id))
        {
            Some(name) => name,
            None => return,
        };
        let category = match result.categories.as_mut().and_then(|c| c.get_mut(name)) {
            Some(category) => category,
            None => return,
        };

        if let Some(value) = category.forecast.get_mut(idx) {
            *value += signed;
        }

        let sub = event
            .subcategory_id
            .as_deref()
            .and_then(|id| self.catalog.subcategory_name(id))
            .and_then(|name| category.subcategories.get_mut(name));
        if let Some(value) = sub.and_then(|s| s.forecast.get_mut(idx)) {
            *value += signed;
        }
    }
}

fn portfolio_aligned(result: &ForecastResult) -> bool {
    let months = result.dates.len();
    result.forecast.income.len() == months
        && result.forecast.expense.len() == months
        && result.min_forecast.len() == months
        && result.max_forecast.len() == months
}
