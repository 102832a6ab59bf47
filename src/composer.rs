use crate::aggregation::{for_category, for_subcategory, HistoricalAggregator};
use crate::concurrent::SeriesKey;
use crate::forecaster::{SeriesForecaster, SufficiencyPolicy};
use crate::model::{Forecast, ForecastPoint};
use crate::result::{CategoryForecast, SubcategoryForecast};
use crate::schema::{Category, CategoryType, Transaction};
use crate::MonthlySeries;
use chrono::NaiveDate;
use log::debug;
use std::collections::BTreeMap;

/// Signed history of one subcategory, ready for forecasting.
#[derive(Debug, Clone)]
pub struct SubcategorySeries {
    pub id: String,
    pub name: String,
    pub series: MonthlySeries,
}

/// Signed history of a category with enough data to forecast, plus its subcategories.
#[derive(Debug, Clone)]
pub struct CategorySeries {
    pub id: String,
    pub name: String,
    pub category_type: CategoryType,
    pub series: MonthlySeries,
    pub subcategories: Vec<SubcategorySeries>,
}

impl CategorySeries {
    pub fn key(&self) -> SeriesKey {
        SeriesKey::Category(self.id.clone())
    }

    pub fn subcategory_key(&self, sub: &SubcategorySeries) -> SeriesKey {
        SeriesKey::Subcategory {
            category_id: self.id.clone(),
            subcategory_id: sub.id.clone(),
        }
    }
}

/// Walks the category tree and forecasts every node with enough history.
#[derive(Clone)]
pub struct CategoryForecastComposer {
    forecaster: SeriesForecaster,
    aggregator: HistoricalAggregator,
}

impl CategoryForecastComposer {
    pub fn new(forecaster: SeriesForecaster, aggregator: HistoricalAggregator) -> Self {
        Self {
            forecaster,
            aggregator,
        }
    }

    pub fn compose(
        &self,
        transactions: &[Transaction],
        categories: &[Category],
        dates: &[NaiveDate],
    ) -> BTreeMap<String, CategoryForecast> {
        let plan = self.plan(transactions, categories);
        Self::assemble(plan, |_, series| {
            self.forecaster
                .forecast_with_policy(series, dates, SufficiencyPolicy::Omit)
        })
    }

    /// Builds the series for every category that meets the history minimum, and for the
    /// subcategories under it that do too. Everything else is left out.
    pub fn plan(&self, transactions: &[Transaction], categories: &[Category]) -> Vec<CategorySeries> {
        let mut plan = Vec::new();

        for category in categories {
            let series = self
                .aggregator
                .signed_series(for_category(transactions, &category.id));
            if !self.forecaster.has_enough_history(&series) {
                debug!(
                    "Omitting category '{}': {} months of history",
                    category.name,
                    series.len()
                );
                continue;
            }

            let subcategories = category
                .subcategories
                .iter()
                .filter_map(|sub| {
                    let series = self
                        .aggregator
                        .signed_series(for_subcategory(transactions, &sub.id));
                    if self.forecaster.has_enough_history(&series) {
                        Some(SubcategorySeries {
                            id: sub.id.clone(),
                            name: sub.name.clone(),
                            series,
                        })
                    } else {
                        debug!(
                            "Omitting subcategory '{}' of '{}': {} months of history",
                            sub.name,
                            category.name,
                            series.len()
                        );
                        None
                    }
                })
                .collect();

            plan.push(CategorySeries {
                id: category.id.clone(),
                name: category.name.clone(),
                category_type: category.category_type,
                series,
                subcategories,
            });
        }

        plan
    }

    /// Turns a plan into the output tree. `forecast` returns `None` for nodes to leave out.
    pub fn assemble<F>(plan: Vec<CategorySeries>, mut forecast: F) -> BTreeMap<String, CategoryForecast>
    where
        F: FnMut(&SeriesKey, &MonthlySeries) -> Option<Forecast>,
    {
        let mut output = BTreeMap::new();

        for node in plan {
            let points = match forecast(&node.key(), &node.series) {
                Some(points) => points,
                None => continue,
            };

            let mut subcategories = BTreeMap::new();
            for sub in &node.subcategories {
                if let Some(sub_points) = forecast(&node.subcategory_key(sub), &sub.series) {
                    let (f, lo, hi) = split_bounds(&sub_points);
                    subcategories.insert(
                        sub.name.clone(),
                        SubcategoryForecast {
                            forecast: f,
                            min_forecast: lo,
                            max_forecast: hi,
                            historical: sub.series.values(),
                        },
                    );
                }
            }

            let (f, lo, hi) = split_bounds(&points);
            output.insert(
                node.name.clone(),
                CategoryForecast {
                    category_type: node.category_type,
                    forecast: f,
                    min_forecast: lo,
                    max_forecast: hi,
                    historical: node.series.values(),
                    subcategories,
                },
            );
        }

        output
    }
}

fn split_bounds(points: &[ForecastPoint]) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
    (
        points.iter().map(|p| p.point_estimate).collect(),
        points.iter().map(|p| p.lower_bound).collect(),
        points.iter().map(|p| p.upper_bound).collect(),
    )
}
