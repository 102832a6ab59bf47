use crate::schema::Transaction;
use crate::utils::{first_of_month, month_starts_in_range};
use crate::{MonthlySeries, MonthlySeriesPoint};
use chrono::NaiveDate;
use log::debug;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Which transaction date decides the month a transaction lands in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum DateBasis {
    #[default]
    Transaction,
    /// Booking date, falling back to the transaction date when a record has none.
    Accounting,
}

impl DateBasis {
    pub fn period_of(&self, tx: &Transaction) -> NaiveDate {
        let date = match self {
            DateBasis::Transaction => tx.date,
            DateBasis::Accounting => tx.accounting_date.unwrap_or(tx.date),
        };
        first_of_month(date)
    }
}

/// Aligned income and expense magnitudes, one point per month in both series.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PortfolioSeries {
    pub income: MonthlySeries,
    pub expense: MonthlySeries,
}

impl PortfolioSeries {
    pub fn is_empty(&self) -> bool {
        self.income.is_empty() && self.expense.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct HistoricalAggregator {
    date_basis: DateBasis,
    fill_gaps: bool,
}

impl Default for HistoricalAggregator {
    fn default() -> Self {
        Self::new(DateBasis::Transaction, true)
    }
}

impl HistoricalAggregator {
    pub fn new(date_basis: DateBasis, fill_gaps: bool) -> Self {
        Self {
            date_basis,
            fill_gaps,
        }
    }

    /// Buckets net amounts by month into separate, non-negative income and expense sums.
    pub fn portfolio_series<'a, I>(&self, transactions: I) -> PortfolioSeries
    where
        I: IntoIterator<Item = &'a Transaction>,
    {
        let mut buckets: BTreeMap<NaiveDate, (f64, f64)> = BTreeMap::new();

        for tx in transactions {
            let slot = buckets.entry(self.date_basis.period_of(tx)).or_default();
            if tx.is_income {
                slot.0 += tx.net_amount();
            } else {
                slot.1 += tx.net_amount();
            }
        }

        if buckets.is_empty() {
            debug!("No transactions to aggregate; returning empty portfolio series");
            return PortfolioSeries::default();
        }

        let buckets = self.fill_missing_months(buckets);

        let (total_income, total_expense) = buckets
            .values()
            .fold((0.0_f64, 0.0_f64), |acc, (i, e)| (acc.0 + i, acc.1 + e));
        debug!(
            "Aggregated {} months of history: income {:.2}, expense {:.2}",
            buckets.len(),
            total_income,
            total_expense
        );

        let income = buckets
            .iter()
            .map(|(period, (i, _))| MonthlySeriesPoint {
                period: *period,
                value: *i,
            })
            .collect();
        let expense = buckets
            .iter()
            .map(|(period, (_, e))| MonthlySeriesPoint {
                period: *period,
                value: *e,
            })
            .collect();

        PortfolioSeries {
            income: MonthlySeries::from_points(income),
            expense: MonthlySeries::from_points(expense),
        }
    }

    /// Monthly sums of signed net amounts (income positive, expense negative).
    ///
    /// The sign only exists for model training; results handed to callers go back to
    /// the magnitude convention at the output boundary.
    pub fn signed_series<'a, I>(&self, transactions: I) -> MonthlySeries
    where
        I: IntoIterator<Item = &'a Transaction>,
    {
        let mut buckets: BTreeMap<NaiveDate, f64> = BTreeMap::new();
        for tx in transactions {
            *buckets.entry(self.date_basis.period_of(tx)).or_default() += tx.signed_net_amount();
        }

        let buckets = self.fill_missing_months(buckets);

        MonthlySeries::from_points(
            buckets
                .into_iter()
                .map(|(period, value)| MonthlySeriesPoint { period, value })
                .collect(),
        )
    }

    fn fill_missing_months<V: Default + Clone>(
        &self,
        mut buckets: BTreeMap<NaiveDate, V>,
    ) -> BTreeMap<NaiveDate, V> {
        if !self.fill_gaps {
            return buckets;
        }

        let (first, last) = match (buckets.keys().next(), buckets.keys().next_back()) {
            (Some(first), Some(last)) => (*first, *last),
            _ => return buckets,
        };

        for period in month_starts_in_range(first, last) {
            buckets.entry(period).or_default();
        }
        buckets
    }
}

pub fn for_category<'a>(
    transactions: &'a [Transaction],
    category_id: &'a str,
) -> impl Iterator<Item = &'a Transaction> + 'a {
    transactions
        .iter()
        .filter(move |tx| tx.category_id == category_id)
}

pub fn for_subcategory<'a>(
    transactions: &'a [Transaction],
    subcategory_id: &'a str,
) -> impl Iterator<Item = &'a Transaction> + 'a {
    transactions
        .iter()
        .filter(move |tx| tx.subcategory_id.as_deref() == Some(subcategory_id))
}
