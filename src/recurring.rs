use crate::schema::RecurringEventDefinition;
use crate::utils::{add_months, same_month};
use chrono::{Duration, NaiveDate};
use log::debug;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Projection ceiling for definitions without an end date, counted from today.
pub const DEFAULT_CEILING_DAYS: i64 = 730;

/// One dated cash flow produced by a recurring definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RecurringOccurrence {
    pub date: NaiveDate,
    pub amount: f64,
    pub is_income: bool,
    pub category_id: String,
    #[serde(default)]
    pub subcategory_id: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct RecurringEventProjector {
    today: NaiveDate,
    horizon_end: NaiveDate,
    ceiling_days: i64,
}

impl RecurringEventProjector {
    pub fn new(today: NaiveDate, horizon_end: NaiveDate) -> Self {
        Self {
            today,
            horizon_end,
            ceiling_days: DEFAULT_CEILING_DAYS,
        }
    }

    pub fn with_ceiling_days(mut self, days: i64) -> Self {
        self.ceiling_days = days.max(0);
        self
    }

    /// Expands every active definition into occurrences between today and the horizon end,
    /// ordered by date.
    pub fn project(&self, definitions: &[RecurringEventDefinition]) -> Vec<RecurringOccurrence> {
        let mut occurrences = Vec::new();

        for def in definitions {
            if !def.active {
                continue;
            }

            let frequency = match def.frequency() {
                Some(f) => f,
                None => {
                    debug!(
                        "Skipping recurring definition {:?}: unsupported frequency '{}'",
                        def.id, def.frequency
                    );
                    continue;
                }
            };

            let stop = self.stop_date(def);
            let step = frequency.step_months();

            // Each date comes from the anchor so a 31st does not drift to the 28th.
            for k in 0u32.. {
                let date = match k
                    .checked_mul(step)
                    .and_then(|months| add_months(def.start_date, months).ok())
                {
                    Some(date) => date,
                    None => break,
                };
                if date > stop {
                    break;
                }
                if date < self.today {
                    continue;
                }

                occurrences.push(RecurringOccurrence {
                    date,
                    amount: def.amount,
                    is_income: def.is_income,
                    category_id: def.category_id.clone(),
                    subcategory_id: def.subcategory_id.clone(),
                });
            }
        }

        occurrences.sort_by_key(|o| o.date);
        debug!(
            "Projected {} recurring occurrences from {} definitions",
            occurrences.len(),
            definitions.len()
        );
        occurrences
    }

    fn stop_date(&self, def: &RecurringEventDefinition) -> NaiveDate {
        let ceiling = def.end_date.unwrap_or_else(|| {
            self.today
                .checked_add_signed(Duration::days(self.ceiling_days))
                .unwrap_or(NaiveDate::MAX)
        });
        ceiling.min(self.horizon_end)
    }
}

/// Sums of income and expense occurrences falling in the month of `period`.
pub fn monthly_totals(occurrences: &[RecurringOccurrence], period: NaiveDate) -> (f64, f64) {
    occurrences
        .iter()
        .filter(|o| same_month(o.date, period))
        .fold((0.0, 0.0), |(income, expense), o| {
            if o.is_income {
                (income + o.amount, expense)
            } else {
                (income, expense + o.amount)
            }
        })
}
