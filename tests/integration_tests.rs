use budget_forecast::*;
use chrono::NaiveDate;
use std::sync::Arc;
use std::time::Duration;

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

fn today() -> NaiveDate {
    d(2024, 6, 15)
}

fn tx(
    id: &str,
    date: NaiveDate,
    amount: f64,
    is_income: bool,
    category: &str,
    sub: Option<&str>,
) -> Transaction {
    Transaction {
        id: id.to_string(),
        date,
        accounting_date: None,
        amount,
        is_income,
        category_id: category.to_string(),
        subcategory_id: sub.map(str::to_string),
        refunds: vec![],
    }
}

fn category(id: &str, name: &str, category_type: CategoryType, subs: &[(&str, &str)]) -> Category {
    Category {
        id: id.to_string(),
        name: name.to_string(),
        category_type,
        subcategories: subs
            .iter()
            .map(|(sid, sname)| Subcategory {
                id: sid.to_string(),
                name: sname.to_string(),
                category_id: id.to_string(),
            })
            .collect(),
    }
}

fn recurring(frequency: &str, start: NaiveDate, amount: f64, is_income: bool) -> RecurringEventDefinition {
    RecurringEventDefinition {
        id: Some(format!("{}-{}", frequency, start)),
        description: None,
        amount,
        is_income,
        category_id: "misc".to_string(),
        subcategory_id: None,
        frequency: frequency.to_string(),
        start_date: start,
        end_date: None,
        active: true,
    }
}

/// A household ledger: salary, rent, groceries with a refund, and a short-lived hobby.
fn household_ledger() -> (Vec<Transaction>, Vec<Category>) {
    let mut transactions = Vec::new();
    for (i, m) in (1..=12).enumerate() {
        let year = if m <= 6 { 2024 } else { 2023 };
        let date = d(year, m, 2);
        transactions.push(tx(&format!("sal-{}", i), date, 3200.0 + 10.0 * i as f64, true, "salary", None));
        transactions.push(tx(&format!("rent-{}", i), date, 1100.0, false, "housing", Some("rent")));
        transactions.push(tx(&format!("util-{}", i), d(year, m, 20), 90.0 + (i % 3) as f64 * 15.0, false, "housing", Some("utilities")));

        let mut groceries = tx(&format!("gro-{}", i), d(year, m, 11), 420.0, false, "food", Some("groceries"));
        if i % 4 == 0 {
            groceries.refunds.push(Refund {
                amount: 35.0,
                date: Some(d(year, m, 14)),
            });
        }
        transactions.push(groceries);
    }
    transactions.push(tx("hobby-1", d(2024, 4, 9), 60.0, false, "hobby", None));
    transactions.push(tx("hobby-2", d(2024, 5, 9), 75.0, false, "hobby", None));

    let categories = vec![
        category("salary", "Salary", CategoryType::Income, &[]),
        category("housing", "Housing", CategoryType::FixedExpense, &[("rent", "Rent"), ("utilities", "Utilities")]),
        category("food", "Food", CategoryType::Expense, &[("groceries", "Groceries"), ("dining", "Dining out")]),
        category("hobby", "Hobby", CategoryType::Expense, &[]),
    ];

    (transactions, categories)
}

fn assembler() -> ForecastAssembler {
    ForecastConfig::default().assembler(today())
}

fn assert_shape(result: &ForecastResult, months: usize) {
    assert_eq!(result.dates.len(), months);
    assert_eq!(result.forecast.income.len(), months);
    assert_eq!(result.forecast.expense.len(), months);
    assert_eq!(result.min_forecast.len(), months);
    assert_eq!(result.max_forecast.len(), months);
    assert!((result.balance - (result.total_income - result.total_expense)).abs() < 1e-6);
}

#[test]
fn test_household_forecast() -> anyhow::Result<()> {
    let (transactions, categories) = household_ledger();
    let inputs = ForecastInputs {
        transactions: &transactions,
        categories: &categories,
        recurring: &[],
    };

    let result = assembler().generate(&inputs, &ForecastParams::new(6))?;

    assert_shape(&result, 6);
    assert_eq!(result.dates[0], d(2024, 7, 1));
    assert_eq!(result.dates[5], d(2024, 12, 1));

    for i in 0..6 {
        assert!(result.forecast.income[i] > 3000.0);
        assert!(result.forecast.expense[i] > 1400.0);
        assert!(result.min_forecast[i] <= result.max_forecast[i]);
    }

    let categories = result.categories.as_ref().expect("categories");
    assert!(categories.contains_key("Salary"));
    assert!(categories.contains_key("Housing"));
    assert!(categories.contains_key("Food"));
    assert!(!categories.contains_key("Hobby"), "two months of history is not enough");

    let housing = &categories["Housing"];
    assert_eq!(housing.category_type, CategoryType::FixedExpense);
    assert_eq!(housing.historical.len(), 12);
    assert!(housing.forecast.iter().all(|v| *v < 0.0));
    assert!(housing.subcategories.contains_key("Rent"));
    assert!(housing.subcategories.contains_key("Utilities"));
    assert!(!categories["Food"].subcategories.contains_key("Dining out"));

    let json = serde_json::to_value(&result)?;
    assert_eq!(json["categories"]["Housing"]["type"], "fixed_expense");
    assert_eq!(json["dates"][0], "2024-07-01");

    Ok(())
}

#[test]
fn test_length_and_balance_invariants_across_horizons() -> anyhow::Result<()> {
    let (transactions, categories) = household_ledger();
    let recurring = vec![recurring("monthly", d(2024, 1, 28), 75.0, false)];
    let inputs = ForecastInputs {
        transactions: &transactions,
        categories: &categories,
        recurring: &recurring,
    };

    for months in [0, 1, 3, 12, 24, MAX_MONTHS_AHEAD] {
        let result = assembler().generate(&inputs, &ForecastParams::new(months))?;
        assert_shape(&result, months as usize);
    }
    Ok(())
}

#[test]
fn test_zero_transactions_scenario() -> anyhow::Result<()> {
    // An active recurring salary does not turn an empty ledger into a forecast.
    let recurring = vec![recurring("monthly", d(2024, 1, 5), 2500.0, true)];
    let inputs = ForecastInputs {
        transactions: &[],
        categories: &[],
        recurring: &recurring,
    };
    let result = assembler().generate(&inputs, &ForecastParams::new(3))?;

    assert_eq!(result.dates, vec![d(2024, 7, 1), d(2024, 8, 1), d(2024, 9, 1)]);
    assert_eq!(result.forecast.income, vec![0.0; 3]);
    assert_eq!(result.forecast.expense, vec![0.0; 3]);
    assert_eq!(result.min_forecast, vec![0.0; 3]);
    assert_eq!(result.max_forecast, vec![0.0; 3]);
    assert_eq!(result.total_income, 0.0);
    assert_eq!(result.total_expense, 0.0);
    assert_eq!(result.balance, 0.0);
    Ok(())
}

#[test]
fn test_category_threshold_two_versus_three_months() -> anyhow::Result<()> {
    let transactions = vec![
        tx("a1", d(2024, 4, 1), 10.0, false, "two", None),
        tx("a2", d(2024, 5, 1), 10.0, false, "two", None),
        tx("b1", d(2024, 3, 1), 10.0, false, "three", None),
        tx("b2", d(2024, 4, 1), 10.0, false, "three", None),
        tx("b3", d(2024, 5, 1), 10.0, false, "three", None),
    ];
    let categories = vec![
        category("two", "Two months", CategoryType::Expense, &[]),
        category("three", "Three months", CategoryType::Expense, &[]),
    ];
    let inputs = ForecastInputs {
        transactions: &transactions,
        categories: &categories,
        recurring: &[],
    };

    let result = assembler().generate(&inputs, &ForecastParams::new(2))?;
    let categories = result.categories.expect("categories");
    assert!(!categories.contains_key("Two months"));
    assert!(categories.contains_key("Three months"));
    Ok(())
}

#[test]
fn test_monthly_recurring_income_added_once_per_month() -> anyhow::Result<()> {
    let (transactions, _) = household_ledger();
    let recurring = vec![recurring("monthly", d(2023, 11, 25), 500.0, true)];
    let inputs = ForecastInputs {
        transactions: &transactions,
        categories: &[],
        recurring: &recurring,
    };

    let with = assembler().generate(&inputs, &ForecastParams::new(12))?;
    let without = assembler().generate(
        &inputs,
        &ForecastParams {
            months_ahead: 12,
            include_recurring: false,
            detailed_categories: false,
        },
    )?;

    for i in 0..12 {
        assert!((with.forecast.income[i] - without.forecast.income[i] - 500.0).abs() < 1e-6);
        assert!((with.forecast.expense[i] - without.forecast.expense[i]).abs() < 1e-9);
    }
    assert!((with.total_income - without.total_income - 6000.0).abs() < 1e-6);
    Ok(())
}

#[test]
fn test_quarterly_recurring_expense_scenario() -> anyhow::Result<()> {
    let (transactions, _) = household_ledger();
    let horizon_start = d(2024, 7, 1);
    let run = |start: NaiveDate| -> Result<Vec<f64>> {
        let recurring = vec![recurring("quarterly", start, 300.0, false)];
        let inputs = ForecastInputs {
            transactions: &transactions,
            categories: &[],
            recurring: &recurring,
        };
        let with = assembler().generate(&inputs, &ForecastParams::new(6))?;
        let without = assembler().generate(
            &inputs,
            &ForecastParams {
                months_ahead: 6,
                include_recurring: false,
                detailed_categories: false,
            },
        )?;
        Ok(with
            .forecast
            .expense
            .iter()
            .zip(&without.forecast.expense)
            .map(|(a, b)| ((a - b) * 100.0).round() / 100.0)
            .collect())
    };

    // Anchored one month before the horizon. Occurrences are counted in 3-month steps from
    // the anchor (June, September, December), so they land in forecast months 3 and 6, not
    // in months 1 and 4 as a horizon-relative reading would place them.
    let one_month_before = run(d(2024, 6, 1))?;
    assert_eq!(one_month_before, vec![0.0, 0.0, 300.0, 0.0, 0.0, 300.0]);

    // Anchored on the horizon start: forecast months 1 and 4.
    let at_start = run(horizon_start)?;
    assert_eq!(at_start, vec![300.0, 0.0, 0.0, 300.0, 0.0, 0.0]);
    Ok(())
}

#[test]
fn test_simulation_identity_and_scenario() -> anyhow::Result<()> {
    let mut baseline = ForecastResult::zeroed(vec![d(2024, 7, 1), d(2024, 8, 1), d(2024, 9, 1)]);
    baseline.forecast.income = vec![100.0, 100.0, 100.0];
    baseline.min_forecast = vec![80.0, 80.0, 80.0];
    baseline.max_forecast = vec![120.0, 120.0, 120.0];
    baseline.recompute_totals();
    let catalog = CategoryCatalog::default();

    assert_eq!(simulate_forecast(&baseline, &[], &catalog), baseline);

    let bonus = SimulationEvent {
        date: d(2024, 8, 14),
        amount: 1000.0,
        is_income: true,
        description: Some("Bonus".to_string()),
        category_id: None,
        subcategory_id: None,
    };
    let result = simulate_forecast(&baseline, &[bonus.clone()], &catalog);
    assert_eq!(result.forecast.income, vec![100.0, 1100.0, 100.0]);
    assert!((result.total_income - baseline.total_income - 1000.0).abs() < 1e-9);
    assert!((result.balance - baseline.balance - 1000.0).abs() < 1e-9);

    let late = SimulationEvent {
        date: d(2025, 3, 1),
        ..bonus
    };
    assert_eq!(simulate_forecast(&baseline, &[late], &catalog), baseline);
    Ok(())
}

#[test]
fn test_service_end_to_end_with_json_source() -> anyhow::Result<()> {
    let (transactions, categories) = household_ledger();
    let mut inactive = recurring("monthly", d(2024, 1, 1), 9999.0, true);
    inactive.active = false;
    let snapshot = DataSnapshot {
        transactions,
        categories,
        recurring_events: vec![recurring("monthly", d(2024, 1, 10), 40.0, false), inactive],
    };

    let dir = tempfile::tempdir()?;
    let source = JsonFileSource::new(dir.path().join("ledger.json"));
    source.save(&snapshot)?;

    let service = ForecastService::new(source, ForecastConfig::default()).with_today(today());
    let baseline = service.forecast(&ForecastParams::default())?;
    assert_shape(&baseline, 6);
    assert!(baseline.forecast.income.iter().all(|v| *v < 5000.0), "inactive definition leaked");

    let simulated = service.simulate(&SimulationParams {
        months_ahead: 6,
        events: vec![SimulationEvent {
            date: d(2024, 10, 5),
            amount: 250.0,
            is_income: false,
            description: Some("New tyres".to_string()),
            category_id: Some("housing".to_string()),
            subcategory_id: Some("rent".to_string()),
        }],
    })?;

    assert!((simulated.forecast.expense[3] - baseline.forecast.expense[3] - 250.0).abs() < 1e-6);
    assert!((simulated.total_expense - baseline.total_expense - 250.0).abs() < 1e-6);
    let before = &baseline.categories.as_ref().expect("categories")["Housing"];
    let after = &simulated.categories.as_ref().expect("categories")["Housing"];
    assert!((after.forecast[3] - before.forecast[3] + 250.0).abs() < 1e-6);
    assert!(
        (after.subcategories["Rent"].forecast[3] - before.subcategories["Rent"].forecast[3] + 250.0)
            .abs()
            < 1e-6
    );
    Ok(())
}

#[test]
fn test_failover_to_secondary_source() -> anyhow::Result<()> {
    let (transactions, categories) = household_ledger();
    let primary = JsonFileSource::new("/nonexistent/primary-ledger.json");
    let secondary = InMemorySource::new(transactions, categories, vec![]);

    let service = ForecastService::new(FailoverSource::new(primary, secondary), ForecastConfig::default())
        .with_today(today());
    let result = service.forecast(&ForecastParams::new(3))?;

    assert_shape(&result, 3);
    assert!(result.total_income > 0.0);
    Ok(())
}

/// Serves its ledger's transactions but fails every category lookup.
struct CategoriesOffline(InMemorySource);

impl DataSource for CategoriesOffline {
    fn fetch_transactions(&self, filter: &TransactionFilter) -> Result<Vec<Transaction>> {
        self.0.fetch_transactions(filter)
    }

    fn fetch_categories(&self) -> Result<Vec<Category>> {
        Err(ForecastError::DataSource("categories table unavailable".to_string()))
    }

    fn fetch_active_recurring_events(&self) -> Result<Vec<RecurringEventDefinition>> {
        self.0.fetch_active_recurring_events()
    }
}

#[test]
fn test_partial_primary_failure_uses_secondary_for_everything() -> anyhow::Result<()> {
    let primary_tx: Vec<Transaction> = (2..=5)
        .map(|m| tx(&format!("p-{}", m), d(2024, m, 8), 100.0, false, "p-food", None))
        .collect();
    let primary = CategoriesOffline(InMemorySource::new(primary_tx, vec![], vec![]));

    let secondary_tx: Vec<Transaction> = (2..=5)
        .map(|m| tx(&format!("s-{}", m), d(2024, m, 8), 250.0, false, "s-food", None))
        .collect();
    let secondary = InMemorySource::new(
        secondary_tx,
        vec![category("s-food", "Food", CategoryType::Expense, &[])],
        vec![],
    );

    let service = ForecastService::new(FailoverSource::new(primary, secondary), ForecastConfig::default())
        .with_today(today());
    let result = service.forecast(&ForecastParams::new(3))?;

    assert!((result.total_expense - 750.0).abs() < 1e-6);
    let categories = result.categories.expect("categories from the secondary");
    assert_eq!(categories.len(), 1);
    assert!(categories["Food"].historical.iter().all(|v| (*v + 250.0).abs() < 1e-9));
    Ok(())
}

#[test]
fn test_data_source_failure_is_surfaced() {
    let service = ForecastService::new(
        JsonFileSource::new("/nonexistent/ledger.json"),
        ForecastConfig::default(),
    )
    .with_today(today());

    assert!(matches!(
        service.forecast(&ForecastParams::new(3)),
        Err(ForecastError::DataSource(_))
    ));
}

struct AlwaysFails;

impl ForecastingModel for AlwaysFails {
    fn fit(&self, _series: &MonthlySeries) -> Result<Box<dyn FittedModel>> {
        Err(ForecastError::ModelFailure("solver diverged".to_string()))
    }
}

#[test]
fn test_model_failure_is_contained() -> anyhow::Result<()> {
    let (transactions, categories) = household_ledger();
    let inputs = ForecastInputs {
        transactions: &transactions,
        categories: &categories,
        recurring: &[],
    };
    let assembler = ForecastAssembler::new(SeriesForecaster::new(Arc::new(AlwaysFails), today()), today());

    let result = assembler.generate(&inputs, &ForecastParams::new(4))?;

    assert_shape(&result, 4);
    assert_eq!(result.forecast.income, vec![0.0; 4]);
    assert_eq!(result.balance, 0.0);
    let categories = result.categories.expect("categories");
    assert!(categories["Salary"].forecast.iter().all(|v| *v == 0.0));
    Ok(())
}

struct Sluggish;

impl ForecastingModel for Sluggish {
    fn fit(&self, series: &MonthlySeries) -> Result<Box<dyn FittedModel>> {
        std::thread::sleep(Duration::from_millis(400));
        AdditiveModel::default().fit(series)
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_timeout_is_contained() -> anyhow::Result<()> {
    let (transactions, categories) = household_ledger();
    let inputs = ForecastInputs {
        transactions: &transactions,
        categories: &categories,
        recurring: &[],
    };
    let assembler = ForecastAssembler::new(SeriesForecaster::new(Arc::new(Sluggish), today()), today())
        .with_series_timeout(Some(Duration::from_millis(25)));

    let result = assembler
        .generate_concurrent(&inputs, &ForecastParams::new(3))
        .await?;

    assert_shape(&result, 3);
    assert_eq!(result.forecast.income, vec![0.0; 3]);
    assert!(result.categories.is_none(), "timed-out categories are omitted");
    Ok(())
}

#[test]
fn test_timeout_applies_to_sequential_generate() -> anyhow::Result<()> {
    let (transactions, categories) = household_ledger();
    let inputs = ForecastInputs {
        transactions: &transactions,
        categories: &categories,
        recurring: &[],
    };
    let assembler = ForecastAssembler::new(SeriesForecaster::new(Arc::new(Sluggish), today()), today())
        .with_series_timeout(Some(Duration::from_millis(25)));

    let result = assembler.generate(&inputs, &ForecastParams::new(3))?;

    assert_shape(&result, 3);
    assert_eq!(result.forecast.income, vec![0.0; 3]);
    assert!(result.categories.is_none());
    Ok(())
}

#[test]
fn test_configured_timeout_on_sync_service_paths() -> anyhow::Result<()> {
    let (transactions, categories) = household_ledger();
    let source = InMemorySource::new(transactions, categories, vec![]);
    let untimed = ForecastService::new(source.clone(), ForecastConfig::default()).with_today(today());
    let timed = ForecastService::new(
        source,
        ForecastConfig {
            series_timeout_ms: Some(60_000),
            ..ForecastConfig::default()
        },
    )
    .with_today(today());

    let params = ForecastParams::new(4);
    assert_eq!(timed.forecast(&params)?, untimed.forecast(&params)?);

    let simulation = SimulationParams {
        months_ahead: 4,
        events: vec![],
    };
    assert_eq!(timed.simulate(&simulation)?, untimed.simulate(&simulation)?);
    Ok(())
}

#[tokio::test]
async fn test_concurrent_service_matches_sequential() -> anyhow::Result<()> {
    let (transactions, categories) = household_ledger();
    let recurring = vec![recurring("yearly", d(2023, 9, 1), 1200.0, false)];
    let service = ForecastService::new(
        InMemorySource::new(transactions, categories, recurring),
        ForecastConfig::default(),
    )
    .with_today(today());
    let params = ForecastParams::new(9);

    let sequential = service.forecast(&params)?;
    let concurrent = service.forecast_concurrent(&params).await?;

    assert_eq!(sequential, concurrent);
    Ok(())
}

#[test]
fn test_moving_average_config() -> anyhow::Result<()> {
    let config = ForecastConfig::from_json_str(r#"{ "model_kind": { "kind": "moving_average", "window": 3 } }"#)?;
    let (transactions, _) = household_ledger();
    let inputs = ForecastInputs {
        transactions: &transactions,
        ..Default::default()
    };

    let result = config.assembler(today()).generate(&inputs, &ForecastParams::new(2))?;
    // Mean of the last three salaries: 2024-04..06, i.e. indexes 3..5.
    let expected = (3230.0 + 3240.0 + 3250.0) / 3.0;
    assert!((result.forecast.income[0] - expected).abs() < 1e-6);
    assert!((result.forecast.income[1] - expected).abs() < 1e-6);
    Ok(())
}

#[test]
fn test_schema_generation() -> anyhow::Result<()> {
    let schema = ForecastResult::schema_as_json()?;
    for field in ["dates", "min_forecast", "max_forecast", "total_income", "balance", "categories"] {
        assert!(schema.contains(field), "schema is missing {}", field);
    }
    Ok(())
}
