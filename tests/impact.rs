use approx::assert_abs_diff_eq;
use chrono::{Days, NaiveDate};
use polars::prelude::*;

use pointdash::dataset::Dataset;
use pointdash::error::QueryError;
use pointdash::impact::{
    ImpactSummary, SchemaPolicy, analyze_event_impact, find_event_date,
    summarize_latest_changepoint,
};

const EVENT: &str = "OPEC production cut";

fn date(raw: &str) -> NaiveDate {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").unwrap()
}

/// Daily prices from 2024-05-01 to 2024-07-01 whose log returns alternate 0.01/0.03 before
/// 2024-06-01, jump by 0.5 on that day and alternate -0.01/-0.03 afterwards.
fn synthetic_prices() -> Dataset {
    let first = date("2024-05-01");
    let event = date("2024-06-01");

    let mut dates = Vec::new();
    let mut prices = Vec::new();
    let mut price = 100.0f64;
    for idx in 0..62u64 {
        let day = first + Days::new(idx);
        if idx > 0 {
            let step = if idx % 2 == 0 { 0.01 } else { 0.03 };
            let log_return = if day < event {
                step
            } else if day == event {
                0.5
            } else {
                -step
            };
            price *= f64::exp(log_return);
        }
        dates.push(day.format("%Y-%m-%d").to_string());
        prices.push(price);
    }

    let dates: Vec<&str> = dates.iter().map(String::as_str).collect();
    Dataset::new(df! { "date" => &dates, "price" => &prices }.unwrap())
}

fn events() -> Dataset {
    Dataset::new(
        df! {
            "date" => &["2024-03-01", "2024-06-01", "2024-06-20"],
            "event_name" => &["Sanctions", EVENT, EVENT],
            "category" => &["geopolitical", "opec", "opec"],
        }
        .unwrap(),
    )
}

#[test]
fn impact_compares_windows_excluding_event_day() -> anyhow::Result<()> {
    let impact = analyze_event_impact(&synthetic_prices(), &events(), EVENT, 30)?;

    assert_eq!(impact.event_date, date("2024-06-01"));
    assert_eq!(impact.rows_before, 30);
    assert_eq!(impact.rows_after, 30);
    assert_abs_diff_eq!(impact.mean_before, 0.02, epsilon = 1e-9);
    assert_abs_diff_eq!(impact.mean_after, -0.02, epsilon = 1e-9);
    assert_abs_diff_eq!(impact.mean_shift(), -0.04, epsilon = 1e-9);

    let expected_vol = (30.0 * 1e-4 / 29.0f64).sqrt();
    assert_abs_diff_eq!(impact.vol_before, expected_vol, epsilon = 1e-9);
    assert_abs_diff_eq!(impact.vol_after, expected_vol, epsilon = 1e-9);
    assert_abs_diff_eq!(impact.vol_shift(), 0.0, epsilon = 1e-9);

    let report = serde_json::to_value(impact.report())?;
    assert_eq!(report["event"], EVENT);
    assert_eq!(report["event_date"], "2024-06-01");
    assert_eq!(report["window_days"], 30);
    assert_eq!(report["returns"]["shift"], -0.04);
    assert_eq!(report["volatility"]["before"], 0.010171);

    Ok(())
}

#[test]
fn wider_windows_never_shrink() -> anyhow::Result<()> {
    let prices = synthetic_prices();
    let events = events();

    let mut previous = (0, 0);
    for window in [2, 5, 10, 30, 45] {
        let impact = analyze_event_impact(&prices, &events, EVENT, window)?;
        assert!(impact.rows_before >= previous.0);
        assert!(impact.rows_after >= previous.1);
        assert!(impact.rows_before <= window as usize);
        assert!(impact.rows_after <= window as usize);
        previous = (impact.rows_before, impact.rows_after);
    }

    Ok(())
}

#[test]
fn duplicate_event_names_resolve_to_the_first_match() -> anyhow::Result<()> {
    assert_eq!(find_event_date(&events(), EVENT)?, date("2024-06-01"));
    Ok(())
}

#[test]
fn unknown_event_is_not_found() {
    let error = analyze_event_impact(&synthetic_prices(), &events(), "Moon landing", 30)
        .expect_err("unknown event");
    assert!(matches!(error, QueryError::EventNotFound(ref name) if name == "Moon landing"));
    assert_eq!(error.status(), 404);
}

#[test]
fn single_row_before_window_is_insufficient() -> anyhow::Result<()> {
    let prices = Dataset::new(df! {
        "date" => &["2024-05-10", "2024-05-25", "2024-06-05", "2024-06-10"],
        "price" => &[80.0, 82.0, 85.0, 84.0],
    }?);

    let error = analyze_event_impact(&prices, &events(), EVENT, 30)
        .expect_err("one usable return before the event");
    assert!(matches!(
        error,
        QueryError::InsufficientWindowData {
            before: 1,
            after: 2,
            ..
        }
    ));
    assert_eq!(error.status(), 400);

    Ok(())
}

#[test]
fn zero_day_window_is_always_insufficient() {
    let error = analyze_event_impact(&synthetic_prices(), &events(), EVENT, 0)
        .expect_err("empty windows");
    assert!(matches!(
        error,
        QueryError::InsufficientWindowData {
            before: 0,
            after: 0,
            ..
        }
    ));
}

fn changepoints() -> Dataset {
    Dataset::new(
        df! {
            "date" => &["2024-01-01", "2024-03-01", "2024-03-01", "2024-02-01"],
            "associated_event" => &["a", "b", "c", "d"],
            "mu_pre_change" => &[70.0, 75.0, 80.0, 72.0],
            "mu_post_change" => &[72.0, 74.0, 83.12346, 71.0],
            "sigma_pre_change" => &[1.0, 1.5, 2.0, 1.2],
            "sigma_post_change" => &[1.1, 1.4, 2.5, 1.3],
        }
        .unwrap(),
    )
}

#[test]
fn summary_picks_last_row_among_latest_dates() -> anyhow::Result<()> {
    let summary = summarize_latest_changepoint(&changepoints(), SchemaPolicy::Strict)?;

    assert_eq!(summary.event.as_deref(), Some("c"));
    assert_eq!(summary.date, Some(date("2024-03-01")));
    assert_abs_diff_eq!(summary.price_shift.unwrap(), 3.1235, epsilon = 1e-12);
    assert_abs_diff_eq!(summary.volatility_change.unwrap(), 0.5, epsilon = 1e-12);
    assert_eq!(summary.count, 4);

    let rendered = serde_json::to_value(&summary)?;
    assert_eq!(rendered["date"], "2024-03-01");
    assert_eq!(rendered["event"], "c");

    Ok(())
}

#[test]
fn strict_summary_rejects_incomplete_schema() -> anyhow::Result<()> {
    let partial = Dataset::new(df! {
        "date" => &["2024-01-01"],
        "associated_event" => &["a"],
        "mu_pre_change" => &[70.0],
        "mu_post_change" => &[71.0],
    }?);

    let error = summarize_latest_changepoint(&partial, SchemaPolicy::Strict)
        .expect_err("sigma columns are required");
    match &error {
        QueryError::Schema { missing } => {
            assert_eq!(missing, &vec!["sigma_pre_change", "sigma_post_change"]);
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(error.status(), 500);

    let tolerant = summarize_latest_changepoint(&partial, SchemaPolicy::Tolerant)?;
    assert_eq!(tolerant.price_shift, Some(1.0));
    assert_eq!(tolerant.volatility_change, Some(0.0));
    assert_eq!(tolerant.event.as_deref(), Some("a"));

    Ok(())
}

#[test]
fn empty_changepoints_summarize_to_zeroed_defaults() -> anyhow::Result<()> {
    for policy in [SchemaPolicy::Strict, SchemaPolicy::Tolerant] {
        let summary = summarize_latest_changepoint(&Dataset::empty(), policy)?;
        assert_eq!(summary, ImpactSummary::empty());
    }

    let rendered = serde_json::to_value(ImpactSummary::empty())?;
    assert!(rendered["event"].is_null());
    assert_eq!(rendered["price_shift"], 0.0);
    assert_eq!(rendered["count"], 0);

    Ok(())
}
