use polars::prelude::*;

use crate::dataset::{
    DATE_COLUMN, Dataset, DatasetResult, PRICE_COLUMN, RETURNS_COLUMN, SortOrder,
    VOLATILITY_COLUMN,
};
use crate::logging::log_event;

pub const DEFAULT_VOLATILITY_WINDOW: usize = 30;

/// Sort chronologically and append `returns[i] = ln(price[i]) - ln(price[i - 1])`.
///
/// The first row has no return. Datasets without a price column pass through unchanged.
/// Non-positive prices produce non-finite returns, which [`Dataset::sanitize`] later nulls.
pub fn with_log_returns(dataset: &Dataset) -> DatasetResult<Dataset> {
    if !dataset.has_column(PRICE_COLUMN) {
        return Ok(dataset.clone());
    }

    let ordered = dataset.sort_by(Some(DATE_COLUMN), SortOrder::Ascending)?;
    let prices = ordered.floats(PRICE_COLUMN)?;

    let mut returns = Vec::with_capacity(prices.len());
    if !prices.is_empty() {
        returns.push(None);
    }
    for window in prices.windows(2) {
        let value = match (window[0], window[1]) {
            (Some(previous), Some(current)) => Some(current.ln() - previous.ln()),
            _ => None,
        };
        returns.push(value);
    }

    let enriched = ordered.with_series(Series::new(RETURNS_COLUMN, returns))?;

    log_event(
        file!(),
        "FeatureEngineering",
        "with_log_returns",
        "features.returns",
        line!(),
        &format!("Computed log returns for {PRICE_COLUMN} -> {RETURNS_COLUMN}"),
        None,
        "none",
        "GET",
    );

    Ok(enriched)
}

/// Append the population standard deviation of the trailing `window` log returns.
///
/// Rows without a full window of finite returns get no value. Computes returns first when
/// the dataset does not carry them yet.
pub fn with_rolling_volatility(dataset: &Dataset, window: usize) -> DatasetResult<Dataset> {
    let window = if window == 0 {
        DEFAULT_VOLATILITY_WINDOW
    } else {
        window
    };

    let with_returns = if dataset.has_column(RETURNS_COLUMN) {
        dataset.clone()
    } else {
        with_log_returns(dataset)?
    };
    if !with_returns.has_column(RETURNS_COLUMN) {
        return Ok(with_returns);
    }

    let returns = with_returns.floats(RETURNS_COLUMN)?;
    let volatility: Vec<Option<f64>> = (0..returns.len())
        .map(|idx| {
            if idx + 1 < window {
                return None;
            }
            let trailing = &returns[idx + 1 - window..=idx];
            let values: Vec<f64> = trailing
                .iter()
                .filter_map(|value| value.filter(|value| value.is_finite()))
                .collect();
            if values.len() < window {
                return None;
            }
            let mean = values.iter().sum::<f64>() / window as f64;
            let variance = values
                .iter()
                .map(|value| (value - mean).powi(2))
                .sum::<f64>()
                / window as f64;
            Some(variance.sqrt())
        })
        .collect();

    let enriched = with_returns.with_series(Series::new(VOLATILITY_COLUMN, volatility))?;

    log_event(
        file!(),
        "FeatureEngineering",
        "with_rolling_volatility",
        "features.volatility",
        line!(),
        &format!("Computed {window}-period rolling volatility for {RETURNS_COLUMN}"),
        None,
        "none",
        "GET",
    );

    Ok(enriched)
}
