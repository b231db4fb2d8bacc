use polars::prelude::DataType;
use rayon::prelude::*;
use serde_json::{Map, Value};

use crate::dataset::{Dataset, DatasetResult};
use crate::logging::log_event;

pub const CORRELATION_PRECISION: i32 = 4;

/// Arithmetic mean; NaN for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().copied().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation with the `n - 1` divisor; NaN with fewer than two values.
pub fn sample_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return f64::NAN;
    }
    sample_variance(values, mean(values)).sqrt()
}

fn sample_variance(values: &[f64], mean: f64) -> f64 {
    let sum_squares = values
        .par_iter()
        .map(|value| {
            let diff = value - mean;
            diff * diff
        })
        .sum::<f64>();
    sum_squares / (values.len() as f64 - 1.0)
}

/// Round half away from zero to `places` decimals.
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// Pearson correlation over the positions where both series hold finite values.
pub fn pearson(left: &[Option<f64>], right: &[Option<f64>]) -> Option<f64> {
    let pairs: Vec<(f64, f64)> = left
        .iter()
        .zip(right)
        .filter_map(|pair| match pair {
            (Some(x), Some(y)) if x.is_finite() && y.is_finite() => Some((*x, *y)),
            _ => None,
        })
        .collect();
    if pairs.len() < 2 {
        return None;
    }

    let count = pairs.len() as f64;
    let mean_x = pairs.iter().map(|(x, _)| x).sum::<f64>() / count;
    let mean_y = pairs.iter().map(|(_, y)| y).sum::<f64>() / count;

    let (mut covariance, mut var_x, mut var_y) = (0.0, 0.0, 0.0);
    for (x, y) in &pairs {
        let (dx, dy) = (x - mean_x, y - mean_y);
        covariance += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    let denominator = (var_x * var_y).sqrt();
    if denominator <= f64::EPSILON {
        return None;
    }

    Some((covariance / denominator).clamp(-1.0, 1.0))
}

#[derive(Debug, Clone, PartialEq)]
pub struct CorrelationMatrix {
    pub columns: Vec<String>,
    /// Row-major, `values[i][j]` correlates `columns[i]` with `columns[j]`.
    pub values: Vec<Vec<Option<f64>>>,
}

impl CorrelationMatrix {
    pub fn get(&self, left: &str, right: &str) -> Option<f64> {
        let i = self.columns.iter().position(|column| column == left)?;
        let j = self.columns.iter().position(|column| column == right)?;
        self.values[i][j]
    }

    /// Nested `{column: {column: value}}` object; undefined correlations become `null`.
    pub fn to_json(&self) -> Value {
        let outer: Map<String, Value> = self
            .columns
            .iter()
            .zip(&self.values)
            .map(|(column, row)| {
                let inner: Map<String, Value> = self
                    .columns
                    .iter()
                    .zip(row)
                    .map(|(other, value)| {
                        let value = value
                            .and_then(serde_json::Number::from_f64)
                            .map_or(Value::Null, Value::Number);
                        (other.clone(), value)
                    })
                    .collect();
                (column.clone(), Value::Object(inner))
            })
            .collect();
        Value::Object(outer)
    }
}

/// Pairwise correlation of every numeric column, rounded to four decimals.
///
/// Returns `None` when fewer than two numeric columns exist.
pub fn correlation_matrix(dataset: &Dataset) -> DatasetResult<Option<CorrelationMatrix>> {
    let numeric: Vec<String> = dataset
        .frame()
        .get_columns()
        .iter()
        .filter(|series| series.dtype().is_numeric() && series.dtype() != &DataType::Boolean)
        .map(|series| series.name().to_string())
        .collect();

    if numeric.len() < 2 {
        log_event(
            file!(),
            "Correlation",
            "correlation_matrix",
            "metrics.correlation",
            line!(),
            &format!("Only {} numeric columns; skipping correlation", numeric.len()),
            None,
            "none",
            "GET",
        );
        return Ok(None);
    }

    let series = numeric
        .iter()
        .map(|column| dataset.floats(column))
        .collect::<DatasetResult<Vec<_>>>()?;

    let values: Vec<Vec<Option<f64>>> = (0..series.len())
        .into_par_iter()
        .map(|i| {
            (0..series.len())
                .map(|j| {
                    pearson(&series[i], &series[j])
                        .map(|value| round_to(value, CORRELATION_PRECISION))
                })
                .collect()
        })
        .collect();

    log_event(
        file!(),
        "Correlation",
        "correlation_matrix",
        "metrics.correlation",
        line!(),
        &format!("Computed correlation across {} numeric columns", numeric.len()),
        None,
        "none",
        "GET",
    );

    Ok(Some(CorrelationMatrix {
        columns: numeric,
        values,
    }))
}
