use chrono::{Days, NaiveDate};
use serde::Serialize;

use crate::dataset::{
    ASSOCIATED_EVENT_COLUMN, DATE_COLUMN, Dataset, EVENT_NAME_COLUMN, MU_POST_COLUMN,
    MU_PRE_COLUMN, RETURNS_COLUMN, SIGMA_POST_COLUMN, SIGMA_PRE_COLUMN,
};
use crate::error::{QueryError, QueryResult};
use crate::features::with_log_returns;
use crate::logging::log_event;
use crate::metrics::{mean, round_to, sample_std};

pub const DEFAULT_WINDOW_DAYS: u32 = 30;
pub const IMPACT_PRECISION: i32 = 6;
pub const SUMMARY_PRECISION: i32 = 4;

/// Before/after return statistics around a named event, kept at full precision.
#[derive(Debug, Clone, PartialEq)]
pub struct EventImpact {
    pub event_name: String,
    pub event_date: NaiveDate,
    pub window_days: u32,
    pub rows_before: usize,
    pub rows_after: usize,
    pub mean_before: f64,
    pub mean_after: f64,
    pub vol_before: f64,
    pub vol_after: f64,
}

impl EventImpact {
    pub fn mean_shift(&self) -> f64 {
        self.mean_after - self.mean_before
    }

    pub fn vol_shift(&self) -> f64 {
        self.vol_after - self.vol_before
    }

    /// Display form, every statistic rounded to six decimals.
    pub fn report(&self) -> EventImpactReport {
        let round = |value: f64| round_to(value, IMPACT_PRECISION);
        EventImpactReport {
            event: self.event_name.clone(),
            event_date: self.event_date,
            window_days: self.window_days,
            returns: ReturnShift {
                mean_before: round(self.mean_before),
                mean_after: round(self.mean_after),
                shift: round(self.mean_shift()),
            },
            volatility: VolatilityShift {
                before: round(self.vol_before),
                after: round(self.vol_after),
                shift: round(self.vol_shift()),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventImpactReport {
    pub event: String,
    pub event_date: NaiveDate,
    pub window_days: u32,
    pub returns: ReturnShift,
    pub volatility: VolatilityShift,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReturnShift {
    pub mean_before: f64,
    pub mean_after: f64,
    pub shift: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VolatilityShift {
    pub before: f64,
    pub after: f64,
    pub shift: f64,
}

/// Date of the first event (input order) named exactly `event_name` with a usable date.
pub fn find_event_date(events: &Dataset, event_name: &str) -> QueryResult<NaiveDate> {
    let missing: Vec<String> = [EVENT_NAME_COLUMN, DATE_COLUMN]
        .into_iter()
        .filter(|column| !events.has_column(column))
        .map(str::to_string)
        .collect();
    if !missing.is_empty() {
        return Err(QueryError::Schema { missing });
    }

    let names = events.texts(EVENT_NAME_COLUMN)?;
    let dates = events.dates(DATE_COLUMN)?;

    names
        .iter()
        .zip(dates)
        .find_map(|(name, date)| match (name.as_deref(), date) {
            (Some(name), Some(date)) if name == event_name => Some(date),
            _ => None,
        })
        .ok_or_else(|| QueryError::EventNotFound(event_name.to_string()))
}

/// Compare log-return mean and volatility in the `window_days` before and after an event.
///
/// Both windows exclude the event date itself. Each needs at least two finite returns,
/// otherwise the comparison fails with [`QueryError::InsufficientWindowData`].
pub fn analyze_event_impact(
    prices: &Dataset,
    events: &Dataset,
    event_name: &str,
    window_days: u32,
) -> QueryResult<EventImpact> {
    let event_date = find_event_date(events, event_name)?;

    let with_returns = with_log_returns(prices)?;
    if !with_returns.has_column(RETURNS_COLUMN) || !with_returns.has_column(DATE_COLUMN) {
        return Err(QueryError::InsufficientWindowData {
            event: event_name.to_string(),
            before: 0,
            after: 0,
        });
    }

    let window = Days::new(u64::from(window_days));
    let lower = event_date.checked_sub_days(window).unwrap_or(NaiveDate::MIN);
    let upper = event_date.checked_add_days(window).unwrap_or(NaiveDate::MAX);

    let dates = with_returns.dates(DATE_COLUMN)?;
    let returns = with_returns.floats(RETURNS_COLUMN)?;

    let mut before = Vec::new();
    let mut after = Vec::new();
    for (date, value) in dates.into_iter().zip(returns) {
        let (Some(date), Some(value)) = (date, value) else {
            continue;
        };
        if !value.is_finite() {
            continue;
        }
        if lower <= date && date < event_date {
            before.push(value);
        } else if event_date < date && date <= upper {
            after.push(value);
        }
    }

    if before.len() < 2 || after.len() < 2 {
        log_event(
            file!(),
            "EventImpactAnalyzer",
            "analyze_event_impact",
            "impact.window",
            line!(),
            &format!(
                "Insufficient data around {event_name} ({event_date}): {} before, {} after",
                before.len(),
                after.len()
            ),
            None,
            "none",
            "GET",
        );
        return Err(QueryError::InsufficientWindowData {
            event: event_name.to_string(),
            before: before.len(),
            after: after.len(),
        });
    }

    let impact = EventImpact {
        event_name: event_name.to_string(),
        event_date,
        window_days,
        rows_before: before.len(),
        rows_after: after.len(),
        mean_before: mean(&before),
        mean_after: mean(&after),
        vol_before: sample_std(&before),
        vol_after: sample_std(&after),
    };

    log_event(
        file!(),
        "EventImpactAnalyzer",
        "analyze_event_impact",
        "impact.window",
        line!(),
        &format!(
            "Computed {window_days}-day impact of {event_name}: mean shift {:.6}, vol shift {:.6}",
            impact.mean_shift(),
            impact.vol_shift()
        ),
        None,
        "none",
        "GET",
    );

    Ok(impact)
}

/// How strictly the changepoint summary checks its input columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaPolicy {
    /// Every required column must be present.
    Strict,
    /// Missing numeric fields count as zero; a missing date column selects the last row.
    Tolerant,
}

pub const SUMMARY_REQUIRED_COLUMNS: [&str; 6] = [
    DATE_COLUMN,
    ASSOCIATED_EVENT_COLUMN,
    MU_PRE_COLUMN,
    MU_POST_COLUMN,
    SIGMA_PRE_COLUMN,
    SIGMA_POST_COLUMN,
];

/// Mean and volatility shift of the most recent changepoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImpactSummary {
    pub event: Option<String>,
    pub date: Option<NaiveDate>,
    pub price_shift: Option<f64>,
    pub volatility_change: Option<f64>,
    pub count: usize,
}

impl ImpactSummary {
    /// Zeroed summary reported when no changepoints are available.
    pub fn empty() -> Self {
        Self {
            event: None,
            date: None,
            price_shift: Some(0.0),
            volatility_change: Some(0.0),
            count: 0,
        }
    }
}

/// Summarize the latest changepoint; ties on the latest date go to the row occurring last.
pub fn summarize_latest_changepoint(
    changepoints: &Dataset,
    policy: SchemaPolicy,
) -> QueryResult<ImpactSummary> {
    if changepoints.is_empty() {
        return Ok(ImpactSummary::empty());
    }

    if policy == SchemaPolicy::Strict {
        let missing: Vec<String> = SUMMARY_REQUIRED_COLUMNS
            .into_iter()
            .filter(|column| !changepoints.has_column(column))
            .map(str::to_string)
            .collect();
        if !missing.is_empty() {
            log_event(
                file!(),
                "ImpactSummary",
                "summarize_latest_changepoint",
                "impact.summary",
                line!(),
                "Changepoints dataset does not match the summary schema",
                Some(&missing.join(", ")),
                "none",
                "GET",
            );
            return Err(QueryError::Schema { missing });
        }
    }

    let latest_idx = if changepoints.has_column(DATE_COLUMN) {
        let dates = changepoints.dates(DATE_COLUMN)?;
        let mut latest: Option<(usize, NaiveDate)> = None;
        for (idx, date) in dates.into_iter().enumerate() {
            if let Some(date) = date
                && latest.is_none_or(|(_, best)| date >= best)
            {
                latest = Some((idx, date));
            }
        }
        latest.map(|(idx, _)| idx)
    } else {
        Some(changepoints.height() - 1)
    };

    let Some(idx) = latest_idx else {
        return Ok(ImpactSummary {
            count: changepoints.height(),
            ..ImpactSummary::empty()
        });
    };

    let numeric = |column: &str| -> QueryResult<Option<f64>> {
        let value = if changepoints.has_column(column) {
            changepoints.floats(column)?[idx]
        } else {
            None
        };
        match policy {
            SchemaPolicy::Strict => Ok(value),
            SchemaPolicy::Tolerant => Ok(value.or(Some(0.0))),
        }
    };
    let difference = |post: Option<f64>, pre: Option<f64>| match (post, pre) {
        (Some(post), Some(pre)) => {
            Some(round_to(post - pre, SUMMARY_PRECISION)).filter(|value| value.is_finite())
        }
        _ => None,
    };

    let event = if changepoints.has_column(ASSOCIATED_EVENT_COLUMN) {
        changepoints.texts(ASSOCIATED_EVENT_COLUMN)?[idx].clone()
    } else {
        None
    };
    let date = if changepoints.has_column(DATE_COLUMN) {
        changepoints.dates(DATE_COLUMN)?[idx]
    } else {
        None
    };

    Ok(ImpactSummary {
        event,
        date,
        price_shift: difference(numeric(MU_POST_COLUMN)?, numeric(MU_PRE_COLUMN)?),
        volatility_change: difference(numeric(SIGMA_POST_COLUMN)?, numeric(SIGMA_PRE_COLUMN)?),
        count: changepoints.height(),
    })
}
