use std::cmp::Ordering;
use std::path::Path;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use polars::prelude::*;
use serde::ser::{Serialize, SerializeMap, Serializer};
use thiserror::Error;

use crate::logging::log_event;

pub const DATE_COLUMN: &str = "date";
pub const PRICE_COLUMN: &str = "price";
pub const RETURNS_COLUMN: &str = "returns";
pub const VOLATILITY_COLUMN: &str = "volatility";
pub const EVENT_NAME_COLUMN: &str = "event_name";
pub const ASSOCIATED_EVENT_COLUMN: &str = "associated_event";
pub const MU_PRE_COLUMN: &str = "mu_pre_change";
pub const MU_POST_COLUMN: &str = "mu_post_change";
pub const SIGMA_PRE_COLUMN: &str = "sigma_pre_change";
pub const SIGMA_POST_COLUMN: &str = "sigma_post_change";
pub const CATEGORY_COLUMN: &str = "category";

/// Days between 0001-01-01 (CE day 1) and the Unix epoch.
const EPOCH_DAYS_FROM_CE: i32 = 719_163;

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("failed to load dataset: {source}")]
    Load { source: PolarsError },
    #[error("failed to transform dataset: {source}")]
    Transform { source: PolarsError },
}

impl From<PolarsError> for DatasetError {
    fn from(source: PolarsError) -> Self {
        DatasetError::Transform { source }
    }
}

pub type DatasetResult<T> = Result<T, DatasetError>;

/// File formats the loader understands. Each variant has exactly one reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Csv,
}

impl SourceFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "csv" => Some(SourceFormat::Csv),
            _ => None,
        }
    }

    fn read(self, path: &Path) -> PolarsResult<DataFrame> {
        match self {
            SourceFormat::Csv => read_csv(path),
        }
    }
}

fn read_csv(path: &Path) -> PolarsResult<DataFrame> {
    LazyCsvReader::new(path)
        .has_header(true)
        .with_try_parse_dates(true)
        .with_infer_schema_length(Some(2048))
        .finish()?
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

impl SortOrder {
    /// `desc` (any case) selects descending order; everything else is ascending.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some(value) if value.trim().eq_ignore_ascii_case("desc") => SortOrder::Descending,
            _ => SortOrder::Ascending,
        }
    }
}

/// A single value of a row.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Date(NaiveDate),
}

impl Cell {
    pub fn is_null(&self) -> bool {
        match self {
            Cell::Null => true,
            Cell::Float(value) => value.is_nan(),
            _ => false,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Float(value) => Some(*value),
            Cell::Int(value) => Some(*value as f64),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Cell::Date(date) => Some(*date),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Cell::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Chronological for dates, lexicographic for text, numeric for numbers. Cells of
    /// different kinds order by kind, so the comparison stays total.
    /// Nulls are not ordered here; callers decide where they go.
    fn natural_cmp(&self, other: &Cell) -> Ordering {
        match (self, other) {
            (Cell::Date(a), Cell::Date(b)) => a.cmp(b),
            (Cell::Text(a), Cell::Text(b)) => a.cmp(b),
            (Cell::Bool(a), Cell::Bool(b)) => a.cmp(b),
            (Cell::Int(a), Cell::Int(b)) => a.cmp(b),
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => x.total_cmp(&y),
                _ => a.kind_rank().cmp(&b.kind_rank()),
            },
        }
    }

    fn kind_rank(&self) -> u8 {
        match self {
            Cell::Null => 0,
            Cell::Bool(_) => 1,
            Cell::Int(_) | Cell::Float(_) => 2,
            Cell::Date(_) => 3,
            Cell::Text(_) => 4,
        }
    }
}

impl From<Option<NaiveDate>> for Cell {
    fn from(value: Option<NaiveDate>) -> Self {
        value.map_or(Cell::Null, Cell::Date)
    }
}

impl Serialize for Cell {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Cell::Null => serializer.serialize_none(),
            Cell::Bool(value) => serializer.serialize_bool(*value),
            Cell::Int(value) => serializer.serialize_i64(*value),
            Cell::Float(value) if value.is_finite() => serializer.serialize_f64(*value),
            Cell::Float(_) => serializer.serialize_none(),
            Cell::Text(text) => serializer.serialize_str(text),
            Cell::Date(date) => serializer.collect_str(&date.format("%Y-%m-%d")),
        }
    }
}

/// An ordered mapping from column name to value.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    cells: Vec<(String, Cell)>,
}

impl Row {
    pub fn get(&self, column: &str) -> Option<&Cell> {
        self.cells
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, cell)| cell)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.cells.len()))?;
        for (name, cell) in &self.cells {
            map.serialize_entry(name, cell)?;
        }
        map.end()
    }
}

/// Parse a date given as `YYYY-MM-DD`, an RFC 3339 timestamp or `YYYY-MM-DD HH:MM:SS`.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .or_else(|| {
            DateTime::parse_from_rfc3339(trimmed)
                .ok()
                .map(|timestamp| timestamp.date_naive())
        })
        .or_else(|| {
            NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S")
                .ok()
                .map(|timestamp| timestamp.date())
        })
        .or_else(|| {
            NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S")
                .ok()
                .map(|timestamp| timestamp.date())
        })
}

fn date_from_epoch_days(days: i32) -> Option<NaiveDate> {
    NaiveDate::from_num_days_from_ce_opt(days.checked_add(EPOCH_DAYS_FROM_CE)?)
}

fn series_dates(series: &Series) -> PolarsResult<Vec<Option<NaiveDate>>> {
    let as_days = |series: &Series| -> PolarsResult<Vec<Option<NaiveDate>>> {
        let days = series.cast(&DataType::Int32)?;
        Ok(days
            .i32()?
            .into_iter()
            .map(|value| value.and_then(date_from_epoch_days))
            .collect())
    };

    match series.dtype() {
        DataType::Date => as_days(series),
        DataType::Datetime(_, _) => as_days(&series.cast(&DataType::Date)?),
        DataType::Utf8 => Ok(series
            .utf8()?
            .into_iter()
            .map(|value| value.and_then(parse_date))
            .collect()),
        _ => Ok(vec![None; series.len()]),
    }
}

fn series_f64(series: &Series) -> PolarsResult<Vec<Option<f64>>> {
    let floats = if series.dtype() != &DataType::Float64 {
        series.cast(&DataType::Float64)?
    } else {
        series.clone()
    };

    Ok(floats.f64()?.into_iter().collect())
}

fn series_cells(series: &Series) -> PolarsResult<Vec<Cell>> {
    let dtype = series.dtype();
    let cells = match dtype {
        DataType::Date | DataType::Datetime(_, _) => {
            series_dates(series)?.into_iter().map(Cell::from).collect()
        }
        DataType::Utf8 if series.name() == DATE_COLUMN => series
            .utf8()?
            .into_iter()
            .map(|value| match value {
                Some(text) => parse_date(text).map_or_else(|| Cell::Text(text.to_string()), Cell::Date),
                None => Cell::Null,
            })
            .collect(),
        DataType::Utf8 => series
            .utf8()?
            .into_iter()
            .map(|value| value.map_or(Cell::Null, |text| Cell::Text(text.to_string())))
            .collect(),
        DataType::Boolean => series
            .bool()?
            .into_iter()
            .map(|value| value.map_or(Cell::Null, Cell::Bool))
            .collect(),
        DataType::Float32 | DataType::Float64 => series_f64(series)?
            .into_iter()
            .map(|value| value.map_or(Cell::Null, Cell::Float))
            .collect(),
        dtype if dtype.is_integer() => series
            .cast(&DataType::Int64)?
            .i64()?
            .into_iter()
            .map(|value| value.map_or(Cell::Null, Cell::Int))
            .collect(),
        _ => series
            .cast(&DataType::Utf8)?
            .utf8()?
            .into_iter()
            .map(|value| value.map_or(Cell::Null, |text| Cell::Text(text.to_string())))
            .collect(),
    };

    Ok(cells)
}

/// An immutable, ordered table of rows sharing one column set.
///
/// Every transform borrows the dataset and returns a new one, so an upstream dataset can be
/// fed to several downstream stages.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    frame: DataFrame,
}

impl Dataset {
    pub fn new(frame: DataFrame) -> Self {
        Self { frame }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Load a dataset from disk. Missing, empty or unreadable sources degrade to an empty
    /// dataset; the failure is logged and never returned.
    pub fn load<P: AsRef<Path>>(path: P) -> Self {
        let path_ref = path.as_ref();

        let Some(format) = SourceFormat::from_path(path_ref) else {
            log_event(
                file!(),
                "Dataset",
                "load",
                "dataset.load",
                line!(),
                &format!("Unsupported source format for {}", path_ref.display()),
                Some("unsupported extension"),
                "none",
                "GET",
            );
            return Self::empty();
        };

        match format.read(path_ref) {
            Ok(frame) => {
                log_event(
                    file!(),
                    "Dataset",
                    "load",
                    "dataset.load",
                    line!(),
                    &format!("Loaded {} rows from {}", frame.height(), path_ref.display()),
                    None,
                    "none",
                    "GET",
                );
                Self { frame }
            }
            Err(source) => {
                let error = DatasetError::Load { source };
                log_event(
                    file!(),
                    "Dataset",
                    "load",
                    "dataset.load",
                    line!(),
                    &format!("Failed to load {}", path_ref.display()),
                    Some(&error.to_string()),
                    "none",
                    "GET",
                );
                Self::empty()
            }
        }
    }

    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    pub fn height(&self) -> usize {
        self.frame.height()
    }

    pub fn is_empty(&self) -> bool {
        self.frame.height() == 0
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.frame.get_column_names()
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.frame.column(column).is_ok()
    }

    pub fn dates(&self, column: &str) -> DatasetResult<Vec<Option<NaiveDate>>> {
        Ok(series_dates(self.frame.column(column)?)?)
    }

    pub fn floats(&self, column: &str) -> DatasetResult<Vec<Option<f64>>> {
        Ok(series_f64(self.frame.column(column)?)?)
    }

    pub fn texts(&self, column: &str) -> DatasetResult<Vec<Option<String>>> {
        let series = self.frame.column(column)?;
        let text = if series.dtype() != &DataType::Utf8 {
            series.cast(&DataType::Utf8)?
        } else {
            series.clone()
        };

        Ok(text
            .utf8()?
            .into_iter()
            .map(|value| value.map(str::to_string))
            .collect())
    }

    /// Append or replace a column.
    pub fn with_series(&self, series: Series) -> DatasetResult<Self> {
        let mut frame = self.frame.clone();
        frame.with_column(series)?;
        Ok(Self { frame })
    }

    /// Keep the rows whose date lies within `[start, end]`. Unparseable bounds count as absent;
    /// with no usable bound the dataset is returned untouched.
    pub fn filter_date_range(
        &self,
        column: &str,
        start: Option<&str>,
        end: Option<&str>,
    ) -> DatasetResult<Self> {
        let start = start.and_then(parse_date);
        let end = end.and_then(parse_date);

        if (start.is_none() && end.is_none()) || !self.has_column(column) {
            return Ok(self.clone());
        }

        let mask: BooleanChunked = self
            .dates(column)?
            .into_iter()
            .map(|date| match date {
                Some(date) => {
                    start.is_none_or(|start| date >= start) && end.is_none_or(|end| date <= end)
                }
                None => false,
            })
            .collect();
        let frame = self.frame.filter(&mask)?;

        log_event(
            file!(),
            "Dataset",
            "filter_date_range",
            "dataset.filter",
            line!(),
            &format!(
                "Applied date filter on column {column}: {} -> {} rows",
                self.height(),
                frame.height()
            ),
            None,
            "none",
            "GET",
        );

        Ok(Self { frame })
    }

    /// Keep the rows whose `column` equals `value` exactly, surrounding whitespace included.
    /// An empty value or missing column leaves the dataset untouched.
    pub fn filter_equals(&self, column: &str, value: Option<&str>) -> DatasetResult<Self> {
        let Some(value) = value.filter(|value| !value.is_empty()) else {
            return Ok(self.clone());
        };
        if !self.has_column(column) {
            return Ok(self.clone());
        }

        let mask: BooleanChunked = self
            .texts(column)?
            .into_iter()
            .map(|text| text.as_deref() == Some(value))
            .collect();
        let frame = self.frame.filter(&mask)?;

        log_event(
            file!(),
            "Dataset",
            "filter_equals",
            "dataset.filter",
            line!(),
            &format!("Filtered {column} == {value}: {} rows", frame.height()),
            None,
            "none",
            "GET",
        );

        Ok(Self { frame })
    }

    /// Stable sort by `column` in its natural order, nulls last in both directions.
    /// In a column holding dates, values that do not parse as dates sort with the nulls.
    /// A missing or absent column leaves the dataset untouched.
    pub fn sort_by(&self, column: Option<&str>, order: SortOrder) -> DatasetResult<Self> {
        let Some(column) = column.filter(|column| self.has_column(column)) else {
            return Ok(self.clone());
        };

        let mut keys = series_cells(self.frame.column(column)?)?;
        if keys.iter().any(|key| matches!(key, Cell::Date(_))) {
            for key in keys.iter_mut() {
                if !matches!(key, Cell::Date(_)) {
                    *key = Cell::Null;
                }
            }
        }
        let mut indices: Vec<IdxSize> = (0..keys.len() as IdxSize).collect();
        indices.sort_by(|&a, &b| {
            let (left, right) = (&keys[a as usize], &keys[b as usize]);
            match (left.is_null(), right.is_null()) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Greater,
                (false, true) => Ordering::Less,
                (false, false) => match order {
                    SortOrder::Ascending => left.natural_cmp(right),
                    SortOrder::Descending => right.natural_cmp(left),
                },
            }
        });

        let frame = self.frame.take(&IdxCa::from_vec("", indices))?;

        log_event(
            file!(),
            "Dataset",
            "sort_by",
            "dataset.sort",
            line!(),
            &format!("Sorted {} rows by {column} ({order:?})", frame.height()),
            None,
            "none",
            "GET",
        );

        Ok(Self { frame })
    }

    /// Replace infinite and NaN values in every float column with nulls.
    pub fn sanitize(&self) -> DatasetResult<Self> {
        let mut frame = self.frame.clone();
        for series in self.frame.get_columns() {
            if matches!(series.dtype(), DataType::Float32 | DataType::Float64) {
                let cleaned: Vec<Option<f64>> = series_f64(series)?
                    .into_iter()
                    .map(|value| value.filter(|value| value.is_finite()))
                    .collect();
                frame.with_column(Series::new(series.name(), cleaned))?;
            }
        }

        Ok(Self { frame })
    }

    /// Rows `offset..offset + length`, clamped to the dataset bounds.
    pub fn slice(&self, offset: usize, length: usize) -> Self {
        let offset = offset.min(self.height());
        Self {
            frame: self.frame.slice(offset as i64, length),
        }
    }

    /// Materialize every row. Date columns are rendered as calendar dates.
    pub fn to_rows(&self) -> DatasetResult<Vec<Row>> {
        let columns = self
            .frame
            .get_columns()
            .iter()
            .map(|series| Ok((series.name().to_string(), series_cells(series)?)))
            .collect::<PolarsResult<Vec<_>>>()?;

        let rows = (0..self.height())
            .map(|idx| Row {
                cells: columns
                    .iter()
                    .map(|(name, cells)| (name.clone(), cells[idx].clone()))
                    .collect(),
            })
            .collect();

        Ok(rows)
    }
}
