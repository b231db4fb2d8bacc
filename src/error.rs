use thiserror::Error;

use crate::dataset::DatasetError;

/// Failures the query engine reports to the orchestration layer.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("page starting at row {start} is beyond the {total} available {resource}")]
    OutOfRange {
        resource: String,
        start: usize,
        total: usize,
    },
    #[error("dataset is missing required columns: {}", .missing.join(", "))]
    Schema { missing: Vec<String> },
    #[error("missing required parameter `{0}`")]
    BadRequest(String),
    #[error("event `{0}` not found")]
    EventNotFound(String),
    #[error("{0}")]
    SourceUnavailable(String),
    #[error(
        "insufficient data around `{event}`: {before} rows before and {after} rows after, at least 2 required on each side"
    )]
    InsufficientWindowData {
        event: String,
        before: usize,
        after: usize,
    },
    #[error(transparent)]
    Dataset(#[from] DatasetError),
}

impl QueryError {
    /// HTTP status equivalent of the failure.
    pub fn status(&self) -> u16 {
        match self {
            QueryError::OutOfRange { .. } => 416,
            QueryError::Schema { .. } => 500,
            QueryError::BadRequest(_) => 400,
            QueryError::EventNotFound(_) => 404,
            QueryError::SourceUnavailable(_) => 404,
            QueryError::InsufficientWindowData { .. } => 400,
            QueryError::Dataset(_) => 500,
        }
    }
}

pub type QueryResult<T> = Result<T, QueryError>;
