//! pointdash serves time-indexed price, changepoint and event records.
//! It provides date-range filtering, stable sorting, pagination, log-return derivation
//! and before/after event impact statistics over in-memory datasets, plus an HTTP layer.

pub mod dataset;
pub mod error;
pub mod features;
pub mod impact;
pub mod logging;
pub mod metrics;
pub mod pagination;
pub mod server;
pub mod service;
pub mod settings;

pub use dataset::{Cell, Dataset, DatasetError, Row, SortOrder, SourceFormat};
pub use error::{QueryError, QueryResult};
pub use features::{with_log_returns, with_rolling_volatility};
pub use impact::{
    EventImpact, EventImpactReport, ImpactSummary, SchemaPolicy, analyze_event_impact,
    summarize_latest_changepoint,
};
pub use metrics::{CorrelationMatrix, correlation_matrix};
pub use pagination::{OutOfRangePolicy, Page, PageRequest, paginate};
pub use service::{AnalyticsService, ApiResponse, EventImpactQuery, ListQuery, Resource};
pub use settings::{DataSources, Settings, SettingsError};

pub type Result<T> = anyhow::Result<T>;
