//! Per-resource request orchestration.
//!
//! Each resource has a pure `*_response` function over already-loaded datasets, and an
//! [`AnalyticsService`] method that loads fresh data from disk before delegating to it.

use serde::Deserialize;
use serde_json::{Value, json};

use crate::dataset::{CATEGORY_COLUMN, DATE_COLUMN, Dataset, SortOrder};
use crate::error::{QueryError, QueryResult};
use crate::features::{DEFAULT_VOLATILITY_WINDOW, with_log_returns, with_rolling_volatility};
use crate::impact::{
    DEFAULT_WINDOW_DAYS, SchemaPolicy, analyze_event_impact, summarize_latest_changepoint,
};
use crate::logging::log_event;
use crate::metrics::correlation_matrix;
use crate::pagination::{OutOfRangePolicy, Page, PageRequest, paginate};
use crate::settings::DataSources;

/// Paginated resources and the policies each one declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Prices,
    Changepoints,
    Events,
}

impl Resource {
    pub fn label(self) -> &'static str {
        match self {
            Resource::Prices => "prices",
            Resource::Changepoints => "changepoints",
            Resource::Events => "events",
        }
    }

    pub fn paging_policy(self) -> OutOfRangePolicy {
        match self {
            Resource::Prices | Resource::Events => OutOfRangePolicy::Reject,
            Resource::Changepoints => OutOfRangePolicy::EmptyPage,
        }
    }
}

/// The impact-summary endpoint validates the changepoint schema strictly.
pub const IMPACT_SUMMARY_SCHEMA: SchemaPolicy = SchemaPolicy::Strict;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PriceMode {
    #[default]
    Price,
    Returns,
    Volatility,
}

impl PriceMode {
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(|value| value.trim().to_ascii_lowercase()).as_deref() {
            Some("returns") => PriceMode::Returns,
            Some("volatility") => PriceMode::Volatility,
            _ => PriceMode::Price,
        }
    }
}

/// Raw query-string parameters. Kept as strings so malformed optional values fall back to
/// defaults instead of rejecting the request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListQuery {
    pub start: Option<String>,
    pub end: Option<String>,
    #[serde(rename = "sortBy")]
    pub sort_by: Option<String>,
    pub order: Option<String>,
    pub page: Option<String>,
    #[serde(rename = "perPage")]
    pub per_page: Option<String>,
    pub mode: Option<String>,
    pub category: Option<String>,
    pub window: Option<String>,
}

impl ListQuery {
    fn page_request(&self) -> PageRequest {
        PageRequest::parse(self.page.as_deref(), self.per_page.as_deref())
    }

    fn sort_order(&self) -> SortOrder {
        SortOrder::parse(self.order.as_deref())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventImpactQuery {
    pub event: Option<String>,
    pub window: Option<String>,
}

/// Transport-neutral response: status, optional `Content-Range` value and a JSON body.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub content_range: Option<String>,
    pub body: Value,
}

impl ApiResponse {
    pub fn ok(body: Value) -> Self {
        Self {
            status: 200,
            content_range: None,
            body,
        }
    }

    pub fn with_status(status: u16, body: Value) -> Self {
        Self {
            status,
            content_range: None,
            body,
        }
    }

    pub fn message(status: u16, message: &str) -> Self {
        Self::with_status(status, json!({ "message": message }))
    }

    pub fn from_error(error: &QueryError) -> Self {
        let content_range = match error {
            QueryError::OutOfRange {
                resource, total, ..
            } => Some(format!("{resource} */{total}")),
            _ => None,
        };

        Self {
            status: error.status(),
            content_range,
            body: json!({ "error": error.to_string() }),
        }
    }
}

fn respond(resource: &str, result: QueryResult<ApiResponse>) -> ApiResponse {
    result.unwrap_or_else(|error| {
        log_event(
            file!(),
            "AnalyticsService",
            "respond",
            "service.respond",
            line!(),
            &format!("Request for {resource} failed with status {}", error.status()),
            Some(&error.to_string()),
            "none",
            "GET",
        );
        ApiResponse::from_error(&error)
    })
}

/// Sort → sanitize → paginate, shared by the list resources after filtering.
fn list_page(resource: Resource, dataset: &Dataset, query: &ListQuery) -> QueryResult<Page> {
    let sorted = dataset.sort_by(query.sort_by.as_deref(), query.sort_order())?;
    let clean = sorted.sanitize()?;
    paginate(
        &clean,
        resource.label(),
        query.page_request(),
        resource.paging_policy(),
    )
}

fn page_response(page: Page) -> ApiResponse {
    ApiResponse {
        status: 200,
        content_range: page.range,
        body: json!(page.items),
    }
}

/// `GET prices`: 404 when the source has no rows.
pub fn prices_response(prices: &Dataset, query: &ListQuery) -> ApiResponse {
    if prices.is_empty() {
        return ApiResponse::message(404, "No price data available");
    }
    respond(Resource::Prices.label(), try_prices(prices, query))
}

fn try_prices(prices: &Dataset, query: &ListQuery) -> QueryResult<ApiResponse> {
    let filtered =
        prices.filter_date_range(DATE_COLUMN, query.start.as_deref(), query.end.as_deref())?;
    let derived = match PriceMode::parse(query.mode.as_deref()) {
        PriceMode::Price => filtered,
        PriceMode::Returns => with_log_returns(&filtered)?,
        PriceMode::Volatility => {
            let window = query
                .window
                .as_deref()
                .and_then(|value| value.trim().parse::<usize>().ok())
                .unwrap_or(DEFAULT_VOLATILITY_WINDOW);
            with_rolling_volatility(&filtered, window)?
        }
    };
    let page = list_page(Resource::Prices, &derived, query)?;
    Ok(page_response(page))
}

fn empty_changepoints() -> ApiResponse {
    ApiResponse::ok(json!({ "changepoints": [], "total": 0 }))
}

/// `GET changepoints`: missing sources, empty filters and pages past the end all succeed
/// with an empty listing.
pub fn changepoints_response(changepoints: &Dataset, query: &ListQuery) -> ApiResponse {
    if changepoints.is_empty() {
        return empty_changepoints();
    }
    respond(
        Resource::Changepoints.label(),
        try_changepoints(changepoints, query),
    )
}

fn try_changepoints(changepoints: &Dataset, query: &ListQuery) -> QueryResult<ApiResponse> {
    let filtered = changepoints.filter_date_range(
        DATE_COLUMN,
        query.start.as_deref(),
        query.end.as_deref(),
    )?;
    let page = list_page(Resource::Changepoints, &filtered, query)?;
    if page.is_empty() {
        return Ok(empty_changepoints());
    }
    Ok(page_response(page))
}

/// `GET events`: 404 when the source has no rows.
pub fn events_response(events: &Dataset, query: &ListQuery) -> ApiResponse {
    if events.is_empty() {
        return ApiResponse::message(404, "No events found");
    }
    respond(Resource::Events.label(), try_events(events, query))
}

fn try_events(events: &Dataset, query: &ListQuery) -> QueryResult<ApiResponse> {
    let filtered = events
        .filter_date_range(DATE_COLUMN, query.start.as_deref(), query.end.as_deref())?
        .filter_equals(CATEGORY_COLUMN, query.category.as_deref())?;
    let page = list_page(Resource::Events, &filtered, query)?;
    Ok(page_response(page))
}

/// `GET correlation`: pairwise correlation of the numeric price columns.
pub fn correlation_response(prices: &Dataset) -> ApiResponse {
    if prices.is_empty() {
        return ApiResponse::message(404, "No data available");
    }

    let result = correlation_matrix(prices)
        .map_err(QueryError::from)
        .map(|matrix| match matrix {
            Some(matrix) => ApiResponse::ok(matrix.to_json()),
            None => ApiResponse::message(200, "Not enough numerical columns"),
        });
    respond("correlation", result)
}

/// `GET impact-summary`: the most recent changepoint within the optional date range.
pub fn impact_summary_response(changepoints: &Dataset, query: &ListQuery) -> ApiResponse {
    respond("impact-summary", try_impact_summary(changepoints, query))
}

fn try_impact_summary(changepoints: &Dataset, query: &ListQuery) -> QueryResult<ApiResponse> {
    let filtered = changepoints.filter_date_range(
        DATE_COLUMN,
        query.start.as_deref(),
        query.end.as_deref(),
    )?;
    let summary = summarize_latest_changepoint(&filtered, IMPACT_SUMMARY_SCHEMA)?;
    Ok(ApiResponse::ok(json!(summary)))
}

/// `GET event-impact`: before/after return statistics around a named event.
pub fn event_impact_response(
    prices: &Dataset,
    events: &Dataset,
    query: &EventImpactQuery,
) -> ApiResponse {
    respond("event-impact", try_event_impact(prices, events, query))
}

fn try_event_impact(
    prices: &Dataset,
    events: &Dataset,
    query: &EventImpactQuery,
) -> QueryResult<ApiResponse> {
    let event = query
        .event
        .as_deref()
        .map(str::trim)
        .filter(|event| !event.is_empty())
        .ok_or_else(|| QueryError::BadRequest("event".to_string()))?;
    if prices.is_empty() {
        return Err(QueryError::SourceUnavailable(
            "No price data available".to_string(),
        ));
    }
    if events.is_empty() {
        return Err(QueryError::SourceUnavailable("No events found".to_string()));
    }

    let window = query
        .window
        .as_deref()
        .and_then(|value| value.trim().parse::<u32>().ok())
        .unwrap_or(DEFAULT_WINDOW_DAYS);
    let impact = analyze_event_impact(prices, events, event, window)?;
    Ok(ApiResponse::ok(json!(impact.report())))
}

/// Loads every source afresh per request; holds no data between requests.
#[derive(Debug, Clone)]
pub struct AnalyticsService {
    sources: DataSources,
}

impl AnalyticsService {
    pub fn new(sources: DataSources) -> Self {
        Self { sources }
    }

    pub fn sources(&self) -> &DataSources {
        &self.sources
    }

    pub fn prices(&self, query: &ListQuery) -> ApiResponse {
        prices_response(&Dataset::load(&self.sources.prices), query)
    }

    pub fn changepoints(&self, query: &ListQuery) -> ApiResponse {
        changepoints_response(&Dataset::load(&self.sources.changepoints), query)
    }

    pub fn events(&self, query: &ListQuery) -> ApiResponse {
        events_response(&Dataset::load(&self.sources.events), query)
    }

    pub fn correlation(&self) -> ApiResponse {
        correlation_response(&Dataset::load(&self.sources.prices))
    }

    pub fn impact_summary(&self, query: &ListQuery) -> ApiResponse {
        impact_summary_response(&Dataset::load(&self.sources.changepoints), query)
    }

    pub fn event_impact(&self, query: &EventImpactQuery) -> ApiResponse {
        event_impact_response(
            &Dataset::load(&self.sources.prices),
            &Dataset::load(&self.sources.events),
            query,
        )
    }
}
