use crate::dataset::{Dataset, Row};
use crate::error::{QueryError, QueryResult};
use crate::logging::log_event;

pub const DEFAULT_PAGE: usize = 1;
pub const DEFAULT_PER_PAGE: usize = 50;

/// What to do when a requested page starts past the last row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutOfRangePolicy {
    /// Report [`QueryError::OutOfRange`].
    Reject,
    /// Succeed with an empty page and a zero total.
    EmptyPage,
}

/// A 1-based page request. Construct through [`PageRequest::parse`] to get the lenient
/// defaults for malformed input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: usize,
    pub per_page: usize,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: DEFAULT_PAGE,
            per_page: DEFAULT_PER_PAGE,
        }
    }
}

impl PageRequest {
    pub fn new(page: usize, per_page: usize) -> Self {
        Self {
            page: page.max(1),
            per_page: if per_page == 0 {
                DEFAULT_PER_PAGE
            } else {
                per_page
            },
        }
    }

    /// Unparseable or non-positive values fall back to page 1 and 50 rows per page.
    pub fn parse(page: Option<&str>, per_page: Option<&str>) -> Self {
        let parse = |raw: Option<&str>| raw.and_then(|value| value.trim().parse::<i64>().ok());

        let page = match parse(page) {
            Some(value) if value >= 1 => usize::try_from(value).unwrap_or(DEFAULT_PAGE),
            _ => DEFAULT_PAGE,
        };
        let per_page = match parse(per_page) {
            Some(value) if value >= 1 => usize::try_from(value).unwrap_or(DEFAULT_PER_PAGE),
            _ => DEFAULT_PER_PAGE,
        };

        Self { page, per_page }
    }

    pub fn offset(&self) -> usize {
        (self.page - 1).saturating_mul(self.per_page)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub items: Vec<Row>,
    pub start_index: usize,
    pub end_index: usize,
    pub total: usize,
    /// `"<resource> <start>-<end>/<total>"`; absent on empty pages.
    pub range: Option<String>,
}

impl Page {
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            start_index: 0,
            end_index: 0,
            total: 0,
            range: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Cut one page out of `dataset` and describe its position.
pub fn paginate(
    dataset: &Dataset,
    resource: &str,
    request: PageRequest,
    policy: OutOfRangePolicy,
) -> QueryResult<Page> {
    let total = dataset.height();
    let start = request.offset();

    if total == 0 {
        return Ok(Page::empty());
    }

    if start >= total {
        log_event(
            file!(),
            "Paginator",
            "paginate",
            "query.paginate",
            line!(),
            &format!(
                "Page {} of {resource} starts at {start} beyond {total} rows ({policy:?})",
                request.page
            ),
            None,
            "none",
            "GET",
        );
        return match policy {
            OutOfRangePolicy::Reject => Err(QueryError::OutOfRange {
                resource: resource.to_string(),
                start,
                total,
            }),
            OutOfRangePolicy::EmptyPage => Ok(Page::empty()),
        };
    }

    let end = start.saturating_add(request.per_page).min(total);
    let items = dataset.slice(start, end - start).to_rows()?;
    let end_index = end - 1;

    Ok(Page {
        items,
        start_index: start,
        end_index,
        total,
        range: Some(format!("{resource} {start}-{end_index}/{total}")),
    })
}
