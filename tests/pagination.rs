use polars::prelude::*;

use pointdash::dataset::{Cell, Dataset};
use pointdash::error::QueryError;
use pointdash::pagination::{OutOfRangePolicy, Page, PageRequest, paginate};

fn numbered(total: usize) -> Dataset {
    let ids: Vec<f64> = (0..total).map(|idx| idx as f64).collect();
    Dataset::new(df! { "id" => &ids }.unwrap())
}

fn ids(page: &Page) -> Vec<f64> {
    page.items
        .iter()
        .filter_map(|row| row.get("id").and_then(Cell::as_f64))
        .collect()
}

#[test]
fn partial_last_page_reports_its_range() -> anyhow::Result<()> {
    let dataset = numbered(25);
    let page = paginate(
        &dataset,
        "prices",
        PageRequest::new(3, 10),
        OutOfRangePolicy::Reject,
    )?;

    assert_eq!(page.items.len(), 5);
    assert_eq!(page.start_index, 20);
    assert_eq!(page.end_index, 24);
    assert_eq!(page.total, 25);
    assert_eq!(page.items.len(), page.end_index - page.start_index + 1);
    assert_eq!(page.range.as_deref(), Some("prices 20-24/25"));
    assert_eq!(ids(&page), vec![20.0, 21.0, 22.0, 23.0, 24.0]);

    Ok(())
}

#[test]
fn page_past_the_end_follows_the_policy() -> anyhow::Result<()> {
    let dataset = numbered(25);
    let request = PageRequest::new(4, 10);

    let error = paginate(&dataset, "prices", request, OutOfRangePolicy::Reject)
        .expect_err("page 4 of 25 rows must be out of range");
    assert!(matches!(
        error,
        QueryError::OutOfRange {
            start: 30,
            total: 25,
            ..
        }
    ));
    assert_eq!(error.status(), 416);

    let empty = paginate(&dataset, "changepoints", request, OutOfRangePolicy::EmptyPage)?;
    assert!(empty.is_empty());
    assert_eq!(empty.total, 0);
    assert_eq!(empty.range, None);

    Ok(())
}

#[test]
fn empty_dataset_yields_empty_page_under_both_policies() -> anyhow::Result<()> {
    let dataset = Dataset::empty();
    for policy in [OutOfRangePolicy::Reject, OutOfRangePolicy::EmptyPage] {
        let page = paginate(&dataset, "events", PageRequest::default(), policy)?;
        assert_eq!(page, Page::empty());
    }
    Ok(())
}

#[test]
fn pages_reconstruct_the_dataset_exactly_once() -> anyhow::Result<()> {
    let dataset = numbered(23);
    let per_page = 4;

    let mut seen = Vec::new();
    let mut page_number = 1;
    loop {
        match paginate(
            &dataset,
            "prices",
            PageRequest::new(page_number, per_page),
            OutOfRangePolicy::Reject,
        ) {
            Ok(page) => {
                let start = (page_number - 1) * per_page;
                assert_eq!(page.items.len(), per_page.min(23 - start));
                seen.extend(ids(&page));
                page_number += 1;
            }
            Err(QueryError::OutOfRange { .. }) => break,
            Err(other) => return Err(other.into()),
        }
    }

    let expected: Vec<f64> = (0..23).map(|idx| idx as f64).collect();
    assert_eq!(seen, expected);
    assert_eq!(page_number, 7);

    Ok(())
}

#[test]
fn malformed_page_parameters_fall_back_to_defaults() {
    assert_eq!(
        PageRequest::parse(Some("abc"), Some("-5")),
        PageRequest::default()
    );
    assert_eq!(PageRequest::parse(Some("0"), Some("0")), PageRequest::default());
    assert_eq!(PageRequest::parse(None, None), PageRequest::default());
    assert_eq!(
        PageRequest::parse(Some(" 3 "), Some("10")),
        PageRequest::new(3, 10)
    );
    assert_eq!(PageRequest::default().per_page, 50);
    assert_eq!(PageRequest::new(0, 0), PageRequest::default());
    assert_eq!(PageRequest::new(3, 10).offset(), 20);
}
