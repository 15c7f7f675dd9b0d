//! Sort, filter and paginate over a row snapshot.
//!
//! The engine is a pure function of its inputs. It never touches the table the
//! rows came from; the caller recomputes the view whenever the session changes.

use std::time::Instant;

use tracing::trace;

use crate::domain::{DEFAULT_PAGE_SIZE, InvError};
use crate::rows::{Row, RowSet};
use crate::value::CellValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub column: String,
    pub direction: SortDirection,
}

impl SortKey {
    pub fn ascending(column: impl Into<String>) -> Self {
        SortKey {
            column: column.into(),
            direction: SortDirection::Ascending,
        }
    }

    pub fn descending(column: impl Into<String>) -> Self {
        SortKey {
            column: column.into(),
            direction: SortDirection::Descending,
        }
    }
}

/// Sort/filter session state of one table view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewQuery {
    pub sort: Option<SortKey>,
    pub filter: String,
    pub page: usize,
    pub page_size: usize,
}

impl Default for ViewQuery {
    fn default() -> Self {
        ViewQuery {
            sort: None,
            filter: String::new(),
            page: 0,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl ViewQuery {
    pub fn with_page(mut self, page: usize, page_size: usize) -> Self {
        self.page = page;
        self.page_size = page_size;
        self
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = filter.into();
        self
    }

    pub fn with_sort(mut self, sort: SortKey) -> Self {
        self.sort = Some(sort);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ViewResult {
    /// Rows of the requested page.
    pub rows: Vec<Row>,
    /// Number of rows matching the filter, across all pages.
    pub total: usize,
}

impl ViewResult {
    pub fn page_count(&self, page_size: usize) -> usize {
        page_count(self.total, page_size)
    }
}

pub fn page_count(total: usize, page_size: usize) -> usize {
    if page_size == 0 {
        0
    } else {
        total.div_ceil(page_size)
    }
}

/// True if `filter` is empty or any text cell contains it (ignoring case) or
/// any number cell's rendering contains it literally.
pub fn row_matches(row: &Row, filter: &str) -> bool {
    if filter.is_empty() {
        return true;
    }
    let needle = filter.to_lowercase();
    row.values().iter().any(|value| match value {
        CellValue::Text(s) => s.to_lowercase().contains(&needle),
        CellValue::Number(_) => value.render().contains(filter),
        CellValue::Bool(_) | CellValue::Empty => false,
    })
}

/// A column holding more than one kind of non-empty value is sorted by its
/// rendered text instead of natural ordering.
fn is_mixed_column(rows: &[Row], cidx: usize) -> bool {
    let mut kinds = rows
        .iter()
        .map(|row| &row.values()[cidx])
        .filter(|v| !v.is_empty())
        .map(std::mem::discriminant);
    match kinds.next() {
        Some(first) => kinds.any(|k| k != first),
        None => false,
    }
}

/// Rows matching the filter, sorted, without pagination.
pub fn filter_and_sort(rows: &RowSet, query: &ViewQuery) -> Result<Vec<Row>, InvError> {
    let start_time = Instant::now();
    let sort_idx = match &query.sort {
        Some(key) => Some(
            rows.header()
                .iter()
                .position(|name| *name == key.column)
                .ok_or_else(|| {
                    InvError::out_of_range(format!("unknown sort column \"{}\"", key.column))
                })?,
        ),
        None => None,
    };

    let mut matched: Vec<Row> = rows
        .rows()
        .iter()
        .filter(|row| row_matches(row, &query.filter))
        .cloned()
        .collect();

    if let (Some(cidx), Some(key)) = (sort_idx, &query.sort) {
        // Vec::sort_by is stable, ties keep their snapshot order.
        if is_mixed_column(&matched, cidx) {
            matched.sort_by(|a, b| a.values()[cidx].text_cmp(&b.values()[cidx]));
        } else {
            matched.sort_by(|a, b| a.values()[cidx].sort_cmp(&b.values()[cidx]));
        }
        if key.direction == SortDirection::Descending {
            matched.reverse();
        }
    }

    trace!(
        "Filter \"{}\" / sort {:?} matched {} of {} rows in {}ms",
        query.filter,
        query.sort,
        matched.len(),
        rows.len(),
        start_time.elapsed().as_millis()
    );
    Ok(matched)
}

/// Filters, sorts and slices `rows` according to `query`.
///
/// Descending order is the exact reverse of the stable ascending order, so rows
/// with equal keys appear in reverse snapshot order. A page past the end is
/// empty, not an error.
pub fn apply(rows: &RowSet, query: &ViewQuery) -> Result<ViewResult, InvError> {
    let matched = filter_and_sort(rows, query)?;
    let total = matched.len();
    let start = query.page.saturating_mul(query.page_size);
    let rows = matched
        .into_iter()
        .skip(start)
        .take(query.page_size)
        .collect();
    Ok(ViewResult { rows, total })
}
