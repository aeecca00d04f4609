//! Row-level access to the catalog tables.
//!
//! The hosted database is reached through PostgREST, where every row is a
//! JSON object. `RowStore` keeps that shape so the ingestion pipeline, the
//! tagger and the backup tool can run against either the live database or the
//! local SQLite mirror.

use anyhow::Result;
use parking_lot::Mutex;
use serde_json::{Map, Value};

pub mod sqlite;

pub use sqlite::SqliteStore;

/// One database row as a JSON object.
pub type Row = Map<String, Value>;

/// PostgREST's default `max-rows` is 1000, so paging never asks for more.
pub const DEFAULT_PAGE_SIZE: usize = 1000;

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(String, Value),
    Neq(String, Value),
    NotNull(String),
}

impl Filter {
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Eq(column.into(), value.into())
    }

    pub fn neq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Neq(column.into(), value.into())
    }

    pub fn not_null(column: impl Into<String>) -> Self {
        Filter::NotNull(column.into())
    }

    pub fn column(&self) -> &str {
        match self {
            Filter::Eq(column, _) | Filter::Neq(column, _) | Filter::NotNull(column) => column,
        }
    }

    /// Evaluates the filter against an in-memory row. Numbers and strings
    /// compare loosely (`"42"` equals `42`) the same way PostgREST coerces
    /// query-string values.
    pub fn matches(&self, row: &Row) -> bool {
        match self {
            Filter::Eq(column, value) => row.get(column).is_some_and(|v| loose_eq(v, value)),
            Filter::Neq(column, value) => row
                .get(column)
                .is_some_and(|v| !v.is_null() && !loose_eq(v, value)),
            Filter::NotNull(column) => row.get(column).is_some_and(|v| !v.is_null()),
        }
    }

    /// PostgREST query-string operator, e.g. `eq.42`.
    pub fn operator(&self) -> String {
        match self {
            Filter::Eq(_, value) => format!("eq.{}", plain(value)),
            Filter::Neq(_, value) => format!("neq.{}", plain(value)),
            Filter::NotNull(_) => "not.is.null".to_string(),
        }
    }
}

/// Renders a JSON scalar without quotes.
pub fn plain(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

fn loose_eq(a: &Value, b: &Value) -> bool {
    if a == b {
        return true;
    }
    match (a, b) {
        (Value::Null, _) | (_, Value::Null) => false,
        _ => plain(a) == plain(b),
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub columns: Option<String>,
    pub filters: Vec<Filter>,
    pub order: Option<(String, bool)>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl Query {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn columns(mut self, columns: impl Into<String>) -> Self {
        self.columns = Some(columns.into());
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn eq(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(Filter::eq(column, value))
    }

    pub fn order_by(mut self, column: impl Into<String>, ascending: bool) -> Self {
        self.order = Some((column.into(), ascending));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Column names from the `select` list, `None` meaning every column.
    pub fn projection(&self) -> Option<Vec<String>> {
        let columns = self.columns.as_deref()?.trim();
        if columns.is_empty() || columns == "*" {
            return None;
        }
        Some(
            columns
                .split(',')
                .map(str::trim)
                .filter(|column| !column.is_empty())
                .map(str::to_owned)
                .collect(),
        )
    }
}

pub trait RowStore {
    fn select(&self, table: &str, query: &Query) -> Result<Vec<Row>>;

    /// Inserts `rows` and returns them as stored.
    fn insert(&self, table: &str, rows: &[Row]) -> Result<Vec<Row>>;

    /// Inserts without reading the rows back. Callers that may write but not
    /// read a table (anonymous error reports) need this form.
    fn insert_minimal(&self, table: &str, rows: &[Row]) -> Result<()> {
        self.insert(table, rows).map(drop)
    }

    /// Applies `patch` to every row matching `filters`; returns how many rows
    /// changed.
    fn update(&self, table: &str, filters: &[Filter], patch: &Row) -> Result<usize>;

    fn delete(&self, table: &str, filters: &[Filter]) -> Result<usize>;

    fn count(&self, table: &str) -> Result<u64>;

    fn find_one(&self, table: &str, column: &str, value: Value) -> Result<Option<Row>> {
        let rows = self.select(table, &Query::all().eq(column, value).limit(1))?;
        Ok(rows.into_iter().next())
    }

    /// Reads a whole table, `page_size` rows at a time, until a short page.
    fn select_all(&self, table: &str, page_size: usize) -> Result<Vec<Row>> {
        let page_size = page_size.max(1);
        let mut rows = Vec::new();
        loop {
            let query = Query::all()
                .order_by("id", true)
                .limit(page_size)
                .offset(rows.len());
            let page = self.select(table, &query)?;
            let fetched = page.len();
            rows.extend(page);
            if fetched < page_size {
                break;
            }
        }
        Ok(rows)
    }
}

/// Lets a single-connection store be shared between threads.
impl<S: RowStore> RowStore for Mutex<S> {
    fn select(&self, table: &str, query: &Query) -> Result<Vec<Row>> {
        self.lock().select(table, query)
    }

    fn insert(&self, table: &str, rows: &[Row]) -> Result<Vec<Row>> {
        self.lock().insert(table, rows)
    }

    fn insert_minimal(&self, table: &str, rows: &[Row]) -> Result<()> {
        self.lock().insert_minimal(table, rows)
    }

    fn update(&self, table: &str, filters: &[Filter], patch: &Row) -> Result<usize> {
        self.lock().update(table, filters, patch)
    }

    fn delete(&self, table: &str, filters: &[Filter]) -> Result<usize> {
        self.lock().delete(table, filters)
    }

    fn count(&self, table: &str) -> Result<u64> {
        self.lock().count(table)
    }
}
