//! Catalog feeds outside TMDB: anime, Quran reciters, games and software.
//!
//! Each feed builds complete rows for one table. [`refresh`] upserts them by
//! `id` the same way the content engine does: look the row up, update or
//! insert, log and count failures, keep going.

pub mod games;
pub mod jikan;
pub mod mp3quran;
pub mod software;

use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

use anyhow::{Result, anyhow};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::catalog::Table;
use crate::dedup::{DUPLICATE_THRESHOLD, find_duplicate};
use crate::engine::IngestReport;
use crate::store::{Filter, Query, Row, RowStore, plain};

pub use games::GamesClient;
pub use jikan::JikanClient;
pub use mp3quran::Mp3QuranClient;
pub use software::SoftwareCatalog;

pub(crate) const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);
const TITLE_PAGE_SIZE: usize = 1000;

/// A feed of ready-to-write rows for one catalog table.
pub trait RowSource {
    fn table(&self) -> Table;

    fn fetch_rows(&self) -> Result<Vec<Row>>;

    /// Column compared against existing rows to skip near-duplicate titles.
    fn title_column(&self) -> Option<&'static str> {
        Some("title")
    }

    /// Older schemas name some columns differently; a write rejected for
    /// mentioning the first column is retried under the second name.
    fn renamed_column(&self) -> Option<(&'static str, &'static str)> {
        None
    }
}

/// Which feed a refresh run targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Catalog {
    Anime,
    Quran,
    Games,
    Software,
}

impl Catalog {
    pub const ALL: [Catalog; 4] = [
        Catalog::Anime,
        Catalog::Quran,
        Catalog::Games,
        Catalog::Software,
    ];

    pub fn table(self) -> Table {
        match self {
            Catalog::Anime => Table::Anime,
            Catalog::Quran => Table::QuranReciters,
            Catalog::Games => Table::Games,
            Catalog::Software => Table::Software,
        }
    }
}

impl fmt::Display for Catalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Catalog::Anime => "anime",
            Catalog::Quran => "quran",
            Catalog::Games => "games",
            Catalog::Software => "software",
        })
    }
}

/// One-line summary used by the binaries and the admin refresh route.
pub fn summarize(table: Table, report: &IngestReport) -> String {
    format!(
        "{table}: {} inserted, {} updated, {} skipped, {} failed",
        report.inserted, report.updated, report.skipped, report.failed
    )
}

/// Fetches `source` and upserts every row into its table.
pub fn refresh<S, D>(source: &S, store: &D) -> Result<IngestReport>
where
    S: RowSource + ?Sized,
    D: RowStore + ?Sized,
{
    let table = source.table();
    let rows = source.fetch_rows()?;
    info!("fetched {} rows for {table}", rows.len());

    let mut known = match source.title_column() {
        Some(column) => known_titles(store, table, column)?,
        None => Vec::new(),
    };
    let mut report = IngestReport::default();
    for row in rows {
        let Some(id) = row.get("id").filter(|id| !id.is_null()).cloned() else {
            warn!("skipping {table} row without id");
            report.failed += 1;
            continue;
        };
        let exists = match store.find_one(table.name(), "id", id.clone()) {
            Ok(found) => found.is_some(),
            Err(err) => {
                error!("looking up {table} {}: {err:#}", plain(&id));
                report.failed += 1;
                continue;
            }
        };

        let title = source
            .title_column()
            .and_then(|column| row.get(column))
            .and_then(Value::as_str)
            .map(str::to_owned);
        if !exists {
            if let Some(title) = &title {
                let existing = known.iter().map(|(_, known)| known.as_str());
                if let Some(found) = find_duplicate(title, existing, DUPLICATE_THRESHOLD) {
                    info!(
                        "skipping {table} {title:?}: matches {:?} ({})",
                        found.title, found.score
                    );
                    report.skipped += 1;
                    continue;
                }
            }
        }

        match write_row(source, store, &id, exists, row) {
            Ok(()) if exists => report.updated += 1,
            Ok(()) => {
                report.inserted += 1;
                if let Some(title) = title {
                    known.push((plain(&id), title));
                }
            }
            Err(err) => {
                error!("writing {table} {}: {err:#}", plain(&id));
                report.failed += 1;
            }
        }
    }
    info!("{}", summarize(table, &report));
    Ok(report)
}

fn known_titles<D: RowStore + ?Sized>(
    store: &D,
    table: Table,
    column: &str,
) -> Result<Vec<(String, String)>> {
    let mut titles = Vec::new();
    let mut seen = HashSet::new();
    let mut offset = 0;
    loop {
        let query = Query::all()
            .columns(format!("id,{column}"))
            .order_by("id", true)
            .limit(TITLE_PAGE_SIZE)
            .offset(offset);
        let page = store.select(table.name(), &query)?;
        let fetched = page.len();
        offset += fetched;
        for row in page {
            let id = row.get("id").map(plain).unwrap_or_default();
            let title = row.get(column).and_then(Value::as_str).map(str::to_owned);
            if seen.insert(id.clone()) {
                if let Some(title) = title {
                    titles.push((id, title));
                }
            }
        }
        if fetched < TITLE_PAGE_SIZE {
            break;
        }
    }
    Ok(titles)
}

fn write_row<S, D>(source: &S, store: &D, id: &Value, exists: bool, row: Row) -> Result<()>
where
    S: RowSource + ?Sized,
    D: RowStore + ?Sized,
{
    let table = source.table().name();
    let attempt = |row: &Row| -> Result<()> {
        if exists {
            store.update(table, &[Filter::eq("id", id.clone())], row)?;
        } else {
            store.insert_minimal(table, std::slice::from_ref(row))?;
        }
        Ok(())
    };
    match attempt(&row) {
        Ok(()) => Ok(()),
        Err(err) => match source.renamed_column() {
            Some((from, to)) if row.contains_key(from) && format!("{err:#}").contains(from) => {
                warn!("{table} rejected column {from}; retrying as {to}");
                let mut renamed = row;
                if let Some(value) = renamed.remove(from) {
                    renamed.insert(to.to_string(), value);
                }
                attempt(&renamed)
            }
            _ => Err(err),
        },
    }
}

/// GET `url` with `params` and decode JSON, naming the service in errors.
pub(crate) fn get_json<T: DeserializeOwned>(
    agent: &ureq::Agent,
    service: &str,
    url: &str,
    params: &[(&str, &str)],
) -> Result<T> {
    let mut request = agent.get(url);
    for (key, value) in params {
        request = request.query(key, value);
    }
    let response = match request.call() {
        Ok(response) => response,
        Err(ureq::Error::Status(status, response)) => {
            let body = response.into_string().unwrap_or_default();
            return Err(anyhow!("{service} {url} returned {status}: {}", body.trim()));
        }
        Err(err) => return Err(anyhow!("{service} {url} failed: {err}")),
    };
    response
        .into_json::<T>()
        .map_err(|err| anyhow!("decoding {service} response from {url}: {err}"))
}

pub(crate) fn agent() -> ureq::Agent {
    ureq::AgentBuilder::new().timeout(REQUEST_TIMEOUT).build()
}

#[cfg(test)]
mod tests {
    use anyhow::bail;
    use serde_json::json;

    use super::*;
    use crate::store::SqliteStore;

    struct Fixed {
        table: Table,
        rows: Vec<Value>,
        renamed: Option<(&'static str, &'static str)>,
    }

    impl RowSource for Fixed {
        fn table(&self) -> Table {
            self.table
        }

        fn fetch_rows(&self) -> Result<Vec<Row>> {
            Ok(self
                .rows
                .iter()
                .filter_map(|row| row.as_object().cloned())
                .collect())
        }

        fn renamed_column(&self) -> Option<(&'static str, &'static str)> {
            self.renamed
        }
    }

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn rows_are_upserted_by_id() -> Result<()> {
        let store = SqliteStore::open_in_memory()?;
        store.insert("games", &[row(json!({"id": 1, "title": "Hades", "rating": 8.0}))])?;
        let source = Fixed {
            table: Table::Games,
            rows: vec![
                json!({"id": 1, "title": "Hades", "rating": 9.4}),
                json!({"id": 2, "title": "Celeste"}),
                json!({"title": "no id"}),
            ],
            renamed: None,
        };

        let report = refresh(&source, &store)?;
        assert_eq!(report.inserted, 1);
        assert_eq!(report.updated, 1);
        assert_eq!(report.failed, 1);
        let hades = store.find_one("games", "id", json!(1))?.unwrap();
        assert_eq!(hades["rating"], 9.4);
        assert_eq!(store.count("games")?, 2);
        Ok(())
    }

    #[test]
    fn near_duplicate_titles_are_skipped() -> Result<()> {
        let store = SqliteStore::open_in_memory()?;
        store.insert("software", &[row(json!({"id": 10, "title": "The VLC Player"}))])?;
        let source = Fixed {
            table: Table::Software,
            rows: vec![
                json!({"id": 11, "title": "VLC Player!"}),
                json!({"id": 12, "title": "GIMP"}),
                json!({"id": 13, "title": "gimp"}),
            ],
            renamed: None,
        };

        let report = refresh(&source, &store)?;
        assert_eq!(report.inserted, 1);
        assert_eq!(report.skipped, 2);
        assert_eq!(store.count("software")?, 2);
        Ok(())
    }

    struct NoYear(SqliteStore);

    impl RowStore for NoYear {
        fn select(&self, table: &str, query: &Query) -> Result<Vec<Row>> {
            self.0.select(table, query)
        }
        fn insert(&self, table: &str, rows: &[Row]) -> Result<Vec<Row>> {
            if rows.iter().any(|row| row.contains_key("year")) {
                bail!("Could not find the 'year' column of '{table}' in the schema cache");
            }
            self.0.insert(table, rows)
        }
        fn update(&self, table: &str, filters: &[Filter], patch: &Row) -> Result<usize> {
            self.0.update(table, filters, patch)
        }
        fn delete(&self, table: &str, filters: &[Filter]) -> Result<usize> {
            self.0.delete(table, filters)
        }
        fn count(&self, table: &str) -> Result<u64> {
            self.0.count(table)
        }
    }

    #[test]
    fn rejected_column_is_retried_under_its_old_name() -> Result<()> {
        let store = NoYear(SqliteStore::open_in_memory()?);
        let source = Fixed {
            table: Table::Games,
            rows: vec![json!({"id": 5, "title": "Tetris", "year": 1984})],
            renamed: Some(("year", "release_year")),
        };
        let report = refresh(&source, &store)?;
        assert_eq!(report.inserted, 1);
        let stored = store.find_one("games", "id", json!(5))?.unwrap();
        assert_eq!(stored["release_year"], 1984);
        assert!(!stored.contains_key("year"));

        let strict = Fixed { renamed: None, ..source };
        let report = refresh(&strict, &NoYear(SqliteStore::open_in_memory()?))?;
        assert_eq!(report.failed, 1);
        Ok(())
    }

    #[test]
    fn catalogs_map_to_tables() {
        assert_eq!(Catalog::Quran.table(), Table::QuranReciters);
        assert_eq!(Catalog::Anime.to_string(), "anime");
        assert_eq!(
            summarize(Table::Anime, &IngestReport { inserted: 2, ..Default::default() }),
            "anime: 2 inserted, 0 updated, 0 skipped, 0 failed"
        );
    }
}
