//! Local SQLite mirror of the catalog tables.
//!
//! Every row is stored as its JSON body next to the table it belongs to, so
//! the mirror accepts whatever columns the hosted schema has. It exists for
//! offline ingestion runs (`content_engine --local-db`) and for tests; the
//! hosted database stays the source of truth.

use std::cmp::Ordering;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use rusqlite::{Connection, params};
use serde_json::Value;

use super::{Filter, Query, Row, RowStore, plain};

/// Ids compare as text so `"42"` and `42` collide, as they would in Postgres
/// after coercion. The expression matches `idx_mirror_rows_id`.
const DUPLICATE_ID_SQL: &str = r#"
    SELECT 1
    FROM mirror_rows
    WHERE table_name = ?1
      AND CAST(json_extract(body_json, '$.id') AS TEXT) = ?2
    LIMIT 1
"#;

#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Opens (and if necessary creates) the mirror. WAL mode keeps a reader
    /// from blocking an ingestion run.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating mirror directory {}", parent.display()))?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("opening mirror DB {}", path.display()))?;

        conn.pragma_update(None, "journal_mode", "WAL")
            .context("enabling WAL mode for mirror DB")?;
        conn.pragma_update(None, "synchronous", "NORMAL")
            .context("setting mirror DB synchronous mode")?;

        let mut store = Self { conn };
        store.ensure_tables()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("opening in-memory mirror")?;
        let mut store = Self { conn };
        store.ensure_tables()?;
        Ok(store)
    }

    fn ensure_tables(&mut self) -> Result<()> {
        let tx = self.conn.transaction()?;

        tx.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS mirror_rows (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                table_name TEXT NOT NULL,
                body_json TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_mirror_rows_id
                ON mirror_rows(table_name, CAST(json_extract(body_json, '$.id') AS TEXT));
            "#,
        )?;

        tx.commit()?;
        Ok(())
    }

    /// Loads every row of `table` together with its sequence number.
    fn load(&self, table: &str) -> Result<Vec<(i64, Row)>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT seq, body_json
            FROM mirror_rows
            WHERE table_name = ?1
            ORDER BY seq ASC
            "#,
        )?;

        let mut rows = stmt.query([table])?;
        let mut loaded = Vec::new();
        while let Some(row) = rows.next()? {
            let seq: i64 = row.get(0)?;
            let body: String = row.get(1)?;
            let value: Value = serde_json::from_str(&body)
                .with_context(|| format!("parsing stored row {seq} of {table}"))?;
            let object = match value {
                Value::Object(object) => object,
                _ => return Err(anyhow!("stored row {seq} of {table} is not an object")),
            };
            loaded.push((seq, object));
        }
        Ok(loaded)
    }

    fn matching(&self, table: &str, filters: &[Filter]) -> Result<Vec<(i64, Row)>> {
        Ok(self
            .load(table)?
            .into_iter()
            .filter(|(_, row)| filters.iter().all(|filter| filter.matches(row)))
            .collect())
    }
}

impl RowStore for SqliteStore {
    fn select(&self, table: &str, query: &Query) -> Result<Vec<Row>> {
        let mut rows: Vec<Row> = self
            .matching(table, &query.filters)?
            .into_iter()
            .map(|(_, row)| row)
            .collect();

        if let Some((column, ascending)) = &query.order {
            rows.sort_by(|a, b| {
                let ordering = compare_values(a.get(column), b.get(column));
                if *ascending { ordering } else { ordering.reverse() }
            });
        }

        let offset = query.offset.unwrap_or(0);
        let limit = query.limit.unwrap_or(usize::MAX);
        let projection = query.projection();

        Ok(rows
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|row| match &projection {
                Some(columns) => columns
                    .iter()
                    .filter_map(|column| row.get(column).map(|v| (column.clone(), v.clone())))
                    .collect(),
                None => row,
            })
            .collect())
    }

    fn insert(&self, table: &str, rows: &[Row]) -> Result<Vec<Row>> {
        let tx = self.conn.unchecked_transaction()?;
        let mut stored = Vec::with_capacity(rows.len());
        let mut duplicate = tx.prepare_cached(DUPLICATE_ID_SQL)?;

        for row in rows {
            if let Some(id) = row.get("id").filter(|id| !id.is_null()) {
                if duplicate.exists(params![table, plain(id)])? {
                    return Err(anyhow!(
                        "duplicate key value violates unique constraint on {table}.id ({})",
                        plain(id)
                    ));
                }
            }

            let body = serde_json::to_string(row).context("serializing row")?;
            tx.execute(
                "INSERT INTO mirror_rows (table_name, body_json) VALUES (?1, ?2)",
                params![table, body],
            )?;
            let seq = tx.last_insert_rowid();

            let mut row = row.clone();
            if row.get("id").is_none_or(Value::is_null) {
                row.insert("id".to_string(), Value::from(seq));
                tx.execute(
                    "UPDATE mirror_rows SET body_json = ?1 WHERE seq = ?2",
                    params![serde_json::to_string(&row)?, seq],
                )?;
            }
            stored.push(row);
        }

        drop(duplicate);
        tx.commit()?;
        Ok(stored)
    }

    fn update(&self, table: &str, filters: &[Filter], patch: &Row) -> Result<usize> {
        let targets = self.matching(table, filters)?;
        let tx = self.conn.unchecked_transaction()?;
        for (seq, mut row) in targets.iter().cloned() {
            for (key, value) in patch {
                row.insert(key.clone(), value.clone());
            }
            tx.execute(
                "UPDATE mirror_rows SET body_json = ?1 WHERE seq = ?2",
                params![serde_json::to_string(&row)?, seq],
            )?;
        }
        tx.commit()?;
        Ok(targets.len())
    }

    fn delete(&self, table: &str, filters: &[Filter]) -> Result<usize> {
        let targets = self.matching(table, filters)?;
        let tx = self.conn.unchecked_transaction()?;
        for (seq, _) in &targets {
            tx.execute("DELETE FROM mirror_rows WHERE seq = ?1", params![seq])?;
        }
        tx.commit()?;
        Ok(targets.len())
    }

    fn count(&self, table: &str) -> Result<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM mirror_rows WHERE table_name = ?1",
            [table],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}

/// Orders JSON scalars the way Postgres would for the column types we store:
/// nulls last, numbers numerically, everything else as text.
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let a = a.filter(|v| !v.is_null());
    let b = b.filter(|v| !v.is_null());
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(a), Some(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
            _ => plain(a).cmp(&plain(b)),
        },
    }
}
