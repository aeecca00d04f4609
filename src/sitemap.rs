//! `sitemap.xml` for the public site: fixed section pages plus one watch page
//! per active movie and series.

use std::fmt::Write as _;

use anyhow::Result;
use chrono::NaiveDate;
use serde_json::Value;
use tracing::{info, warn};

use crate::catalog::{MediaKind, Table};
use crate::store::{Filter, Query, Row, RowStore, plain};

pub const SITE_URL: &str = "https://cinma.online";
pub const DEFAULT_OUTPUT: &str = "public/sitemap.xml";

const SECTIONS: [&str; 11] = [
    "", "/movies", "/series", "/anime", "/games", "/software", "/quran", "/kids", "/search",
    "/dmca", "/privacy",
];
const PAGE_SIZE: usize = 1000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SitemapEntry {
    pub loc: String,
    pub lastmod: String,
    pub changefreq: &'static str,
    pub priority: &'static str,
}

/// Section pages, refreshed daily; the home page ranks highest.
pub fn section_entries(base_url: &str, today: NaiveDate) -> Vec<SitemapEntry> {
    let lastmod = today.format("%Y-%m-%d").to_string();
    SECTIONS
        .iter()
        .map(|path| SitemapEntry {
            loc: format!("{base_url}{path}"),
            lastmod: lastmod.clone(),
            changefreq: "daily",
            priority: if path.is_empty() { "1.0" } else { "0.8" },
        })
        .collect()
}

/// The date part of the row's creation (or last update) stamp.
fn row_date(row: &Row, today: NaiveDate) -> String {
    ["created_at", "updated_at"]
        .iter()
        .filter_map(|column| row.get(*column).and_then(Value::as_str))
        .find_map(|stamp| stamp.get(..10))
        .map(str::to_owned)
        .unwrap_or_else(|| today.format("%Y-%m-%d").to_string())
}

pub fn watch_entries(
    base_url: &str,
    kind: MediaKind,
    rows: &[Row],
    today: NaiveDate,
) -> Vec<SitemapEntry> {
    rows.iter()
        .filter_map(|row| {
            let id = row.get("id").filter(|id| !id.is_null()).map(plain)?;
            Some(SitemapEntry {
                loc: format!("{base_url}/watch/{}/{id}", kind.tmdb_path()),
                lastmod: row_date(row, today),
                changefreq: "weekly",
                priority: "0.9",
            })
        })
        .collect()
}

fn active_rows<S: RowStore + ?Sized>(store: &S, table: Table) -> Result<Vec<Row>> {
    let mut rows = Vec::new();
    loop {
        let query = Query::all()
            .filter(Filter::eq("is_active", true))
            .order_by("id", true)
            .limit(PAGE_SIZE)
            .offset(rows.len());
        let page = store.select(table.name(), &query)?;
        let fetched = page.len();
        rows.extend(page);
        if fetched < PAGE_SIZE {
            return Ok(rows);
        }
    }
}

/// Every entry for the site. A table that cannot be read is logged and left
/// out, so the section pages are always present.
pub fn collect_entries<S: RowStore + ?Sized>(
    store: &S,
    base_url: &str,
    today: NaiveDate,
) -> Vec<SitemapEntry> {
    let mut entries = section_entries(base_url, today);
    for kind in [MediaKind::Movie, MediaKind::Tv] {
        let table = kind.table();
        match active_rows(store, table) {
            Ok(rows) => {
                info!("{} active rows in {table}", rows.len());
                entries.extend(watch_entries(base_url, kind, &rows, today));
            }
            Err(err) => warn!("skipping {table} in sitemap: {err:#}"),
        }
    }
    entries
}

fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

pub fn render(entries: &[SitemapEntry]) -> String {
    let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    xml.push_str("<urlset xmlns=\"http://www.sitemaps.org/schemas/sitemap/0.9\">\n");
    for entry in entries {
        let _ = write!(
            xml,
            "  <url>\n    <loc>{}</loc>\n    <lastmod>{}</lastmod>\n    \
             <changefreq>{}</changefreq>\n    <priority>{}</priority>\n  </url>\n",
            escape(&entry.loc),
            entry.lastmod,
            entry.changefreq,
            entry.priority
        );
    }
    xml.push_str("</urlset>");
    xml
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::store::SqliteStore;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 1).unwrap()
    }

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn sections_rank_home_first() {
        let entries = section_entries(SITE_URL, today());
        assert_eq!(entries.len(), 11);
        assert_eq!(entries[0].loc, "https://cinma.online");
        assert_eq!(entries[0].priority, "1.0");
        assert_eq!(entries[1].loc, "https://cinma.online/movies");
        assert_eq!(entries[1].priority, "0.8");
        assert!(entries.iter().all(|e| e.lastmod == "2026-03-01" && e.changefreq == "daily"));
    }

    #[test]
    fn only_active_titles_get_watch_pages() -> Result<()> {
        let store = SqliteStore::open_in_memory()?;
        store.insert(
            "movies",
            &[
                row(json!({"id": 550, "is_active": true, "created_at": "2025-11-02T10:00:00Z"})),
                row(json!({"id": 551, "is_active": false})),
            ],
        )?;
        let series = json!({
            "id": 1399,
            "is_active": true,
            "updated_at": "2026-01-15T08:30:00.000Z"
        });
        store.insert("tv_series", &[row(series)])?;

        let entries = collect_entries(&store, SITE_URL, today());
        let watch: Vec<(&str, &str)> = entries[11..]
            .iter()
            .map(|e| (e.loc.as_str(), e.lastmod.as_str()))
            .collect();
        assert_eq!(
            watch,
            vec![
                ("https://cinma.online/watch/movie/550", "2025-11-02"),
                ("https://cinma.online/watch/tv/1399", "2026-01-15"),
            ]
        );
        assert_eq!(entries[11].priority, "0.9");
        assert_eq!(entries[11].changefreq, "weekly");
        Ok(())
    }

    #[test]
    fn xml_is_escaped() {
        let entries = vec![SitemapEntry {
            loc: "https://cinma.online/search?q=a&b".to_string(),
            lastmod: "2026-03-01".to_string(),
            changefreq: "daily",
            priority: "0.8",
        }];
        let xml = render(&entries);
        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<urlset"));
        assert!(xml.contains("<loc>https://cinma.online/search?q=a&amp;b</loc>"));
        assert!(xml.contains("<priority>0.8</priority>"));
        assert!(xml.ends_with("</urlset>"));
    }
}
