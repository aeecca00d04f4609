//! Rule-based tagging of stored rows.
//!
//! Two independent rules: a series is Ramadan content when it premiered
//! around the start of Ramadan and is Arabic or from the MENA region, or when
//! its name says so; a movie is a filmed stage play when its title says so.
//! Only positive tags are written.

use anyhow::Result;
use chrono::{Datelike, NaiveDate};
use serde_json::{Value, json};
use tracing::{error, info};

use crate::catalog::Table;
use crate::store::{DEFAULT_PAGE_SIZE, Filter, Query, Row, RowStore};

/// First day of Ramadan per Gregorian year, as `(year, month, day)`.
pub const RAMADAN_STARTS: [(i32, u32, u32); 17] = [
    (2010, 8, 11),
    (2011, 8, 1),
    (2012, 7, 20),
    (2013, 7, 9),
    (2014, 6, 29),
    (2015, 6, 18),
    (2016, 6, 6),
    (2017, 5, 27),
    (2018, 5, 16),
    (2019, 5, 6),
    (2020, 4, 24),
    (2021, 4, 13),
    (2022, 4, 2),
    (2023, 3, 23),
    (2024, 3, 11),
    (2025, 2, 28),
    (2026, 2, 17),
];

/// Days around the start of Ramadan that still count as a Ramadan premiere.
pub const WINDOW_BEFORE_DAYS: i64 = 5;
pub const WINDOW_AFTER_DAYS: i64 = 35;

pub const MENA_COUNTRIES: [&str; 18] = [
    "EG", "SA", "AE", "KW", "QA", "BH", "OM", "LB", "SY", "JO", "PS", "IQ", "YE", "LY", "TN",
    "DZ", "MA", "SD",
];

pub const RAMADAN_KEYWORDS: [&str; 2] = ["رمضان", "Ramadan"];
pub const PLAY_KEYWORDS: [&str; 2] = ["مسرحية", "Play"];

pub fn ramadan_start(year: i32) -> Option<NaiveDate> {
    RAMADAN_STARTS
        .iter()
        .find(|(y, _, _)| *y == year)
        .and_then(|(y, m, d)| NaiveDate::from_ymd_opt(*y, *m, *d))
}

/// Parses the leading `YYYY-MM-DD` of a date or timestamp string.
fn parse_date(value: &str) -> Option<NaiveDate> {
    let head = value.trim().get(..10)?;
    NaiveDate::parse_from_str(head, "%Y-%m-%d").ok()
}

pub fn in_ramadan_window(date: Option<&str>) -> bool {
    let Some(date) = date.and_then(parse_date) else {
        return false;
    };
    let Some(start) = ramadan_start(date.year()) else {
        return false;
    };
    let diff = (date - start).num_days();
    (-WINDOW_BEFORE_DAYS..=WINDOW_AFTER_DAYS).contains(&diff)
}

fn text<'a>(row: &'a Row, column: &str) -> Option<&'a str> {
    row.get(column).and_then(Value::as_str)
}

fn countries(row: &Row) -> Vec<&str> {
    match row.get("origin_country") {
        Some(Value::Array(values)) => values.iter().filter_map(Value::as_str).collect(),
        Some(Value::String(single)) => vec![single.as_str()],
        _ => Vec::new(),
    }
}

/// Date-window rule: premiered in the window and Arabic or MENA-made.
pub fn ramadan_by_date(row: &Row) -> bool {
    if !in_ramadan_window(text(row, "first_air_date")) {
        return false;
    }
    let arabic = text(row, "original_language") == Some("ar");
    let mena = countries(row)
        .iter()
        .any(|country| MENA_COUNTRIES.contains(country));
    arabic || mena
}

pub fn ramadan_by_keyword(row: &Row) -> bool {
    text(row, "name").is_some_and(|name| RAMADAN_KEYWORDS.iter().any(|k| name.contains(k)))
}

pub fn is_ramadan_series(row: &Row) -> bool {
    ramadan_by_date(row) || ramadan_by_keyword(row)
}

pub fn is_play(row: &Row) -> bool {
    text(row, "title").is_some_and(|title| PLAY_KEYWORDS.iter().any(|k| title.contains(k)))
}

fn already_tagged(row: &Row, column: &str) -> bool {
    row.get(column).and_then(Value::as_bool).unwrap_or(false)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TagReport {
    pub scanned_series: usize,
    pub tagged_series: usize,
    pub scanned_movies: usize,
    pub tagged_movies: usize,
    pub failed: usize,
}

pub struct ContentTagger<'a, D> {
    store: &'a D,
    page_size: usize,
}

impl<'a, D: RowStore> ContentTagger<'a, D> {
    pub fn new(store: &'a D) -> Self {
        Self {
            store,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn run(&self) -> TagReport {
        info!("starting content tagger");
        let mut report = TagReport::default();

        info!("scanning series for Ramadan content");
        let columns = "id, name, first_air_date, original_language, origin_country, is_ramadan";
        match self.scan(Table::TvSeries, columns) {
            Ok(series) => {
                report.scanned_series = series.len();
                for row in &series {
                    if !is_ramadan_series(row) || already_tagged(row, "is_ramadan") {
                        continue;
                    }
                    let label = text(row, "name").unwrap_or_default();
                    if ramadan_by_date(row) {
                        let aired = text(row, "first_air_date").unwrap_or_default();
                        info!("[RAMADAN DETECTED]: {label} ({aired})");
                    } else {
                        info!("[RAMADAN KEYWORD]: {label}");
                    }
                    match self.tag(Table::TvSeries, row, "is_ramadan") {
                        Ok(()) => report.tagged_series += 1,
                        Err(err) => {
                            report.failed += 1;
                            error!("failed to tag {label}: {err:#}");
                        }
                    }
                }
                info!("tagged {} series as Ramadan content", report.tagged_series);
            }
            Err(err) => error!("error fetching series: {err:#}"),
        }

        info!("scanning movies for plays");
        match self.scan(Table::Movies, "id, title, original_language, is_play") {
            Ok(movies) => {
                report.scanned_movies = movies.len();
                for row in &movies {
                    if !is_play(row) || already_tagged(row, "is_play") {
                        continue;
                    }
                    let label = text(row, "title").unwrap_or_default();
                    info!("[PLAY DETECTED]: {label}");
                    match self.tag(Table::Movies, row, "is_play") {
                        Ok(()) => report.tagged_movies += 1,
                        Err(err) => {
                            report.failed += 1;
                            error!("failed to tag {label}: {err:#}");
                        }
                    }
                }
                info!("tagged {} movies as plays", report.tagged_movies);
            }
            Err(err) => error!("error fetching movies: {err:#}"),
        }

        info!("content tagger finished");
        report
    }

    /// Pages through `table` with the given column list.
    fn scan(&self, table: Table, columns: &str) -> Result<Vec<Row>> {
        let mut rows = Vec::new();
        loop {
            let query = Query::all()
                .columns(columns)
                .order_by("id", true)
                .limit(self.page_size)
                .offset(rows.len());
            let page = self.store.select(table.name(), &query)?;
            let fetched = page.len();
            rows.extend(page);
            if fetched < self.page_size {
                break;
            }
        }
        Ok(rows)
    }

    fn tag(&self, table: Table, row: &Row, column: &str) -> Result<()> {
        let id = row
            .get("id")
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("row has no id"))?;
        let mut patch = Row::new();
        patch.insert(column.to_string(), json!(true));
        self.store.update(table.name(), &[Filter::Eq("id".to_string(), id)], &patch)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn window_spans_five_days_before_to_thirty_five_after() {
        assert!(in_ramadan_window(Some("2024-03-11")));
        assert!(in_ramadan_window(Some("2024-03-06")));
        assert!(!in_ramadan_window(Some("2024-03-05")));
        assert!(in_ramadan_window(Some("2024-04-15")));
        assert!(!in_ramadan_window(Some("2024-04-16")));
        assert!(in_ramadan_window(Some("2025-03-01T00:00:00Z")));
    }

    #[test]
    fn unknown_years_and_bad_dates_are_outside() {
        assert!(!in_ramadan_window(Some("2009-08-22")));
        assert!(!in_ramadan_window(Some("2031-01-01")));
        assert!(!in_ramadan_window(Some("not a date")));
        assert!(!in_ramadan_window(Some("")));
        assert!(!in_ramadan_window(None));
    }

    #[test]
    fn date_rule_needs_arabic_or_mena_origin() {
        let in_window = "2023-03-23";
        let arabic = row(json!({"first_air_date": in_window, "original_language": "ar"}));
        let gulf = row(json!({
            "first_air_date": in_window,
            "original_language": "en",
            "origin_country": ["KW"]
        }));
        let turkish = row(json!({
            "first_air_date": in_window,
            "original_language": "tr",
            "origin_country": ["TR"]
        }));
        let autumn = row(json!({"first_air_date": "2023-09-01", "original_language": "ar"}));
        assert!(ramadan_by_date(&arabic));
        assert!(ramadan_by_date(&gulf));
        assert!(!ramadan_by_date(&turkish));
        assert!(!ramadan_by_date(&autumn));
    }

    #[test]
    fn keyword_rule_is_independent_of_dates() {
        let riddles = row(json!({"name": "فوازير رمضان", "first_air_date": "1990-01-01"}));
        assert!(is_ramadan_series(&riddles));
        assert!(is_ramadan_series(&row(json!({"name": "Ramadan Nights"}))));
        assert!(!is_ramadan_series(&row(json!({"name": "ramadan lowercase"}))));
    }

    #[test]
    fn play_rule_matches_title_keywords() {
        assert!(is_play(&row(json!({"title": "مسرحية شاهد ماشفش حاجة"}))));
        assert!(is_play(&row(json!({"title": "The Play That Goes Wrong"}))));
        // plain substring match, so "Playground" counts too
        assert!(is_play(&row(json!({"title": "Playground"}))));
        assert!(!is_play(&row(json!({"title": "A quiet evening"}))));
        assert!(!is_play(&row(json!({"name": "مسرحية"}))));
    }

    #[test]
    fn tagger_writes_positive_tags_only() -> Result<()> {
        let store = SqliteStore::open_in_memory()?;
        store.insert(
            "tv_series",
            &[
                row(json!({
                    "id": 1,
                    "name": "الحشاشين",
                    "first_air_date": "2024-03-11",
                    "original_language": "ar"
                })),
                row(json!({
                    "id": 2,
                    "name": "Foreign",
                    "first_air_date": "2024-03-11",
                    "original_language": "ko"
                })),
                row(json!({"id": 3, "name": "Ramadan Special", "is_ramadan": true})),
            ],
        )?;
        store.insert(
            "movies",
            &[
                row(json!({"id": 10, "title": "مسرحية العيال كبرت"})),
                row(json!({"id": 11, "title": "Drama"})),
            ],
        )?;

        let report = ContentTagger::new(&store).with_page_size(2).run();
        assert_eq!(
            report,
            TagReport {
                scanned_series: 3,
                tagged_series: 1,
                scanned_movies: 2,
                tagged_movies: 1,
                failed: 0,
            }
        );

        let tagged = store.find_one("tv_series", "id", json!(1))?.unwrap();
        assert_eq!(tagged.get("is_ramadan"), Some(&json!(true)));
        let untouched = store.find_one("tv_series", "id", json!(2))?.unwrap();
        assert_eq!(untouched.get("is_ramadan"), None);
        let play = store.find_one("movies", "id", json!(10))?.unwrap();
        assert_eq!(play.get("is_play"), Some(&json!(true)));
        Ok(())
    }
}
