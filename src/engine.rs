//! Content ingestion: TMDB feeds → `movies` / `tv_series`.
//!
//! The run is strictly sequential. For each item of each feed page we look the
//! row up by its TMDB id, fetch the detail payload, merge it over the list
//! payload and then update or insert. A failing item is logged and counted and
//! the run moves on; nothing is retried.

use std::ops::RangeInclusive;

use anyhow::{Result, anyhow};
use serde_json::Value;
use tracing::{error, info, warn};

use crate::catalog::{MediaKind, MovieRow, SeriesRow, now_timestamp, slugify, to_row};
use crate::store::{Filter, RowStore};
use crate::tmdb::{CatalogSource, Feed, TmdbMovie, TmdbShow};

pub const DEFAULT_RAMADAN_YEARS: RangeInclusive<i32> = 2023..=2026;
pub const PLAY_QUERIES: [&str; 2] = ["مسرحية", "play"];

#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Pages fetched per feed, at least one.
    pub max_pages: u32,
    pub ramadan_years: RangeInclusive<i32>,
    /// Build rows without writing them.
    pub dry_run: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            max_pages: 1,
            ramadan_years: DEFAULT_RAMADAN_YEARS,
            dry_run: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub inserted: usize,
    pub updated: usize,
    pub failed: usize,
    /// Rows built but not written: dry runs and near-duplicate titles.
    pub skipped: usize,
}

impl IngestReport {
    pub fn processed(&self) -> usize {
        self.inserted + self.updated + self.failed + self.skipped
    }

    fn absorb(&mut self, other: IngestReport) {
        self.inserted += other.inserted;
        self.updated += other.updated;
        self.failed += other.failed;
        self.skipped += other.skipped;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Inserted,
    Updated,
    Skipped,
}

/// The feeds one run walks, in order.
pub fn default_plan(ramadan_years: RangeInclusive<i32>) -> Vec<Feed> {
    let mut plan = vec![
        Feed::new("trending movies", MediaKind::Movie, "/trending/movie/week"),
        Feed::new("now playing", MediaKind::Movie, "/movie/now_playing"),
        Feed::new("trending series", MediaKind::Tv, "/trending/tv/week"),
        Feed::new("arabic movies", MediaKind::Movie, "/discover/movie")
            .param("with_original_language", "ar")
            .param("sort_by", "popularity.desc"),
        Feed::new("arabic series", MediaKind::Tv, "/discover/tv")
            .param("with_original_language", "ar")
            .param("sort_by", "popularity.desc"),
    ];
    for year in ramadan_years {
        plan.push(
            Feed::new(format!("ramadan {year}"), MediaKind::Tv, "/discover/tv")
                .param("with_original_language", "ar")
                .param("first_air_date.gte", format!("{year}-01-01"))
                .param("first_air_date.lte", format!("{year}-12-31"))
                .param("sort_by", "popularity.desc"),
        );
    }
    for query in PLAY_QUERIES {
        plan.push(
            Feed::new(format!("plays: {query}"), MediaKind::Movie, "/search/movie")
                .param("query", query),
        );
    }
    plan
}

pub struct ContentEngine<'a, S, D> {
    source: &'a S,
    store: &'a D,
    options: EngineOptions,
}

impl<'a, S, D> ContentEngine<'a, S, D>
where
    S: CatalogSource,
    D: RowStore,
{
    pub fn new(source: &'a S, store: &'a D, options: EngineOptions) -> Self {
        Self {
            source,
            store,
            options,
        }
    }

    pub fn run(&self) -> IngestReport {
        let plan = default_plan(self.options.ramadan_years.clone());
        self.run_plan(&plan)
    }

    pub fn run_plan(&self, plan: &[Feed]) -> IngestReport {
        info!(feeds = plan.len(), "starting content engine");
        let mut total = IngestReport::default();
        for feed in plan {
            info!(feed = %feed.label, "fetching feed");
            let report = self.run_feed(feed);
            info!(
                feed = %feed.label,
                inserted = report.inserted,
                updated = report.updated,
                failed = report.failed,
                "feed done"
            );
            total.absorb(report);
        }
        info!(
            inserted = total.inserted,
            updated = total.updated,
            failed = total.failed,
            "cycle complete"
        );
        total
    }

    pub fn run_feed(&self, feed: &Feed) -> IngestReport {
        let mut report = IngestReport::default();
        let max_pages = self.options.max_pages.max(1);
        for page in 1..=max_pages {
            let total_pages = match feed.kind {
                MediaKind::Movie => match self.source.movie_page(feed, page) {
                    Ok(list) => {
                        report.absorb(self.process_movies(&list.results));
                        list.total_pages
                    }
                    Err(err) => {
                        error!(feed = %feed.label, page, "fetching feed failed: {err:#}");
                        break;
                    }
                },
                MediaKind::Tv => match self.source.show_page(feed, page) {
                    Ok(list) => {
                        report.absorb(self.process_series(&list.results));
                        list.total_pages
                    }
                    Err(err) => {
                        error!(feed = %feed.label, page, "fetching feed failed: {err:#}");
                        break;
                    }
                },
            };
            if page >= total_pages {
                break;
            }
        }
        report
    }

    pub fn process_movies(&self, movies: &[TmdbMovie]) -> IngestReport {
        let mut report = IngestReport::default();
        for movie in movies {
            let title = movie.title.clone().unwrap_or_default();
            info!("processing movie: {title} ({})", movie.id);
            match self.upsert_movie(movie) {
                Ok(outcome) => {
                    report.record(outcome);
                    info!(" -> upsert successful for {title}");
                }
                Err(err) => {
                    report.failed += 1;
                    error!("error processing movie {title}: {err:#}");
                }
            }
        }
        report
    }

    pub fn process_series(&self, shows: &[TmdbShow]) -> IngestReport {
        let mut report = IngestReport::default();
        for show in shows {
            let name = show.name.clone().unwrap_or_default();
            info!("processing series: {name} ({})", show.id);
            match self.upsert_series(show) {
                Ok(outcome) => {
                    report.record(outcome);
                    info!(" -> upsert successful for {name}");
                }
                Err(err) => {
                    report.failed += 1;
                    error!("error processing series {name}: {err:#}");
                }
            }
        }
        report
    }

    fn upsert_movie(&self, listed: &TmdbMovie) -> Result<Outcome> {
        let table = MediaKind::Movie.table().name();
        let existing = self.store.find_one(table, "id", Value::from(listed.id))?;
        let details = self.source.movie_details(listed.id).unwrap_or_else(|err| {
            warn!("details for movie {} unavailable, using list payload: {err:#}", listed.id);
            listed.clone()
        });
        let row = to_row(&merge_movie(listed, &details, now_timestamp())?)?;
        self.write(table, listed.id, existing.is_some(), row)
    }

    fn upsert_series(&self, listed: &TmdbShow) -> Result<Outcome> {
        let table = MediaKind::Tv.table().name();
        let existing = self.store.find_one(table, "id", Value::from(listed.id))?;
        let details = self.source.show_details(listed.id).unwrap_or_else(|err| {
            warn!("details for series {} unavailable, using list payload: {err:#}", listed.id);
            listed.clone()
        });
        let row = to_row(&merge_series(listed, &details, now_timestamp())?)?;
        self.write(table, listed.id, existing.is_some(), row)
    }

    fn write(&self, table: &str, id: u64, exists: bool, row: crate::store::Row) -> Result<Outcome> {
        if self.options.dry_run {
            return Ok(Outcome::Skipped);
        }
        if exists {
            self.store.update(table, &[Filter::eq("id", id)], &row)?;
            Ok(Outcome::Updated)
        } else {
            self.store.insert(table, &[row])?;
            Ok(Outcome::Inserted)
        }
    }
}

impl IngestReport {
    fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Inserted => self.inserted += 1,
            Outcome::Updated => self.updated += 1,
            Outcome::Skipped => self.skipped += 1,
        }
    }
}

/// Values that count as "present" when the detail payload is merged over the
/// list payload. Empty strings and zero scores fall back to the list value.
trait Present {
    fn is_present(&self) -> bool;
}

impl Present for String {
    fn is_present(&self) -> bool {
        !self.is_empty()
    }
}

impl Present for f64 {
    fn is_present(&self) -> bool {
        *self != 0.0
    }
}

impl<T> Present for Vec<T> {
    fn is_present(&self) -> bool {
        true
    }
}

/// The detail value wins when present, otherwise the list value.
fn prefer<T: Present + Clone>(details: &Option<T>, listed: &Option<T>) -> Option<T> {
    details
        .as_ref()
        .filter(|value| value.is_present())
        .or(listed.as_ref())
        .cloned()
}

/// Title of a listed item; items without one cannot be slugged and fail.
fn required_title(title: &Option<String>, kind: &str, id: u64) -> Result<String> {
    title
        .as_deref()
        .map(str::trim)
        .filter(|title| !title.is_empty())
        .map(str::to_owned)
        .ok_or_else(|| anyhow!("{kind} {id} has no title"))
}

pub fn merge_movie(
    listed: &TmdbMovie,
    details: &TmdbMovie,
    updated_at: String,
) -> Result<MovieRow> {
    let title = required_title(&listed.title, "movie", listed.id)?;
    let production_codes = details.production_countries.as_ref().map(|countries| {
        countries
            .iter()
            .map(|country| country.iso_3166_1.clone())
            .collect::<Vec<_>>()
    });
    let origin_country = details
        .origin_country
        .clone()
        .or(production_codes)
        .or_else(|| listed.origin_country.clone())
        .unwrap_or_default();

    Ok(MovieRow {
        id: listed.id,
        slug: slugify(&title, listed.id),
        arabic_title: title.clone(),
        title,
        overview: prefer(&details.overview, &listed.overview),
        poster_path: prefer(&details.poster_path, &listed.poster_path),
        backdrop_path: prefer(&details.backdrop_path, &listed.backdrop_path),
        release_date: prefer(&details.release_date, &listed.release_date),
        vote_average: prefer(&details.vote_average, &listed.vote_average),
        original_language: prefer(&details.original_language, &listed.original_language),
        origin_country,
        is_active: true,
        source: "tmdb".to_string(),
        updated_at,
    })
}

pub fn merge_series(
    listed: &TmdbShow,
    details: &TmdbShow,
    updated_at: String,
) -> Result<SeriesRow> {
    let name = required_title(&listed.name, "series", listed.id)?;
    Ok(SeriesRow {
        id: listed.id,
        slug: slugify(&name, listed.id),
        arabic_title: name.clone(),
        name,
        overview: prefer(&details.overview, &listed.overview),
        poster_path: prefer(&details.poster_path, &listed.poster_path),
        backdrop_path: prefer(&details.backdrop_path, &listed.backdrop_path),
        first_air_date: prefer(&details.first_air_date, &listed.first_air_date),
        vote_average: prefer(&details.vote_average, &listed.vote_average),
        popularity: prefer(&details.popularity, &listed.popularity),
        original_language: prefer(&details.original_language, &listed.original_language),
        is_active: true,
        source: "tmdb".to_string(),
        updated_at,
    })
}
