//! Tables of the hosted catalog and the rows the ingestion pipeline writes.
//!
//! `movies` and `tv_series` use the TMDB id as their primary key, so an
//! existence check is a lookup on `id`.

use std::fmt;
use std::str::FromStr;

use anyhow::{Result, bail};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::store::Row;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Movie,
    Tv,
}

impl MediaKind {
    /// Path segment TMDB uses for this kind.
    pub fn tmdb_path(self) -> &'static str {
        match self {
            MediaKind::Movie => "movie",
            MediaKind::Tv => "tv",
        }
    }

    pub fn table(self) -> Table {
        match self {
            MediaKind::Movie => Table::Movies,
            MediaKind::Tv => Table::TvSeries,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Movies,
    TvSeries,
    Seasons,
    Episodes,
    Anime,
    QuranReciters,
    Games,
    Software,
    Profiles,
    Ads,
    ErrorLogs,
}

impl Table {
    pub const ALL: [Table; 11] = [
        Table::Movies,
        Table::TvSeries,
        Table::Seasons,
        Table::Episodes,
        Table::Anime,
        Table::QuranReciters,
        Table::Games,
        Table::Software,
        Table::Profiles,
        Table::Ads,
        Table::ErrorLogs,
    ];

    /// Tables the public catalog API may list.
    pub const BROWSABLE: [Table; 6] = [
        Table::Movies,
        Table::TvSeries,
        Table::Anime,
        Table::QuranReciters,
        Table::Games,
        Table::Software,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Table::Movies => "movies",
            Table::TvSeries => "tv_series",
            Table::Seasons => "seasons",
            Table::Episodes => "episodes",
            Table::Anime => "anime",
            Table::QuranReciters => "quran_reciters",
            Table::Games => "games",
            Table::Software => "software",
            Table::Profiles => "profiles",
            Table::Ads => "ads",
            Table::ErrorLogs => "error_logs",
        }
    }

    pub fn is_browsable(self) -> bool {
        Table::BROWSABLE.contains(&self)
    }

    /// The TMDB kind behind rows of this table, if any.
    pub fn media_kind(self) -> Option<MediaKind> {
        match self {
            Table::Movies => Some(MediaKind::Movie),
            Table::TvSeries => Some(MediaKind::Tv),
            _ => None,
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Table {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match Table::ALL.iter().find(|table| table.name() == value) {
            Some(table) => Ok(*table),
            None => bail!("unknown table: {value}"),
        }
    }
}

/// `"The Sand  Storm"` + 42 → `"the-sand-storm-42"`. Whitespace runs collapse
/// to one dash; everything else, Arabic letters included, is kept.
pub fn slugify(title: &str, id: u64) -> String {
    let mut slug = String::with_capacity(title.len() + 8);
    let mut in_space = false;
    for ch in title.chars() {
        if ch.is_whitespace() {
            if !in_space {
                slug.push('-');
                in_space = true;
            }
            continue;
        }
        in_space = false;
        slug.extend(ch.to_lowercase());
    }
    format!("{slug}-{id}")
}

pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Row written to `movies`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovieRow {
    pub id: u64,
    pub title: String,
    pub overview: Option<String>,
    pub poster_path: Option<String>,
    pub backdrop_path: Option<String>,
    pub release_date: Option<String>,
    pub vote_average: Option<f64>,
    pub original_language: Option<String>,
    pub origin_country: Vec<String>,
    pub is_active: bool,
    pub source: String,
    pub slug: String,
    pub arabic_title: String,
    pub updated_at: String,
}

/// Row written to `tv_series`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesRow {
    pub id: u64,
    pub name: String,
    pub overview: Option<String>,
    pub poster_path: Option<String>,
    pub backdrop_path: Option<String>,
    pub first_air_date: Option<String>,
    pub vote_average: Option<f64>,
    pub popularity: Option<f64>,
    pub original_language: Option<String>,
    pub is_active: bool,
    pub source: String,
    pub slug: String,
    pub arabic_title: String,
    pub updated_at: String,
}

/// Row written to `anime`, keyed by the MyAnimeList id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnimeRow {
    pub id: u64,
    pub mal_id: u64,
    pub title: String,
    pub title_english: Option<String>,
    pub title_japanese: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub episodes: Option<u32>,
    pub status: Option<String>,
    pub score: Option<f64>,
    pub rank: Option<u64>,
    pub popularity: Option<u64>,
    pub synopsis: Option<String>,
    pub year: Option<i32>,
    pub season: Option<String>,
    pub category: String,
    pub image_url: Option<String>,
    pub trailer_url: Option<String>,
    pub source: String,
}

/// Row written to `quran_reciters`: one reciter and the recitation served.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReciterRow {
    pub id: u64,
    pub name: String,
    pub rewaya: String,
    pub letter: Option<String>,
    pub server: String,
    pub surah_list: String,
    pub category: String,
    pub is_active: bool,
    pub featured: bool,
}

/// Row shape shared by `games` and `software`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadRow {
    pub id: u64,
    pub title: String,
    pub poster_url: Option<String>,
    pub rating: f64,
    pub year: Option<i32>,
    pub description: String,
    pub download_url: String,
    pub category: String,
}

/// Serializes a typed row into the JSON object form the stores take.
pub fn to_row<T: Serialize>(value: &T) -> Result<Row> {
    match serde_json::to_value(value)? {
        serde_json::Value::Object(row) => Ok(row),
        other => bail!("expected a JSON object row, got {other}"),
    }
}
