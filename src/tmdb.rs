//! TMDB (The Movie Database) REST client.
//!
//! Requests carry the API key and the display language as query parameters.
//! Arabic (`ar-SA`) is the default since every title shown on the site is
//! Arabic-first; `en-US` is used where the original title is needed.

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::catalog::MediaKind;

pub const TMDB_BASE_URL: &str = "https://api.themoviedb.org/3";
pub const DEFAULT_LANGUAGE: &str = "ar-SA";
pub const ENGLISH_LANGUAGE: &str = "en-US";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TmdbPage<T> {
    #[serde(default = "first_page")]
    pub page: u32,
    #[serde(default = "Vec::new")]
    pub results: Vec<T>,
    #[serde(default)]
    pub total_pages: u32,
    #[serde(default)]
    pub total_results: u32,
}

fn first_page() -> u32 {
    1
}

impl<T> TmdbPage<T> {
    pub fn single(results: Vec<T>) -> Self {
        let total_results = results.len() as u32;
        Self {
            page: 1,
            results,
            total_pages: 1,
            total_results,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductionCountry {
    pub iso_3166_1: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Genre {
    pub id: u32,
    pub name: String,
}

/// A movie as returned by list endpoints and by `/movie/{id}`; detail-only
/// fields stay `None` on list items.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TmdbMovie {
    pub id: u64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub original_title: Option<String>,
    #[serde(default)]
    pub overview: Option<String>,
    #[serde(default)]
    pub poster_path: Option<String>,
    #[serde(default)]
    pub backdrop_path: Option<String>,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub vote_average: Option<f64>,
    #[serde(default)]
    pub popularity: Option<f64>,
    #[serde(default)]
    pub original_language: Option<String>,
    #[serde(default)]
    pub origin_country: Option<Vec<String>>,
    #[serde(default)]
    pub production_countries: Option<Vec<ProductionCountry>>,
    #[serde(default)]
    pub genre_ids: Option<Vec<u32>>,
    #[serde(default)]
    pub genres: Option<Vec<Genre>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TmdbShow {
    pub id: u64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub original_name: Option<String>,
    #[serde(default)]
    pub overview: Option<String>,
    #[serde(default)]
    pub poster_path: Option<String>,
    #[serde(default)]
    pub backdrop_path: Option<String>,
    #[serde(default)]
    pub first_air_date: Option<String>,
    #[serde(default)]
    pub vote_average: Option<f64>,
    #[serde(default)]
    pub popularity: Option<f64>,
    #[serde(default)]
    pub original_language: Option<String>,
    #[serde(default)]
    pub origin_country: Option<Vec<String>>,
    #[serde(default)]
    pub genre_ids: Option<Vec<u32>>,
    #[serde(default)]
    pub genres: Option<Vec<Genre>>,
}

#[derive(Debug, Deserialize)]
struct GenreList {
    #[serde(default)]
    genres: Vec<Genre>,
}

#[derive(Debug, Deserialize)]
struct CountryResults<T> {
    #[serde(default = "Vec::new")]
    results: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct ReleaseDates {
    iso_3166_1: String,
    #[serde(default)]
    release_dates: Vec<ReleaseDate>,
}

#[derive(Debug, Deserialize)]
struct ReleaseDate {
    #[serde(default)]
    certification: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContentRating {
    iso_3166_1: String,
    #[serde(default)]
    rating: Option<String>,
}

/// Traffic-light rating shown on posters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RatingColor {
    Green,
    Yellow,
    Red,
}

/// Maps a US certification (`PG`, `TV-14`, ...) to its rating color. Unknown
/// or empty certifications are treated as adult content.
pub fn rating_color(certification: &str) -> RatingColor {
    match certification.trim().to_ascii_uppercase().as_str() {
        "G" | "PG" => RatingColor::Green,
        "PG-13" | "TV-14" => RatingColor::Yellow,
        _ => RatingColor::Red,
    }
}

/// One list endpoint the ingestion run walks, e.g. `/trending/movie/week`.
#[derive(Debug, Clone, PartialEq)]
pub struct Feed {
    pub label: String,
    pub kind: MediaKind,
    pub endpoint: String,
    pub params: Vec<(String, String)>,
}

impl Feed {
    pub fn new(label: impl Into<String>, kind: MediaKind, endpoint: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            kind,
            endpoint: endpoint.into(),
            params: Vec::new(),
        }
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }
}

/// What the ingestion pipeline needs from the metadata provider.
pub trait CatalogSource {
    fn movie_page(&self, feed: &Feed, page: u32) -> Result<TmdbPage<TmdbMovie>>;
    fn show_page(&self, feed: &Feed, page: u32) -> Result<TmdbPage<TmdbShow>>;
    fn movie_details(&self, id: u64) -> Result<TmdbMovie>;
    fn show_details(&self, id: u64) -> Result<TmdbShow>;
}

#[derive(Clone)]
pub struct TmdbClient {
    agent: ureq::Agent,
    base_url: String,
    api_key: String,
    language: String,
}

impl std::fmt::Debug for TmdbClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TmdbClient")
            .field("base_url", &self.base_url)
            .field("language", &self.language)
            .finish_non_exhaustive()
    }
}

impl TmdbClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(TMDB_BASE_URL, api_key)
    }

    pub fn with_base_url(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().timeout(REQUEST_TIMEOUT).build(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            language: DEFAULT_LANGUAGE.to_string(),
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    /// GETs `endpoint` with the key, language and `params`. A `language`
    /// entry in `params` overrides the client default.
    pub fn fetch<T: DeserializeOwned>(&self, endpoint: &str, params: &[(&str, &str)]) -> Result<T> {
        let mut request = self
            .agent
            .get(&format!("{}{}", self.base_url, endpoint))
            .query("api_key", &self.api_key);
        if !params.iter().any(|(key, _)| *key == "language") {
            request = request.query("language", &self.language);
        }
        for (key, value) in params {
            if *key != "api_key" {
                request = request.query(key, value);
            }
        }

        debug!(endpoint, "TMDB request");
        let response = match request.call() {
            Ok(response) => response,
            Err(ureq::Error::Status(status, response)) => {
                let body = response.into_string().unwrap_or_default();
                let message = serde_json::from_str::<Value>(&body)
                    .ok()
                    .and_then(|v| {
                        v.get("status_message")
                            .and_then(Value::as_str)
                            .map(str::to_owned)
                    })
                    .unwrap_or(body);
                return Err(anyhow!("TMDB {endpoint} returned {status}: {message}"));
            }
            Err(err) => return Err(anyhow!("TMDB {endpoint} failed: {err}")),
        };
        response
            .into_json::<T>()
            .with_context(|| format!("decoding TMDB response for {endpoint}"))
    }

    fn feed_page<T: DeserializeOwned>(&self, feed: &Feed, page: u32) -> Result<TmdbPage<T>> {
        let page = page.to_string();
        let mut params: Vec<(&str, &str)> = feed
            .params
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
            .collect();
        params.push(("page", &page));
        self.fetch(&feed.endpoint, &params)
    }

    pub fn trending(&self, kind: MediaKind) -> Result<TmdbPage<Value>> {
        self.fetch(&format!("/trending/{}/week", kind.tmdb_path()), &[])
    }

    /// `/search/multi`, used by the site search box.
    pub fn search_multi(&self, query: &str, page: u32) -> Result<TmdbPage<Value>> {
        let page = page.max(1).to_string();
        self.fetch(
            "/search/multi",
            &[("query", query), ("page", &page), ("include_adult", "false")],
        )
    }

    pub fn genres(&self, kind: MediaKind) -> Result<Vec<Genre>> {
        let list: GenreList = self.fetch(&format!("/genre/{}/list", kind.tmdb_path()), &[])?;
        Ok(list.genres)
    }

    /// First US certification listed for a movie, uppercased; empty when none.
    pub fn us_movie_certification(&self, id: u64) -> Result<String> {
        let dates: CountryResults<ReleaseDates> =
            self.fetch(&format!("/movie/{id}/release_dates"), &[])?;
        Ok(dates
            .results
            .into_iter()
            .find(|entry| entry.iso_3166_1 == "US")
            .and_then(|entry| entry.release_dates.into_iter().next())
            .and_then(|date| date.certification)
            .unwrap_or_default()
            .to_ascii_uppercase())
    }

    /// US rating of a title of either kind; empty when TMDB lists none.
    pub fn certification(&self, kind: MediaKind, id: u64) -> Result<String> {
        match kind {
            MediaKind::Movie => self.us_movie_certification(id),
            MediaKind::Tv => self.us_tv_rating(id),
        }
    }

    pub fn us_tv_rating(&self, id: u64) -> Result<String> {
        let ratings: CountryResults<ContentRating> =
            self.fetch(&format!("/tv/{id}/content_ratings"), &[])?;
        Ok(ratings
            .results
            .into_iter()
            .find(|entry| entry.iso_3166_1 == "US")
            .and_then(|entry| entry.rating)
            .unwrap_or_default()
            .to_ascii_uppercase())
    }
}

impl CatalogSource for TmdbClient {
    fn movie_page(&self, feed: &Feed, page: u32) -> Result<TmdbPage<TmdbMovie>> {
        self.feed_page(feed, page)
    }

    fn show_page(&self, feed: &Feed, page: u32) -> Result<TmdbPage<TmdbShow>> {
        self.feed_page(feed, page)
    }

    fn movie_details(&self, id: u64) -> Result<TmdbMovie> {
        self.fetch(&format!("/movie/{id}"), &[])
    }

    fn show_details(&self, id: u64) -> Result<TmdbShow> {
        self.fetch(&format!("/tv/{id}"), &[])
    }
}
