//! Top anime from the Jikan (MyAnimeList) API.

use std::thread;
use std::time::Duration;

use anyhow::Result;
use serde::Deserialize;
use tracing::info;

use super::{RowSource, agent, get_json};
use crate::catalog::{AnimeRow, Table, to_row};
use crate::store::Row;

pub const JIKAN_BASE_URL: &str = "https://api.jikan.moe/v4";
pub const DEFAULT_TOTAL: usize = 50;
const PAGE_SIZE: usize = 25;
/// Jikan allows a few requests per second per client.
const PAGE_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Deserialize)]
struct TopPage {
    #[serde(default)]
    data: Vec<JikanAnime>,
    #[serde(default)]
    pagination: Option<Pagination>,
}

#[derive(Debug, Deserialize)]
struct Pagination {
    #[serde(default)]
    has_next_page: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct JikanAnime {
    mal_id: u64,
    title: Option<String>,
    title_english: Option<String>,
    title_japanese: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    episodes: Option<u32>,
    status: Option<String>,
    score: Option<f64>,
    rank: Option<u64>,
    popularity: Option<u64>,
    synopsis: Option<String>,
    year: Option<i32>,
    season: Option<String>,
    genres: Vec<Named>,
    images: Option<Images>,
    trailer: Option<Trailer>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct Named {
    name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct Images {
    jpg: Option<ImageSet>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ImageSet {
    image_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct Trailer {
    url: Option<String>,
}

impl JikanAnime {
    fn into_row(self) -> Option<AnimeRow> {
        let title = self.title.filter(|title| !title.trim().is_empty())?;
        let category = self
            .genres
            .into_iter()
            .next()
            .map(|genre| genre.name)
            .unwrap_or_else(|| "Others".to_string());
        Some(AnimeRow {
            id: self.mal_id,
            mal_id: self.mal_id,
            title,
            title_english: self.title_english,
            title_japanese: self.title_japanese,
            kind: self.kind,
            episodes: self.episodes,
            status: self.status,
            score: self.score,
            rank: self.rank,
            popularity: self.popularity,
            synopsis: self.synopsis,
            year: self.year,
            season: self.season,
            category,
            image_url: self.images.and_then(|i| i.jpg).and_then(|jpg| jpg.image_url),
            trailer_url: self.trailer.and_then(|trailer| trailer.url),
            source: "jikan".to_string(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct JikanClient {
    agent: ureq::Agent,
    base_url: String,
    total: usize,
    page_delay: Duration,
}

impl Default for JikanClient {
    fn default() -> Self {
        Self::with_base_url(JIKAN_BASE_URL)
    }
}

impl JikanClient {
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            agent: agent(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            total: DEFAULT_TOTAL,
            page_delay: PAGE_DELAY,
        }
    }

    /// How many top titles to fetch, at least one.
    pub fn with_total(mut self, total: usize) -> Self {
        self.total = total.max(1);
        self
    }

    /// Top anime by score, `total` at most, in rank order.
    pub fn top_anime(&self) -> Result<Vec<AnimeRow>> {
        let url = format!("{}/top/anime", self.base_url);
        let limit = PAGE_SIZE.to_string();
        let mut rows = Vec::new();
        let mut page = 1;
        while rows.len() < self.total {
            if page > 1 {
                thread::sleep(self.page_delay);
            }
            let page_param = page.to_string();
            let top: TopPage = get_json(
                &self.agent,
                "Jikan",
                &url,
                &[("page", &page_param), ("limit", &limit)],
            )?;
            let fetched = top.data.len();
            rows.extend(top.data.into_iter().filter_map(JikanAnime::into_row));
            info!("Jikan page {page}: {fetched} titles");
            let more = top.pagination.is_some_and(|p| p.has_next_page);
            if fetched == 0 || !more {
                break;
            }
            page += 1;
        }
        rows.truncate(self.total);
        Ok(rows)
    }
}

impl RowSource for JikanClient {
    fn table(&self) -> Table {
        Table::Anime
    }

    fn fetch_rows(&self) -> Result<Vec<Row>> {
        self.top_anime()?.iter().map(to_row).collect()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn items_map_to_rows() {
        let anime: JikanAnime = serde_json::from_value(json!({
            "mal_id": 5114,
            "title": "Fullmetal Alchemist: Brotherhood",
            "type": "TV",
            "episodes": 64,
            "score": 9.1,
            "year": 2009,
            "genres": [{"mal_id": 1, "name": "Action"}, {"mal_id": 2, "name": "Adventure"}],
            "images": {"jpg": {"image_url": "https://cdn.myanimelist.net/fma.jpg"}},
            "trailer": {"url": null}
        }))
        .unwrap();
        let row = anime.into_row().unwrap();
        assert_eq!(row.id, 5114);
        assert_eq!(row.mal_id, 5114);
        assert_eq!(row.category, "Action");
        assert_eq!(row.kind.as_deref(), Some("TV"));
        assert_eq!(row.image_url.as_deref(), Some("https://cdn.myanimelist.net/fma.jpg"));
        assert_eq!(row.trailer_url, None);
        assert_eq!(row.source, "jikan");

        let bare: JikanAnime = serde_json::from_value(json!({"mal_id": 1, "title": "X"})).unwrap();
        assert_eq!(bare.into_row().unwrap().category, "Others");
        let untitled: JikanAnime = serde_json::from_value(json!({"mal_id": 2})).unwrap();
        assert!(untitled.into_row().is_none());
    }

    #[test]
    fn rows_serialize_type_column() {
        let anime: JikanAnime =
            serde_json::from_value(json!({"mal_id": 3, "title": "Mushishi", "type": "TV"}))
                .unwrap();
        let row = to_row(&anime.into_row().unwrap()).unwrap();
        assert_eq!(row["type"], "TV");
        assert!(!row.contains_key("kind"));
    }
}
