//! Top-rated games from RAWG, with SteamSpy's trending list as a keyless
//! fallback when RAWG is unavailable.

use std::thread;
use std::time::Duration;

use anyhow::Result;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{info, warn};
use url::Url;

use super::{RowSource, agent, get_json};
use crate::catalog::{DownloadRow, Table, to_row};
use crate::store::{Row, plain};

pub const RAWG_GAMES_URL: &str = "https://api.rawg.io/api/games";
pub const STEAMSPY_URL: &str = "https://steamspy.com/api.php";
pub const DEFAULT_LIMIT: usize = 50;
const DETAIL_DELAY: Duration = Duration::from_millis(150);
const NO_DESCRIPTION: &str = "لا يوجد وصف";
const STEAM_DESCRIPTION: &str = "لعبة رائجة على Steam";
const STEAM_DEFAULT_RATING: f64 = 8.5;

#[derive(Debug, Deserialize)]
struct RawgPage {
    #[serde(default)]
    results: Vec<RawgGame>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct RawgGame {
    id: Option<u64>,
    name: Option<String>,
    background_image: Option<String>,
    rating: Option<f64>,
    released: Option<String>,
    platforms: Vec<PlatformEntry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct PlatformEntry {
    platform: Platform,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct Platform {
    name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawgDetails {
    description_raw: Option<String>,
}

/// PC wins over consoles, consoles over mobile.
fn platform_category(platforms: &[PlatformEntry]) -> &'static str {
    let names: Vec<&str> = platforms.iter().map(|p| p.platform.name.as_str()).collect();
    let any = |needles: &[&str]| {
        names
            .iter()
            .any(|name| needles.iter().any(|needle| name.contains(needle)))
    };
    if any(&["PC"]) {
        "PC"
    } else if any(&["PlayStation", "Xbox", "Nintendo"]) {
        "Console"
    } else if any(&["Android", "iOS"]) {
        "Mobile"
    } else {
        "Others"
    }
}

/// RAWG rates out of 5; the site shows scores out of 10 with one decimal.
fn ten_point_rating(rawg: f64) -> f64 {
    ((rawg * 2.0).clamp(0.0, 10.0) * 10.0).round() / 10.0
}

fn release_year(released: Option<&str>) -> Option<i32> {
    released.and_then(|date| date.get(..4)).and_then(|year| year.parse().ok())
}

fn search_url(title: &str) -> String {
    let query = format!("{title} PC download");
    match Url::parse_with_params("https://www.google.com/search", [("q", query.as_str())]) {
        Ok(url) => url.to_string(),
        Err(_) => "https://www.google.com/search".to_string(),
    }
}

/// SteamSpy rank 1 scores 9.9, falling a point per ten places down to 6.
fn steam_rating(score_rank: Option<&Value>) -> f64 {
    let rank = score_rank
        .map(plain)
        .and_then(|rank| rank.trim().parse::<f64>().ok())
        .unwrap_or(0.0);
    if rank > 0.0 {
        ((10.0 - rank / 10.0).clamp(6.0, 10.0) * 10.0).round() / 10.0
    } else {
        STEAM_DEFAULT_RATING
    }
}

fn steam_row(item: &Map<String, Value>) -> Option<DownloadRow> {
    let appid = item.get("appid").map(plain)?.parse::<u64>().ok()?;
    let title = item
        .get("name")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|name| !name.is_empty())?
        .to_string();
    Some(DownloadRow {
        id: appid,
        title,
        poster_url: Some(format!(
            "https://cdn.cloudflare.steamstatic.com/steam/apps/{appid}/library_600x900.jpg"
        )),
        rating: steam_rating(item.get("score_rank")),
        year: None,
        description: STEAM_DESCRIPTION.to_string(),
        download_url: format!("https://store.steampowered.com/app/{appid}/"),
        category: "PC".to_string(),
    })
}

#[derive(Debug, Clone)]
pub struct GamesClient {
    agent: ureq::Agent,
    rawg_url: String,
    steamspy_url: String,
    api_key: Option<String>,
    limit: usize,
    detail_delay: Duration,
}

impl GamesClient {
    pub fn new(api_key: Option<String>) -> Self {
        Self::with_endpoints(RAWG_GAMES_URL, STEAMSPY_URL, api_key)
    }

    pub fn with_endpoints(
        rawg_url: impl Into<String>,
        steamspy_url: impl Into<String>,
        api_key: Option<String>,
    ) -> Self {
        Self {
            agent: agent(),
            rawg_url: rawg_url.into().trim_end_matches('/').to_string(),
            steamspy_url: steamspy_url.into(),
            api_key,
            limit: DEFAULT_LIMIT,
            detail_delay: DETAIL_DELAY,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit.max(1);
        self
    }

    /// RAWG's best-rated games, or SteamSpy's trending list when any RAWG
    /// request for the list fails.
    pub fn top_games(&self) -> Result<Vec<DownloadRow>> {
        match self.rawg_games() {
            Ok(rows) => Ok(rows),
            Err(err) => {
                warn!("RAWG unavailable, using SteamSpy: {err:#}");
                self.steam_games()
            }
        }
    }

    fn key_param(&self) -> Vec<(&str, &str)> {
        self.api_key
            .as_deref()
            .map(|key| vec![("key", key)])
            .unwrap_or_default()
    }

    fn rawg_games(&self) -> Result<Vec<DownloadRow>> {
        let page_size = self.limit.to_string();
        let mut params = vec![("ordering", "-rating"), ("page_size", page_size.as_str())];
        params.extend(self.key_param());
        let page: RawgPage = get_json(&self.agent, "RAWG", &self.rawg_url, &params)?;

        let mut rows = Vec::new();
        for (index, game) in page.results.into_iter().take(self.limit).enumerate() {
            let (Some(id), Some(title)) = (game.id, game.name.clone()) else {
                continue;
            };
            if title.trim().is_empty() {
                continue;
            }
            if index > 0 {
                thread::sleep(self.detail_delay);
            }
            let description = self
                .description(id)
                .filter(|text| !text.trim().is_empty())
                .unwrap_or_else(|| NO_DESCRIPTION.to_string());
            rows.push(DownloadRow {
                id,
                download_url: search_url(&title),
                title,
                poster_url: game.background_image.filter(|url| !url.is_empty()),
                rating: ten_point_rating(game.rating.unwrap_or_default()),
                year: release_year(game.released.as_deref()),
                description,
                category: platform_category(&game.platforms).to_string(),
            });
        }
        info!("RAWG returned {} games", rows.len());
        Ok(rows)
    }

    /// Detail lookups are best effort; a failure leaves the description out.
    fn description(&self, id: u64) -> Option<String> {
        let url = format!("{}/{id}", self.rawg_url);
        match get_json::<RawgDetails>(&self.agent, "RAWG", &url, &self.key_param()) {
            Ok(details) => details.description_raw,
            Err(err) => {
                warn!("RAWG details for {id} unavailable: {err:#}");
                None
            }
        }
    }

    /// SteamSpy keys its answer by app id; serde_json does not keep that
    /// order, so titles are ranked by concurrent players instead.
    fn steam_games(&self) -> Result<Vec<DownloadRow>> {
        let raw: Map<String, Value> = get_json(
            &self.agent,
            "SteamSpy",
            &self.steamspy_url,
            &[("request", "top100in2weeks")],
        )?;
        let mut items: Vec<&Map<String, Value>> =
            raw.values().filter_map(Value::as_object).collect();
        items.sort_by_key(|item| {
            std::cmp::Reverse(item.get("ccu").and_then(Value::as_u64).unwrap_or(0))
        });
        let rows: Vec<DownloadRow> = items
            .into_iter()
            .filter_map(steam_row)
            .take(self.limit)
            .collect();
        info!("SteamSpy returned {} games", rows.len());
        Ok(rows)
    }
}

impl RowSource for GamesClient {
    fn table(&self) -> Table {
        Table::Games
    }

    fn fetch_rows(&self) -> Result<Vec<Row>> {
        self.top_games()?.iter().map(to_row).collect()
    }

    fn renamed_column(&self) -> Option<(&'static str, &'static str)> {
        Some(("year", "release_year"))
    }
}
