//! Quran reciters from the mp3quran.net v3 API.

use anyhow::{Result, anyhow};
use serde::Deserialize;
use tracing::{info, warn};

use super::{RowSource, agent, get_json};
use crate::catalog::{ReciterRow, Table, to_row};
use crate::store::Row;

/// Primary host first, then the API mirror.
pub const MP3QURAN_ENDPOINTS: [&str; 2] = [
    "https://www.mp3quran.net/api/v3/reciters",
    "https://api.mp3quran.net/api/v3/reciters",
];
pub const DEFAULT_LIMIT: usize = 200;
const ATTEMPTS_PER_ENDPOINT: usize = 3;
/// Riwaya preferred when a reciter has several recordings.
const PREFERRED_RIWAYA: &str = "حفص";

#[derive(Debug, Deserialize)]
struct RecitersResponse {
    #[serde(default)]
    reciters: Vec<Reciter>,
}

#[derive(Debug, Clone, Deserialize)]
struct Reciter {
    id: u64,
    #[serde(default)]
    name: String,
    #[serde(default)]
    letter: Option<String>,
    #[serde(default)]
    moshaf: Vec<Moshaf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct Moshaf {
    name: String,
    server: Option<String>,
    surah_list: String,
}

impl Reciter {
    /// Picks the Hafs recording when there is one, else the first. Reciters
    /// without a playable recording yield nothing.
    fn into_row(self) -> Option<ReciterRow> {
        let moshaf = self
            .moshaf
            .iter()
            .find(|moshaf| moshaf.name.contains(PREFERRED_RIWAYA))
            .or_else(|| self.moshaf.first())?
            .clone();
        let server = moshaf.server.filter(|server| !server.trim().is_empty())?;
        let letter = self.letter.filter(|letter| !letter.trim().is_empty());
        Some(ReciterRow {
            id: self.id,
            name: self.name,
            rewaya: moshaf.name,
            category: letter.clone().unwrap_or_else(|| "Others".to_string()),
            letter,
            server,
            surah_list: moshaf.surah_list,
            is_active: true,
            featured: false,
        })
    }
}

#[derive(Debug, Clone)]
pub struct Mp3QuranClient {
    agent: ureq::Agent,
    endpoints: Vec<String>,
    limit: usize,
}

impl Default for Mp3QuranClient {
    fn default() -> Self {
        Self::with_endpoints(MP3QURAN_ENDPOINTS.iter().map(|url| url.to_string()).collect())
    }
}

impl Mp3QuranClient {
    pub fn with_endpoints(endpoints: Vec<String>) -> Self {
        Self {
            agent: agent(),
            endpoints,
            limit: DEFAULT_LIMIT,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit.max(1);
        self
    }

    /// Tries each endpoint a few times; the last error wins when all fail.
    pub fn reciters(&self) -> Result<Vec<ReciterRow>> {
        let mut last_err = anyhow!("no mp3quran endpoints configured");
        for url in &self.endpoints {
            for attempt in 1..=ATTEMPTS_PER_ENDPOINT {
                match get_json::<RecitersResponse>(
                    &self.agent,
                    "mp3quran",
                    url,
                    &[("language", "ar")],
                ) {
                    Ok(response) => {
                        info!("fetched {} reciters from {url}", response.reciters.len());
                        return Ok(self.rows(response.reciters));
                    }
                    Err(err) => {
                        warn!("mp3quran attempt {attempt} at {url} failed: {err:#}");
                        last_err = err;
                    }
                }
            }
        }
        Err(last_err)
    }

    fn rows(&self, reciters: Vec<Reciter>) -> Vec<ReciterRow> {
        reciters
            .into_iter()
            .take(self.limit)
            .filter_map(|reciter| {
                let name = reciter.name.clone();
                let row = reciter.into_row();
                if row.is_none() {
                    info!("skipping reciter {name}: no playable recording");
                }
                row
            })
            .collect()
    }
}

impl RowSource for Mp3QuranClient {
    fn table(&self) -> Table {
        Table::QuranReciters
    }

    fn fetch_rows(&self) -> Result<Vec<Row>> {
        self.reciters()?.iter().map(to_row).collect()
    }

    /// Different reciters can share near-identical names.
    fn title_column(&self) -> Option<&'static str> {
        None
    }
}
