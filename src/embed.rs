//! Third-party embed players, addressed by TMDB id.

use std::fmt;
use std::str::FromStr;

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

use crate::catalog::MediaKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EmbedServer {
    #[serde(rename = "vidsrc")]
    VidSrc,
    #[serde(rename = "2embed")]
    TwoEmbed,
    #[serde(rename = "embed_su")]
    EmbedSu,
}

impl EmbedServer {
    /// Servers in the order the player offers them.
    pub const ALL: [EmbedServer; 3] = [
        EmbedServer::VidSrc,
        EmbedServer::TwoEmbed,
        EmbedServer::EmbedSu,
    ];

    pub fn key(self) -> &'static str {
        match self {
            EmbedServer::VidSrc => "vidsrc",
            EmbedServer::TwoEmbed => "2embed",
            EmbedServer::EmbedSu => "embed_su",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            EmbedServer::VidSrc => "VidSrc",
            EmbedServer::TwoEmbed => "2Embed",
            EmbedServer::EmbedSu => "EmbedSU",
        }
    }

    /// Out-of-range indexes fall back to the first server.
    pub fn by_index(index: usize) -> Self {
        Self::ALL.get(index).copied().unwrap_or(Self::ALL[0])
    }
}

impl fmt::Display for EmbedServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for EmbedServer {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match Self::ALL.iter().find(|server| server.key() == value) {
            Some(server) => Ok(*server),
            None => bail!("unknown embed server: {value}"),
        }
    }
}

/// Season/episode pair for TV embeds; both start at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Episode {
    pub season: u32,
    pub episode: u32,
}

impl Default for Episode {
    fn default() -> Self {
        Self {
            season: 1,
            episode: 1,
        }
    }
}

pub fn embed_url(kind: MediaKind, tmdb_id: u64, episode: Episode, server: EmbedServer) -> String {
    let Episode { season: s, episode: e } = episode;
    match (server, kind) {
        (EmbedServer::VidSrc, MediaKind::Movie) => {
            format!("https://vidsrc.to/embed/movie?tmdb={tmdb_id}")
        }
        (EmbedServer::VidSrc, MediaKind::Tv) => {
            format!("https://vidsrc.to/embed/tv?tmdb={tmdb_id}&season={s}&episode={e}")
        }
        (EmbedServer::TwoEmbed, MediaKind::Movie) => {
            format!("https://www.2embed.cc/embed/{tmdb_id}")
        }
        (EmbedServer::TwoEmbed, MediaKind::Tv) => {
            format!("https://www.2embed.cc/embed/tv/{tmdb_id}?s={s}&e={e}")
        }
        (EmbedServer::EmbedSu, MediaKind::Movie) => {
            format!("https://embed.su/?tmdb={tmdb_id}&category=movie")
        }
        (EmbedServer::EmbedSu, MediaKind::Tv) => {
            format!("https://embed.su/?tmdb={tmdb_id}&season={s}&episode={e}&category=tv")
        }
    }
}

pub fn embed_url_by_index(kind: MediaKind, tmdb_id: u64, episode: Episode, index: usize) -> String {
    embed_url(kind, tmdb_id, episode, EmbedServer::by_index(index))
}

/// One entry of the server picker returned with catalog details.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServerLink {
    pub server: EmbedServer,
    pub name: &'static str,
    pub url: String,
}

pub fn server_links(kind: MediaKind, tmdb_id: u64, episode: Episode) -> Vec<ServerLink> {
    EmbedServer::ALL
        .iter()
        .map(|server| ServerLink {
            server: *server,
            name: server.label(),
            url: embed_url(kind, tmdb_id, episode, *server),
        })
        .collect()
}
