//! Reachability checks for external links and embed servers.

use std::time::{Duration, Instant};

use anyhow::{Result, bail};
use serde::Serialize;
use url::Url;

use crate::catalog::MediaKind;
use crate::embed::{EmbedServer, Episode, embed_url, embed_url_by_index};
use crate::security::is_private_host;

pub const CHECK_TIMEOUT: Duration = Duration::from_secs(5);
/// Redirect hops followed by hand, each one re-validated.
pub const MAX_REDIRECTS: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkStatus {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl LinkStatus {
    fn reachable(status: u16, elapsed: Duration) -> Self {
        Self {
            valid: true,
            status: Some(status),
            response_time_ms: Some(elapsed.as_millis() as u64),
            error: None,
        }
    }

    fn failed(status: Option<u16>, error: impl Into<String>) -> Self {
        Self {
            valid: false,
            status,
            response_time_ms: None,
            error: Some(error.into()),
        }
    }
}

fn failure(err: ureq::Error) -> LinkStatus {
    match err {
        ureq::Error::Status(status, _) => {
            LinkStatus::failed(Some(status), format!("HTTP {status}"))
        }
        ureq::Error::Transport(transport) => LinkStatus::failed(None, transport.to_string()),
    }
}

/// Rejects anything that is not a public `http`/`https` URL. The error text
/// is the short code the API returns to callers.
pub fn validate_target(raw: &str) -> Result<Url> {
    let parsed = match Url::parse(raw.trim()) {
        Ok(parsed) => parsed,
        Err(_) => bail!("invalid_url"),
    };
    if !matches!(parsed.scheme(), "http" | "https") {
        bail!("invalid_protocol");
    }
    match parsed.host_str() {
        Some(host) if !is_private_host(host) => Ok(parsed),
        _ => bail!("blocked_host"),
    }
}

#[derive(Debug, Clone)]
pub struct LinkChecker {
    agent: ureq::Agent,
}

impl Default for LinkChecker {
    fn default() -> Self {
        Self::new(CHECK_TIMEOUT)
    }
}

impl LinkChecker {
    pub fn new(timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(timeout)
            .redirects(0)
            .build();
        Self { agent }
    }

    /// Checks an already validated URL. Servers that refuse `HEAD` get a
    /// one-byte ranged `GET` instead. Redirects are followed only to public
    /// hosts.
    pub fn check_url(&self, url: &Url) -> LinkStatus {
        let started = Instant::now();
        let mut current = url.clone();
        for _ in 0..=MAX_REDIRECTS {
            let response = match self.request(&current) {
                Ok(response) => response,
                Err(err) => return failure(err),
            };
            let status = response.status();
            if !(300..400).contains(&status) {
                return if status < 400 {
                    LinkStatus::reachable(status, started.elapsed())
                } else {
                    LinkStatus::failed(Some(status), format!("HTTP {status}"))
                };
            }
            let next = response
                .header("Location")
                .and_then(|location| current.join(location).ok());
            current = match next.map(|next| validate_target(next.as_str())) {
                Some(Ok(next)) => next,
                Some(Err(err)) => return LinkStatus::failed(Some(status), err.to_string()),
                None => return LinkStatus::failed(Some(status), "redirect without location"),
            };
        }
        LinkStatus::failed(None, "too many redirects")
    }

    fn request(&self, url: &Url) -> Result<ureq::Response, ureq::Error> {
        match self.agent.request_url("HEAD", url).call() {
            Ok(response) => Ok(response),
            Err(_) => self
                .agent
                .request_url("GET", url)
                .set("Range", "bytes=0-0")
                .call(),
        }
    }

    pub fn check_link(&self, raw: &str) -> LinkStatus {
        match validate_target(raw) {
            Ok(url) => self.check_url(&url),
            Err(err) => LinkStatus::failed(None, err.to_string()),
        }
    }

    /// Checks the server at `index` in picker order; out-of-range indexes
    /// check the first server.
    pub fn verify_source(
        &self,
        kind: MediaKind,
        tmdb_id: u64,
        episode: Episode,
        index: usize,
    ) -> SourceCheck {
        let url = embed_url_by_index(kind, tmdb_id, episode, index);
        SourceCheck {
            server: EmbedServer::by_index(index),
            status: self.check_link(&url),
            url,
        }
    }

    /// Checks every embed server for one title.
    pub fn verify_sources(
        &self,
        kind: MediaKind,
        tmdb_id: u64,
        episode: Episode,
    ) -> Vec<SourceCheck> {
        EmbedServer::ALL
            .iter()
            .map(|server| {
                let url = embed_url(kind, tmdb_id, episode, *server);
                let status = self.check_link(&url);
                SourceCheck {
                    server: *server,
                    url,
                    status,
                }
            })
            .collect()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceCheck {
    pub server: EmbedServer,
    pub url: String,
    pub status: LinkStatus,
}

pub fn check_link(raw: &str) -> LinkStatus {
    LinkChecker::default().check_link(raw)
}
