use anyhow::{Context, Result, bail};
use std::{
    collections::BTreeMap,
    env, fs,
    path::{Path, PathBuf},
};

pub const DEFAULT_ENV_PATH: &str = ".env";
pub const DEFAULT_API_PORT: u16 = 3001;
pub const DEFAULT_API_HOST: &str = "127.0.0.1";
pub const DEFAULT_WWW_ROOT: &str = "dist";

const SUPABASE_URL_KEYS: &[&str] = &["VITE_SUPABASE_URL", "SUPABASE_URL"];
const SERVICE_KEY_KEYS: &[&str] = &[
    "SUPABASE_SERVICE_ROLE_KEY",
    "SUPABASE_SERVICE_KEY",
    "VITE_SUPABASE_SERVICE_ROLE_KEY",
    "VITE_SUPABASE_ANON_KEY",
];
const ANON_KEY_KEYS: &[&str] = &["VITE_SUPABASE_ANON_KEY", "SUPABASE_ANON_KEY"];
const TMDB_KEY_KEYS: &[&str] = &["VITE_TMDB_API_KEY", "TMDB_API_KEY"];

/// Every key the binaries understand, in the order `check_env` reports them.
pub const KNOWN_KEYS: &[&str] = &[
    "VITE_SUPABASE_URL",
    "SUPABASE_URL",
    "SUPABASE_SERVICE_ROLE_KEY",
    "SUPABASE_SERVICE_KEY",
    "VITE_SUPABASE_SERVICE_ROLE_KEY",
    "VITE_SUPABASE_ANON_KEY",
    "SUPABASE_ANON_KEY",
    "VITE_TMDB_API_KEY",
    "TMDB_API_KEY",
    "RAWG_API_KEY",
    "API_HOST",
    "API_PORT",
    "WEB_ORIGIN",
    "ADMIN_SYNC_TOKEN",
    "WWW_ROOT",
];

/// Raw `KEY=VALUE` pairs read from a `.env` file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnvFile {
    values: BTreeMap<String, String>,
}

impl EnvFile {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub supabase_url: Option<String>,
    pub service_key: Option<String>,
    pub anon_key: Option<String>,
    pub tmdb_api_key: Option<String>,
    pub rawg_api_key: Option<String>,
    pub api_host: String,
    pub api_port: u16,
    pub web_origins: Vec<String>,
    pub admin_token: Option<String>,
    pub www_root: PathBuf,
}

/// Connection details for the hosted database, once both halves are known.
#[derive(Debug, Clone)]
pub struct SupabaseCredentials {
    pub url: String,
    pub key: String,
}

pub fn read_env_file(path: &Path) -> Result<Option<EnvFile>> {
    if !path.exists() {
        return Ok(None);
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))?;
    Ok(Some(parse_env(&content)))
}

pub fn parse_env(content: &str) -> EnvFile {
    let mut file = EnvFile::default();
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let trimmed = trimmed.strip_prefix("export ").unwrap_or(trimmed);
        if let Some((key, value_raw)) = trimmed.split_once('=') {
            let key = key.trim();
            if key.is_empty() {
                continue;
            }
            let value = value_raw.trim().trim_matches('"').trim_matches('\'');
            file.insert(key, value);
        }
    }
    file
}

impl Settings {
    /// Reads `path` (when present) and layers it over the process environment.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = read_env_file(path.as_ref())?.unwrap_or_default();
        Self::resolve(&file, |key| env::var(key).ok())
    }

    /// Values from the `.env` file win over the process environment; empty
    /// values are treated as unset.
    pub fn resolve<F>(file: &EnvFile, process_env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| -> Option<String> {
            file.get(key)
                .map(str::to_owned)
                .or_else(|| process_env(key))
                .filter(|value| !value.trim().is_empty())
        };
        let first = |keys: &[&str]| keys.iter().find_map(|key| lookup(key));

        let api_port = match lookup("API_PORT") {
            Some(raw) => raw
                .trim()
                .parse::<u16>()
                .with_context(|| format!("Parsing API_PORT value {raw:?}"))?,
            None => DEFAULT_API_PORT,
        };
        let web_origins = lookup("WEB_ORIGIN")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|origin| !origin.is_empty())
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            supabase_url: first(SUPABASE_URL_KEYS).map(|url| url.trim_end_matches('/').to_owned()),
            service_key: first(SERVICE_KEY_KEYS),
            anon_key: first(ANON_KEY_KEYS),
            tmdb_api_key: first(TMDB_KEY_KEYS),
            rawg_api_key: lookup("RAWG_API_KEY"),
            api_host: lookup("API_HOST").unwrap_or_else(|| DEFAULT_API_HOST.to_string()),
            api_port,
            web_origins,
            admin_token: lookup("ADMIN_SYNC_TOKEN"),
            www_root: lookup("WWW_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_WWW_ROOT)),
        })
    }

    pub fn require_supabase(&self) -> Result<SupabaseCredentials> {
        match (&self.supabase_url, &self.service_key) {
            (Some(url), Some(key)) => Ok(SupabaseCredentials {
                url: url.clone(),
                key: key.clone(),
            }),
            (None, _) => bail!(
                "Missing Supabase URL; set one of {}",
                SUPABASE_URL_KEYS.join(", ")
            ),
            (_, None) => bail!(
                "Missing Supabase key; set one of {}",
                SERVICE_KEY_KEYS.join(", ")
            ),
        }
    }

    pub fn require_anon(&self) -> Result<SupabaseCredentials> {
        let url = self
            .supabase_url
            .clone()
            .ok_or_else(|| anyhow::anyhow!("Missing Supabase URL; set VITE_SUPABASE_URL"))?;
        let key = self
            .anon_key
            .clone()
            .ok_or_else(|| anyhow::anyhow!("Missing anon key; set VITE_SUPABASE_ANON_KEY"))?;
        Ok(SupabaseCredentials { url, key })
    }

    pub fn require_tmdb(&self) -> Result<String> {
        self.tmdb_api_key
            .clone()
            .ok_or_else(|| {
                anyhow::anyhow!("Missing TMDB key; set one of {}", TMDB_KEY_KEYS.join(", "))
            })
    }
}
