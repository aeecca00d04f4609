//! Snapshot backups of the hosted tables.
//!
//! A backup is a directory `{backup_dir}/{kind}/backup-{timestamp}` holding
//! one dump file per table, optional `auth.json` / `storage.json` exports and
//! a `metadata.json` manifest. Older tools wrote the same layout, and their
//! XOR-obfuscated dumps still restore.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result, anyhow, bail};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Datelike, NaiveDateTime, SecondsFormat, Timelike, Utc, Weekday};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{error, info, warn};
use walkdir::WalkDir;

use crate::catalog::Table;
use crate::store::{DEFAULT_PAGE_SIZE, Filter, Row, RowStore};
use crate::supabase::SupabaseClient;

pub const DEFAULT_BACKUP_DIR: &str = "backups";
pub const DEFAULT_RETENTION_DAYS: u64 = 30;
pub const DEFAULT_ENCRYPTION_KEY: &str = "backup_encryption_key_2024";
pub const FORMAT_VERSION: &str = "1.0.0";
pub const RESTORE_CHUNK: usize = 500;
const METADATA_FILE: &str = "metadata.json";
const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    pub backup_dir: PathBuf,
    pub retention_days: u64,
    pub tables: Vec<String>,
    pub include_auth: bool,
    pub include_storage: bool,
    pub compress: bool,
    pub encrypt: bool,
    pub encryption_key: String,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            backup_dir: PathBuf::from(DEFAULT_BACKUP_DIR),
            retention_days: DEFAULT_RETENTION_DAYS,
            tables: Table::ALL.iter().map(|t| t.name().to_string()).collect(),
            include_auth: true,
            include_storage: true,
            compress: false,
            encrypt: false,
            encryption_key: DEFAULT_ENCRYPTION_KEY.to_string(),
        }
    }
}

impl BackupConfig {
    /// Reads a TOML config; a missing file means all defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Reading backup config {}", path.display()))?;
        let config: Self = toml::from_str(&raw)
            .with_context(|| format!("Parsing backup config {}", path.display()))?;
        if config.encrypt && config.encryption_key.is_empty() {
            bail!("encrypt is enabled but encryption_key is empty");
        }
        Ok(config)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupKind {
    Daily,
    Weekly,
    Monthly,
}

impl BackupKind {
    pub const ALL: [BackupKind; 3] = [BackupKind::Daily, BackupKind::Weekly, BackupKind::Monthly];

    pub fn as_str(self) -> &'static str {
        match self {
            BackupKind::Daily => "daily",
            BackupKind::Weekly => "weekly",
            BackupKind::Monthly => "monthly",
        }
    }
}

impl FromStr for BackupKind {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "daily" => Ok(BackupKind::Daily),
            "weekly" => Ok(BackupKind::Weekly),
            "monthly" => Ok(BackupKind::Monthly),
            other => bail!("unknown backup type: {other}"),
        }
    }
}

/// Schedule: daily at 02:00, weekly on Sunday at 03:00, monthly on the 1st
/// at 04:00. Checked once an hour, so only the hour matters.
pub fn due_backups(now: NaiveDateTime) -> Vec<BackupKind> {
    let mut due = Vec::new();
    if now.hour() == 2 {
        due.push(BackupKind::Daily);
    }
    if now.weekday() == Weekday::Sun && now.hour() == 3 {
        due.push(BackupKind::Weekly);
    }
    if now.day() == 1 && now.hour() == 4 {
        due.push(BackupKind::Monthly);
    }
    due
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDump {
    pub table: String,
    pub timestamp: String,
    pub count: usize,
    pub data: Vec<Row>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupMetadata {
    pub timestamp: String,
    pub version: String,
    pub tables: Vec<String>,
    pub row_counts: BTreeMap<String, u64>,
    pub size: u64,
    pub checksum: String,
    #[serde(default)]
    pub compressed: bool,
    #[serde(default)]
    pub encrypted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupSummary {
    pub dir: PathBuf,
    pub succeeded: usize,
    pub total: usize,
    pub pruned: usize,
}

impl BackupSummary {
    pub fn is_success(&self) -> bool {
        self.succeeded == self.total
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreReport {
    pub restored: Vec<String>,
    pub failed: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupStatus {
    pub is_running: bool,
    pub last_backup: Option<String>,
}

/// Account-level exports that only the admin APIs can produce.
pub trait AccountSource {
    fn export_users(&self) -> Result<Vec<Value>>;
    fn export_buckets(&self) -> Result<Vec<Value>>;
}

impl AccountSource for SupabaseClient {
    fn export_users(&self) -> Result<Vec<Value>> {
        self.list_all_users()?
            .iter()
            .map(|user| serde_json::to_value(user).context("Serializing auth user"))
            .collect()
    }

    fn export_buckets(&self) -> Result<Vec<Value>> {
        Ok(self.list_buckets()?)
    }
}

/// XORs UTF-16 units of `text` with `key` and base64-encodes the UTF-8 form
/// of the result.
pub fn xor_encrypt(text: &str, key: &str) -> String {
    let mixed = xor_units(text, key);
    BASE64.encode(String::from_utf16_lossy(&mixed).as_bytes())
}

pub fn xor_decrypt(encoded: &str, key: &str) -> Result<String> {
    let bytes = BASE64
        .decode(encoded.trim())
        .context("Decoding base64 backup payload")?;
    let text = String::from_utf8(bytes).context("Encrypted payload is not UTF-8")?;
    String::from_utf16(&xor_units(&text, key))
        .map_err(|_| anyhow!("Decrypted payload is not valid text"))
}

fn xor_units(text: &str, key: &str) -> Vec<u16> {
    let key: Vec<u16> = key.encode_utf16().collect();
    if key.is_empty() {
        return text.encode_utf16().collect();
    }
    text.encode_utf16()
        .enumerate()
        .map(|(i, unit)| unit ^ key[i % key.len()])
        .collect()
}

fn gzip(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes)?;
    Ok(encoder.finish()?)
}

fn gunzip(bytes: &[u8]) -> Result<String> {
    let mut text = String::new();
    GzDecoder::new(bytes)
        .read_to_string(&mut text)
        .context("Decompressing backup file")?;
    Ok(text)
}

fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Oldest modification time a backup may have and still be kept. A retention
/// too large to represent keeps everything.
fn retention_cutoff(now: SystemTime, retention_days: u64) -> SystemTime {
    retention_days
        .checked_mul(SECONDS_PER_DAY)
        .map(Duration::from_secs)
        .and_then(|retention| now.checked_sub(retention))
        .unwrap_or(SystemTime::UNIX_EPOCH)
}

/// Deletes backups under `{backup_dir}/{kind}` last modified before `cutoff`.
pub fn prune_older_than(backup_dir: &Path, cutoff: SystemTime) -> Result<usize> {
    let mut pruned = 0;
    for kind in BackupKind::ALL {
        let dir = backup_dir.join(kind.as_str());
        if !dir.is_dir() {
            continue;
        }
        for entry in WalkDir::new(&dir).min_depth(1).max_depth(1) {
            let entry = entry.with_context(|| format!("Listing {}", dir.display()))?;
            let modified = entry.metadata()?.modified()?;
            if modified >= cutoff {
                continue;
            }
            info!("deleting old backup {}", entry.path().display());
            if entry.file_type().is_dir() {
                fs::remove_dir_all(entry.path())?;
            } else {
                fs::remove_file(entry.path())?;
            }
            pruned += 1;
        }
    }
    Ok(pruned)
}

/// Newest entry of the daily folder, by modification time.
pub fn last_backup_time(backup_dir: &Path) -> Option<String> {
    let dir = backup_dir.join(BackupKind::Daily.as_str());
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.metadata().ok()?.modified().ok())
        .max()
        .map(|time| DateTime::<Utc>::from(time).to_rfc3339_opts(SecondsFormat::Millis, true))
}

struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct BackupSystem<'a, D> {
    config: BackupConfig,
    store: &'a D,
    accounts: Option<&'a dyn AccountSource>,
    running: AtomicBool,
}

impl<'a, D: RowStore> BackupSystem<'a, D> {
    pub fn new(config: BackupConfig, store: &'a D) -> Self {
        Self {
            config,
            store,
            accounts: None,
            running: AtomicBool::new(false),
        }
    }

    pub fn with_accounts(mut self, accounts: &'a dyn AccountSource) -> Self {
        self.accounts = Some(accounts);
        self
    }

    pub fn config(&self) -> &BackupConfig {
        &self.config
    }

    pub fn status(&self) -> BackupStatus {
        BackupStatus {
            is_running: self.running.load(Ordering::SeqCst),
            last_backup: last_backup_time(&self.config.backup_dir),
        }
    }

    pub fn create_backup(&self, kind: BackupKind) -> Result<BackupSummary> {
        if self.running.swap(true, Ordering::SeqCst) {
            bail!("backup already in progress");
        }
        let _guard = RunningGuard(&self.running);

        info!("starting {} backup", kind.as_str());
        let stamp = timestamp().replace([':', '.'], "-");
        let dir = self
            .config
            .backup_dir
            .join(kind.as_str())
            .join(format!("backup-{stamp}"));
        fs::create_dir_all(&dir).with_context(|| format!("Creating {}", dir.display()))?;

        let mut succeeded = 0;
        let total = self.config.tables.len()
            + usize::from(self.config.include_auth)
            + usize::from(self.config.include_storage);
        let mut hasher = blake3::Hasher::new();
        let mut size = 0u64;

        for table in &self.config.tables {
            match self.dump_table(table, &dir) {
                Ok(bytes) => {
                    hasher.update(&bytes);
                    size += bytes.len() as u64;
                    succeeded += 1;
                }
                Err(err) => error!("error backing up table {table}: {err:#}"),
            }
        }

        if self.config.include_auth {
            match self.export_accounts(&dir, "auth.json", "users", |a| a.export_users()) {
                Ok(written) => {
                    size += written;
                    succeeded += 1;
                }
                Err(err) => error!("error backing up auth users: {err:#}"),
            }
        }
        if self.config.include_storage {
            match self.export_accounts(&dir, "storage.json", "buckets", |a| a.export_buckets()) {
                Ok(written) => {
                    size += written;
                    succeeded += 1;
                }
                Err(err) => error!("error backing up storage metadata: {err:#}"),
            }
        }

        let mut row_counts = BTreeMap::new();
        for table in &self.config.tables {
            let count = self.store.count(table).unwrap_or_else(|err| {
                warn!("row count for {table} failed: {err:#}");
                0
            });
            row_counts.insert(table.clone(), count);
        }
        let metadata = BackupMetadata {
            timestamp: timestamp(),
            version: FORMAT_VERSION.to_string(),
            tables: self.config.tables.clone(),
            row_counts,
            size,
            checksum: hasher.finalize().to_hex().to_string(),
            compressed: self.config.compress,
            encrypted: self.config.encrypt,
        };
        fs::write(dir.join(METADATA_FILE), serde_json::to_string_pretty(&metadata)?)
            .context("Writing backup metadata")?;

        info!("backup finished: {succeeded}/{total} parts");
        let pruned = self.prune().unwrap_or_else(|err| {
            warn!("pruning old backups failed: {err:#}");
            0
        });
        Ok(BackupSummary {
            dir,
            succeeded,
            total,
            pruned,
        })
    }

    /// Writes one table dump and returns the bytes written.
    fn dump_table(&self, table: &str, dir: &Path) -> Result<Vec<u8>> {
        info!("backing up table {table}");
        let data = self.store.select_all(table, DEFAULT_PAGE_SIZE)?;
        let dump = TableDump {
            table: table.to_string(),
            timestamp: timestamp(),
            count: data.len(),
            data,
        };
        let mut text = if self.config.compress {
            serde_json::to_string(&dump)?
        } else {
            serde_json::to_string_pretty(&dump)?
        };
        if self.config.encrypt {
            text = xor_encrypt(&text, &self.config.encryption_key);
        }
        let (name, bytes) = if self.config.compress {
            (format!("{table}.json.gz"), gzip(text.as_bytes())?)
        } else {
            (format!("{table}.json"), text.into_bytes())
        };
        fs::write(dir.join(&name), &bytes).with_context(|| format!("Writing {name}"))?;
        info!("table {table} backed up ({} rows)", dump.count);
        Ok(bytes)
    }

    fn export_accounts<F>(&self, dir: &Path, file: &str, field: &str, export: F) -> Result<u64>
    where
        F: FnOnce(&dyn AccountSource) -> Result<Vec<Value>>,
    {
        let accounts = self
            .accounts
            .ok_or_else(|| anyhow!("no admin API client configured"))?;
        let items = export(accounts)?;
        let mut body = json!({ "timestamp": timestamp(), "count": items.len() });
        body[field] = Value::Array(items);
        let text = serde_json::to_string_pretty(&body)?;
        fs::write(dir.join(file), &text).with_context(|| format!("Writing {file}"))?;
        Ok(text.len() as u64)
    }

    pub fn prune(&self) -> Result<usize> {
        let cutoff = retention_cutoff(SystemTime::now(), self.config.retention_days);
        prune_older_than(&self.config.backup_dir, cutoff)
    }

    pub fn restore_backup(&self, dir: &Path) -> Result<RestoreReport> {
        info!("restoring backup from {}", dir.display());
        let metadata_path = dir.join(METADATA_FILE);
        let raw = fs::read_to_string(&metadata_path)
            .with_context(|| format!("Reading {}", metadata_path.display()))?;
        let metadata: BackupMetadata =
            serde_json::from_str(&raw).context("Parsing backup metadata")?;

        let mut report = RestoreReport::default();
        for table in &metadata.tables {
            let Some(path) = dump_path(dir, table) else {
                warn!("no dump for {table}, skipping");
                continue;
            };
            match self.restore_table(table, &path) {
                Ok(rows) => {
                    info!("table {table} restored ({rows} rows)");
                    report.restored.push(table.clone());
                }
                Err(err) => {
                    error!("error restoring table {table}: {err:#}");
                    report.failed.push(table.clone());
                }
            }
        }
        Ok(report)
    }

    fn restore_table(&self, table: &str, path: &Path) -> Result<usize> {
        let dump = read_dump(path, &self.config.encryption_key)?;
        self.store
            .delete(table, &[Filter::not_null("id")])
            .with_context(|| format!("Clearing {table}"))?;
        for chunk in dump.data.chunks(RESTORE_CHUNK) {
            self.store
                .insert(table, chunk)
                .with_context(|| format!("Inserting into {table}"))?;
        }
        Ok(dump.data.len())
    }
}

fn dump_path(dir: &Path, table: &str) -> Option<PathBuf> {
    [format!("{table}.json.gz"), format!("{table}.json")]
        .into_iter()
        .map(|name| dir.join(name))
        .find(|path| path.is_file())
}

/// Reads a dump in any of the layouts `dump_table` writes. Payloads that do
/// not start with a JSON object are taken to be XOR-encrypted.
pub fn read_dump(path: &Path, key: &str) -> Result<TableDump> {
    let mut bytes = Vec::new();
    File::open(path)
        .with_context(|| format!("Opening {}", path.display()))?
        .read_to_end(&mut bytes)?;
    let text = if path.extension().is_some_and(|ext| ext == "gz") {
        gunzip(&bytes)?
    } else {
        String::from_utf8(bytes).context("Backup file is not UTF-8")?
    };
    let text = if text.trim_start().starts_with('{') {
        text
    } else {
        xor_decrypt(&text, key)?
    };
    serde_json::from_str(&text).with_context(|| format!("Parsing {}", path.display()))
}
