#![forbid(unsafe_code)]

//! Backup tool: one-off backups, restores, status and the hourly scheduler.

use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use anyhow::{Result, bail};
use chrono::Local;
use cinma_tools::backup::{BackupConfig, BackupKind, BackupSystem, due_backups};
use cinma_tools::config::{DEFAULT_ENV_PATH, Settings};
use cinma_tools::logging;
use cinma_tools::supabase::SupabaseClient;
use clap::{Parser, Subcommand};
use tracing::{error, info};

const DEFAULT_CONFIG_PATH: &str = "backup.toml";
const SCHEDULE_INTERVAL: Duration = Duration::from_secs(60 * 60);

#[derive(Parser, Debug)]
#[command(author, version, about = "Back up and restore the hosted tables.")]
struct Cli {
    #[arg(long = "env-file", value_name = "PATH", default_value = DEFAULT_ENV_PATH)]
    env_file: PathBuf,
    #[arg(long = "config", value_name = "PATH", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a backup now.
    Backup {
        #[arg(value_name = "TYPE", default_value = "daily")]
        kind: BackupKind,
    },
    /// Restore every table found in a backup directory.
    Restore {
        #[arg(value_name = "DIR")]
        dir: PathBuf,
    },
    /// Print whether a backup is running and when the last one happened.
    Status,
    /// Run scheduled backups until interrupted.
    Start,
}

fn main() -> Result<()> {
    logging::init();
    let cli = Cli::parse();
    let config = BackupConfig::load(&cli.config)?;
    let settings = Settings::load(&cli.env_file)?;
    let client = SupabaseClient::new(&settings.require_supabase()?);
    let system = BackupSystem::new(config, &client).with_accounts(&client);

    match cli.command {
        Command::Backup { kind } => {
            let summary = system.create_backup(kind)?;
            println!(
                "Backup written to {} ({}/{} parts, {} old backups pruned)",
                summary.dir.display(),
                summary.succeeded,
                summary.total,
                summary.pruned
            );
            if !summary.is_success() {
                bail!("backup finished with failures");
            }
        }
        Command::Restore { dir } => {
            let report = system.restore_backup(&dir)?;
            println!("Restored tables: {}", report.restored.join(", "));
            if !report.failed.is_empty() {
                bail!("failed to restore: {}", report.failed.join(", "));
            }
        }
        Command::Status => {
            let status = system.status();
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Command::Start => {
            info!("scheduled backups started, checking hourly");
            loop {
                for kind in due_backups(Local::now().naive_local()) {
                    info!("starting scheduled {} backup", kind.as_str());
                    if let Err(err) = system.create_backup(kind) {
                        error!("scheduled {} backup failed: {err:#}", kind.as_str());
                    }
                }
                thread::sleep(SCHEDULE_INTERVAL);
            }
        }
    }
    Ok(())
}
