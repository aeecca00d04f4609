#![forbid(unsafe_code)]

//! Pulls TMDB feeds into `movies` and `tv_series`. Meant to run from cron.

use std::path::PathBuf;

use anyhow::{Result, bail};
use cinma_tools::config::{DEFAULT_ENV_PATH, Settings};
use cinma_tools::engine::{ContentEngine, DEFAULT_RAMADAN_YEARS, EngineOptions, IngestReport};
use cinma_tools::logging;
use cinma_tools::store::{RowStore, SqliteStore};
use cinma_tools::supabase::SupabaseClient;
use cinma_tools::tmdb::TmdbClient;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(author, version, about = "Ingest TMDB feeds into the catalog tables.")]
struct Cli {
    #[arg(long = "env-file", value_name = "PATH", default_value = DEFAULT_ENV_PATH)]
    env_file: PathBuf,
    #[arg(
        long = "max-pages",
        value_name = "N",
        default_value_t = 1,
        help = "Pages fetched per feed"
    )]
    max_pages: u32,
    #[arg(
        long = "ramadan-from",
        value_name = "YEAR",
        default_value_t = *DEFAULT_RAMADAN_YEARS.start()
    )]
    ramadan_from: i32,
    #[arg(long = "ramadan-to", value_name = "YEAR", default_value_t = *DEFAULT_RAMADAN_YEARS.end())]
    ramadan_to: i32,
    #[arg(long = "dry-run", help = "Fetch and merge without writing rows")]
    dry_run: bool,
    #[arg(
        long = "local-db",
        value_name = "PATH",
        help = "Write to a local SQLite mirror instead of the hosted database"
    )]
    local_db: Option<PathBuf>,
}

fn main() -> Result<()> {
    logging::init();
    let cli = Cli::parse();
    if cli.ramadan_from > cli.ramadan_to {
        bail!("--ramadan-from must not be after --ramadan-to");
    }

    let settings = Settings::load(&cli.env_file)?;
    let tmdb = TmdbClient::new(settings.require_tmdb()?);
    let options = EngineOptions {
        max_pages: cli.max_pages.max(1),
        ramadan_years: cli.ramadan_from..=cli.ramadan_to,
        dry_run: cli.dry_run,
    };

    let report = match &cli.local_db {
        Some(path) => run(&tmdb, &SqliteStore::open(path)?, options),
        None => {
            let client = SupabaseClient::new(&settings.require_supabase()?);
            run(&tmdb, &client, options)
        }
    };

    println!(
        "Content engine finished: {} inserted, {} updated, {} failed, {} skipped",
        report.inserted, report.updated, report.failed, report.skipped
    );
    Ok(())
}

fn run<D: RowStore>(tmdb: &TmdbClient, store: &D, options: EngineOptions) -> IngestReport {
    ContentEngine::new(tmdb, store, options).run()
}
